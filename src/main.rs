//! Command-line interface for incremental WaveNet generation.
//!
//! Wraps the runtime to generate audio from a config (optionally primed with
//! a WAV file and a global conditioning vector) and to inspect a model's
//! hyperparameters and receptive field.

#![recursion_limit = "256"]

use anyhow::Result;
use burn::tensor::backend::Backend;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::ValueEnum;
use clap::{Parser, Subcommand};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wavenet::audio::io::WavIo;
use wavenet::config::load_config;
use wavenet::modules::dilation::DilationSchedule;
use wavenet::perf;
use wavenet::runtime::{RuntimeParams, WaveNetRuntime};
use wavenet::WaveNetError;

#[cfg(feature = "backend-wgpu")]
use burn_wgpu::graphics::AutoGraphicsApi;
#[cfg(feature = "backend-wgpu")]
use burn_wgpu::{init_setup, Wgpu, WgpuDevice};

/// Supported compute backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
enum BackendChoice {
    /// Use the WGPU backend (GPU acceleration when available).
    Wgpu,
    /// Use the ndarray backend (CPU).
    Ndarray,
}

#[cfg(feature = "backend-wgpu")]
const DEFAULT_BACKEND: BackendChoice = BackendChoice::Wgpu;
#[cfg(not(feature = "backend-wgpu"))]
const DEFAULT_BACKEND: BackendChoice = BackendChoice::Ndarray;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "wavenet")]
#[command(about = "Incremental WaveNet audio generation", long_about = None)]
struct Cli {
    /// Log progress and print a performance summary at the end of the run.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Compute backend to use.
    #[arg(long, value_enum, default_value_t = DEFAULT_BACKEND, global = true)]
    backend: BackendChoice,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Generate a waveform sample by sample.
    Generate {
        /// Model configuration YAML.
        #[arg(long)]
        config: PathBuf,
        /// Output WAV file path.
        #[arg(long)]
        output: PathBuf,
        /// Number of samples to generate (defaults to the config value).
        #[arg(long)]
        steps: Option<usize>,
        /// Seed for the sampling RNG.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// WAV file whose first samples are teacher-forced.
        #[arg(long)]
        prime: Option<PathBuf>,
        /// Number of priming samples to take from `--prime`.
        #[arg(long, default_value_t = 1600)]
        prime_samples: usize,
        /// Comma-separated global conditioning vector.
        #[arg(long, value_delimiter = ',')]
        global_cond: Option<Vec<f32>>,
        /// Feed back probabilities instead of sampled categories.
        #[arg(long)]
        no_quantize: bool,
        /// Print a progress line every second of generated audio.
        #[arg(long)]
        progress: bool,
    },
    /// Print hyperparameters, dilations and receptive field of a config.
    Info {
        /// Model configuration YAML.
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone)]
struct GenerateArgs {
    config: PathBuf,
    output: PathBuf,
    steps: Option<usize>,
    seed: u64,
    prime: Option<PathBuf>,
    prime_samples: usize,
    global_cond: Option<Vec<f32>>,
    no_quantize: bool,
    progress: bool,
}

/// Entry point for the CLI.
fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let backend = cli.backend;
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Generate {
            config,
            output,
            steps,
            seed,
            prime,
            prime_samples,
            global_cond,
            no_quantize,
            progress,
        } => {
            let args = GenerateArgs {
                config,
                output,
                steps,
                seed,
                prime,
                prime_samples,
                global_cond,
                no_quantize,
                progress,
            };
            let interrupted = Arc::new(AtomicBool::new(false));
            let interrupt_flag = Arc::clone(&interrupted);
            ctrlc::set_handler(move || {
                interrupt_flag.store(true, Ordering::SeqCst);
            })?;
            match backend {
                BackendChoice::Wgpu => {
                    #[cfg(feature = "backend-wgpu")]
                    {
                        let device = WgpuDevice::default();
                        init_setup::<AutoGraphicsApi>(&device, Default::default());
                        run_generate::<Wgpu>(args, &device, interrupted)?;
                    }
                    #[cfg(not(feature = "backend-wgpu"))]
                    {
                        let _ = args;
                        anyhow::bail!("WGPU backend not enabled; build with --features backend-wgpu");
                    }
                }
                BackendChoice::Ndarray => {
                    let device = NdArrayDevice::default();
                    run_generate::<NdArray<f32>>(args, &device, interrupted)?;
                }
            }
        }
        Commands::Info { config } => {
            let config = load_config(&config)?;
            let schedule = DilationSchedule::new(config.model.layers, config.model.stacks)?;
            let kernel_size = config.model.kernel_size;
            let receptive_field = schedule.receptive_field(kernel_size)?;
            let history = (0..schedule.len())
                .map(|layer| schedule.buffer_len(layer, kernel_size))
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", config.model.debug_string());
            println!("Dilations: {:?}", schedule.dilations());
            println!("History frames: {history:?}");
            println!(
                "Receptive field: {} samples ({:.1} ms at {} Hz)",
                receptive_field,
                receptive_field as f64 * 1000.0 / config.sample_rate as f64,
                config.sample_rate
            );
        }
    }

    if verbose {
        eprintln!("{}", perf::report());
    }

    Ok(())
}

fn run_generate<B: Backend>(
    args: GenerateArgs,
    device: &B::Device,
    interrupted: Arc<AtomicBool>,
) -> Result<()> {
    let runtime = WaveNetRuntime::<B>::from_config_path(&args.config, device)?;
    let sample_rate = runtime.config().sample_rate;

    let mut params = RuntimeParams::from_generation_config(&runtime.config().generation);
    if args.steps.is_some() {
        params.steps = args.steps;
    }
    if args.no_quantize {
        params.quantize = false;
    }
    params.global_conditioning = args.global_cond;
    if let Some(path) = args.prime.as_ref() {
        let (mut samples, prime_rate) = WavIo::read_mono(path)?;
        if prime_rate != sample_rate {
            warn!("prime sample rate {prime_rate} Hz differs from model rate {sample_rate} Hz");
        }
        samples.truncate(args.prime_samples);
        info!("priming with {} samples from {}", samples.len(), path.display());
        params.prime = Some(samples);
    }

    let report_every = sample_rate.max(1) as usize;
    let progress = args.progress;
    let mut observer = |step: usize, total: usize| {
        if interrupted.load(Ordering::SeqCst) {
            return ControlFlow::Break(());
        }
        if progress && ((step + 1) % report_every == 0 || step + 1 == total) {
            eprintln!("generated {}/{} samples", step + 1, total);
        }
        ControlFlow::Continue(())
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let categories = match runtime.generate(&params, &mut rng, &mut observer) {
        Ok(categories) => categories,
        Err(err) => match err.downcast_ref::<WaveNetError>() {
            Some(WaveNetError::Cancelled { step }) => {
                anyhow::bail!("Interrupted after {} samples", step + 1)
            }
            _ => return Err(err),
        },
    };

    let waveform = categories
        .first()
        .map(|item| runtime.decode_waveform(item))
        .ok_or_else(|| anyhow::anyhow!("generation produced no output"))?;
    WavIo::write_wav(&args.output, &[waveform], sample_rate)?;
    info!("wrote {}", args.output.display());
    Ok(())
}
