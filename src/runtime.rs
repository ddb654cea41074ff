//! High-level runtime wrapper for WaveNet bootstrapping and generation.
//!
//! This module builds a model from a YAML config (loading or downloading its
//! weights), turns waveform primes and conditioning vectors into generation
//! inputs, and maps generated categories back to audio. It keeps that
//! boilerplate out of the CLI and tests.

use crate::audio::mulaw::{inv_mulaw_quantize, mulaw_quantize};
use crate::config::{load_config, Config, GenerationConfig};
use crate::download::download_if_necessary;
use crate::model::sampling::{argmax_rows, one_hot};
use crate::model::wavenet::{GenerateOptions, GenerationObserver, WaveNet};
use crate::perf::{self, Metric};
use crate::state::StreamingModule;
use crate::weights::load_wavenet_state_dict;
use anyhow::Result;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Seed for the weights of a model built without a checkpoint.
const INIT_SEED: u64 = 0;

/// Generation parameters for one runtime call.
#[derive(Debug, Clone, Default)]
pub struct RuntimeParams {
    /// Number of samples to generate (at least the prime length).
    pub steps: Option<usize>,
    /// Convert output scores to probabilities.
    pub softmax: bool,
    /// Sample categories instead of feeding back distributions.
    pub quantize: bool,
    /// Waveform in `[-1, 1]` used as a teacher-forced prefix.
    pub prime: Option<Vec<f32>>,
    /// Global conditioning vector (speaker embedding).
    pub global_conditioning: Option<Vec<f32>>,
}

impl RuntimeParams {
    /// Parameters taken from a config's generation defaults.
    pub fn from_generation_config(generation: &GenerationConfig) -> Self {
        Self {
            steps: generation.steps,
            softmax: generation.softmax,
            quantize: generation.quantize,
            prime: None,
            global_conditioning: None,
        }
    }
}

/// High-level WaveNet runtime that owns the model and configuration.
#[derive(Debug)]
pub struct WaveNetRuntime<B: Backend> {
    config: Config,
    model: WaveNet<B>,
    device: B::Device,
}

impl<B: Backend> WaveNetRuntime<B> {
    /// Create a runtime from a config path.
    pub fn from_config_path(path: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let _span = perf::span(Metric::RuntimeFromConfigPath);
        let config = load_config(path)?;
        Self::from_config(&config, device)
    }

    /// Create a runtime from an already-loaded config.
    ///
    /// Without a `weights_path` the model keeps seeded random weights, which
    /// is only useful for smoke tests.
    pub fn from_config(config: &Config, device: &B::Device) -> Result<Self> {
        let _span = perf::span(Metric::RuntimeFromConfig);
        info!("{}", config.model.debug_string());
        let model = match config.weights_path.as_deref() {
            Some(location) => {
                let path = download_if_necessary(location)?;
                info!("loading weights from {}", path.display());
                let state = load_wavenet_state_dict(&path)?;
                WaveNet::from_state_dict(&config.model, &state, device)?
            }
            None => {
                warn!("no weights_path configured; using randomly initialised weights");
                let mut rng = StdRng::seed_from_u64(INIT_SEED);
                WaveNet::init(&config.model, &mut rng, device)?
            }
        };
        Ok(Self {
            config: config.clone(),
            model,
            device: device.clone(),
        })
    }

    /// Access the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Access the underlying model.
    pub fn model(&self) -> &WaveNet<B> {
        &self.model
    }

    /// Build generation options from waveform-level parameters.
    pub fn options(&self, params: &RuntimeParams) -> Result<GenerateOptions<B>> {
        let labels = self.config.model.labels;
        let mut options = GenerateOptions {
            steps: params.steps,
            softmax: params.softmax,
            quantize: params.quantize,
            ..GenerateOptions::default()
        };
        if let Some(prime) = params.prime.as_ref().filter(|p| !p.is_empty()) {
            let categories: Vec<usize> = prime
                .iter()
                .map(|&sample| mulaw_quantize(sample, labels - 1))
                .collect();
            let frames = one_hot::<B>(&categories, labels, &self.device)?;
            // Channel-major, so a prime of exactly `labels` samples is not
            // mistaken for the other layout.
            options.teacher_inputs = Some(
                frames
                    .reshape([1, categories.len(), labels])
                    .swap_dims(1, 2),
            );
        }
        if let Some(vector) = params.global_conditioning.as_ref() {
            options.global_conditioning = Some(Tensor::from_data(
                TensorData::new(vector.clone(), [1, vector.len()]),
                &self.device,
            ));
        }
        Ok(options)
    }

    /// Generate categories for every batch item.
    ///
    /// Without quantisation the most probable category of each output frame
    /// is reported.
    pub fn generate<R, O>(
        &self,
        params: &RuntimeParams,
        rng: &mut R,
        observer: &mut O,
    ) -> Result<Vec<Vec<usize>>>
    where
        R: Rng + ?Sized,
        O: GenerationObserver + ?Sized,
    {
        let options = self.options(params)?;
        let mut state = self.model.init_state(1);
        let output = self
            .model
            .incremental_forward(&mut state, options, rng, observer)?;
        let [batch, labels, steps] = output.dims();
        (0..batch)
            .map(|item| -> Result<Vec<usize>> {
                let frames = output
                    .clone()
                    .narrow(0, item, 1)
                    .swap_dims(1, 2)
                    .reshape([steps, labels]);
                Ok(argmax_rows(frames)?)
            })
            .collect()
    }

    /// Map generated categories back to a waveform in `[-1, 1]`.
    pub fn decode_waveform(&self, categories: &[usize]) -> Vec<f32> {
        let mu = self.config.model.labels - 1;
        categories
            .iter()
            .map(|&category| inv_mulaw_quantize(category, mu))
            .collect()
    }
}
