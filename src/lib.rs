//! # wavenet - Incremental WaveNet generation
//!
//! An inference engine for autoregressive WaveNet vocoders. A trained network
//! is run one audio sample at a time: each generated sample is fed back as
//! the next input, and every dilated causal convolution keeps only the short
//! history its kernel needs, so a step costs the same at sample 10 as at
//! sample 100 000.
//!
//! ## Architecture Overview
//!
//! 1. **Causal convolution cell** ([`modules::causal_conv`]): a dilated 1-D
//!    convolution usable in bulk mode or one frame at a time, backed by a
//!    fixed-length ring buffer.
//!
//! 2. **Residual stack** ([`modules::residual`]): gated (`tanh * sigmoid`)
//!    blocks with optional local and global conditioning, whose skip outputs
//!    are accumulated with a `sqrt(0.5)` rescale.
//!
//! 3. **Output head** ([`modules::output_head`]): ReLU and 1x1 projections
//!    mapping accumulated skips to one score per category.
//!
//! 4. **Generation loop** ([`WaveNet::incremental_forward`]): seeding, teacher
//!    forcing, softmax and categorical sampling with an injected RNG.
//!
//! ## Quick Start
//!
//! ```no_run
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use rand::{rngs::StdRng, SeedableRng};
//! use wavenet::{GenerateOptions, WaveNet, WaveNetConfig};
//!
//! let device = NdArrayDevice::default();
//! let mut rng = StdRng::seed_from_u64(0);
//! let model = WaveNet::<NdArray<f32>>::init(&WaveNetConfig::default(), &mut rng, &device).unwrap();
//!
//! // 16 000 one-hot frames, [1, 256, 16000]
//! let audio = model.generate(GenerateOptions::new(16_000), &mut rng).unwrap();
//! ```
//!
//! ## Streaming state
//!
//! Weights are immutable; history lives in a [`WaveNetState`] created by
//! [`state::StreamingModule::init_state`]. Concurrent runs over one model each
//! own their state:
//!
//! ```no_run
//! # use burn_ndarray::{NdArray, NdArrayDevice};
//! # use rand::{rngs::StdRng, SeedableRng};
//! # use wavenet::{GenerateOptions, WaveNet, WaveNetConfig};
//! use wavenet::model::wavenet::NoProgress;
//! use wavenet::state::StreamingModule;
//! # let device = NdArrayDevice::default();
//! # let mut rng = StdRng::seed_from_u64(0);
//! # let model = WaveNet::<NdArray<f32>>::init(&WaveNetConfig::default(), &mut rng, &device).unwrap();
//!
//! let mut state = model.init_state(1);
//! let options = GenerateOptions::new(400).with_quantize(true);
//! let audio = model
//!     .incremental_forward(&mut state, options, &mut rng, &mut NoProgress)
//!     .unwrap();
//! ```
//!
//! ## Configuration
//!
//! Models are configured via YAML files (see [`Config`]). Weights are
//! SafeTensors checkpoints loaded from local files or from HuggingFace Hub
//! using the `hf://` URL scheme.

pub mod audio;
pub mod config;
pub mod download;
pub mod error;
pub mod perf;
pub mod runtime;

// Internal building blocks, exposed for integration tests.
#[doc(hidden)]
pub mod conditioner;
pub mod model;
pub mod modules;
pub mod state;
#[doc(hidden)]
pub mod weights;

pub use config::{load_config, Config, GenerationConfig, WaveNetConfig};
pub use download::download_if_necessary;
pub use error::WaveNetError;
pub use model::wavenet::{GenerateOptions, GenerationObserver, WaveNet, WaveNetState};
