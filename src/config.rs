//! Configuration types for WaveNet architecture, generation defaults and weights.
//!
//! Configurations are typically loaded from YAML files using [`load_config`].

use crate::error::WaveNetError;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Network hyperparameters.
pub struct WaveNetConfig {
    /// Number of output categories (and one-hot input width).
    #[serde(default = "default_labels")]
    pub labels: usize,
    /// Residual channel width.
    pub channels: usize,
    /// Total number of residual blocks.
    pub layers: usize,
    /// Number of dilation cycles the blocks are split into.
    pub stacks: usize,
    /// Kernel size of every dilated convolution.
    pub kernel_size: usize,
    /// Training-time dropout probability. Ignored at inference.
    #[serde(default)]
    pub dropout: f32,
    /// Local conditioning channels, if the model is locally conditioned.
    #[serde(default)]
    pub cin_channels: Option<usize>,
    /// Global conditioning channels, if the model is globally conditioned.
    #[serde(default)]
    pub gin_channels: Option<usize>,
}

fn default_labels() -> usize {
    256
}

impl Default for WaveNetConfig {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            channels: 128,
            layers: 18,
            stacks: 2,
            kernel_size: 3,
            dropout: 0.05,
            cin_channels: None,
            gin_channels: None,
        }
    }
}

impl WaveNetConfig {
    /// Check the hyperparameters before any weights are allocated.
    pub fn validate(&self) -> Result<(), WaveNetError> {
        for (name, value) in [
            ("labels", self.labels),
            ("channels", self.channels),
            ("layers", self.layers),
            ("stacks", self.stacks),
            ("kernel_size", self.kernel_size),
        ] {
            if value == 0 {
                return Err(WaveNetError::config(format!("{name} must be positive")));
            }
        }
        if self.layers % self.stacks != 0 {
            return Err(WaveNetError::config(format!(
                "layers ({}) must be divisible by stacks ({})",
                self.layers, self.stacks
            )));
        }
        if self.channels % 2 != 0 {
            return Err(WaveNetError::config(format!(
                "channels ({}) must be even for the gated activation split",
                self.channels
            )));
        }
        if self.cin_channels == Some(0) || self.gin_channels == Some(0) {
            return Err(WaveNetError::config(
                "conditioning channels must be positive when set",
            ));
        }
        Ok(())
    }

    /// Human-readable dump of every hyperparameter, sorted by name.
    pub fn debug_string(&self) -> String {
        let fmt_opt = |value: Option<usize>| match value {
            Some(v) => v.to_string(),
            None => "None".to_string(),
        };
        let mut rows = [
            ("channels", self.channels.to_string()),
            ("cin_channels", fmt_opt(self.cin_channels)),
            ("dropout", self.dropout.to_string()),
            ("gin_channels", fmt_opt(self.gin_channels)),
            ("kernel_size", self.kernel_size.to_string()),
            ("labels", self.labels.to_string()),
            ("layers", self.layers.to_string()),
            ("stacks", self.stacks.to_string()),
        ];
        rows.sort_by(|a, b| a.0.cmp(b.0));
        let mut output = String::from("Hyperparameters:");
        for (name, value) in rows {
            let _ = write!(&mut output, "\n  {name}: {value}");
        }
        output
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Defaults for incremental generation.
pub struct GenerationConfig {
    /// Number of samples to generate when not given on the command line.
    #[serde(default)]
    pub steps: Option<usize>,
    /// Convert scores to probabilities before feeding them back.
    #[serde(default = "default_true")]
    pub softmax: bool,
    /// Sample a category and feed back its one-hot encoding.
    #[serde(default = "default_true")]
    pub quantize: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            steps: None,
            softmax: true,
            quantize: true,
        }
    }
}

/// Top-level vocoder configuration.
///
/// # Example YAML
///
/// ```yaml
/// name: wavenet_vocoder
/// sample_rate: 16000
/// model:
///   labels: 256
///   channels: 128
///   layers: 18
///   stacks: 2
///   kernel_size: 3
///   dropout: 0.05
/// generation:
///   steps: 16000
/// weights_path: "hf://owner/repo/wavenet.safetensors"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Informational model name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Audio sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Network hyperparameters.
    pub model: WaveNetConfig,
    /// Generation defaults.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Path to model weights (supports `hf://` URLs).
    #[serde(default)]
    pub weights_path: Option<String>,
}

fn default_name() -> String {
    "wavenet_vocoder".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            sample_rate: default_sample_rate(),
            model: WaveNetConfig::default(),
            generation: GenerationConfig::default(),
            weights_path: None,
        }
    }
}

/// Load a model configuration from a YAML file.
///
/// Relative `weights_path` entries are resolved against the file location.
///
/// # Errors
///
/// Returns an error if the file doesn't exist, contains invalid YAML, or
/// describes an invalid network.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let mut config: Config = serde_yaml::from_str(&data)?;
    config.model.validate()?;
    if let Some(weights) = config.weights_path.as_mut() {
        if !weights.contains("://") {
            *weights = resolve_relative_path(path, weights)
                .to_string_lossy()
                .into_owned();
        }
    }
    Ok(config)
}

/// Resolve a possibly relative path against a config file location.
pub fn resolve_relative_path(config_path: &Path, maybe_relative: &str) -> PathBuf {
    let candidate = Path::new(maybe_relative);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(candidate)
}
