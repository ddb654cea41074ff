//! Error types raised by the WaveNet inference engine.
//!
//! Every failure inside the engine is a configuration or usage error: given
//! fixed weights and a fixed randomness source, generation is deterministic,
//! so nothing here is retriable.

use thiserror::Error;

/// Errors produced while building or running a [`crate::WaveNet`].
#[derive(Error, Debug)]
pub enum WaveNetError {
    /// Invalid hyperparameters or generation arguments.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A tensor's width disagrees with the configured layout.
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which input was malformed.
        what: String,
        /// Expected size or shape.
        expected: String,
        /// Observed size or shape.
        actual: String,
    },

    /// Missing or malformed checkpoint tensors.
    #[error("Weight error: {0}")]
    Weights(String),

    /// The output distribution could not be sampled.
    #[error("Sampling error: {0}")]
    Sampling(String),

    /// The caller aborted generation between steps.
    #[error("Generation cancelled at step {step}")]
    Cancelled {
        /// Index of the last completed step.
        step: usize,
    },
}

impl WaveNetError {
    /// Shorthand for a [`WaveNetError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a [`WaveNetError::ShapeMismatch`].
    pub fn shape(
        what: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, WaveNetError>;
