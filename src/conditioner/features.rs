//! Global and local conditioning expansion.
//!
//! Global conditioning is one vector per sequence, broadcast to every step.
//! Local conditioning is already upsampled to one frame per sample upstream;
//! here it is only moved from channel-major `[batch, cin, time]` to time-major
//! `[batch, time, cin]` so a step can slice its frame cheaply.

use crate::error::{Result, WaveNetError};
use burn::tensor::{backend::Backend, Tensor};

/// A global conditioning vector broadcast over `steps` time steps.
///
/// Only the single `[batch, gin]` vector is stored; every step sees the same
/// value.
#[derive(Debug, Clone)]
pub struct GlobalConditioning<B: Backend> {
    vector: Tensor<B, 2>,
    steps: usize,
}

impl<B: Backend> GlobalConditioning<B> {
    /// Batch size and channel count `[batch, gin]`.
    pub fn dims(&self) -> [usize; 2] {
        self.vector.dims()
    }

    /// The `[batch, gin]` slice for step `step`.
    pub fn at(&self, step: usize) -> Tensor<B, 2> {
        debug_assert!(step < self.steps, "step {step} out of {}", self.steps);
        self.vector.clone()
    }

    /// Materialise the `[batch, gin, steps]` channel-major view used by the bulk pass.
    pub fn channel_major(&self) -> Tensor<B, 3> {
        let [batch, channels] = self.vector.dims();
        self.vector
            .clone()
            .reshape([batch, channels, 1])
            .repeat_dim(2, self.steps)
    }
}

/// Broadcast `global` (`[batch, gin]`) across `steps` time steps.
///
/// The time axis is never part of the input: callers holding a
/// `[batch, gin, 1]` tensor reshape it to `[batch, gin]` first.
pub fn expand_global<B: Backend>(
    global: Option<Tensor<B, 2>>,
    steps: usize,
) -> Option<GlobalConditioning<B>> {
    global.map(|vector| GlobalConditioning { vector, steps })
}

/// Local conditioning features in time-major layout `[batch, time, cin]`.
#[derive(Debug, Clone)]
pub struct LocalConditioning<B: Backend> {
    frames: Tensor<B, 3>,
}

impl<B: Backend> LocalConditioning<B> {
    /// Shape `[batch, time, cin]`.
    pub fn dims(&self) -> [usize; 3] {
        self.frames.dims()
    }

    /// The `[batch, cin]` frame for step `step`.
    pub fn at(&self, step: usize) -> Tensor<B, 2> {
        let [batch, _, channels] = self.frames.dims();
        self.frames
            .clone()
            .narrow(1, step, 1)
            .reshape([batch, channels])
    }
}

/// Reorder channel-major local features `[batch, cin, steps]` for per-step slicing.
///
/// Features already in time-major `[batch, steps, cin]` layout are accepted as
/// is. Any other time length is an error: alignment happens upstream.
pub fn align_local<B: Backend>(
    local: Option<Tensor<B, 3>>,
    steps: usize,
) -> Result<Option<LocalConditioning<B>>> {
    let Some(local) = local else {
        return Ok(None);
    };
    let dims = local.dims();
    let frames = if dims[2] == steps {
        local.swap_dims(1, 2)
    } else if dims[1] == steps {
        local
    } else {
        return Err(WaveNetError::config(format!(
            "local conditioning of shape {dims:?} is not aligned to {steps} steps"
        )));
    };
    Ok(Some(LocalConditioning { frames }))
}
