//! Streaming state helpers shared across the incremental generation engine.
//!
//! Modules hold immutable weights; everything that changes from one time step
//! to the next lives in a separate state value created by
//! [`StreamingModule::init_state`]. A generation run owns its state, so two
//! runs can never observe each other's history.

use burn::tensor::backend::Backend;

/// Trait implemented by modules that keep per-run streaming state.
pub trait StreamingModule<B: Backend> {
    /// Concrete state type for this module.
    type State: StreamingState;

    /// Allocate a fresh, zeroed state for `batch_size` parallel sequences.
    fn init_state(&self, batch_size: usize) -> Self::State;
}

/// Per-run state that can be rewound without reallocating.
pub trait StreamingState {
    /// Forget all history, leaving the state as if freshly allocated.
    fn reset(&mut self);
}

/// Position counter for an incremental run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStep {
    step: usize,
}

impl StreamStep {
    /// Start counting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps processed so far.
    pub fn get(&self) -> usize {
        self.step
    }

    /// Advance the counter by `increment` steps.
    pub fn increment(&mut self, increment: usize) {
        self.step = self.step.saturating_add(increment);
    }

    /// Rewind to step zero.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
