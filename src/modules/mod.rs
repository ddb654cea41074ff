//! Low-level building blocks for streaming WaveNet inference.
//!
//! These modules implement the causal convolution cell, the gated residual
//! block, the dilation schedule and the output head. Every stateful module
//! implements [`crate::state::StreamingModule`].

pub mod causal_conv;
pub mod dilation;
pub mod output_head;
pub mod residual;
