//! The WaveNet model and its output sampling.
//!
//! `wavenet` wires the residual stack and output head together and drives
//! incremental generation; `sampling` turns output distributions back into
//! one-hot input frames.

pub mod sampling;
pub mod wavenet;
