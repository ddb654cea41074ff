//! Conditioning expanders for the WaveNet model.
//!
//! Conditioners turn per-utterance vectors and per-sample feature sequences
//! into the per-step slices the residual blocks consume.

pub mod features;
