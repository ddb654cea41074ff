//! Audio helpers for the CLI and tests.
//!
//! The model itself only sees categorical frames; these helpers convert
//! between those categories and waveforms (mu-law companding) and read or
//! write WAV files.

pub mod io;
pub mod mulaw;
