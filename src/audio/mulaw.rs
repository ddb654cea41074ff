//! Mu-law companding and quantisation.
//!
//! Maps waveforms in `[-1, 1]` to the `mu + 1` categories a WaveNet predicts
//! and back. `mu` is `labels - 1` (255 for 256 categories).

/// Compress `x` in `[-1, 1]` with the mu-law curve.
pub fn mulaw(x: f32, mu: f32) -> f32 {
    x.signum() * (mu * x.abs()).ln_1p() / mu.ln_1p()
}

/// Expand a mu-law compressed value back to linear amplitude.
pub fn inv_mulaw(y: f32, mu: f32) -> f32 {
    y.signum() * ((1.0 + mu).powf(y.abs()) - 1.0) / mu
}

/// Compress and quantise `x` to a category in `0..=mu`.
pub fn mulaw_quantize(x: f32, mu: usize) -> usize {
    let mu_f = mu as f32;
    let y = mulaw(x.clamp(-1.0, 1.0), mu_f);
    let category = ((y + 1.0) / 2.0 * mu_f).round();
    category.clamp(0.0, mu_f) as usize
}

/// Map a category in `0..=mu` back to a linear amplitude.
pub fn inv_mulaw_quantize(category: usize, mu: usize) -> f32 {
    let mu_f = mu as f32;
    let y = 2.0 * category.min(mu) as f32 / mu_f - 1.0;
    inv_mulaw(y, mu_f)
}
