//! Mu-law companding and the legacy first-order emphasis pair.

/// Mu-law compression parameter.
pub const MU: f64 = 255.0;
/// Coefficient of the legacy first-order pre-/de-emphasis filters.
pub const PREEMPH_COEFF: f64 = 0.97;

/// Logarithmic compression of `x` in [-1, 1].
#[inline]
pub fn mu_law_compress(x: f64) -> f64 {
    x.signum() * (1.0 + MU * x.abs()).ln() / (1.0 + MU).ln()
}

/// Inverse of [`mu_law_compress`].
#[inline]
pub fn mu_law_expand(y: f64) -> f64 {
    y.signum() * ((1.0 + MU).powf(y.abs()) - 1.0) / MU
}

/// Legacy pre-emphasis: `y[n] = x[n] - 0.97 x[n-1]`.
pub fn pre_emphasis(samples: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    let mut prev = 0.0;
    for (i, &x) in samples.iter().enumerate() {
        out.push(if i == 0 { x } else { x - PREEMPH_COEFF * prev });
        prev = x;
    }
    out
}

/// Legacy de-emphasis: `y[n] = x[n] + 0.97 y[n-1]`.
pub fn de_emphasis(samples: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(samples.len());
    for &x in samples {
        let prev = out.last().copied().unwrap_or(0.0);
        out.push(x + PREEMPH_COEFF * prev);
    }
    out
}
