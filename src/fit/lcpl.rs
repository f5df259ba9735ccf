//! Exponent selection for the linear combination of two power laws.
//!
//! A plain power law is fitted on every pixel first; the spread of the
//! fitted exponents sets the two exponents shared by the whole image.

use serde::{Deserialize, Serialize};

/// Percentile of the sorted exponents used for `r2`.
pub const LOW_PERCENTILE: f64 = 0.2;
/// Percentile of the sorted exponents used for `r1`.
pub const HIGH_PERCENTILE: f64 = 0.8;

/// The two exponents of an LCPL background, `r1 >= r2` and `r2 <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LcplExponents {
    pub r1: f64,
    pub r2: f64,
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Derive the LCPL exponents from per-pixel power-law exponents.
///
/// Non-finite values are ignored; `None` if nothing usable remains.
pub fn lcpl_exponents(exponents: &[f64]) -> Option<LcplExponents> {
    let mut sorted: Vec<f64> = exponents.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let r2 = percentile(&sorted, LOW_PERCENTILE).min(0.0);
    let r1 = percentile(&sorted, HIGH_PERCENTILE).max(r2);
    Some(LcplExponents { r1, r2 })
}
