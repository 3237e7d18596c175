// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Kolmogorov–Smirnov goodness-of-fit check against a uniform integer range
//!
//! Values drawn from the service are integers, so the theoretical distribution is
//! the discrete uniform on `[min, max)`. The statistic is evaluated at every
//! distinct sample value, on the step and on its left limit, which keeps ties
//! and empty stretches of the range from hiding a deviation.

use crate::{Error, Result};

/// Significance level used when none is given
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Discrete uniform distribution over the half-open range `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformRange {
    min: i64,
    max: i64,
}

impl UniformRange {
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if max <= min {
            return Err(Error::Validation(format!(
                "range requires max > min, got [{}, {})",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Range covering every `i32`
    pub fn full_i32() -> Self {
        Self {
            min: i32::MIN as i64,
            max: i32::MAX as i64 + 1,
        }
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// P(X <= x)
    pub fn cdf(&self, x: i64) -> f64 {
        let span = self.max as i128 - self.min as i128;
        let at_or_below = x as i128 - self.min as i128 + 1;
        (at_or_below as f64 / span as f64).clamp(0.0, 1.0)
    }
}

/// Result of a Kolmogorov–Smirnov check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsOutcome {
    /// Largest distance between empirical and theoretical CDF
    pub statistic: f64,
    /// Rejection threshold for the sample size and significance level
    pub critical_value: f64,
    pub sample_size: usize,
    pub alpha: f64,
}

impl KsOutcome {
    /// True when the sample is consistent with the distribution at level `alpha`
    pub fn passes(&self) -> bool {
        self.statistic <= self.critical_value
    }
}

/// Asymptotic critical value `sqrt(-0.5 * ln(alpha / 2)) / sqrt(n)`
pub fn critical_value(alpha: f64, sample_size: usize) -> f64 {
    (-0.5 * (alpha / 2.0).ln()).sqrt() / (sample_size as f64).sqrt()
}

/// Sort `sample` and test it against `distribution` at significance level `alpha`
pub fn kolmogorov_smirnov(
    sample: &mut [i64],
    distribution: &UniformRange,
    alpha: f64,
) -> Result<KsOutcome> {
    if sample.is_empty() {
        return Err(Error::Validation("sample must not be empty".to_string()));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(Error::Validation(format!(
            "alpha must lie in (0, 1), got {}",
            alpha
        )));
    }

    sample.sort_unstable();
    let n = sample.len() as f64;
    let mut below = 0usize;
    let mut statistic = 0.0f64;

    for run in sample.chunk_by(|a, b| a == b) {
        let value = run[0];
        let at_or_below = below + run.len();

        let left = (below as f64 / n - distribution.cdf(value.saturating_sub(1))).abs();
        let step = (at_or_below as f64 / n - distribution.cdf(value)).abs();
        statistic = statistic.max(left).max(step);

        below = at_or_below;
    }

    Ok(KsOutcome {
        statistic,
        critical_value: critical_value(alpha, sample.len()),
        sample_size: sample.len(),
        alpha,
    })
}
