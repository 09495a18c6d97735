//! Sample sanitation.
//!
//! Scalar samples are validated before they enter a ring buffer; whole arrays
//! are repaired before they enter the filter chain.

use ndarray::Array1;

use crate::config::IntensityBounds;
use crate::dsp::DspProcessor;
use crate::error::{Result, SignalError};

/// Largest magnitude accepted for any scalar sample.
pub const MAX_SAMPLE_MAGNITUDE: f32 = 1e6;

/// Repair NaN and infinite entries in `x`.
///
/// NaN entries are linearly interpolated between the nearest finite
/// neighbours on each side, or replaced by the mean of the finite entries when
/// one side has none. Infinite entries are replaced by the median of the
/// finite entries.
///
/// Returns `(clean, ok)`. `ok == false` comes with an empty array and means
/// the input was empty or held no finite value at all. When `ok == true`
/// every entry of `clean` is finite and `clean.len() == x.len()`.
pub fn validate_array(x: &[f32]) -> (Array1<f32>, bool) {
    if x.is_empty() {
        return (Array1::zeros(0), false);
    }

    let finite: Vec<f32> = x.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (Array1::zeros(0), false);
    }

    if finite.len() == x.len() {
        return (Array1::from(x.to_vec()), true);
    }

    let mean = finite.iter().sum::<f32>() / finite.len() as f32;
    let median = DspProcessor::median(&finite);

    let mut clean = x.to_vec();
    for i in 0..x.len() {
        let v = x[i];
        if v.is_nan() {
            let prev = (0..i).rev().find(|&j| x[j].is_finite());
            let next = (i + 1..x.len()).find(|&j| x[j].is_finite());
            clean[i] = match (prev, next) {
                (Some(p), Some(q)) => {
                    let frac = (i - p) as f32 / (q - p) as f32;
                    x[p] + frac * (x[q] - x[p])
                }
                _ => mean,
            };
        } else if v.is_infinite() {
            clean[i] = median;
        }
    }

    // Interpolating between huge finite neighbours can still overflow.
    if clean.iter().any(|v| !v.is_finite()) {
        return (Array1::zeros(0), false);
    }

    (Array1::from(clean), true)
}

/// Accept a scalar only if it is finite and within [`MAX_SAMPLE_MAGNITUDE`].
pub fn validate_scalar(v: f32) -> Option<f32> {
    if v.is_finite() && v.abs() <= MAX_SAMPLE_MAGNITUDE {
        Some(v)
    } else {
        None
    }
}

/// Scalar validation with channel-specific bounds and a typed rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleValidator {
    bounds: Option<IntensityBounds>,
}

impl SampleValidator {
    pub fn new(bounds: Option<IntensityBounds>) -> Self {
        Self { bounds }
    }

    /// Validate one extracted sample.
    pub fn check(&self, v: f32) -> Result<f32> {
        if !v.is_finite() {
            return Err(SignalError::NonFiniteSample);
        }
        let v = validate_scalar(v).ok_or(SignalError::SampleOutOfRange {
            value: v,
            min: -MAX_SAMPLE_MAGNITUDE,
            max: MAX_SAMPLE_MAGNITUDE,
        })?;

        if let Some(b) = self.bounds {
            if v < b.min || v > b.max {
                return Err(SignalError::SampleOutOfRange {
                    value: v,
                    min: b.min,
                    max: b.max,
                });
            }
        }

        Ok(v)
    }
}
