//! Detrend → bandpass → smoothing filter chain.
//!
//! Every stage returns a [`StageOutcome`] instead of an error. The chain keeps
//! the last known-good array whenever a stage fails or hands back an empty or
//! non-finite result, so one bad stage never poisons the output.

use ndarray::Array1;

use super::butterworth::SosFilter;
use crate::config::FilterConfig;
use crate::sanitize::validate_array;

/// Normalized cutoffs are clamped into this range.
pub const MIN_NORMALIZED_CUTOFF: f64 = 0.001;
pub const MAX_NORMALIZED_CUTOFF: f64 = 0.999;

/// Why a stage degraded or failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DegradeReason {
    EmptyInput,
    /// Input held no finite value at all.
    NonFiniteInput,
    /// NaN/Inf entries were repaired before processing.
    InputRepaired,
    /// Linear fit was singular; mean removal used instead.
    SingularTrend,
    /// Cutoffs were clamped or reordered; values in Hz after correction.
    CutoffsAdjusted { low_hz: f32, high_hz: f32 },
    /// Order, sampling rate or cutoffs unusable even after correction.
    InvalidDesign,
    UnstableFilter,
    NonFiniteOutput,
    /// Smoothing window clamped to the signal length.
    WindowClamped { requested: usize, used: usize },
    TooShort { len: usize },
    /// The chain discarded a stage result that was empty, non-finite or
    /// changed the signal length.
    RejectedOutput,
}

/// Result of one filter stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Ok(Array1<f32>),
    Degraded(Array1<f32>, DegradeReason),
    Failed(DegradeReason),
}

impl StageOutcome {
    /// The data carried by the outcome, if any.
    pub fn data(&self) -> Option<&Array1<f32>> {
        match self {
            Self::Ok(d) | Self::Degraded(d, _) => Some(d),
            Self::Failed(_) => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn into_data(self) -> Option<Array1<f32>> {
        match self {
            Self::Ok(d) | Self::Degraded(d, _) => Some(d),
            Self::Failed(_) => None,
        }
    }
}

/// Remove the least-squares linear trend.
///
/// Falls back to mean removal when the fit is singular or non-finite.
pub fn detrend(x: &[f32]) -> StageOutcome {
    let n = x.len();
    if n == 0 {
        return StageOutcome::Failed(DegradeReason::EmptyInput);
    }
    if x.iter().any(|v| !v.is_finite()) {
        return StageOutcome::Failed(DegradeReason::NonFiniteInput);
    }

    let mean = x.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let demeaned = || Array1::from_iter(x.iter().map(|&v| (v as f64 - mean) as f32));
    if n == 1 {
        return StageOutcome::Ok(demeaned());
    }

    // Fit y = a + b*i with i = 0..n-1
    let n_f = n as f64;
    let sum_x = n_f * (n_f - 1.0) / 2.0;
    let sum_x2 = n_f * (n_f - 1.0) * (2.0 * n_f - 1.0) / 6.0;
    let sum_y = mean * n_f;
    let sum_xy: f64 = x.iter().enumerate().map(|(i, &y)| i as f64 * y as f64).sum();

    let denom = n_f * sum_x2 - sum_x * sum_x;
    if denom.abs() < 1e-30 || !denom.is_finite() {
        return StageOutcome::Degraded(demeaned(), DegradeReason::SingularTrend);
    }

    let b = (n_f * sum_xy - sum_x * sum_y) / denom;
    let a = (sum_y - b * sum_x) / n_f;
    let out = Array1::from_iter(
        x.iter()
            .enumerate()
            .map(|(i, &y)| (y as f64 - (a + b * i as f64)) as f32),
    );

    if out.iter().all(|v| v.is_finite()) {
        StageOutcome::Ok(out)
    } else {
        StageOutcome::Degraded(demeaned(), DegradeReason::SingularTrend)
    }
}

/// Zero-phase Butterworth bandpass.
///
/// Cutoffs are normalized to Nyquist, clamped into
/// `[MIN_NORMALIZED_CUTOFF, MAX_NORMALIZED_CUTOFF]`, and when `low >= high`
/// the low edge is moved to `0.8 × high`. When the filter cannot be built or
/// produces non-finite output, the sanitized input comes back as `Degraded`.
pub fn bandpass(x: &[f32], low_hz: f32, high_hz: f32, fs: f32, order: usize) -> StageOutcome {
    if x.is_empty() {
        return StageOutcome::Failed(DegradeReason::EmptyInput);
    }
    let (clean, ok) = validate_array(x);
    if !ok {
        return StageOutcome::Failed(DegradeReason::NonFiniteInput);
    }
    let repaired = x.iter().any(|v| !v.is_finite());

    if !(fs.is_finite() && fs > 0.0 && low_hz.is_finite() && high_hz.is_finite()) || order == 0 {
        log::debug!("bandpass: unusable design (fs={}, order={})", fs, order);
        return StageOutcome::Degraded(clean, DegradeReason::InvalidDesign);
    }
    if clean.len() < 2 {
        return StageOutcome::Degraded(clean.clone(), DegradeReason::TooShort { len: clean.len() });
    }

    let nyquist = fs as f64 / 2.0;
    let raw_low = low_hz as f64 / nyquist;
    let raw_high = high_hz as f64 / nyquist;
    let mut low = raw_low.clamp(MIN_NORMALIZED_CUTOFF, MAX_NORMALIZED_CUTOFF);
    let high = raw_high.clamp(MIN_NORMALIZED_CUTOFF, MAX_NORMALIZED_CUTOFF);
    if low >= high {
        low = 0.8 * high;
    }
    let adjusted = low != raw_low || high != raw_high;

    let sos = match SosFilter::bandpass(low, high, order) {
        Ok(sos) => sos,
        Err(reason) => {
            log::debug!("bandpass: design failed ({:?}), passing input through", reason);
            return StageOutcome::Degraded(clean, reason);
        }
    };

    let input: Vec<f64> = clean.iter().map(|&v| v as f64).collect();
    let filtered = sos.filtfilt(&input);
    if filtered.iter().any(|v| !v.is_finite()) {
        log::debug!("bandpass: non-finite output, passing input through");
        return StageOutcome::Degraded(clean, DegradeReason::NonFiniteOutput);
    }
    let out = Array1::from_iter(filtered.into_iter().map(|v| v as f32));

    if adjusted {
        StageOutcome::Degraded(
            out,
            DegradeReason::CutoffsAdjusted {
                low_hz: (low * nyquist) as f32,
                high_hz: (high * nyquist) as f32,
            },
        )
    } else if repaired {
        StageOutcome::Degraded(out, DegradeReason::InputRepaired)
    } else {
        StageOutcome::Ok(out)
    }
}

/// Two-pass centred moving average.
///
/// The first pass uses `window`, the second `max(window / 2, 3)`; both are
/// clamped to `[1, len]`. Edges average over the samples available, so the
/// output keeps the input's length.
pub fn smooth(x: &[f32], window: usize) -> StageOutcome {
    let n = x.len();
    if n == 0 {
        return StageOutcome::Failed(DegradeReason::EmptyInput);
    }
    if x.iter().any(|v| !v.is_finite()) {
        return StageOutcome::Failed(DegradeReason::NonFiniteInput);
    }

    let first = window.clamp(1, n);
    let second = (window / 2).max(3).clamp(1, n);

    let once = moving_average(x, first);
    let twice = moving_average(&once, second);
    let out = Array1::from(twice);

    if out.iter().any(|v| !v.is_finite()) {
        return StageOutcome::Degraded(Array1::from(x.to_vec()), DegradeReason::NonFiniteOutput);
    }
    if first != window {
        StageOutcome::Degraded(
            out,
            DegradeReason::WindowClamped {
                requested: window,
                used: first,
            },
        )
    } else {
        StageOutcome::Ok(out)
    }
}

fn moving_average(x: &[f32], window: usize) -> Vec<f32> {
    let n = x.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0f64);
    for &v in x {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v as f64);
    }

    let left = (window - 1) / 2;
    let right = window / 2;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(left);
            let end = (i + right + 1).min(n);
            ((prefix[end] - prefix[start]) / (end - start) as f64) as f32
        })
        .collect()
}

/// A filter chain stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sanitize,
    Detrend,
    Bandpass,
    Smooth,
}

/// What one stage did inside the chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageStatus {
    Ok,
    Degraded(DegradeReason),
    Failed(DegradeReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
}

/// Output of [`FilterChain::apply`].
#[derive(Debug, Clone)]
pub struct FilterOutput {
    pub values: Array1<f32>,
    pub stages: Vec<StageReport>,
}

impl FilterOutput {
    /// True when every stage ran cleanly.
    pub fn is_clean(&self) -> bool {
        self.stages.iter().all(|r| r.status == StageStatus::Ok)
    }
}

/// Detrend → bandpass → smoothing with per-stage fallback.
#[derive(Debug, Clone)]
pub struct FilterChain {
    config: FilterConfig,
}

impl FilterChain {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Run the chain at the configured sampling rate.
    pub fn apply(&self, x: &[f32]) -> FilterOutput {
        self.apply_at(x, self.config.sample_rate)
    }

    /// Run the chain at an explicit sampling rate.
    pub fn apply_at(&self, x: &[f32], fs: f32) -> FilterOutput {
        let mut stages = Vec::with_capacity(4);

        let (mut current, ok) = validate_array(x);
        if !ok {
            let reason = if x.is_empty() {
                DegradeReason::EmptyInput
            } else {
                DegradeReason::NonFiniteInput
            };
            log::warn!("filter chain: input unusable ({:?})", reason);
            stages.push(StageReport {
                stage: Stage::Sanitize,
                status: StageStatus::Failed(reason),
            });
            return FilterOutput {
                values: current,
                stages,
            };
        }
        stages.push(StageReport {
            stage: Stage::Sanitize,
            status: if x.iter().all(|v| v.is_finite()) {
                StageStatus::Ok
            } else {
                StageStatus::Degraded(DegradeReason::InputRepaired)
            },
        });

        let cfg = &self.config;
        for stage in [Stage::Detrend, Stage::Bandpass, Stage::Smooth] {
            let input = current.as_slice().unwrap_or(&[]);
            let outcome = match stage {
                Stage::Detrend => detrend(input),
                Stage::Bandpass => bandpass(input, cfg.low_hz, cfg.high_hz, fs, cfg.order),
                Stage::Smooth => smooth(input, cfg.smoothing_window),
                Stage::Sanitize => continue,
            };
            let (next, status) = Self::accept(&current, outcome);
            if let StageStatus::Degraded(reason) | StageStatus::Failed(reason) = status {
                log::debug!("filter chain: {:?} -> {:?}", stage, reason);
            }
            if let Some(next) = next {
                current = next;
            }
            stages.push(StageReport { stage, status });
        }

        FilterOutput {
            values: current,
            stages,
        }
    }

    /// Decide whether a stage's data replaces the previous good array.
    fn accept(previous: &Array1<f32>, outcome: StageOutcome) -> (Option<Array1<f32>>, StageStatus) {
        let usable = |d: &Array1<f32>| {
            !d.is_empty() && d.len() == previous.len() && d.iter().all(|v| v.is_finite())
        };
        match outcome {
            StageOutcome::Ok(d) if usable(&d) => (Some(d), StageStatus::Ok),
            StageOutcome::Degraded(d, reason) if usable(&d) => (Some(d), StageStatus::Degraded(reason)),
            StageOutcome::Ok(_) | StageOutcome::Degraded(..) => {
                (None, StageStatus::Failed(DegradeReason::RejectedOutput))
            }
            StageOutcome::Failed(reason) => (None, StageStatus::Failed(reason)),
        }
    }
}
