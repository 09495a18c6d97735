//! Rate estimation: spectral peak + peak interval, fused by median consensus
//! and stabilized by a rolling median.

use std::collections::VecDeque;
use std::fmt;

use crate::config::{EstimatorConfig, FallbackPolicy};
use crate::dsp::DspProcessor;
use crate::error::{MethodFailure, Result, SignalError};

/// Shortest signal the spectral method accepts.
pub const MIN_SPECTRAL_SAMPLES: usize = 10;

/// Independent rate estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMethod {
    /// Dominant in-band FFT bin
    Spectral,
    /// Median interval between detected peaks
    PeakInterval,
}

impl fmt::Display for RateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spectral => write!(f, "spectral"),
            Self::PeakInterval => write!(f, "peak-interval"),
        }
    }
}

/// One accepted estimate, cycles/minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEstimate {
    pub value: f32,
    pub method: RateMethod,
}

/// Where a reported rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Median of this cycle's estimates (history still warming up)
    Consensus,
    /// Median of the rolling history
    Stabilized,
    /// Configured population default; no estimator succeeded
    PopulationDefault,
}

/// Outcome of one estimation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RateReport {
    /// Reported rate, cycles/minute
    pub rate: f32,
    /// This cycle's consensus value, if any estimator succeeded
    pub consensus: Option<f32>,
    pub source: RateSource,
    pub estimates: Vec<RateEstimate>,
    pub failures: Vec<(RateMethod, MethodFailure)>,
}

/// Bounded FIFO of accepted consensus values.
#[derive(Debug, Clone)]
pub struct EstimateHistory {
    values: VecDeque<f32>,
    capacity: usize,
}

impl EstimateHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, value: f32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn values(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }

    pub fn median(&self) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        Some(DspProcessor::median(&self.values()))
    }

    /// Population standard deviation of the stored values.
    pub fn std(&self) -> f32 {
        DspProcessor::std(&self.values())
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Multi-method rate estimator with temporal stabilization.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    config: EstimatorConfig,
    history: EstimateHistory,
}

impl RateEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let history = EstimateHistory::new(config.history_len);
        Self { config, history }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn history(&self) -> &EstimateHistory {
        &self.history
    }

    fn check_range(&self, rate: f32) -> std::result::Result<f32, MethodFailure> {
        if !rate.is_finite() {
            return Err(MethodFailure::NonFinite);
        }
        if rate < self.config.min_rate || rate > self.config.max_rate {
            return Err(MethodFailure::OutOfRange {
                rate,
                min: self.config.min_rate,
                max: self.config.max_rate,
            });
        }
        Ok(rate)
    }

    /// Dominant in-band frequency of the unwindowed magnitude spectrum.
    pub fn spectral(&self, signal: &[f32], fs: f32) -> std::result::Result<f32, MethodFailure> {
        if signal.len() < MIN_SPECTRAL_SAMPLES {
            return Err(MethodFailure::SignalTooShort { len: signal.len() });
        }
        if signal.iter().any(|v| !v.is_finite()) {
            return Err(MethodFailure::NonFinite);
        }

        let spectrum = DspProcessor::magnitude_spectrum(signal, fs);
        if spectrum.magnitudes.iter().any(|m| !m.is_finite()) {
            return Err(MethodFailure::NonFinite);
        }
        let (lo, hi) = (self.config.min_freq_hz, self.config.max_freq_hz);
        if spectrum.bins_in_band(lo, hi) == 0 {
            return Err(MethodFailure::NoInBandBins);
        }
        let (freq, _) = spectrum
            .peak_in_band(lo, hi)
            .ok_or(MethodFailure::ZeroSpectrum)?;

        self.check_range(freq * 60.0)
    }

    /// Median inter-peak interval converted to cycles/minute.
    ///
    /// Peaks must reach `peak_height_sigma × std` and lie at least
    /// `fs × 60 / max_rate` samples apart.
    pub fn peak_interval(&self, signal: &[f32], fs: f32) -> std::result::Result<f32, MethodFailure> {
        if signal.iter().any(|v| !v.is_finite()) {
            return Err(MethodFailure::NonFinite);
        }
        if !(fs.is_finite() && fs > 0.0) {
            return Err(MethodFailure::NonFinite);
        }
        // Spacing never exceeds the signal, whatever the sampling rate.
        let spacing = (fs * 60.0 / self.config.max_rate).floor();
        let distance = if spacing.is_finite() && spacing < signal.len() as f32 {
            (spacing as usize).max(1)
        } else {
            signal.len().max(1)
        };
        let required = self.config.min_peaks;
        let min_len = distance
            .saturating_mul(required.saturating_sub(1))
            .saturating_add(1);
        if signal.len() < min_len.max(3) {
            return Err(MethodFailure::SignalTooShort { len: signal.len() });
        }

        let std = DspProcessor::std(signal);
        if !(std > 0.0) {
            return Err(MethodFailure::FlatSignal);
        }

        let peaks = DspProcessor::find_peaks(signal, self.config.peak_height_sigma * std, distance);
        if peaks.len() < required {
            return Err(MethodFailure::TooFewPeaks {
                found: peaks.len(),
                required,
            });
        }

        let intervals: Vec<f32> = peaks.windows(2).map(|w| (w[1] - w[0]) as f32).collect();
        let interval = DspProcessor::median(&intervals);
        if !(interval > 0.0) {
            return Err(MethodFailure::NonFinite);
        }
        self.check_range(60.0 / (interval / fs))
    }

    /// Run both estimators, fuse, stabilize and fall back per policy.
    ///
    /// `buffered_seconds` is the buffered signal duration used by the
    /// population-default fallback.
    pub fn estimate(&mut self, signal: &[f32], fs: f32, buffered_seconds: f32) -> Result<RateReport> {
        let mut estimates = Vec::with_capacity(2);
        let mut failures = Vec::new();

        for method in [RateMethod::Spectral, RateMethod::PeakInterval] {
            let result = match method {
                RateMethod::Spectral => self.spectral(signal, fs),
                RateMethod::PeakInterval => self.peak_interval(signal, fs),
            };
            match result {
                Ok(value) => estimates.push(RateEstimate { value, method }),
                Err(failure) => {
                    log::debug!("{} estimator failed: {}", method, failure);
                    failures.push((method, failure));
                }
            }
        }

        if !estimates.is_empty() {
            let values: Vec<f32> = estimates.iter().map(|e| e.value).collect();
            let consensus = DspProcessor::median(&values);
            if self.check_range(consensus).is_ok() {
                self.history.push(consensus);
                let (rate, source) = match self.history.median() {
                    Some(m) if self.history.len() >= self.config.stabilize_after => {
                        (m, RateSource::Stabilized)
                    }
                    _ => (consensus, RateSource::Consensus),
                };
                return Ok(RateReport {
                    rate,
                    consensus: Some(consensus),
                    source,
                    estimates,
                    failures,
                });
            }
        }

        if let FallbackPolicy::PopulationDefault { rate, after_seconds } = self.config.fallback {
            if buffered_seconds > after_seconds {
                log::warn!(
                    "all estimators failed after {:.1}s of signal, reporting population default {:.1}",
                    buffered_seconds,
                    rate
                );
                return Ok(RateReport {
                    rate,
                    consensus: None,
                    source: RateSource::PopulationDefault,
                    estimates,
                    failures,
                });
            }
        }

        Err(SignalError::NoEstimate { failures })
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
