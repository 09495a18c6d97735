//! Per-channel orchestration: intake → buffer → filter chain → estimation.
//!
//! A [`ChannelProcessor`] owns every piece of state for one channel. Two
//! configured instances cover respiration (chest ROI) and rPPG (face ROI).

use ndarray::{Array1, ArrayView3};

use crate::baseline::BaselineSuppressor;
use crate::buffer::CircularSampleBuffer;
use crate::config::{ChannelConfig, ChannelKind};
use crate::dsp::{DspProcessor, FilterChain, StageReport};
use crate::error::{Result, SignalError};
use crate::feature::{ChannelMeans, FeatureExtractor};
use crate::quality::{QualityRating, QualityReport, QualityScorer};
use crate::rate::{EstimateHistory, RateEstimator, RateReport};
use crate::sanitize::SampleValidator;

/// Largest factor a timestamp-derived sampling rate may differ from the
/// configured one before it is ignored.
pub const MAX_RATE_DEVIATION: f32 = 4.0;

/// Chronological filtered series of one channel.
#[derive(Debug, Clone)]
pub struct FilteredSignal {
    /// Seconds since session start
    pub time: Array1<f32>,
    pub values: Array1<f32>,
    /// Empty when too few samples were buffered to run the chain
    pub stages: Vec<StageReport>,
    /// Sampling rate the chain ran at
    pub sample_rate: f32,
}

impl FilteredSignal {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the filter chain actually ran.
    pub fn is_filtered(&self) -> bool {
        !self.stages.is_empty()
    }
}

/// Signal pipeline for one physiological channel.
#[derive(Debug, Clone)]
pub struct ChannelProcessor {
    config: ChannelConfig,
    lanes: Vec<CircularSampleBuffer>,
    extractor: FeatureExtractor,
    validator: SampleValidator,
    chain: FilterChain,
    estimator: RateEstimator,
    scorer: QualityScorer,
    baseline: Option<BaselineSuppressor>,
    session_start: Option<f64>,
}

impl ChannelProcessor {
    /// Build a processor. The configuration is validated once, here.
    pub fn new(config: ChannelConfig) -> Result<Self> {
        config.validate()?;

        let extractor = FeatureExtractor::new(config.feature);
        let lanes = (0..extractor.lanes())
            .map(|_| CircularSampleBuffer::new(config.buffer_capacity))
            .collect::<Result<Vec<_>>>()?;
        let baseline = config
            .outlier_rejection
            .clone()
            .map(|o| BaselineSuppressor::new(o, config.sample_rate()));

        log::info!(
            "{} processor: capacity={} fs={}Hz band={}-{}Hz",
            config.kind.as_str(),
            config.buffer_capacity,
            config.sample_rate(),
            config.filter.low_hz,
            config.filter.high_hz
        );

        Ok(Self {
            lanes,
            extractor,
            validator: SampleValidator::new(config.intensity_bounds),
            chain: FilterChain::new(config.filter.clone()),
            estimator: RateEstimator::new(config.estimator.clone()),
            scorer: QualityScorer::new(config.quality.clone()),
            baseline,
            session_start: None,
            config,
        })
    }

    /// Respiration processor with default settings.
    pub fn respiration() -> Result<Self> {
        Self::new(ChannelConfig::respiration())
    }

    /// rPPG processor with default settings.
    pub fn rppg() -> Result<Self> {
        Self::new(ChannelConfig::rppg())
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn kind(&self) -> ChannelKind {
        self.config.kind
    }

    /// Buffered sample count.
    pub fn len(&self) -> usize {
        self.lanes.first().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute timestamp of the first accepted sample.
    pub fn session_start(&self) -> Option<f64> {
        self.session_start
    }

    pub fn history(&self) -> &EstimateHistory {
        self.estimator.history()
    }

    /// Reduce an `(height, width, >=3)` RGB ROI and buffer the result.
    ///
    /// Returns the live-preview scalar. Rejected frames leave every piece of
    /// state untouched.
    pub fn process_roi(&mut self, roi: ArrayView3<'_, u8>, timestamp: f64) -> Result<f32> {
        let means = ChannelMeans::from_roi(roi).map_err(|e| {
            log::trace!("{}: frame skipped: {}", self.config.kind.as_str(), e);
            e
        })?;
        self.add_sample(means, timestamp)
    }

    /// Buffer a frame whose channel means were computed upstream.
    pub fn add_sample(&mut self, means: ChannelMeans, timestamp: f64) -> Result<f32> {
        self.accept(means, timestamp).map_err(|e| {
            log::trace!("{}: sample rejected: {}", self.config.kind.as_str(), e);
            e
        })
    }

    fn accept(&mut self, means: ChannelMeans, timestamp: f64) -> Result<f32> {
        if !timestamp.is_finite() {
            return Err(SignalError::NonFiniteSample);
        }
        means.check_positive(self.extractor.planes())?;

        // Only lanes the feature buffers are bounds-checked.
        let feature = self.extractor.extract(&means);
        let live = self.validator.check(feature.live)?;
        let lane_count = self.lanes.len();
        for &v in &feature.lanes[..lane_count] {
            self.validator.check(v)?;
        }

        let start = *self.session_start.get_or_insert(timestamp);
        let t = (timestamp - start) as f32;
        for (buffer, &v) in self.lanes.iter_mut().zip(feature.lanes.iter()) {
            buffer.push(v, t);
        }
        if let Some(baseline) = self.baseline.as_mut() {
            baseline.observe(feature.lanes[0]);
        }

        Ok(live)
    }

    fn live_series(&self) -> (Array1<f32>, Array1<f32>) {
        let mut time = Array1::zeros(0);
        let mut lanes = Vec::with_capacity(self.lanes.len());
        for (i, buffer) in self.lanes.iter().enumerate() {
            let (t, v) = buffer.read_live();
            if i == 0 {
                time = t;
            }
            lanes.push(v);
        }
        (time, self.extractor.combine(&lanes))
    }

    /// Sampling rate used for filtering and estimation.
    ///
    /// `1 / median(Δt)` over the buffered timestamps when enabled, the
    /// timestamps strictly increase and the result lies within
    /// `MAX_RATE_DEVIATION` of the configured rate; otherwise the configured
    /// rate.
    pub fn effective_sample_rate(&self) -> f32 {
        let nominal = self.config.sample_rate();
        if !self.config.use_timestamp_rate {
            return nominal;
        }
        let Some(buffer) = self.lanes.first() else {
            return nominal;
        };
        let (time, _) = buffer.read_live();
        let time = time.to_vec();
        if time.len() < 2 {
            return nominal;
        }

        let deltas = DspProcessor::diff(&time);
        if deltas.iter().any(|d| !(*d > 0.0)) {
            return nominal;
        }
        let fs = 1.0 / DspProcessor::median(&deltas);
        let plausible = nominal / MAX_RATE_DEVIATION..=nominal * MAX_RATE_DEVIATION;
        if fs.is_finite() && plausible.contains(&fs) {
            fs
        } else {
            log::debug!(
                "{}: timestamp rate {}Hz too far from {}Hz, using nominal",
                self.config.kind.as_str(),
                fs,
                nominal
            );
            nominal
        }
    }

    /// Filtered, chronologically ordered signal.
    ///
    /// With fewer than `min_filter_samples` buffered, the raw series is
    /// returned with an empty stage list.
    pub fn get_filtered_signal(&self) -> FilteredSignal {
        let (time, mut values) = self.live_series();
        let sample_rate = self.effective_sample_rate();

        if values.len() < self.config.min_filter_samples {
            return FilteredSignal {
                time,
                values,
                stages: Vec::new(),
                sample_rate,
            };
        }

        if let Some(baseline) = &self.baseline {
            baseline.suppress(&mut values);
        }

        let output = self
            .chain
            .apply_at(values.as_slice().unwrap_or(&[]), sample_rate);
        FilteredSignal {
            time,
            values: output.values,
            stages: output.stages,
            sample_rate,
        }
    }

    /// Estimate the channel's rate in cycles/minute.
    ///
    /// Fails with `InsufficientData` until `sample_rate × min_seconds`
    /// samples are buffered, and with `NoEstimate` when every estimator fails
    /// and the fallback policy does not apply.
    pub fn estimate_rate(&mut self) -> Result<RateReport> {
        let available = self.len();
        let required = self.config.min_estimation_samples();
        if available < required {
            return Err(SignalError::InsufficientData { available, required });
        }

        let filtered = self.get_filtered_signal();
        let buffered_seconds = available as f32 / self.config.sample_rate();
        let report = self.estimator.estimate(
            filtered.values.as_slice().unwrap_or(&[]),
            filtered.sample_rate,
            buffered_seconds,
        )?;

        log::debug!(
            "{}: {:.1} {} ({:?}, {} estimate(s))",
            self.config.kind.as_str(),
            report.rate,
            self.config.kind.rate_unit(),
            report.source,
            report.estimates.len()
        );
        Ok(report)
    }

    /// Quality label of the current filtered signal.
    pub fn get_signal_quality(&self) -> QualityRating {
        self.signal_quality_report().rating
    }

    /// Quality label with its score breakdown.
    pub fn signal_quality_report(&self) -> QualityReport {
        let enough = self.len() >= self.config.min_estimation_samples();
        let filtered = self.get_filtered_signal();
        self.scorer.score(
            filtered.values.as_slice().unwrap_or(&[]),
            &self.estimator.history().values(),
            enough,
        )
    }

    /// Clear buffers, session start, baseline and estimate history.
    /// Configuration and allocations are kept.
    pub fn reset(&mut self) {
        for buffer in &mut self.lanes {
            buffer.clear();
        }
        self.estimator.reset();
        if let Some(baseline) = self.baseline.as_mut() {
            baseline.reset();
        }
        self.session_start = None;
        log::info!("{} processor reset", self.config.kind.as_str());
    }
}
