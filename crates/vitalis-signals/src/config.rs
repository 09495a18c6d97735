//! Channel configuration.
//!
//! Every processor is built from an immutable [`ChannelConfig`] that is
//! validated once at construction. [`VitalsConfig`] bundles both channels and
//! handles TOML loading with `VITALIS_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Which physiological signal a channel tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Respiration,
    Rppg,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respiration => "respiration",
            Self::Rppg => "rppg",
        }
    }

    /// Unit label for rates on this channel.
    pub fn rate_unit(&self) -> &'static str {
        match self {
            Self::Respiration => "breaths/min",
            Self::Rppg => "beats/min",
        }
    }
}

/// Inclusive bounds applied to an extracted pixel-intensity sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityBounds {
    pub min: f32,
    pub max: f32,
}

/// Detrend → bandpass → smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Nominal sampling rate in Hz
    pub sample_rate: f32,
    /// Bandpass low cutoff in Hz
    pub low_hz: f32,
    /// Bandpass high cutoff in Hz
    pub high_hz: f32,
    /// Butterworth order of each band edge
    pub order: usize,
    /// First moving-average window in samples
    pub smoothing_window: usize,
}

/// What to report when every estimator fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Report "no estimate".
    Disabled,
    /// Report a fixed population-average rate once more than `after_seconds`
    /// of signal is buffered.
    PopulationDefault { rate: f32, after_seconds: f32 },
}

/// Rate estimation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Spectral search band, Hz
    pub min_freq_hz: f32,
    pub max_freq_hz: f32,
    /// Hard physiological acceptance range, cycles/minute
    pub min_rate: f32,
    pub max_rate: f32,
    /// Buffered seconds required before estimation is attempted
    pub min_seconds: f32,
    /// Peak height threshold as a multiple of the signal standard deviation
    pub peak_height_sigma: f32,
    /// Peaks the interval method needs before it reports
    pub min_peaks: usize,
    /// Capacity of the rolling estimate history
    pub history_len: usize,
    /// History entries needed before the rolling median is reported
    pub stabilize_after: usize,
    pub fallback: FallbackPolicy,
}

/// Quality scoring thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Rate spread (cycles/minute) at which stability reaches its floor
    pub stability_scale: f32,
    pub excellent: f32,
    pub good: f32,
    pub fair: f32,
}

/// How an ROI is reduced to the channel's signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Single lane: weighted sum of the R, G, B means.
    WeightedRgb { weights: [f32; 3] },
    /// Two lanes (R, G means). Filtering uses
    /// `g/mean(g) - red_weight * r/mean(r)`; the live value is the green mean.
    /// Blue is never read.
    ChromaticPulse { red_weight: f32 },
}

impl FeatureKind {
    /// Number of buffered lanes this feature needs.
    pub fn lanes(&self) -> usize {
        match self {
            Self::WeightedRgb { .. } => 1,
            Self::ChromaticPulse { .. } => 2,
        }
    }

    /// Number of leading colour planes (R, G, B order) the feature reads.
    pub fn planes(&self) -> usize {
        match self {
            Self::WeightedRgb { .. } => 3,
            Self::ChromaticPulse { .. } => 2,
        }
    }
}

/// Baseline-relative outlier suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Seconds of accepted samples used to learn the baseline
    pub calibration_seconds: f32,
    /// Distance from the baseline mean, in baseline standard deviations
    pub sigma: f32,
    /// Suppression only runs when inliers exceed this fraction of the window
    pub min_inlier_fraction: f32,
}

/// Complete, immutable configuration of one channel processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub kind: ChannelKind,
    pub buffer_capacity: usize,
    /// Samples required before the filter chain runs
    pub min_filter_samples: usize,
    /// Derive the working sampling rate from timestamp deltas when possible
    pub use_timestamp_rate: bool,
    pub feature: FeatureKind,
    pub intensity_bounds: Option<IntensityBounds>,
    pub outlier_rejection: Option<OutlierConfig>,
    pub filter: FilterConfig,
    pub estimator: EstimatorConfig,
    pub quality: QualityConfig,
}

impl ChannelConfig {
    /// Chest-ROI respiration defaults (≈5–30 breaths/min band).
    pub fn respiration() -> Self {
        Self {
            kind: ChannelKind::Respiration,
            buffer_capacity: 900,
            min_filter_samples: 6,
            use_timestamp_rate: true,
            feature: FeatureKind::WeightedRgb {
                weights: [0.6, 0.3, 0.1],
            },
            intensity_bounds: Some(IntensityBounds {
                min: 10.0,
                max: 250.0,
            }),
            outlier_rejection: Some(OutlierConfig {
                calibration_seconds: 5.0,
                sigma: 3.0,
                min_inlier_fraction: 0.7,
            }),
            filter: FilterConfig {
                sample_rate: 30.0,
                low_hz: 0.08,
                high_hz: 0.5,
                order: 4,
                smoothing_window: 8,
            },
            estimator: EstimatorConfig {
                min_freq_hz: 0.08,
                max_freq_hz: 0.5,
                min_rate: 5.0,
                max_rate: 40.0,
                min_seconds: 3.0,
                peak_height_sigma: 0.3,
                min_peaks: 2,
                history_len: 5,
                stabilize_after: 3,
                fallback: FallbackPolicy::PopulationDefault {
                    rate: 15.0,
                    after_seconds: 8.0,
                },
            },
            quality: QualityConfig {
                stability_scale: 5.0,
                excellent: 10.0,
                good: 5.0,
                fair: 2.0,
            },
        }
    }

    /// Forehead-ROI rPPG defaults (≈42–210 beats/min band).
    pub fn rppg() -> Self {
        Self {
            kind: ChannelKind::Rppg,
            buffer_capacity: 1200,
            min_filter_samples: 90,
            use_timestamp_rate: true,
            feature: FeatureKind::ChromaticPulse { red_weight: 0.5 },
            intensity_bounds: Some(IntensityBounds {
                min: 10.0,
                max: 250.0,
            }),
            outlier_rejection: None,
            filter: FilterConfig {
                sample_rate: 30.0,
                low_hz: 0.7,
                high_hz: 3.5,
                order: 4,
                smoothing_window: 5,
            },
            estimator: EstimatorConfig {
                min_freq_hz: 0.67,
                max_freq_hz: 3.0,
                min_rate: 40.0,
                max_rate: 150.0,
                min_seconds: 5.0,
                peak_height_sigma: 0.3,
                min_peaks: 3,
                history_len: 5,
                stabilize_after: 3,
                fallback: FallbackPolicy::Disabled,
            },
            quality: QualityConfig {
                stability_scale: 10.0,
                excellent: 10.0,
                good: 5.0,
                fair: 2.0,
            },
        }
    }

    /// Nominal sampling rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.filter.sample_rate
    }

    /// Samples required before `estimate_rate` is attempted.
    pub fn min_estimation_samples(&self) -> usize {
        (self.sample_rate() * self.estimator.min_seconds).ceil() as usize
    }

    /// Check every invariant the processor relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.kind.as_str();
        let invalid = |msg: &str| Err(ConfigError::Validation(format!("{}.{}", name, msg)));

        let f = &self.filter;
        if !(f.sample_rate.is_finite() && f.sample_rate > 0.0) {
            return invalid("filter.sample_rate must be positive");
        }
        if !(f.low_hz.is_finite() && f.high_hz.is_finite() && f.low_hz > 0.0 && f.low_hz < f.high_hz) {
            return invalid("filter band must satisfy 0 < low_hz < high_hz");
        }
        if f.order == 0 || f.order > 8 {
            return invalid("filter.order must be in [1, 8]");
        }
        if f.smoothing_window == 0 {
            return invalid("filter.smoothing_window must be >= 1");
        }

        let e = &self.estimator;
        if !(e.min_freq_hz >= 0.0 && e.min_freq_hz < e.max_freq_hz) {
            return invalid("estimator band must satisfy 0 <= min_freq_hz < max_freq_hz");
        }
        if !(e.min_rate > 0.0 && e.min_rate < e.max_rate) {
            return invalid("estimator range must satisfy 0 < min_rate < max_rate");
        }
        if !(e.min_seconds.is_finite() && e.min_seconds > 0.0) {
            return invalid("estimator.min_seconds must be positive");
        }
        if !(e.peak_height_sigma.is_finite() && e.peak_height_sigma >= 0.0) {
            return invalid("estimator.peak_height_sigma must be >= 0");
        }
        if e.min_peaks < 2 {
            return invalid("estimator.min_peaks must be >= 2");
        }
        if e.history_len == 0 || e.stabilize_after == 0 || e.stabilize_after > e.history_len {
            return invalid("estimator.stabilize_after must be in [1, history_len]");
        }
        if let FallbackPolicy::PopulationDefault { rate, after_seconds } = e.fallback {
            if rate < e.min_rate || rate > e.max_rate {
                return invalid("estimator.fallback.rate must lie in [min_rate, max_rate]");
            }
            if !(after_seconds.is_finite() && after_seconds > 0.0) {
                return invalid("estimator.fallback.after_seconds must be positive");
            }
        }

        let q = &self.quality;
        if !(q.stability_scale > 0.0) {
            return invalid("quality.stability_scale must be positive");
        }
        if !(q.excellent > q.good && q.good > q.fair && q.fair >= 0.0) {
            return invalid("quality thresholds must satisfy excellent > good > fair >= 0");
        }

        match self.feature {
            FeatureKind::WeightedRgb { weights } => {
                if weights.iter().any(|w| !w.is_finite()) || weights.iter().all(|w| *w == 0.0) {
                    return invalid("feature.weights must be finite and not all zero");
                }
            }
            FeatureKind::ChromaticPulse { red_weight } => {
                if !red_weight.is_finite() {
                    return invalid("feature.red_weight must be finite");
                }
            }
        }

        if let Some(b) = self.intensity_bounds {
            if !(b.min.is_finite() && b.max.is_finite() && b.min < b.max) {
                return invalid("intensity_bounds must satisfy min < max");
            }
        }

        if let Some(o) = &self.outlier_rejection {
            if !(o.calibration_seconds > 0.0 && o.sigma > 0.0) {
                return invalid("outlier_rejection needs positive calibration_seconds and sigma");
            }
            if !(o.min_inlier_fraction > 0.0 && o.min_inlier_fraction <= 1.0) {
                return invalid("outlier_rejection.min_inlier_fraction must be in (0, 1]");
            }
        }

        if self.buffer_capacity < self.min_estimation_samples() {
            return invalid("buffer_capacity must hold estimator.min_seconds of samples");
        }

        Ok(())
    }
}

/// Configuration of both channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsConfig {
    #[serde(default = "ChannelConfig::respiration")]
    pub respiration: ChannelConfig,
    #[serde(default = "ChannelConfig::rppg")]
    pub rppg: ChannelConfig,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            respiration: ChannelConfig::respiration(),
            rppg: ChannelConfig::rppg(),
        }
    }
}

impl VitalsConfig {
    /// Parse and validate a TOML document. Missing channel tables use defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VitalsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration with environment variable overrides.
    /// Variables are prefixed with `VITALIS_`, e.g. `VITALIS_RPPG_SAMPLE_RATE=25`.
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VITALIS_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, val: &str) -> Result<T, ConfigError> {
            val.trim()
                .parse()
                .map_err(|_| ConfigError::EnvVar(format!("Invalid {}: {:?}", key, val)))
        }

        for (prefix, channel) in [
            ("VITALIS_RESPIRATION", &mut self.respiration),
            ("VITALIS_RPPG", &mut self.rppg),
        ] {
            let key = format!("{}_SAMPLE_RATE", prefix);
            if let Some(val) = lookup(&key) {
                channel.filter.sample_rate = parse(&key, &val)?;
            }
            let key = format!("{}_BUFFER_CAPACITY", prefix);
            if let Some(val) = lookup(&key) {
                channel.buffer_capacity = parse(&key, &val)?;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.respiration.kind != ChannelKind::Respiration {
            return Err(ConfigError::Validation(
                "respiration.kind must be \"respiration\"".to_string(),
            ));
        }
        if self.rppg.kind != ChannelKind::Rppg {
            return Err(ConfigError::Validation("rppg.kind must be \"rppg\"".to_string()));
        }
        self.respiration.validate()?;
        self.rppg.validate()
    }

    /// Export configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        assert!(ChannelConfig::respiration().validate().is_ok());
        assert!(ChannelConfig::rppg().validate().is_ok());
        assert!(VitalsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_band_rejected() {
        let mut cfg = ChannelConfig::respiration();
        cfg.filter.low_hz = 0.6;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("respiration.filter band"), "{}", err);
    }

    #[test]
    fn test_small_buffer_rejected() {
        let mut cfg = ChannelConfig::rppg();
        cfg.buffer_capacity = 60;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_fallback_outside_range_rejected() {
        let mut cfg = ChannelConfig::respiration();
        cfg.estimator.fallback = FallbackPolicy::PopulationDefault {
            rate: 60.0,
            after_seconds: 8.0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_min_estimation_samples() {
        assert_eq!(ChannelConfig::respiration().min_estimation_samples(), 90);
        assert_eq!(ChannelConfig::rppg().min_estimation_samples(), 150);
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let config = VitalsConfig::default();
        let text = config.to_toml_string().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let loaded = VitalsConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_tables_use_defaults() {
        let loaded = VitalsConfig::from_toml_str("").unwrap();
        assert_eq!(loaded, VitalsConfig::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("VITALIS_RPPG_SAMPLE_RATE", "25"),
            ("VITALIS_RESPIRATION_BUFFER_CAPACITY", "450"),
        ]
        .into_iter()
        .collect();

        let mut config = VitalsConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rppg.sample_rate(), 25.0);
        assert_eq!(config.respiration.buffer_capacity, 450);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_override_reports_key() {
        let mut config = VitalsConfig::default();
        let err = config
            .apply_overrides(|k| (k == "VITALIS_RPPG_SAMPLE_RATE").then(|| "fast".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("VITALIS_RPPG_SAMPLE_RATE"));
    }
}
