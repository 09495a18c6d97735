//! Error types for the vital-sign pipeline.
//!
//! Filter stages never fail with an error; they report a
//! [`StageOutcome`](crate::dsp::StageOutcome) instead. The types here cover the
//! caller-facing boundaries: sample intake, rate estimation and configuration.

use thiserror::Error;

use crate::rate::RateMethod;

/// Caller-facing error for sample intake and rate estimation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    /// ROI has no pixels. The frame is skipped without touching any state.
    #[error("empty ROI")]
    EmptyRoi,

    /// ROI does not carry at least three colour planes.
    #[error("invalid ROI shape: expected (height, width, >=3), got {shape:?}")]
    InvalidRoiShape { shape: Vec<usize> },

    /// Extracted value is NaN or infinite.
    #[error("non-finite sample")]
    NonFiniteSample,

    /// Extracted value falls outside the accepted range for the channel.
    #[error("sample {value} outside [{min}, {max}]")]
    SampleOutOfRange { value: f32, min: f32, max: f32 },

    /// A colour plane averaged to zero (or below), e.g. a black frame.
    #[error("non-positive mean in {channel} channel")]
    NonPositiveChannel { channel: &'static str },

    /// Not enough buffered samples to attempt estimation.
    #[error("insufficient data: {available} samples buffered, {required} required")]
    InsufficientData { available: usize, required: usize },

    /// Every estimator failed and no fallback applies.
    #[error("no estimate: {} estimator(s) failed", .failures.len())]
    NoEstimate { failures: Vec<(RateMethod, MethodFailure)> },

    /// Configuration rejected at construction.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SignalError {
    /// True for the "frame skipped" class (missing or malformed ROI).
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::EmptyRoi | Self::InvalidRoiShape { .. })
    }

    /// True for values rejected by numeric validation.
    pub fn is_numeric_error(&self) -> bool {
        matches!(
            self,
            Self::NonFiniteSample | Self::SampleOutOfRange { .. } | Self::NonPositiveChannel { .. }
        )
    }

    /// True when the processor simply has not seen enough data yet.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

impl From<ConfigError> for SignalError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Reason a single rate estimator produced nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MethodFailure {
    #[error("signal too short ({len} samples)")]
    SignalTooShort { len: usize },

    #[error("no spectral bins inside the band")]
    NoInBandBins,

    #[error("in-band spectrum is zero")]
    ZeroSpectrum,

    #[error("signal has zero variance")]
    FlatSignal,

    #[error("found {found} peaks, need {required}")]
    TooFewPeaks { found: usize, required: usize },

    #[error("rate {rate:.1} outside [{min}, {max}]")]
    OutOfRange { rate: f32, min: f32, max: f32 },

    #[error("non-finite value in estimator input or result")]
    NonFinite,
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Environment variable error: {0}")]
    EnvVar(String),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SignalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(SignalError::EmptyRoi.is_input_error());
        assert!(SignalError::NonFiniteSample.is_numeric_error());
        assert!(SignalError::NonPositiveChannel { channel: "green" }.is_numeric_error());
        assert!(SignalError::InsufficientData { available: 1, required: 90 }.is_insufficient_data());
        assert!(!SignalError::EmptyRoi.is_numeric_error());
    }

    #[test]
    fn test_no_estimate_message_counts_failures() {
        let err = SignalError::NoEstimate {
            failures: vec![
                (RateMethod::Spectral, MethodFailure::ZeroSpectrum),
                (RateMethod::PeakInterval, MethodFailure::TooFewPeaks { found: 1, required: 2 }),
            ],
        };
        assert_eq!(err.to_string(), "no estimate: 2 estimator(s) failed");
    }

    #[test]
    fn test_config_error_converts() {
        let err: SignalError = ConfigError::Validation("bad band".to_string()).into();
        assert!(matches!(err, SignalError::Config(ref msg) if msg.contains("bad band")));
    }
}
