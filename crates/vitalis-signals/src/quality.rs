//! Signal quality scoring.
//!
//! Score is `var(x) / var(diff(x))` (a cheap SNR proxy: slow physiological
//! oscillations have small sample-to-sample differences, broadband noise does
//! not), scaled by how stable the recent rate estimates are.

use std::fmt;

use crate::config::QualityConfig;
use crate::dsp::DspProcessor;

/// History entries needed before stability is taken into account.
pub const MIN_STABILITY_HISTORY: usize = 3;

/// Stability never drops below this factor.
pub const MIN_STABILITY: f32 = 0.1;

/// Four-level quality label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        }
    }

    /// Map a combined score through the configured thresholds.
    pub fn from_score(score: f32, config: &QualityConfig) -> Self {
        if score > config.excellent {
            Self::Excellent
        } else if score > config.good {
            Self::Good
        } else if score > config.fair {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl fmt::Display for QualityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality breakdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    pub rating: QualityRating,
    /// `snr * stability`
    pub score: f32,
    /// `var(x) / var(diff(x))`; infinite when the difference is constant
    pub snr: f32,
    /// In `[MIN_STABILITY, 1]`
    pub stability: f32,
}

impl QualityReport {
    fn poor() -> Self {
        Self {
            rating: QualityRating::Poor,
            score: 0.0,
            snr: 0.0,
            stability: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Stability factor from recent rate estimates.
    pub fn stability(&self, recent_rates: &[f32]) -> f32 {
        if recent_rates.len() < MIN_STABILITY_HISTORY {
            return 1.0;
        }
        let spread = DspProcessor::std(recent_rates);
        (1.0 - spread / self.config.stability_scale).max(MIN_STABILITY)
    }

    /// Score a filtered signal.
    ///
    /// `enough_data` is false when the buffered duration is below the
    /// estimation minimum; the result is then `Poor` regardless of the signal.
    pub fn score(&self, signal: &[f32], recent_rates: &[f32], enough_data: bool) -> QualityReport {
        if !enough_data || signal.len() < 2 || signal.iter().any(|v| !v.is_finite()) {
            return QualityReport::poor();
        }

        let power = DspProcessor::variance(signal);
        if !(power > 0.0) {
            return QualityReport::poor();
        }

        let stability = self.stability(recent_rates);
        let noise = DspProcessor::variance(&DspProcessor::diff(signal));
        if noise == 0.0 {
            return QualityReport {
                rating: QualityRating::Excellent,
                score: f32::INFINITY,
                snr: f32::INFINITY,
                stability,
            };
        }

        let snr = power / noise;
        let score = snr * stability;
        QualityReport {
            rating: QualityRating::from_score(score, &self.config),
            score,
            snr,
            stability,
        }
    }
}
