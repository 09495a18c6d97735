//! Baseline-relative outlier suppression.
//!
//! The first accepted samples of a session calibrate a baseline. Afterwards,
//! buffered values far from that baseline are replaced by the median of the
//! inliers before filtering, so a single motion spike cannot dominate the
//! spectrum.

use ndarray::Array1;

use crate::config::OutlierConfig;
use crate::dsp::DspProcessor;

#[derive(Debug, Clone)]
pub struct BaselineSuppressor {
    config: OutlierConfig,
    target: usize,
    values: Vec<f32>,
    calibrated: bool,
}

impl BaselineSuppressor {
    /// `sample_rate` converts the calibration window to a sample count.
    pub fn new(config: OutlierConfig, sample_rate: f32) -> Self {
        let target = ((config.calibration_seconds * sample_rate).ceil() as usize).max(1);
        Self {
            config,
            target,
            values: Vec::with_capacity(target),
            calibrated: false,
        }
    }

    /// Feed one accepted sample; ignored once calibrated.
    pub fn observe(&mut self, value: f32) {
        if self.calibrated {
            return;
        }
        self.values.push(value);
        if self.values.len() >= self.target {
            self.calibrated = true;
            log::debug!(
                "baseline calibrated: mean={:.3} std={:.3} over {} samples",
                DspProcessor::mean(&self.values),
                DspProcessor::std(&self.values),
                self.values.len()
            );
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Replace outliers in `signal` with the inlier median.
    ///
    /// Returns the number of replaced samples. Nothing changes before
    /// calibration, when the baseline is flat, or when inliers do not exceed
    /// `min_inlier_fraction` of the window.
    pub fn suppress(&self, signal: &mut Array1<f32>) -> usize {
        if !self.calibrated || signal.is_empty() {
            return 0;
        }
        let std = DspProcessor::std(&self.values);
        if !(std > 0.0) {
            return 0;
        }
        let mean = DspProcessor::mean(&self.values);
        let limit = self.config.sigma * std;

        let is_inlier = |v: f32| (v - mean).abs() < limit;
        let inliers: Vec<f32> = signal.iter().copied().filter(|&v| is_inlier(v)).collect();
        if inliers.len() == signal.len() {
            return 0;
        }
        if (inliers.len() as f32) <= signal.len() as f32 * self.config.min_inlier_fraction {
            return 0;
        }

        let replacement = DspProcessor::median(&inliers);
        let mut replaced = 0;
        for v in signal.iter_mut() {
            if !is_inlier(*v) {
                *v = replacement;
                replaced += 1;
            }
        }
        log::trace!("baseline suppression replaced {} sample(s)", replaced);
        replaced
    }

    pub fn reset(&mut self) {
        self.values.clear();
        self.calibrated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OutlierConfig {
        OutlierConfig {
            calibration_seconds: 1.0,
            sigma: 3.0,
            min_inlier_fraction: 0.7,
        }
    }

    fn calibrated() -> BaselineSuppressor {
        let mut s = BaselineSuppressor::new(config(), 10.0);
        for i in 0..10 {
            s.observe(100.0 + if i % 2 == 0 { 1.0 } else { -1.0 });
        }
        s
    }

    #[test]
    fn test_calibrates_after_window() {
        let mut s = BaselineSuppressor::new(config(), 10.0);
        for _ in 0..9 {
            s.observe(100.0);
        }
        assert!(!s.is_calibrated());
        s.observe(100.0);
        assert!(s.is_calibrated());
    }

    #[test]
    fn test_spike_replaced_by_inlier_median() {
        let s = calibrated();
        let mut signal = Array1::from(vec![99.0, 101.0, 100.0, 180.0, 100.0]);
        assert_eq!(s.suppress(&mut signal), 1);
        assert_eq!(signal[3], 100.0);
    }

    #[test]
    fn test_too_many_outliers_left_alone() {
        let s = calibrated();
        let mut signal = Array1::from(vec![150.0, 160.0, 100.0, 170.0]);
        assert_eq!(s.suppress(&mut signal), 0);
        assert_eq!(signal[0], 150.0);
    }

    #[test]
    fn test_uncalibrated_and_reset() {
        let mut s = calibrated();
        s.reset();
        assert!(!s.is_calibrated());
        let mut signal = Array1::from(vec![100.0, 500.0, 100.0, 100.0]);
        assert_eq!(s.suppress(&mut signal), 0);
    }
}
