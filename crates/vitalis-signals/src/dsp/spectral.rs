//! Spectral and statistical helpers shared by the estimators and scorers.

use num_complex::Complex32;
use rustfft::FftPlanner;

/// One-sided magnitude spectrum.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Bin centre frequencies in Hz, `0..=fs/2`
    pub freqs: Vec<f32>,
    /// Magnitude `|X[k]|` per bin
    pub magnitudes: Vec<f32>,
}

impl Spectrum {
    /// Frequency of the largest magnitude whose bin lies in `[min_hz, max_hz]`.
    ///
    /// `None` when no bin is in band or the in-band maximum is zero.
    pub fn peak_in_band(&self, min_hz: f32, max_hz: f32) -> Option<(f32, f32)> {
        let mut best: Option<(f32, f32)> = None;
        for (&f, &m) in self.freqs.iter().zip(self.magnitudes.iter()) {
            if f < min_hz || f > max_hz {
                continue;
            }
            match best {
                Some((_, bm)) if bm >= m => {}
                _ => best = Some((f, m)),
            }
        }
        best.filter(|&(_, m)| m > 0.0)
    }

    /// Number of bins inside `[min_hz, max_hz]`.
    pub fn bins_in_band(&self, min_hz: f32, max_hz: f32) -> usize {
        self.freqs.iter().filter(|&&f| f >= min_hz && f <= max_hz).count()
    }
}

/// Stateless DSP helpers.
pub struct DspProcessor;

impl DspProcessor {
    /// One-sided magnitude spectrum of a real signal (no window applied).
    ///
    /// Bins `0..=n/2` at spacing `fs / n`.
    pub fn magnitude_spectrum(signal: &[f32], fs: f32) -> Spectrum {
        let n = signal.len();
        if n == 0 || !(fs > 0.0) {
            return Spectrum {
                freqs: Vec::new(),
                magnitudes: Vec::new(),
            };
        }

        let mut buffer: Vec<Complex32> = signal.iter().map(|&s| Complex32::new(s, 0.0)).collect();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let half = n / 2;
        let bin_res = fs / n as f32;
        Spectrum {
            freqs: (0..=half).map(|k| k as f32 * bin_res).collect(),
            magnitudes: buffer.iter().take(half + 1).map(|c| c.norm()).collect(),
        }
    }

    /// Local maxima at least `min_height` tall and `min_distance` samples apart.
    ///
    /// Plateaus report their left edge. When two peaks are closer than
    /// `min_distance` the taller one wins. Indices are returned ascending.
    pub fn find_peaks(signal: &[f32], min_height: f32, min_distance: usize) -> Vec<usize> {
        let n = signal.len();
        if n < 3 {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        let mut i = 1;
        while i < n - 1 {
            if signal[i] > signal[i - 1] {
                // Walk across a flat top, if any.
                let mut j = i;
                while j + 1 < n - 1 && signal[j + 1] == signal[i] {
                    j += 1;
                }
                if signal[j + 1] < signal[i] && signal[i] >= min_height {
                    candidates.push(i);
                }
                i = j + 1;
            } else {
                i += 1;
            }
        }

        if min_distance <= 1 || candidates.len() < 2 {
            return candidates;
        }

        // Highest first; suppress neighbours within min_distance.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| signal[candidates[b]].total_cmp(&signal[candidates[a]]));

        let mut keep = vec![true; candidates.len()];
        for &idx in &order {
            if !keep[idx] {
                continue;
            }
            let p = candidates[idx];
            for (other, &q) in candidates.iter().enumerate() {
                if other != idx && keep[other] && p.abs_diff(q) < min_distance {
                    keep[other] = false;
                }
            }
        }

        candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect()
    }

    pub fn mean(arr: &[f32]) -> f32 {
        if arr.is_empty() {
            return 0.0;
        }
        (arr.iter().map(|&v| v as f64).sum::<f64>() / arr.len() as f64) as f32
    }

    /// Population variance.
    pub fn variance(arr: &[f32]) -> f32 {
        if arr.is_empty() {
            return 0.0;
        }
        let mean = arr.iter().map(|&v| v as f64).sum::<f64>() / arr.len() as f64;
        let var = arr.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / arr.len() as f64;
        var as f32
    }

    /// Population standard deviation.
    pub fn std(arr: &[f32]) -> f32 {
        Self::variance(arr).sqrt()
    }

    /// Median, averaging the middle pair for even lengths. Zero when empty.
    pub fn median(arr: &[f32]) -> f32 {
        if arr.is_empty() {
            return 0.0;
        }
        let mut sorted = arr.to_vec();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            0.5 * (sorted[mid - 1] + sorted[mid])
        } else {
            sorted[mid]
        }
    }

    /// First difference `x[i+1] - x[i]`.
    pub fn diff(arr: &[f32]) -> Vec<f32> {
        arr.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_std() {
        let std = DspProcessor::std(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // Known std for [1,2,3,4,5] is sqrt(2)
        assert_relative_eq!(std, std::f32::consts::SQRT_2, epsilon = 0.001);
    }

    #[test]
    fn test_median() {
        assert_eq!(DspProcessor::median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(DspProcessor::median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(DspProcessor::median(&[]), 0.0);
    }

    #[test]
    fn test_spectrum_peak_of_sine() {
        let fs = 30.0;
        let signal: Vec<f32> = (0..300)
            .map(|i| (2.0 * PI * 1.2 * i as f32 / fs).sin())
            .collect();

        let spectrum = DspProcessor::magnitude_spectrum(&signal, fs);
        assert_eq!(spectrum.freqs.len(), 151);

        let (hz, _) = spectrum.peak_in_band(0.7, 3.0).unwrap();
        assert_relative_eq!(hz, 1.2, epsilon = 1e-4);
    }

    #[test]
    fn test_peak_in_band_empty_band() {
        let spectrum = DspProcessor::magnitude_spectrum(&[0.0; 16], 30.0);
        assert!(spectrum.peak_in_band(20.0, 25.0).is_none());
        assert_eq!(spectrum.bins_in_band(20.0, 25.0), 0);
        // All-zero input: bins exist but carry nothing.
        assert!(spectrum.bins_in_band(1.0, 10.0) > 0);
        assert!(spectrum.peak_in_band(1.0, 10.0).is_none());
    }

    #[test]
    fn test_find_peaks_respects_distance() {
        // 1 Hz cosine at 30 Hz: maxima every 30 samples, the one at 0 is an edge
        let signal: Vec<f32> = (0..120)
            .map(|i| (2.0 * PI * i as f32 / 30.0).cos())
            .collect();

        let peaks = DspProcessor::find_peaks(&signal, 0.3, 20);
        assert_eq!(peaks, vec![30, 60, 90]);
    }

    #[test]
    fn test_find_peaks_taller_wins() {
        let signal = [0.0, 1.0, 0.0, 3.0, 0.0, 0.0, 2.0, 0.0];
        assert_eq!(DspProcessor::find_peaks(&signal, 0.0, 3), vec![3, 6]);
        assert_eq!(DspProcessor::find_peaks(&signal, 1.5, 1), vec![3, 6]);
    }

    #[test]
    fn test_find_peaks_plateau() {
        let signal = [0.0, 2.0, 2.0, 2.0, 0.0];
        assert_eq!(DspProcessor::find_peaks(&signal, 0.0, 1), vec![1]);
    }
}
