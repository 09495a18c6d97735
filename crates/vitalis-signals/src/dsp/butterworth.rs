//! Butterworth design as cascaded second-order sections, plus zero-phase
//! forward-backward application.
//!
//! Sections are designed with the bilinear transform and run in Direct Form II
//! Transposed. All arithmetic is `f64`; the very low respiration cutoffs put
//! poles close to the unit circle.

use std::f64::consts::PI;

use super::filters::DegradeReason;

/// Biquad coefficients, `a0` normalized to 1.
/// H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    fn lowpass(w0: f64, q: f64) -> Self {
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn highpass(w0: f64, q: f64) -> Self {
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn first_order_lowpass(w0: f64) -> Self {
        let k = (w0 / 2.0).tan();
        Self {
            b0: k / (1.0 + k),
            b1: k / (1.0 + k),
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    fn first_order_highpass(w0: f64) -> Self {
        let k = (w0 / 2.0).tan();
        Self {
            b0: 1.0 / (1.0 + k),
            b1: -1.0 / (1.0 + k),
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    /// Poles strictly inside the unit circle (stability triangle).
    fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }

    fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// DC gain H(1).
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Edge {
    Low,
    High,
}

/// Cascade of biquads.
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    /// Butterworth bandpass built as an order-`order` highpass at `low`
    /// cascaded with an order-`order` lowpass at `high`.
    ///
    /// Cutoffs are normalized to Nyquist and must satisfy `0 < low < high < 1`.
    pub fn bandpass(low: f64, high: f64, order: usize) -> Result<Self, DegradeReason> {
        if !(low > 0.0 && low < high && high < 1.0) || order == 0 {
            return Err(DegradeReason::InvalidDesign);
        }
        let mut sections = Self::butterworth(low, order, Edge::High);
        sections.extend(Self::butterworth(high, order, Edge::Low));
        Self::from_sections(sections)
    }

    /// Butterworth lowpass, cutoff normalized to Nyquist.
    pub fn lowpass(cutoff: f64, order: usize) -> Result<Self, DegradeReason> {
        if !(cutoff > 0.0 && cutoff < 1.0) || order == 0 {
            return Err(DegradeReason::InvalidDesign);
        }
        Self::from_sections(Self::butterworth(cutoff, order, Edge::Low))
    }

    /// Butterworth highpass, cutoff normalized to Nyquist.
    pub fn highpass(cutoff: f64, order: usize) -> Result<Self, DegradeReason> {
        if !(cutoff > 0.0 && cutoff < 1.0) || order == 0 {
            return Err(DegradeReason::InvalidDesign);
        }
        Self::from_sections(Self::butterworth(cutoff, order, Edge::High))
    }

    fn from_sections(sections: Vec<Biquad>) -> Result<Self, DegradeReason> {
        if sections.iter().any(|s| !s.is_finite()) {
            return Err(DegradeReason::InvalidDesign);
        }
        if sections.iter().any(|s| !s.is_stable()) {
            return Err(DegradeReason::UnstableFilter);
        }
        Ok(Self { sections })
    }

    fn butterworth(cutoff: f64, order: usize, edge: Edge) -> Vec<Biquad> {
        let w0 = PI * cutoff;
        let mut sections = Vec::with_capacity((order + 1) / 2);

        // Conjugate pole pairs: Q_k = 1 / (2 sin((2k+1)π / 2N))
        for k in 0..order / 2 {
            let q = 1.0 / (2.0 * (PI * (2 * k + 1) as f64 / (2 * order) as f64).sin());
            sections.push(match edge {
                Edge::Low => Biquad::lowpass(w0, q),
                Edge::High => Biquad::highpass(w0, q),
            });
        }
        if order % 2 == 1 {
            sections.push(match edge {
                Edge::Low => Biquad::first_order_lowpass(w0),
                Edge::High => Biquad::first_order_highpass(w0),
            });
        }
        sections
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Default edge padding for `filtfilt`.
    pub fn padlen(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Single forward pass with every section started in its steady state for
    /// a constant input equal to `x[0]`.
    pub fn filter(&self, x: &[f64]) -> Vec<f64> {
        let Some(&x0) = x.first() else {
            return Vec::new();
        };

        let mut state: Vec<(f64, f64)> = Vec::with_capacity(self.sections.len());
        let mut u = x0;
        for s in &self.sections {
            let y = s.dc_gain() * u;
            state.push(((s.b1 + s.b2) * u - (s.a1 + s.a2) * y, s.b2 * u - s.a2 * y));
            u = y;
        }

        x.iter()
            .map(|&input| {
                let mut v = input;
                for (s, (z1, z2)) in self.sections.iter().zip(state.iter_mut()) {
                    let out = s.b0 * v + *z1;
                    *z1 = s.b1 * v - s.a1 * out + *z2;
                    *z2 = s.b2 * v - s.a2 * out;
                    v = out;
                }
                v
            })
            .collect()
    }

    /// Zero-phase forward-backward filtering with odd-extension padding.
    ///
    /// Output has the input's length. Inputs shorter than two samples are
    /// returned unchanged.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n < 2 {
            return x.to_vec();
        }

        let pad = self.padlen().min(n - 1);
        let first = x[0];
        let last = x[n - 1];

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));

        let mut y = self.filter(&ext);
        y.reverse();
        let mut y = self.filter(&y);
        y.reverse();

        y[pad..pad + n].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_section_counts() {
        assert_eq!(SosFilter::lowpass(0.2, 4).unwrap().sections().len(), 2);
        assert_eq!(SosFilter::lowpass(0.2, 3).unwrap().sections().len(), 2);
        assert_eq!(SosFilter::bandpass(0.1, 0.3, 4).unwrap().sections().len(), 4);
    }

    #[test]
    fn test_invalid_cutoffs_rejected() {
        assert_eq!(
            SosFilter::bandpass(0.4, 0.2, 4).unwrap_err(),
            DegradeReason::InvalidDesign
        );
        assert!(SosFilter::lowpass(1.2, 2).is_err());
        assert!(SosFilter::highpass(0.2, 0).is_err());
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let filter = SosFilter::lowpass(0.1, 4).unwrap();
        let out = filter.filter(&vec![1.0; 200]);
        for v in out {
            assert_relative_eq!(v, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let filter = SosFilter::highpass(0.1, 2).unwrap();
        let out = filter.filtfilt(&vec![5.0; 100]);
        for v in out {
            assert!(v.abs() < 1e-9, "DC leaked: {}", v);
        }
    }

    #[test]
    fn test_bandpass_keeps_in_band_and_rejects_out_of_band() {
        let fs = 30.0;
        // 0.7-3.5 Hz band at 30 Hz
        let filter = SosFilter::bandpass(0.7 / 15.0, 3.5 / 15.0, 4).unwrap();

        let in_band = sine(1.5, fs, 600);
        let out = filter.filtfilt(&in_band);
        let ratio = rms(&out[100..500]) / rms(&in_band[100..500]);
        assert!(ratio > 0.9 && ratio < 1.1, "in-band gain {}", ratio);

        let out_of_band = sine(8.0, fs, 600);
        let out = filter.filtfilt(&out_of_band);
        assert!(rms(&out[100..500]) < 0.05, "stopband leak {}", rms(&out));
    }

    #[test]
    fn test_filtfilt_preserves_length_and_phase() {
        let filter = SosFilter::bandpass(0.08 / 15.0, 0.5 / 15.0, 4).unwrap();
        let x = sine(0.25, 30.0, 900);
        let y = filter.filtfilt(&x);
        assert_eq!(y.len(), x.len());

        // Zero phase: the maximum of the filtered cycle lines up with the input.
        let window = 300..420;
        let argmax = |v: &[f64]| {
            window
                .clone()
                .max_by(|&a, &b| v[a].total_cmp(&v[b]))
                .unwrap_or(0)
        };
        let shift = argmax(&x) as i64 - argmax(&y) as i64;
        assert!(shift.abs() <= 2, "phase shift {} samples", shift);
    }

    #[test]
    fn test_short_input_untouched() {
        let filter = SosFilter::lowpass(0.5, 2).unwrap();
        assert_eq!(filter.filtfilt(&[3.0]), vec![3.0]);
        assert!(filter.filtfilt(&[]).is_empty());
    }
}
