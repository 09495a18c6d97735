//! ROI → channel feature reduction.

use ndarray::{Array1, ArrayView3, Axis};

use crate::config::FeatureKind;
use crate::error::{Result, SignalError};

/// Per-plane pixel means of one ROI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMeans {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl ChannelMeans {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Mean of each colour plane of an `(height, width, planes)` RGB block.
    ///
    /// Planes beyond the third (e.g. alpha) are ignored.
    pub fn from_roi(roi: ArrayView3<'_, u8>) -> Result<Self> {
        let (h, w, planes) = roi.dim();
        if h == 0 || w == 0 || planes == 0 {
            return Err(SignalError::EmptyRoi);
        }
        if planes < 3 {
            return Err(SignalError::InvalidRoiShape {
                shape: roi.shape().to_vec(),
            });
        }

        let count = (h * w) as f64;
        let mut sums = [0.0f64; 3];
        for (c, sum) in sums.iter_mut().enumerate() {
            *sum = roi
                .index_axis(Axis(2), c)
                .iter()
                .map(|&p| p as f64)
                .sum();
        }

        Ok(Self {
            r: (sums[0] / count) as f32,
            g: (sums[1] / count) as f32,
            b: (sums[2] / count) as f32,
        })
    }

    /// Reject frames whose first `planes` planes average to zero or below, or
    /// are not finite.
    pub fn check_positive(&self, planes: usize) -> Result<()> {
        let named = [("red", self.r), ("green", self.g), ("blue", self.b)];
        for &(name, v) in named.iter().take(planes) {
            if !v.is_finite() {
                return Err(SignalError::NonFiniteSample);
            }
            if v <= 0.0 {
                return Err(SignalError::NonPositiveChannel { channel: name });
            }
        }
        Ok(())
    }
}

/// Values one frame contributes to a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    /// Scalar returned to live-preview consumers
    pub live: f32,
    /// Buffered lanes; only the first `FeatureKind::lanes()` are meaningful
    pub lanes: [f32; 3],
}

/// Reduces channel means to the channel's buffered feature.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    kind: FeatureKind,
}

impl FeatureExtractor {
    pub fn new(kind: FeatureKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn lanes(&self) -> usize {
        self.kind.lanes()
    }

    pub fn planes(&self) -> usize {
        self.kind.planes()
    }

    pub fn extract(&self, means: &ChannelMeans) -> Feature {
        match self.kind {
            FeatureKind::WeightedRgb { weights } => {
                let v = weights[0] * means.r + weights[1] * means.g + weights[2] * means.b;
                Feature {
                    live: v,
                    lanes: [v, 0.0, 0.0],
                }
            }
            FeatureKind::ChromaticPulse { .. } => Feature {
                live: means.g,
                lanes: [means.r, means.g, 0.0],
            },
        }
    }

    /// Combine buffered lanes into the single series the filter chain sees.
    ///
    /// For the chromatic pulse this is `g/mean(g) - red_weight * r/mean(r)`.
    /// A lane whose mean is zero or non-finite is left un-normalized.
    pub fn combine(&self, lanes: &[Array1<f32>]) -> Array1<f32> {
        match self.kind {
            FeatureKind::WeightedRgb { .. } => lanes.first().cloned().unwrap_or_else(|| Array1::zeros(0)),
            FeatureKind::ChromaticPulse { red_weight } => {
                let (Some(r), Some(g)) = (lanes.first(), lanes.get(1)) else {
                    return Array1::zeros(0);
                };
                let r_n = normalize_by_mean(r);
                let g_n = normalize_by_mean(g);
                &g_n - &(r_n * red_weight)
            }
        }
    }
}

fn normalize_by_mean(x: &Array1<f32>) -> Array1<f32> {
    match x.mean() {
        Some(m) if m.is_finite() && m != 0.0 => x / m,
        _ => x.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn roi(r: u8, g: u8, b: u8) -> Array3<u8> {
        let mut block = Array3::<u8>::zeros((4, 6, 3));
        block.index_axis_mut(Axis(2), 0).fill(r);
        block.index_axis_mut(Axis(2), 1).fill(g);
        block.index_axis_mut(Axis(2), 2).fill(b);
        block
    }

    #[test]
    fn test_means_from_roi() {
        let block = roi(200, 100, 50);
        let means = ChannelMeans::from_roi(block.view()).unwrap();
        assert_eq!(means, ChannelMeans::new(200.0, 100.0, 50.0));
    }

    #[test]
    fn test_empty_and_malformed_roi() {
        let empty = Array3::<u8>::zeros((0, 5, 3));
        assert_eq!(ChannelMeans::from_roi(empty.view()), Err(SignalError::EmptyRoi));

        let gray = Array3::<u8>::zeros((4, 4, 1));
        assert_eq!(
            ChannelMeans::from_roi(gray.view()),
            Err(SignalError::InvalidRoiShape { shape: vec![4, 4, 1] })
        );
    }

    #[test]
    fn test_black_frame_not_positive() {
        let means = ChannelMeans::from_roi(roi(0, 0, 0).view()).unwrap();
        assert_eq!(
            means.check_positive(3),
            Err(SignalError::NonPositiveChannel { channel: "red" })
        );
    }

    #[test]
    fn test_unread_plane_not_checked() {
        let means = ChannelMeans::new(150.0, 120.0, 0.0);
        assert_eq!(
            means.check_positive(3),
            Err(SignalError::NonPositiveChannel { channel: "blue" })
        );
        assert_eq!(means.check_positive(2), Ok(()));
    }

    #[test]
    fn test_weighted_feature() {
        let extractor = FeatureExtractor::new(FeatureKind::WeightedRgb {
            weights: [0.6, 0.3, 0.1],
        });
        let f = extractor.extract(&ChannelMeans::new(100.0, 50.0, 10.0));
        assert_relative_eq!(f.live, 76.0, epsilon = 1e-4);
        assert_eq!(extractor.lanes(), 1);
    }

    #[test]
    fn test_chromatic_pulse_combination() {
        let extractor = FeatureExtractor::new(FeatureKind::ChromaticPulse { red_weight: 0.5 });
        let f = extractor.extract(&ChannelMeans::new(150.0, 120.0, 90.0));
        assert_eq!(f.live, 120.0);
        assert_eq!(&f.lanes[..extractor.lanes()], &[150.0, 120.0]);
        assert_eq!(extractor.planes(), 2);

        let r = Array1::from(vec![100.0, 100.0, 100.0]);
        let g = Array1::from(vec![90.0, 100.0, 110.0]);
        let combined = extractor.combine(&[r, g]);
        assert_relative_eq!(combined[0], 0.9 - 0.5, epsilon = 1e-6);
        assert_relative_eq!(combined[2], 1.1 - 0.5, epsilon = 1e-6);
    }
}
