//! Caller-owned respiration + rPPG pair.

use ndarray::ArrayView3;

use crate::channel::ChannelProcessor;
use crate::config::VitalsConfig;
use crate::error::{Result, SignalError};
use crate::quality::QualityReport;
use crate::rate::RateReport;

/// Live-preview scalars produced by one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub respiration: Result<f32>,
    pub rppg: Result<f32>,
}

/// Rate and quality of one channel at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub rate: Result<RateReport>,
    pub quality: QualityReport,
    /// Buffered samples
    pub samples: usize,
}

/// Both channels at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalsSnapshot {
    pub respiration: ChannelSnapshot,
    pub rppg: ChannelSnapshot,
}

/// Respiration (chest ROI) and heart rate (face ROI) processors driven by the
/// same frame clock.
#[derive(Debug, Clone)]
pub struct VitalsMonitor {
    respiration: ChannelProcessor,
    rppg: ChannelProcessor,
}

impl VitalsMonitor {
    pub fn new(config: VitalsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            respiration: ChannelProcessor::new(config.respiration)?,
            rppg: ChannelProcessor::new(config.rppg)?,
        })
    }

    pub fn respiration(&self) -> &ChannelProcessor {
        &self.respiration
    }

    pub fn rppg(&self) -> &ChannelProcessor {
        &self.rppg
    }

    /// Feed one frame. A missing ROI is a skipped frame for that channel only.
    pub fn process_frame(
        &mut self,
        chest_roi: Option<ArrayView3<'_, u8>>,
        face_roi: Option<ArrayView3<'_, u8>>,
        timestamp: f64,
    ) -> FrameOutput {
        FrameOutput {
            respiration: match chest_roi {
                Some(roi) => self.respiration.process_roi(roi, timestamp),
                None => Err(SignalError::EmptyRoi),
            },
            rppg: match face_roi {
                Some(roi) => self.rppg.process_roi(roi, timestamp),
                None => Err(SignalError::EmptyRoi),
            },
        }
    }

    /// Estimate both rates and score both signals.
    ///
    /// Successful estimates extend each channel's rate history.
    pub fn snapshot(&mut self) -> VitalsSnapshot {
        VitalsSnapshot {
            respiration: Self::channel_snapshot(&mut self.respiration),
            rppg: Self::channel_snapshot(&mut self.rppg),
        }
    }

    fn channel_snapshot(processor: &mut ChannelProcessor) -> ChannelSnapshot {
        let rate = processor.estimate_rate();
        ChannelSnapshot {
            rate,
            quality: processor.signal_quality_report(),
            samples: processor.len(),
        }
    }

    pub fn reset(&mut self) {
        self.respiration.reset();
        self.rppg.reset();
    }
}
