//! # vitalis-signals
//!
//! Respiration and heart-rate estimation from per-frame ROI pixel statistics.
//!
//! This crate provides:
//! - **Channel processors**: sample intake, ring buffering, filtering and rate
//!   estimation for a chest (respiration) or face (rPPG) region
//! - **DSP functions**: FFT spectra, Butterworth zero-phase filtering, peak detection
//! - **Estimation**: spectral and peak-interval estimators fused by median consensus
//! - **Quality scoring**: SNR-proxy × estimate stability, mapped to a four-level rating
//!
//! ## Example
//!
//! ```ignore
//! use vitalis_signals::{VitalsConfig, VitalsMonitor};
//!
//! let mut monitor = VitalsMonitor::new(VitalsConfig::default())?;
//!
//! for frame in video_frames {
//!     monitor.process_frame(Some(frame.chest.view()), Some(frame.face.view()), frame.timestamp);
//! }
//!
//! let snapshot = monitor.snapshot();
//! if let Ok(report) = &snapshot.rppg.rate {
//!     println!("Heart rate: {:.1} BPM ({})", report.rate, snapshot.rppg.quality.rating);
//! }
//! ```

pub mod baseline;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod dsp;
pub mod error;
pub mod feature;
pub mod monitor;
pub mod quality;
pub mod rate;
pub mod sanitize;

pub use buffer::CircularSampleBuffer;
pub use channel::{ChannelProcessor, FilteredSignal};
pub use config::{ChannelConfig, ChannelKind, FallbackPolicy, FilterConfig, VitalsConfig};
pub use dsp::{DegradeReason, DspProcessor, FilterChain, StageOutcome};
pub use error::{ConfigError, MethodFailure, Result, SignalError};
pub use feature::ChannelMeans;
pub use monitor::{VitalsMonitor, VitalsSnapshot};
pub use quality::{QualityRating, QualityReport};
pub use rate::{RateMethod, RateReport, RateSource};
pub use sanitize::{validate_array, validate_scalar};
