//! DSP (Digital Signal Processing) module
//!
//! ## Components
//! - `DspProcessor` / `Spectrum` - FFT magnitude spectrum, peak picking, statistics
//! - `SosFilter` - Butterworth cascades with zero-phase application
//! - `FilterChain` - detrend → bandpass → smoothing with per-stage fallback

mod butterworth;
mod filters;
mod spectral;

pub use butterworth::{Biquad, SosFilter};
pub use filters::{
    bandpass, detrend, smooth, DegradeReason, FilterChain, FilterOutput, Stage, StageOutcome,
    StageReport, StageStatus,
};
pub use spectral::{DspProcessor, Spectrum};
