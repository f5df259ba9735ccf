//! Data layer: calibrated spectra, stacks and index windows.
//!
//! ```text
//!   stack file (.spim)
//!        │
//!        ▼
//!   ┌───────────────┐
//!   │ SpectrumStack │  slice-major (x, y, channel) samples + EnergyAxis
//!   └───────────────┘
//!        │ pixel_series / region_spectrum
//!        ▼
//!   ┌────────────┐      ┌──────────────────────────────────┐
//!   │ Spectrum1D │ ◄──► │ IndexWindow / IntegrationWindow  │
//!   └────────────┘      └──────────────────────────────────┘
//! ```

pub mod spectrum;
pub mod stack;
pub mod synth;
pub mod window;

pub use spectrum::{EnergyAxis, ImageMap, Spectrum1D};
pub use stack::{Roi, SpectrumStack};
pub use synth::{synthesize, SynthParams};
pub use window::{IndexWindow, IntegrationWindow};
