//! Spectrum-image stack container: header with energy calibration,
//! followed by slice-major `f32` samples.

pub mod header;
pub mod reader;
pub mod writer;

pub use header::*;
pub use reader::*;
pub use writer::*;
