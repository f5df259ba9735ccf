//! Background fitting, energy-window integration and windowed PCA for
//! spectrum-image stacks.

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod fit;
pub mod log;
pub mod pipeline;
pub mod progress;

pub use error::{AnalysisError, Result};
