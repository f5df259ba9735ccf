//! Error taxonomy for analysis operations.
//!
//! Degenerate per-pixel fits are not errors: they resolve to zero
//! coefficients inside the fit module and never surface here.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid {kind} window [{start}, {end}] for a series of {len} channels")]
    InvalidWindow {
        kind: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("Invalid region of interest: {0}")]
    InvalidRoi(String),
    #[error("Data length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("Singular value decomposition failed: {0}")]
    Svd(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Stack file error: {0}")]
    Stack(#[from] spim_stack::StackError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image export error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
