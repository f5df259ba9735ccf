//! Index windows over the energy axis.
//!
//! A fit window is half-open, `[start, end)`. An integration window names
//! its two endpoint channels, both of which are sampled: `[start, end]`.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::spectrum::EnergyAxis;
use crate::error::{AnalysisError, Result};

/// Half-open channel range used to estimate the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWindow {
    pub start: usize,
    pub end: usize,
}

impl IndexWindow {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Requires `start < end <= len`.
    pub fn validate(&self, len: usize) -> Result<()> {
        if self.start < self.end && self.end <= len {
            Ok(())
        } else {
            Err(AnalysisError::InvalidWindow {
                kind: "fit",
                start: self.start,
                end: self.end,
                len,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Channels covering `[lo, hi]` in calibrated units.
    pub fn from_energies(axis: &EnergyAxis, lo: f64, hi: f64, n: usize) -> Self {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        Self {
            start: axis.index_of(lo, n),
            end: axis.index_of(hi, n) + 1,
        }
    }
}

/// Integration range with both endpoint channels included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationWindow {
    pub start: usize,
    pub end: usize,
}

impl IntegrationWindow {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Requires `start < end < len`.
    pub fn validate(&self, len: usize) -> Result<()> {
        if self.start < self.end && self.end < len {
            Ok(())
        } else {
            Err(AnalysisError::InvalidWindow {
                kind: "integration",
                start: self.start,
                end: self.end,
                len,
            })
        }
    }

    /// Trapezoid weight of channel `i`: 0.5 at either endpoint, 1 inside,
    /// 0 outside the window.
    pub fn weight(&self, i: usize) -> f64 {
        if i == self.start || i == self.end {
            0.5
        } else if i > self.start && i < self.end {
            1.0
        } else {
            0.0
        }
    }

    /// Channels with non-zero weight.
    pub fn channels(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn from_energies(axis: &EnergyAxis, lo: f64, hi: f64, n: usize) -> Self {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        Self {
            start: axis.index_of(lo, n),
            end: axis.index_of(hi, n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_window_bounds() {
        assert!(IndexWindow::new(0, 5).validate(5).is_ok());
        assert!(IndexWindow::new(0, 6).validate(5).is_err());
        assert!(IndexWindow::new(3, 3).validate(5).is_err());
        assert!(IndexWindow::new(4, 2).validate(5).is_err());
    }

    #[test]
    fn test_integration_window_bounds() {
        assert!(IntegrationWindow::new(1, 3).validate(5).is_ok());
        assert!(IntegrationWindow::new(1, 4).validate(5).is_ok());
        assert!(IntegrationWindow::new(1, 5).validate(5).is_err());
        assert!(IntegrationWindow::new(2, 2).validate(5).is_err());
    }

    #[test]
    fn test_trapezoid_weights() {
        let w = IntegrationWindow::new(2, 5);
        let weights: Vec<f64> = (0..7).map(|i| w.weight(i)).collect();
        assert_eq!(weights, vec![0.0, 0.0, 0.5, 1.0, 1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_windows_from_energies() {
        let axis = EnergyAxis::new(100.0, 1.0, "eV");
        let fit = IndexWindow::from_energies(&axis, 110.0, 105.0, 50);
        assert_eq!(fit, IndexWindow::new(5, 11));
        let int = IntegrationWindow::from_energies(&axis, 112.0, 120.0, 50);
        assert_eq!(int, IntegrationWindow::new(12, 20));
    }
}
