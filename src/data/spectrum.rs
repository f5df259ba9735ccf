//! Energy calibration, single spectra and single-slice result maps.

use serde::{Deserialize, Serialize};

/// Linear calibration of the energy axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAxis {
    /// Energy of channel 0.
    pub offset: f64,
    /// Energy step per channel.
    pub scale: f64,
    pub unit: String,
}

impl Default for EnergyAxis {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
            unit: "eV".to_string(),
        }
    }
}

impl EnergyAxis {
    pub fn new(offset: f64, scale: f64, unit: &str) -> Self {
        Self {
            offset,
            scale,
            unit: unit.to_string(),
        }
    }

    /// Convert a channel index to energy
    pub fn energy_at(&self, index: usize) -> f64 {
        self.offset + self.scale * index as f64
    }

    /// Generate the energy scale for `n` channels
    pub fn energies(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.energy_at(i)).collect()
    }

    /// Nearest channel to `energy`, clamped to `[0, n)`.
    pub fn index_of(&self, energy: f64, n: usize) -> usize {
        if n == 0 || self.scale == 0.0 || !energy.is_finite() {
            return 0;
        }
        let idx = ((energy - self.offset) / self.scale).round();
        if idx <= 0.0 {
            0
        } else {
            (idx as usize).min(n - 1)
        }
    }

    /// Axis of a sub-range whose first channel is `start`.
    pub fn shifted(&self, start: usize) -> Self {
        Self {
            offset: self.energy_at(start),
            scale: self.scale,
            unit: self.unit.clone(),
        }
    }
}

/// A single calibrated spectrum, e.g. the mean over a region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum1D {
    pub axis: EnergyAxis,
    pub values: Vec<f64>,
}

impl Spectrum1D {
    pub fn new(axis: EnergyAxis, values: Vec<f64>) -> Self {
        Self { axis, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum absolute value, 0 for an empty spectrum
    pub fn max_abs(&self) -> f64 {
        self.values.iter().map(|v| v.abs()).fold(0.0f64, f64::max)
    }
}

/// A single-slice image: integrated intensity, a coefficient, or a PCA map.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMap {
    pub width: usize,
    pub height: usize,
    /// Row-major, `values[y * width + x]`.
    pub values: Vec<f64>,
}

impl ImageMap {
    pub fn new(width: usize, height: usize, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), width * height);
        Self {
            width,
            height,
            values,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[y * self.width + x]
    }

    /// Finite minimum and maximum, `None` if no finite value exists.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None::<(f64, f64)>, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}
