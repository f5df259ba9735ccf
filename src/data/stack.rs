//! Spectrum-image stack: one calibrated spectrum per spatial pixel.

use serde::{Deserialize, Serialize};
use std::path::Path;

use spim_stack::StackHeader;

use super::spectrum::{EnergyAxis, ImageMap, Spectrum1D};
use crate::error::{AnalysisError, Result};

/// Rectangular region of interest in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// 3D sample array indexed by (x, y, channel).
///
/// Storage is slice-major: every channel is a contiguous row-major image,
/// so `data[(c * height + y) * width + x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumStack {
    width: usize,
    height: usize,
    channels: usize,
    axis: EnergyAxis,
    data: Vec<f64>,
}

impl SpectrumStack {
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        axis: EnergyAxis,
        data: Vec<f64>,
    ) -> Result<Self> {
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(AnalysisError::LengthMismatch {
                expected,
                got: data.len(),
            });
        }
        if expected == 0 {
            return Err(AnalysisError::Config("stack has a zero dimension".into()));
        }
        Ok(Self {
            width,
            height,
            channels,
            axis,
            data,
        })
    }

    pub fn zeros(width: usize, height: usize, channels: usize, axis: EnergyAxis) -> Self {
        Self {
            width,
            height,
            channels,
            axis,
            data: vec![0.0; width * height * channels],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn axis(&self) -> &EnergyAxis {
        &self.axis
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn energies(&self) -> Vec<f64> {
        self.axis.energies(self.channels)
    }

    #[inline]
    fn index(&self, pixel: usize, channel: usize) -> usize {
        channel * self.num_pixels() + pixel
    }

    pub fn value(&self, x: usize, y: usize, channel: usize) -> f64 {
        self.data[self.index(y * self.width + x, channel)]
    }

    pub fn set(&mut self, x: usize, y: usize, channel: usize, v: f64) {
        let i = self.index(y * self.width + x, channel);
        self.data[i] = v;
    }

    /// The row-major image of one channel.
    pub fn slice(&self, channel: usize) -> &[f64] {
        let n = self.num_pixels();
        &self.data[channel * n..(channel + 1) * n]
    }

    /// Spectrum of the pixel with linear index `pixel` (`y * width + x`).
    pub fn series(&self, pixel: usize) -> Vec<f64> {
        (0..self.channels)
            .map(|c| self.data[self.index(pixel, c)])
            .collect()
    }

    pub fn pixel_series(&self, x: usize, y: usize) -> Vec<f64> {
        self.series(y * self.width + x)
    }

    /// Overwrite one pixel's spectrum. `values` must have one entry per channel.
    pub fn set_series(&mut self, pixel: usize, values: &[f64]) {
        debug_assert_eq!(values.len(), self.channels);
        for (c, &v) in values.iter().enumerate() {
            let i = self.index(pixel, c);
            self.data[i] = v;
        }
    }

    /// Mean spectrum over a rectangular region.
    pub fn region_spectrum(&self, roi: &Roi) -> Result<Spectrum1D> {
        if roi.width == 0
            || roi.height == 0
            || roi.x + roi.width > self.width
            || roi.y + roi.height > self.height
        {
            return Err(AnalysisError::InvalidRoi(format!(
                "{}x{} at ({}, {}) exceeds {}x{} image",
                roi.width, roi.height, roi.x, roi.y, self.width, self.height
            )));
        }

        let mut values = vec![0.0; self.channels];
        for (c, v) in values.iter_mut().enumerate() {
            let slice = self.slice(c);
            let mut sum = 0.0;
            for y in roi.y..roi.y + roi.height {
                let row = &slice[y * self.width..(y + 1) * self.width];
                sum += row[roi.x..roi.x + roi.width].iter().sum::<f64>();
            }
            *v = sum / roi.pixel_count() as f64;
        }
        Ok(Spectrum1D::new(self.axis.clone(), values))
    }

    /// Mean spectrum over the whole image.
    pub fn mean_spectrum(&self) -> Spectrum1D {
        let n = self.num_pixels() as f64;
        let values = (0..self.channels)
            .map(|c| self.slice(c).iter().sum::<f64>() / n)
            .collect();
        Spectrum1D::new(self.axis.clone(), values)
    }

    /// Copy out the channels `[start, end)` as a new stack with a shifted axis.
    pub fn sub_stack(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end || end > self.channels {
            return Err(AnalysisError::InvalidWindow {
                kind: "channel",
                start,
                end,
                len: self.channels,
            });
        }
        let n = self.num_pixels();
        Self::new(
            self.width,
            self.height,
            end - start,
            self.axis.shifted(start),
            self.data[start * n..end * n].to_vec(),
        )
    }

    /// Stack a set of equally sized maps, one per channel.
    pub fn from_maps(maps: &[ImageMap], axis: EnergyAxis) -> Result<Self> {
        let first = maps
            .first()
            .ok_or_else(|| AnalysisError::Config("no maps to stack".into()))?;
        let mut data = Vec::with_capacity(first.values.len() * maps.len());
        for m in maps {
            if m.width != first.width || m.height != first.height {
                return Err(AnalysisError::LengthMismatch {
                    expected: first.values.len(),
                    got: m.values.len(),
                });
            }
            data.extend_from_slice(&m.values);
        }
        Self::new(first.width, first.height, maps.len(), axis, data)
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    pub fn header(&self) -> StackHeader {
        StackHeader::new(self.width as u32, self.height as u32, self.channels as u32)
            .with_calibration(self.axis.offset, self.axis.scale, &self.axis.unit)
    }

    pub fn from_header(header: &StackHeader, samples: &[f32]) -> Result<Self> {
        Self::new(
            header.width as usize,
            header.height as usize,
            header.channels as usize,
            EnergyAxis::new(header.offset, header.scale, &header.unit),
            samples.iter().map(|&v| v as f64).collect(),
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, samples) = spim_stack::read_stack_file(path)?;
        log::info!(
            "Loaded {}: {}x{} px, {} channels, {:.3}+{:.4}·i {}",
            path.display(),
            header.width,
            header.height,
            header.channels,
            header.offset,
            header.scale,
            header.unit
        );
        Self::from_header(&header, &samples)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let samples: Vec<f32> = self.data.iter().map(|&v| v as f32).collect();
        spim_stack::write_stack_file(path, &self.header(), &samples)?;
        log::info!("Saved {}", path.display());
        Ok(())
    }
}
