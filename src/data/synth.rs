//! Synthetic spectrum images for demos and end-to-end checks.
//!
//! Every pixel holds a power-law background `A(x, y) · E^-r` plus an
//! absorption edge at `edge_onset` whose height follows a disc in the
//! middle of the image, optionally with Poisson counting noise.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use super::spectrum::EnergyAxis;
use super::stack::SpectrumStack;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthParams {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub offset: f64,
    pub scale: f64,
    /// Background counts at the first channel.
    pub background: f64,
    /// Power-law exponent `r` of the background, `E^-r`.
    pub exponent: f64,
    pub edge_onset: f64,
    /// Edge jump inside the disc, in counts.
    pub edge_height: f64,
    /// Decay length of the post-edge signal, axis units.
    pub edge_decay: f64,
    pub noise: bool,
    pub seed: u64,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            channels: 256,
            offset: 250.0,
            scale: 0.5,
            background: 5000.0,
            exponent: 3.0,
            edge_onset: 300.0,
            edge_height: 400.0,
            edge_decay: 40.0,
            noise: false,
            seed: 7,
        }
    }
}

impl SynthParams {
    /// Edge amplitude at a pixel: 1 inside a centred disc, fading out over
    /// a few pixels.
    fn edge_fraction(&self, x: usize, y: usize) -> f64 {
        let cx = (self.width as f64 - 1.0) / 2.0;
        let cy = (self.height as f64 - 1.0) / 2.0;
        let radius = self.width.min(self.height) as f64 / 4.0;
        let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
        (1.0 - (d - radius) / 2.0).clamp(0.0, 1.0)
    }

    /// Background amplitude: a gentle left-to-right thickness gradient.
    fn thickness(&self, x: usize) -> f64 {
        0.75 + 0.5 * x as f64 / self.width.max(1) as f64
    }
}

pub fn synthesize(params: &SynthParams) -> Result<SpectrumStack> {
    if params.offset <= 0.0 || params.scale <= 0.0 {
        return Err(AnalysisError::Config(
            "synthetic energy axis must be positive and increasing".into(),
        ));
    }
    let axis = EnergyAxis::new(params.offset, params.scale, "eV");
    let mut stack = SpectrumStack::zeros(params.width, params.height, params.channels, axis.clone());
    let mut rng = StdRng::seed_from_u64(params.seed);
    let energies = axis.energies(params.channels);
    let amplitude = params.background * params.offset.powf(params.exponent);

    for y in 0..params.height {
        for x in 0..params.width {
            let a = amplitude * params.thickness(x);
            let h = params.edge_height * params.edge_fraction(x, y);
            let mut series: Vec<f64> = energies
                .iter()
                .map(|&e| {
                    let edge = if e >= params.edge_onset {
                        h * (-(e - params.edge_onset) / params.edge_decay).exp()
                    } else {
                        0.0
                    };
                    a * e.powf(-params.exponent) + edge
                })
                .collect();

            if params.noise {
                for v in series.iter_mut() {
                    if *v > 0.0 {
                        let dist = Poisson::new(*v).map_err(|e| {
                            AnalysisError::Config(format!("bad Poisson mean {}: {}", v, e))
                        })?;
                        *v = dist.sample(&mut rng);
                    }
                }
            }
            stack.set_series(y * params.width + x, &series);
        }
    }

    log::info!(
        "Synthesized {}x{}x{} stack (noise: {})",
        params.width,
        params.height,
        params.channels,
        params.noise
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noiseless_background_level() {
        let p = SynthParams {
            width: 8,
            height: 8,
            channels: 64,
            ..Default::default()
        };
        let s = synthesize(&p).unwrap();
        // Corner pixel: no edge, thickness 0.75.
        let v = s.value(0, 0, 0);
        assert!((v - 0.75 * p.background).abs() < 1e-6);
        // Before the onset only background exists.
        let c = s.axis().index_of(280.0, 64);
        assert!(s.value(0, 0, c) < v);
    }

    #[test]
    fn test_edge_only_in_disc() {
        let p = SynthParams {
            width: 16,
            height: 16,
            channels: 200,
            ..Default::default()
        };
        let s = synthesize(&p).unwrap();
        let c = s.axis().index_of(p.edge_onset + 1.0, 200);
        let c_pre = s.axis().index_of(p.edge_onset - 1.0, 200);
        let centre_jump = s.value(8, 8, c) - s.value(8, 8, c_pre);
        let corner_jump = s.value(0, 0, c) - s.value(0, 0, c_pre);
        assert!(centre_jump > 0.0);
        assert!(corner_jump < 0.0);
    }

    #[test]
    fn test_noise_is_seeded() {
        let p = SynthParams {
            width: 4,
            height: 4,
            channels: 32,
            noise: true,
            ..Default::default()
        };
        let a = synthesize(&p).unwrap();
        let b = synthesize(&p).unwrap();
        assert_eq!(a, b);
        assert!(a.data().iter().all(|v| v.fract() == 0.0));
    }
}
