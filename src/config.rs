//! Analysis configuration.
//!
//! Everything an analysis needs is passed in explicitly through an
//! [`AnalysisConfig`], usually loaded from JSON:
//!
//! ```json
//! {
//!   "background": { "model": "power", "fit": { "energy": [250.0, 280.0] } },
//!   "integration": { "window": { "channels": [60, 90] }, "hcm": false },
//!   "subtract": true,
//!   "pca": { "window": { "channels": [40, 120] }, "weighted": true, "components": 4, "filter": 3 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{EnergyAxis, IndexWindow, IntegrationWindow, Roi};
use crate::error::{AnalysisError, Result};
use crate::fit::FitModel;
use crate::pipeline::pca::{BackgroundSpec, PcaOptions};

/// A channel range given either as indices or as calibrated energies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSpec {
    /// `[start, end]` channel indices; for fit windows `end` is exclusive.
    Channels([usize; 2]),
    /// `[from, to]` in the axis unit, both ends included.
    Energy([f64; 2]),
}

impl WindowSpec {
    pub fn fit_window(&self, axis: &EnergyAxis, channels: usize) -> IndexWindow {
        match *self {
            WindowSpec::Channels([start, end]) => IndexWindow::new(start, end),
            WindowSpec::Energy([lo, hi]) => IndexWindow::from_energies(axis, lo, hi, channels),
        }
    }

    pub fn integration_window(&self, axis: &EnergyAxis, channels: usize) -> IntegrationWindow {
        match *self {
            WindowSpec::Channels([start, end]) => IntegrationWindow::new(start, end),
            WindowSpec::Energy([lo, hi]) => {
                IntegrationWindow::from_energies(axis, lo, hi, channels)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    pub model: FitModel,
    pub fit: WindowSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub window: WindowSpec,
    #[serde(default)]
    pub hcm: bool,
}

fn default_components() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaConfig {
    pub window: WindowSpec,
    #[serde(default)]
    pub mean_center: bool,
    #[serde(default)]
    pub weighted: bool,
    /// Subtract the configured background before decomposing.
    #[serde(default)]
    pub subtract_background: bool,
    /// Component maps and spectra to export.
    #[serde(default = "default_components")]
    pub components: usize,
    /// Write a stack rebuilt from this many components.
    #[serde(default)]
    pub filter: Option<usize>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub png: bool,
    #[serde(default = "default_true")]
    pub csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            png: true,
            csv: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub background: Option<BackgroundConfig>,
    #[serde(default)]
    pub integration: Option<IntegrationConfig>,
    /// Write the background-subtracted stack.
    #[serde(default)]
    pub subtract: bool,
    #[serde(default)]
    pub pca: Option<PcaConfig>,
    /// Region whose mean spectrum (and its fit) is exported.
    #[serde(default)]
    pub roi: Option<Roi>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Configuration with every window resolved to channel indices and
/// validated against one stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub background: Option<(FitModel, IndexWindow)>,
    pub integration: Option<(IntegrationWindow, bool)>,
    pub subtract: bool,
    pub pca: Option<(PcaOptions, usize, Option<usize>)>,
    pub roi: Option<Roi>,
    pub output: OutputConfig,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        log::info!("Loaded analysis config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Resolve windows against a stack's axis and check them before any
    /// computation starts.
    pub fn resolve(&self, axis: &EnergyAxis, channels: usize) -> Result<ResolvedConfig> {
        let background = match &self.background {
            Some(bg) => {
                let fit = bg.fit.fit_window(axis, channels);
                fit.validate(channels)?;
                Some((bg.model, fit))
            }
            None => None,
        };

        let needs_background = |what: &str| {
            AnalysisError::Config(format!("{} requires a background section", what))
        };

        let integration = match &self.integration {
            Some(int) => {
                if background.is_none() {
                    return Err(needs_background("integration"));
                }
                let window = int.window.integration_window(axis, channels);
                window.validate(channels)?;
                Some((window, int.hcm))
            }
            None => None,
        };

        if self.subtract && background.is_none() {
            return Err(needs_background("subtract"));
        }

        let pca = match &self.pca {
            Some(p) => {
                let window = p.window.fit_window(axis, channels);
                window.validate(channels)?;
                let bg = if p.subtract_background {
                    let (model, fit) = background.ok_or_else(|| needs_background("pca.subtract_background"))?;
                    Some(BackgroundSpec { model, fit })
                } else {
                    None
                };
                let options = PcaOptions {
                    window,
                    mean_center: p.mean_center,
                    weighted: p.weighted,
                    background: bg,
                };
                Some((options, p.components, p.filter))
            }
            None => None,
        };

        Ok(ResolvedConfig {
            background,
            integration,
            subtract: self.subtract,
            pca,
            roi: self.roi,
            output: self.output.clone(),
        })
    }
}
