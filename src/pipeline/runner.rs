/// Batch execution of an analysis configuration
///
/// Runs every configured step against one stack and writes the results
/// into an output directory, named after the input stem.

use std::path::{Path, PathBuf};

use super::pca;
use super::processing::{self, BackgroundFit};
use crate::config::ResolvedConfig;
use crate::data::{EnergyAxis, ImageMap, SpectrumStack};
use crate::error::Result;
use crate::export;
use crate::log::reproducibility::ReproLog;
use crate::progress::LogProgress;

/// Files written by a run, in order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outputs: Vec<PathBuf>,
}

struct Writer<'a> {
    dir: &'a Path,
    stem: &'a str,
    png: bool,
    csv: bool,
    summary: RunSummary,
}

impl Writer<'_> {
    fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", self.stem, suffix))
    }

    fn map(&mut self, map: &ImageMap, axis: &EnergyAxis, name: &str) -> Result<()> {
        let path = self.path(&format!("{}.spim", name));
        export::write_map_stack(map, axis, &path)?;
        self.summary.outputs.push(path);
        if self.png {
            let path = self.path(&format!("{}.png", name));
            export::write_map_png(map, &path)?;
            self.summary.outputs.push(path);
        }
        Ok(())
    }

    fn stack(&mut self, stack: &SpectrumStack, name: &str) -> Result<()> {
        let path = self.path(&format!("{}.spim", name));
        stack.save(&path)?;
        self.summary.outputs.push(path);
        Ok(())
    }

    fn text(&mut self, text: &str, name: &str) -> Result<()> {
        if !self.csv {
            return Ok(());
        }
        let path = self.path(&format!("{}.csv", name));
        std::fs::write(&path, text)?;
        self.summary.outputs.push(path);
        Ok(())
    }
}

pub fn run(
    stack: &SpectrumStack,
    config: &ResolvedConfig,
    out_dir: &Path,
    stem: &str,
    log: &mut ReproLog,
) -> Result<RunSummary> {
    std::fs::create_dir_all(out_dir)?;
    let mut out = Writer {
        dir: out_dir,
        stem,
        png: config.output.png,
        csv: config.output.csv,
        summary: RunSummary::default(),
    };
    let axis = stack.axis().clone();

    let background: Option<BackgroundFit> = match config.background {
        Some((model, fit)) => Some(processing::fit_background(
            stack,
            model,
            fit,
            &mut LogProgress::new("Background fit"),
            log,
        )?),
        None => None,
    };

    if let Some(bg) = &background {
        out.map(&bg.c0_map(), &axis, "c0")?;
        out.map(&bg.c1_map(), &axis, "c1")?;

        if config.subtract {
            let sub = processing::subtract_background(
                stack,
                bg,
                &mut LogProgress::new("Subtraction"),
                log,
            )?;
            out.stack(&sub, "sub")?;
        }

        if let Some((window, hcm)) = config.integration {
            let mut progress = LogProgress::new("Integration");
            let (map, name) = if hcm {
                (processing::hcm_integrate(stack, bg, window, &mut progress, log)?, "hcm")
            } else {
                (processing::integrate(stack, bg, window, &mut progress, log)?, "int")
            };
            out.map(&map, &axis.shifted(window.start), name)?;
        }
    }

    if let Some(roi) = &config.roi {
        let spectrum = stack.region_spectrum(roi)?;
        let csv = match config.background {
            Some((model, fit)) => {
                let series_fit = processing::fit_spectrum(&spectrum, model, fit)?;
                let curve = series_fit.curve(&spectrum.axis, spectrum.len());
                let residual = processing::subtract_spectrum(&spectrum, &series_fit);
                export::spectra_csv(
                    &spectrum.axis,
                    spectrum.len(),
                    &[
                        ("roi", &spectrum.values[..]),
                        ("background", &curve[..]),
                        ("signal", &residual.values[..]),
                    ],
                )
            }
            None => export::spectra_csv(
                &spectrum.axis,
                spectrum.len(),
                &[("roi", &spectrum.values[..])],
            ),
        };
        out.text(&csv, "roi")?;
    }

    if let Some((options, components, filter)) = &config.pca {
        let result = pca::decompose(stack, options, &mut LogProgress::new("PCA"), log)?;
        out.text(&export::scree_csv(&result), "scree")?;
        out.text(&export::components_csv(&result, *components), "components")?;
        for k in 0..(*components).min(result.n_components()) {
            if let Some(map) = result.component_map(k) {
                out.map(&map, &result.axis, &format!("pc{}", k))?;
            }
        }
        if let Some(n) = filter {
            let filtered = pca::apply_filter(&result, options, *n, log)?;
            out.stack(&filtered, &format!("pca{}", n))?;
        }
    }

    log::info!("Run wrote {} files to {}", out.summary.outputs.len(), out_dir.display());
    Ok(out.summary)
}
