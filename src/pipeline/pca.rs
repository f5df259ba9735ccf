/// Windowed principal component analysis of a spectrum-image stack
///
/// The stack's window channels form a (samples × pixels) matrix. It may be
/// background-subtracted, mean-centered per column and reweighted with
/// `1/sqrt(row sum)` and `1/sqrt(column sum)` before the SVD. Weights are
/// taken back out of the singular vectors, so `reconstruct` returns data in
/// the original units.

use nalgebra::{DMatrix, SVD};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::processing::{fit_background, subtract_background, ProcessingOp};
use crate::data::{EnergyAxis, ImageMap, IndexWindow, Spectrum1D, SpectrumStack};
use crate::error::{AnalysisError, Result};
use crate::fit::FitModel;
use crate::log::reproducibility::ReproLog;
use crate::progress::{NoProgress, Progress};

/// Scale inside the scree logarithm.
pub const SCREE_SCALE: f64 = 1e4;
/// Matrix size (elements) above which the SVD is flagged as slow.
pub const SLOW_SVD_ELEMENTS: usize = 4_000_000;

/// Background removed before decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSpec {
    pub model: FitModel,
    pub fit: IndexWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaOptions {
    /// Energy sub-window, half-open.
    pub window: IndexWindow,
    #[serde(default)]
    pub mean_center: bool,
    #[serde(default)]
    pub weighted: bool,
    #[serde(default)]
    pub background: Option<BackgroundSpec>,
}

impl PcaOptions {
    pub fn new(window: IndexWindow) -> Self {
        Self {
            window,
            mean_center: false,
            weighted: false,
            background: None,
        }
    }
}

/// Decomposition of a window of a stack, components in descending order.
#[derive(Debug, Clone)]
pub struct PcaResult {
    pub width: usize,
    pub height: usize,
    /// Axis of the window's first channel.
    pub axis: EnergyAxis,
    pub window: IndexWindow,
    pub singular_values: Vec<f64>,
    /// Left singular vectors, one per component, over the window channels.
    pub spectra: Vec<Vec<f64>>,
    /// Right singular vectors, one per component, row-major over pixels.
    pub maps: Vec<Vec<f64>>,
    /// Per-pixel means removed before decomposition.
    pub column_means: Option<Vec<f64>>,
}

impl PcaResult {
    pub fn n_components(&self) -> usize {
        self.singular_values.len()
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    /// `ln(1 + 1e4 · s / s_max)` for each singular value.
    pub fn scree(&self) -> Vec<f64> {
        let smax = self.singular_values.first().copied().unwrap_or(0.0);
        self.singular_values
            .iter()
            .map(|&s| {
                if smax > 0.0 {
                    (1.0 + SCREE_SCALE * s / smax).ln()
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Fraction of the total squared singular values per component.
    pub fn explained_variance(&self) -> Vec<f64> {
        let total: f64 = self.singular_values.iter().map(|s| s * s).sum();
        self.singular_values
            .iter()
            .map(|s| if total > 0.0 { s * s / total } else { 0.0 })
            .collect()
    }

    pub fn component_spectrum(&self, k: usize) -> Option<Spectrum1D> {
        self.spectra
            .get(k)
            .map(|v| Spectrum1D::new(self.axis.clone(), v.clone()))
    }

    pub fn component_map(&self, k: usize) -> Option<ImageMap> {
        self.maps
            .get(k)
            .map(|v| ImageMap::new(self.width, self.height, v.clone()))
    }

    /// Window stack rebuilt from the first `n` components (clamped to the
    /// number available), each weighted by its singular value.
    pub fn reconstruct(&self, n: usize) -> Result<SpectrumStack> {
        let n = n.min(self.n_components());
        let pixels = self.width * self.height;
        let samples = self.samples();
        let mut data = vec![0.0; samples * pixels];

        for (r, slice) in data.chunks_mut(pixels).enumerate() {
            if let Some(means) = &self.column_means {
                slice.copy_from_slice(means);
            }
            for k in 0..n {
                let a = self.singular_values[k] * self.spectra[k][r];
                for (v, m) in slice.iter_mut().zip(&self.maps[k]) {
                    *v += a * m;
                }
            }
        }

        SpectrumStack::new(self.width, self.height, samples, self.axis.clone(), data)
    }
}

fn inverse_sqrt_weight(sum: f64) -> f64 {
    if sum > 0.0 && sum.is_finite() {
        1.0 / sum.sqrt()
    } else {
        1.0
    }
}

/// Decompose the window of `stack` described by `options`.
///
/// On error the log is left as it was, including the background steps
/// recorded before the SVD ran.
pub fn decompose(
    stack: &SpectrumStack,
    options: &PcaOptions,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<PcaResult> {
    let mark = log.checkpoint();
    let result = run_decomposition(stack, options, progress, log);
    if result.is_err() {
        log.rollback(mark);
    }
    result
}

fn run_decomposition(
    stack: &SpectrumStack,
    options: &PcaOptions,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<PcaResult> {
    let window = options.window;
    window.validate(stack.channels())?;

    let source: Cow<SpectrumStack> = match &options.background {
        Some(bg) => {
            let fit = fit_background(stack, bg.model, bg.fit, &mut NoProgress, log)?;
            Cow::Owned(subtract_background(stack, &fit, &mut NoProgress, log)?)
        }
        None => Cow::Borrowed(stack),
    };

    let rows = window.len();
    let cols = stack.num_pixels();
    if rows * cols > SLOW_SVD_ELEMENTS {
        log::warn!(
            "SVD of a {}×{} matrix; this may take a long time",
            rows,
            cols
        );
    }

    let mut m = DMatrix::from_fn(rows, cols, |r, c| source.slice(window.start + r)[c]);
    if m.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::Svd("matrix contains non-finite values".into()));
    }
    progress.report(10);

    // Weights come from the data before centering, whose column sums vanish.
    let weights = if options.weighted {
        let row_w: Vec<f64> = m.row_iter().map(|r| inverse_sqrt_weight(r.sum())).collect();
        let col_w: Vec<f64> = m.column_iter().map(|c| inverse_sqrt_weight(c.sum())).collect();
        Some((row_w, col_w))
    } else {
        None
    };

    let column_means = if options.mean_center {
        let means: Vec<f64> = m.column_iter().map(|c| c.mean()).collect();
        for (mut col, mean) in m.column_iter_mut().zip(&means) {
            col.add_scalar_mut(-mean);
        }
        Some(means)
    } else {
        None
    };

    if let Some((row_w, col_w)) = &weights {
        for c in 0..cols {
            for r in 0..rows {
                m[(r, c)] *= row_w[r] * col_w[c];
            }
        }
    }
    progress.report(30);

    let svd = SVD::try_new(m, true, true, f64::EPSILON * 5.0, 0)
        .ok_or_else(|| AnalysisError::Svd("did not converge".into()))?;
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(AnalysisError::Svd("singular vectors unavailable".into())),
    };
    progress.report(90);

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

    let mut singular_values = Vec::with_capacity(order.len());
    let mut spectra = Vec::with_capacity(order.len());
    let mut maps = Vec::with_capacity(order.len());
    for &k in &order {
        singular_values.push(svd.singular_values[k]);
        let mut spectrum: Vec<f64> = u.column(k).iter().copied().collect();
        let mut map: Vec<f64> = v_t.row(k).iter().copied().collect();
        if let Some((row_w, col_w)) = &weights {
            for (s, w) in spectrum.iter_mut().zip(row_w) {
                *s /= w;
            }
            for (p, w) in map.iter_mut().zip(col_w) {
                *p /= w;
            }
        }
        spectra.push(spectrum);
        maps.push(map);
    }
    progress.report(100);

    let result = PcaResult {
        width: stack.width(),
        height: stack.height(),
        axis: stack.axis().shifted(window.start),
        window,
        singular_values,
        spectra,
        maps,
        column_means,
    };

    let op = ProcessingOp::Pca {
        options: options.clone(),
        filter: None,
    };
    log.add_entry(
        "PCA",
        &format!(
            "{}×{} matrix over channels [{}, {}){}{}, {} components, leading s={:.4e}",
            rows,
            cols,
            window.start,
            window.end,
            if options.mean_center { ", mean-centered" } else { "" },
            if options.weighted { ", weighted" } else { "" },
            result.n_components(),
            result.singular_values.first().copied().unwrap_or(0.0)
        ),
        &op.to_command(&log.source_file),
    );
    Ok(result)
}

/// Denoise the window of `stack` by keeping its first `n` components.
pub fn filter(
    stack: &SpectrumStack,
    options: &PcaOptions,
    n: usize,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<SpectrumStack> {
    let mark = log.checkpoint();
    let result = decompose(stack, options, progress, log)?;
    apply_filter(&result, options, n, log).inspect_err(|_| log.rollback(mark))
}

/// Rank-`n` reconstruction of an existing decomposition, logged as a filter.
pub fn apply_filter(
    result: &PcaResult,
    options: &PcaOptions,
    n: usize,
    log: &mut ReproLog,
) -> Result<SpectrumStack> {
    let filtered = result.reconstruct(n)?;
    let op = ProcessingOp::Pca {
        options: options.clone(),
        filter: Some(n),
    };
    log.add_entry(
        "PCA Filter",
        &format!(
            "Reconstructed channels [{}, {}) from {} of {} components",
            result.window.start,
            result.window.end,
            n.min(result.n_components()),
            result.n_components()
        ),
        &op.to_command(&log.source_file),
    );
    Ok(filtered)
}
