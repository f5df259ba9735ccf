/// Background fitting, subtraction and window integration
///
/// Each stack operation validates its windows first, works pixel by pixel
/// (a row at a time, pixels of a row in parallel), reports progress and
/// records itself in the reproducibility log. Single-spectrum variants
/// share the same kernels, so 1D and stack results agree exactly.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::pca::PcaOptions;
use crate::data::{EnergyAxis, ImageMap, IndexWindow, IntegrationWindow, Spectrum1D, SpectrumStack};
use crate::error::{AnalysisError, Result};
use crate::fit::{lcpl_exponents, Basis, FitCoefficients, FitModel, LcplExponents};
use crate::log::reproducibility::ReproLog;
use crate::progress::{percent, Progress};

/// Processing operation descriptor (for logging and batch configs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProcessingOp {
    FitBackground {
        model: FitModel,
        fit: IndexWindow,
    },
    SubtractBackground {
        model: FitModel,
        fit: IndexWindow,
    },
    Integrate {
        model: FitModel,
        fit: IndexWindow,
        window: IntegrationWindow,
        hcm: bool,
    },
    Pca {
        options: PcaOptions,
        filter: Option<usize>,
    },
}

impl std::fmt::Display for ProcessingOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingOp::FitBackground { model, fit } => {
                write!(f, "Background Fit ({}, [{}, {}))", model, fit.start, fit.end)
            }
            ProcessingOp::SubtractBackground { model, fit } => {
                write!(f, "Background Subtraction ({}, [{}, {}))", model, fit.start, fit.end)
            }
            ProcessingOp::Integrate {
                window, hcm, ..
            } => {
                let kind = if *hcm { "HCM Integral" } else { "Integral" };
                write!(f, "{} [{}, {}]", kind, window.start, window.end)
            }
            ProcessingOp::Pca { options, filter } => {
                write!(f, "PCA [{}, {})", options.window.start, options.window.end)?;
                if let Some(n) = filter {
                    write!(f, " → filter to {} components", n)?;
                }
                Ok(())
            }
        }
    }
}

impl ProcessingOp {
    /// Equivalent `spim` invocation on `source`.
    pub fn to_command(&self, source: &str) -> String {
        let input = if source.is_empty() { "<input>" } else { source };
        match self {
            ProcessingOp::FitBackground { model, fit } => format!(
                "spim fit -i {} --model {} --fit {}:{}",
                input, model, fit.start, fit.end
            ),
            ProcessingOp::SubtractBackground { model, fit } => format!(
                "spim subtract -i {} --model {} --fit {}:{}",
                input, model, fit.start, fit.end
            ),
            ProcessingOp::Integrate {
                model,
                fit,
                window,
                hcm,
            } => format!(
                "spim integrate -i {} --model {} --fit {}:{} --window {}:{}{}",
                input,
                model,
                fit.start,
                fit.end,
                window.start,
                window.end,
                if *hcm { " --hcm" } else { "" }
            ),
            ProcessingOp::Pca { options, filter } => {
                let mut cmd = format!(
                    "spim pca -i {} --window {}:{}",
                    input, options.window.start, options.window.end
                );
                if options.mean_center {
                    cmd.push_str(" --mean-center");
                }
                if options.weighted {
                    cmd.push_str(" --weighted");
                }
                if let Some(bg) = &options.background {
                    cmd.push_str(&format!(
                        " --model {} --fit {}:{}",
                        bg.model, bg.fit.start, bg.fit.end
                    ));
                }
                if let Some(n) = filter {
                    cmd.push_str(&format!(" --filter {}", n));
                }
                cmd
            }
        }
    }
}

// =========================================================================
//  Single spectrum
// =========================================================================

/// Background fit of one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFit {
    pub basis: Basis,
    pub window: IndexWindow,
    pub coefficients: FitCoefficients,
}

impl SeriesFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.basis.evaluate(&self.coefficients, x)
    }

    pub fn curve(&self, axis: &EnergyAxis, n: usize) -> Vec<f64> {
        self.basis.curve(&self.coefficients, &axis.energies(n))
    }
}

/// Fit a background model to one spectrum over `fit`.
///
/// LCPL on a single spectrum has only one power-law exponent to draw from,
/// so it reduces to a plain power law unless that exponent is positive.
pub fn fit_spectrum(
    spectrum: &Spectrum1D,
    model: FitModel,
    fit: IndexWindow,
) -> Result<SeriesFit> {
    fit.validate(spectrum.len())?;
    let x: Vec<f64> = fit.range().map(|i| spectrum.axis.energy_at(i)).collect();
    let y = &spectrum.values[fit.range()];

    let basis = match Basis::simple(model) {
        Some(b) => b,
        None => {
            let exps: Vec<f64> = Basis::Power.try_fit(&x, y).map(|c| c.c1).into_iter().collect();
            Basis::lcpl(resolve_exponents(&exps))
        }
    };

    Ok(SeriesFit {
        basis,
        window: fit,
        coefficients: basis.fit(&x, y),
    })
}

/// Spectrum minus its fitted background; channels before the fit window are zero.
pub fn subtract_spectrum(spectrum: &Spectrum1D, fit: &SeriesFit) -> Spectrum1D {
    let values = spectrum
        .values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i < fit.window.start {
                0.0
            } else {
                v - fit.evaluate(spectrum.axis.energy_at(i))
            }
        })
        .collect();
    Spectrum1D::new(spectrum.axis.clone(), values)
}

/// Trapezoidal integral of the background-subtracted spectrum.
pub fn integrate_spectrum(
    spectrum: &Spectrum1D,
    fit: &SeriesFit,
    window: IntegrationWindow,
) -> Result<f64> {
    window.validate(spectrum.len())?;
    Ok(trapezoid_residual(&spectrum.values, window, |i| {
        fit.evaluate(spectrum.axis.energy_at(i))
    }))
}

/// Chi-square-like integral `Σ w·(signal − fit)² / signal`.
pub fn hcm_integrate_spectrum(
    spectrum: &Spectrum1D,
    fit: &SeriesFit,
    window: IntegrationWindow,
) -> Result<f64> {
    window.validate(spectrum.len())?;
    Ok(hcm_residual(&spectrum.values, window, |i| {
        fit.evaluate(spectrum.axis.energy_at(i))
    }))
}

// =========================================================================
//  Integration kernels
// =========================================================================

/// `signal` is indexed by absolute channel.
fn trapezoid_residual(
    signal: &[f64],
    window: IntegrationWindow,
    background: impl Fn(usize) -> f64,
) -> f64 {
    window
        .channels()
        .map(|i| window.weight(i) * (signal[i] - background(i)))
        .sum()
}

/// Channels with non-positive signal are skipped.
fn hcm_residual(
    signal: &[f64],
    window: IntegrationWindow,
    background: impl Fn(usize) -> f64,
) -> f64 {
    window
        .channels()
        .filter(|&i| signal[i] > 0.0)
        .map(|i| {
            let d = signal[i] - background(i);
            window.weight(i) * d * d / signal[i]
        })
        .sum()
}

// =========================================================================
//  Stack
// =========================================================================

/// Per-pixel background coefficients for a whole stack.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundFit {
    pub basis: Basis,
    pub window: IndexWindow,
    pub width: usize,
    pub height: usize,
    /// Row-major, one entry per pixel. Degenerate pixels hold zeros.
    pub coefficients: Vec<FitCoefficients>,
    /// Pixels whose least-squares system was singular.
    pub degenerate: usize,
}

impl BackgroundFit {
    pub fn evaluate(&self, pixel: usize, x: f64) -> f64 {
        self.basis.evaluate(&self.coefficients[pixel], x)
    }

    /// The fit of one pixel as a single-spectrum fit.
    pub fn series_fit(&self, pixel: usize) -> SeriesFit {
        SeriesFit {
            basis: self.basis,
            window: self.window,
            coefficients: self.coefficients[pixel],
        }
    }

    pub fn c0_map(&self) -> ImageMap {
        ImageMap::new(
            self.width,
            self.height,
            self.coefficients.iter().map(|c| c.c0).collect(),
        )
    }

    pub fn c1_map(&self) -> ImageMap {
        ImageMap::new(
            self.width,
            self.height,
            self.coefficients.iter().map(|c| c.c1).collect(),
        )
    }

    fn check_geometry(&self, stack: &SpectrumStack) -> Result<()> {
        if self.width != stack.width() || self.height != stack.height() {
            return Err(AnalysisError::LengthMismatch {
                expected: stack.num_pixels(),
                got: self.coefficients.len(),
            });
        }
        self.window.validate(stack.channels())
    }
}

/// Run `f` for every pixel, a row at a time with the row's pixels in parallel.
fn per_pixel<T, F>(width: usize, height: usize, progress: &mut dyn Progress, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let row: Vec<T> = (0..width)
            .into_par_iter()
            .map(|x| f(y * width + x))
            .collect();
        out.extend(row);
        progress.report(percent(y + 1, height));
    }
    out
}

fn window_values(stack: &SpectrumStack, pixel: usize, range: Range<usize>) -> Vec<f64> {
    range.map(|c| stack.slice(c)[pixel]).collect()
}

fn resolve_exponents(exponents: &[f64]) -> LcplExponents {
    lcpl_exponents(exponents).unwrap_or_else(|| {
        log::warn!("No pixel admits a power-law fit; LCPL falls back to a constant term");
        LcplExponents { r1: 0.0, r2: 0.0 }
    })
}

/// Fit the background model of every pixel over `fit`.
pub fn fit_background(
    stack: &SpectrumStack,
    model: FitModel,
    fit: IndexWindow,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<BackgroundFit> {
    fit.validate(stack.channels())?;
    let x: Vec<f64> = fit.range().map(|c| stack.axis().energy_at(c)).collect();

    let basis = match Basis::simple(model) {
        Some(b) => b,
        None => {
            let exps: Vec<f64> = per_pixel(stack.width(), stack.height(), &mut |_: u8| {}, |p| {
                Basis::Power
                    .try_fit(&x, &window_values(stack, p, fit.range()))
                    .map(|c| c.c1)
            })
            .into_iter()
            .flatten()
            .collect();
            let e = resolve_exponents(&exps);
            log::info!(
                "LCPL exponents from {} power-law fits: r1={:.4}, r2={:.4}",
                exps.len(),
                e.r1,
                e.r2
            );
            Basis::lcpl(e)
        }
    };

    let solved = per_pixel(stack.width(), stack.height(), progress, |p| {
        basis.try_fit(&x, &window_values(stack, p, fit.range()))
    });
    let degenerate = solved.iter().filter(|c| c.is_none()).count();
    let coefficients = solved.into_iter().map(Option::unwrap_or_default).collect();

    let result = BackgroundFit {
        basis,
        window: fit,
        width: stack.width(),
        height: stack.height(),
        coefficients,
        degenerate,
    };

    if degenerate > 0 {
        log::warn!("{} of {} pixels have a degenerate fit", degenerate, stack.num_pixels());
    }

    let op = ProcessingOp::FitBackground { model, fit };
    log.add_entry(
        "Background Fit",
        &format!(
            "{} over channels [{}, {}) ({:.3}–{:.3} {}), {} degenerate pixels",
            basis,
            fit.start,
            fit.end,
            stack.axis().energy_at(fit.start),
            stack.axis().energy_at(fit.end - 1),
            stack.axis().unit,
            degenerate
        ),
        &op.to_command(&log.source_file),
    );
    Ok(result)
}

/// Stack minus the fitted background from the fit window onward; earlier
/// channels are zero.
pub fn subtract_background(
    stack: &SpectrumStack,
    background: &BackgroundFit,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<SpectrumStack> {
    background.check_geometry(stack)?;
    let n = stack.num_pixels();
    let start = background.window.start;
    let mut out = SpectrumStack::zeros(
        stack.width(),
        stack.height(),
        stack.channels(),
        stack.axis().clone(),
    );

    let total = stack.channels() - start;
    for (c, slice) in out.data_mut().chunks_mut(n).enumerate().skip(start) {
        let x = stack.axis().energy_at(c);
        let src = stack.slice(c);
        slice
            .par_iter_mut()
            .enumerate()
            .for_each(|(p, v)| *v = src[p] - background.evaluate(p, x));
        progress.report(percent(c + 1 - start, total));
    }

    let op = ProcessingOp::SubtractBackground {
        model: background.basis.model(),
        fit: background.window,
    };
    log.add_entry(
        "Background Subtraction",
        &format!("Subtracted {} background from channel {} on", background.basis, start),
        &op.to_command(&log.source_file),
    );
    Ok(out)
}

fn integrate_map(
    stack: &SpectrumStack,
    background: &BackgroundFit,
    window: IntegrationWindow,
    hcm: bool,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<ImageMap> {
    background.check_geometry(stack)?;
    window.validate(stack.channels())?;

    let energies = stack.energies();
    let values = per_pixel(stack.width(), stack.height(), progress, |p| {
        // Only the window channels are read; the rest stay zero.
        let mut signal = vec![0.0; stack.channels()];
        for c in window.channels() {
            signal[c] = stack.slice(c)[p];
        }
        let bg = |i: usize| background.evaluate(p, energies[i]);
        if hcm {
            hcm_residual(&signal, window, bg)
        } else {
            trapezoid_residual(&signal, window, bg)
        }
    });
    let map = ImageMap::new(stack.width(), stack.height(), values);

    let op = ProcessingOp::Integrate {
        model: background.basis.model(),
        fit: background.window,
        window,
        hcm,
    };
    log.add_entry(
        if hcm { "HCM Integration" } else { "Integration" },
        &format!(
            "Channels [{}, {}] ({:.3}–{:.3} {}) over {} background, mean {:.4e}",
            window.start,
            window.end,
            energies[window.start],
            energies[window.end],
            stack.axis().unit,
            background.basis,
            map.mean()
        ),
        &op.to_command(&log.source_file),
    );
    Ok(map)
}

/// Integrated background-subtracted intensity per pixel.
pub fn integrate(
    stack: &SpectrumStack,
    background: &BackgroundFit,
    window: IntegrationWindow,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<ImageMap> {
    integrate_map(stack, background, window, false, progress, log)
}

/// HCM statistic per pixel.
pub fn hcm_integrate(
    stack: &SpectrumStack,
    background: &BackgroundFit,
    window: IntegrationWindow,
    progress: &mut dyn Progress,
    log: &mut ReproLog,
) -> Result<ImageMap> {
    integrate_map(stack, background, window, true, progress, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn flat_spectrum(n: usize, v: f64) -> Spectrum1D {
        Spectrum1D::new(EnergyAxis::new(0.0, 1.0, "eV"), vec![v; n])
    }

    /// Power-law background on every pixel with amplitude varying in x,
    /// plus a box signal of height `edge` from channel 30 on.
    fn edge_stack(edge: f64) -> SpectrumStack {
        let (w, h, n) = (4, 3, 50);
        let axis = EnergyAxis::new(100.0, 2.0, "eV");
        let mut s = SpectrumStack::zeros(w, h, n, axis.clone());
        for y in 0..h {
            for x in 0..w {
                let amp = 1e7 * (1.0 + x as f64 + 0.5 * y as f64);
                let series: Vec<f64> = (0..n)
                    .map(|c| {
                        let e = axis.energy_at(c);
                        amp * e.powf(-2.5) + if c >= 30 { edge } else { 0.0 }
                    })
                    .collect();
                s.set_series(y * w + x, &series);
            }
        }
        s
    }

    #[test]
    fn test_example_scenario() {
        let sp = flat_spectrum(5, 10.0);
        let fit = fit_spectrum(&sp, FitModel::Linear, IndexWindow::new(0, 5)).unwrap();
        assert!((fit.coefficients.c0 - 10.0).abs() < 1e-9);
        assert!(fit.coefficients.c1.abs() < 1e-9);
        let integral = integrate_spectrum(&sp, &fit, IntegrationWindow::new(1, 3)).unwrap();
        assert!(integral.abs() < 1e-9);
    }

    #[test]
    fn test_trapezoid_weights_endpoints_half() {
        let mut sp = flat_spectrum(6, 0.0);
        sp.values = vec![0.0, 2.0, 4.0, 4.0, 2.0, 0.0];
        let fit = SeriesFit {
            basis: Basis::Constant,
            window: IndexWindow::new(0, 1),
            coefficients: FitCoefficients::default(),
        };
        // 0.5*2 + 4 + 4 + 0.5*2
        let v = integrate_spectrum(&sp, &fit, IntegrationWindow::new(1, 4)).unwrap();
        assert!((v - 10.0).abs() < 1e-12);
        // Two-channel window has no interior.
        let v = integrate_spectrum(&sp, &fit, IntegrationWindow::new(1, 2)).unwrap();
        assert!((v - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_hcm_identical_is_exactly_zero() {
        let axis = EnergyAxis::new(1.0, 1.0, "eV");
        let values: Vec<f64> = (0..10).map(|i| (3.0 - 0.2 * (i as f64 + 1.0)).exp()).collect();
        let sp = Spectrum1D::new(axis, values.clone());
        let fit = fit_spectrum(&sp, FitModel::Constant, IndexWindow::new(0, 10)).unwrap();
        let signal = sp.values.clone();
        // Background identical to the signal at every channel.
        let v = hcm_residual(&signal, IntegrationWindow::new(2, 8), |i| values[i]);
        assert_eq!(v, 0.0);
        // And a non-trivial background gives a positive statistic.
        let v = hcm_integrate_spectrum(&sp, &fit, IntegrationWindow::new(2, 8)).unwrap();
        assert!(v > 0.0);
    }

    #[test]
    fn test_hcm_skips_nonpositive_signal() {
        let signal = [0.0, -1.0, 4.0, 0.0];
        let v = hcm_residual(&signal, IntegrationWindow::new(0, 3), |_| 2.0);
        // Only channel 2 (interior, weight 1): (4-2)^2/4
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_windows_rejected() {
        let sp = flat_spectrum(5, 1.0);
        assert!(matches!(
            fit_spectrum(&sp, FitModel::Linear, IndexWindow::new(2, 6)),
            Err(AnalysisError::InvalidWindow { kind: "fit", .. })
        ));
        let fit = fit_spectrum(&sp, FitModel::Linear, IndexWindow::new(0, 5)).unwrap();
        assert!(matches!(
            integrate_spectrum(&sp, &fit, IntegrationWindow::new(3, 5)),
            Err(AnalysisError::InvalidWindow {
                kind: "integration",
                ..
            })
        ));
    }

    #[test]
    fn test_subtract_spectrum_zeroes_pre_window() {
        let sp = Spectrum1D::new(EnergyAxis::default(), vec![5.0, 6.0, 7.0, 8.0, 9.0]);
        let fit = fit_spectrum(&sp, FitModel::Linear, IndexWindow::new(1, 4)).unwrap();
        let sub = subtract_spectrum(&sp, &fit);
        assert_eq!(sub.values[0], 0.0);
        for v in &sub.values[1..] {
            assert!(v.abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_spectrum_lcpl_is_power_law() {
        let axis = EnergyAxis::new(100.0, 1.0, "eV");
        let values: Vec<f64> = (0..40).map(|i| 2e6 * axis.energy_at(i).powf(-3.0)).collect();
        let sp = Spectrum1D::new(axis, values);
        let fit = fit_spectrum(&sp, FitModel::Lcpl, IndexWindow::new(0, 20)).unwrap();
        match fit.basis {
            Basis::PowerPair { r1, r2 } => {
                assert!((r1 + 3.0).abs() < 1e-8);
                assert_eq!(r1, r2);
            }
            other => panic!("unexpected basis {:?}", other),
        }
        let v = integrate_spectrum(&sp, &fit, IntegrationWindow::new(25, 35)).unwrap();
        assert!(v.abs() < 1e-6);
    }

    #[test]
    fn test_stack_power_fit_and_integration() {
        let s = edge_stack(3.0);
        let mut log = ReproLog::new();
        let bg = fit_background(&s, FitModel::Power, IndexWindow::new(5, 25), &mut NoProgress, &mut log)
            .unwrap();
        assert_eq!(bg.degenerate, 0);
        for c in &bg.coefficients {
            assert!((c.c1 + 2.5).abs() < 1e-8);
        }

        let map = integrate(&s, &bg, IntegrationWindow::new(32, 40), &mut NoProgress, &mut log)
            .unwrap();
        // 7 full-weight channels + 2 half-weight endpoints of height 3.
        for v in &map.values {
            assert!((v - 24.0).abs() < 1e-6, "integral {}", v);
        }
        assert_eq!(log.len(), 2);
        assert!(log.entries[1].command.contains("--window 32:40"));
    }

    #[test]
    fn test_stack_and_single_spectrum_agree() {
        let s = edge_stack(5.0);
        let mut log = ReproLog::new();
        let fit = IndexWindow::new(2, 28);
        let window = IntegrationWindow::new(29, 45);
        let bg = fit_background(&s, FitModel::Exponential, fit, &mut NoProgress, &mut log).unwrap();
        let map = integrate(&s, &bg, window, &mut NoProgress, &mut log).unwrap();
        let hcm = hcm_integrate(&s, &bg, window, &mut NoProgress, &mut log).unwrap();

        let pixel = 2 * s.width() + 1;
        let sp = Spectrum1D::new(s.axis().clone(), s.series(pixel));
        let single = fit_spectrum(&sp, FitModel::Exponential, fit).unwrap();
        assert_eq!(single.coefficients, bg.coefficients[pixel]);
        let v = integrate_spectrum(&sp, &single, window).unwrap();
        assert!((v - map.values[pixel]).abs() < 1e-9);
        let v = hcm_integrate_spectrum(&sp, &single, window).unwrap();
        assert!((v - hcm.values[pixel]).abs() < 1e-9);
    }

    #[test]
    fn test_stack_subtraction() {
        let s = edge_stack(0.0);
        let mut log = ReproLog::new();
        let bg = fit_background(&s, FitModel::Power, IndexWindow::new(10, 40), &mut NoProgress, &mut log)
            .unwrap();
        let sub = subtract_background(&s, &bg, &mut NoProgress, &mut log).unwrap();
        for c in 0..s.channels() {
            for &v in sub.slice(c) {
                if c < 10 {
                    assert_eq!(v, 0.0);
                } else {
                    assert!(v.abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_stack_lcpl_exponents_ordered() {
        // Mix of two power laws whose ratio varies across pixels.
        let (w, h, n) = (5, 2, 60);
        let axis = EnergyAxis::new(50.0, 1.0, "eV");
        let mut s = SpectrumStack::zeros(w, h, n, axis.clone());
        for p in 0..w * h {
            let mix = p as f64 / (w * h) as f64;
            let series: Vec<f64> = (0..n)
                .map(|c| {
                    let e = axis.energy_at(c);
                    1e5 * (1.0 - mix) * e.powf(-2.0) + 1e8 * mix * e.powf(-4.0)
                })
                .collect();
            s.set_series(p, &series);
        }
        let mut log = ReproLog::new();
        let bg = fit_background(&s, FitModel::Lcpl, IndexWindow::new(0, 40), &mut NoProgress, &mut log)
            .unwrap();
        match bg.basis {
            Basis::PowerPair { r1, r2 } => {
                assert!(r1 >= r2);
                assert!(r2 <= 0.0);
            }
            other => panic!("unexpected basis {:?}", other),
        }
        assert_eq!(bg.c0_map().values.len(), w * h);
    }

    #[test]
    fn test_progress_reaches_100() {
        let s = edge_stack(1.0);
        let mut last = 0u8;
        let mut log = ReproLog::new();
        fit_background(
            &s,
            FitModel::Linear,
            IndexWindow::new(0, 10),
            &mut |p: u8| last = p,
            &mut log,
        )
        .unwrap();
        assert_eq!(last, 100);
    }

    #[test]
    fn test_zero_pixels_are_not_degenerate() {
        let s = SpectrumStack::zeros(3, 2, 12, EnergyAxis::new(10.0, 1.0, "eV"));
        let mut log = ReproLog::new();
        let bg = fit_background(&s, FitModel::Linear, IndexWindow::new(0, 8), &mut NoProgress, &mut log)
            .unwrap();
        assert!(bg.coefficients.iter().all(|c| *c == FitCoefficients::default()));
        assert_eq!(bg.degenerate, 0);

        // A one-channel window cannot determine a line anywhere.
        let bg = fit_background(&s, FitModel::Linear, IndexWindow::new(3, 4), &mut NoProgress, &mut log)
            .unwrap();
        assert_eq!(bg.degenerate, 6);
    }

    #[test]
    fn test_subtraction_reports_each_slice() {
        let s = edge_stack(0.0);
        let mut log = ReproLog::new();
        let bg = fit_background(&s, FitModel::Power, IndexWindow::new(10, 40), &mut NoProgress, &mut log)
            .unwrap();
        let mut reports = Vec::new();
        subtract_background(&s, &bg, &mut |p: u8| reports.push(p), &mut log).unwrap();
        // One report per channel from the fit start on.
        assert_eq!(reports.len(), 40);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(reports.last(), Some(&100));
    }

    #[test]
    fn test_geometry_mismatch() {
        let s = edge_stack(1.0);
        let mut log = ReproLog::new();
        let mut bg = fit_background(&s, FitModel::Linear, IndexWindow::new(0, 10), &mut NoProgress, &mut log)
            .unwrap();
        bg.width = 2;
        assert!(subtract_background(&s, &bg, &mut NoProgress, &mut log).is_err());
    }

    #[test]
    fn test_op_commands() {
        let op = ProcessingOp::Integrate {
            model: FitModel::Power,
            fit: IndexWindow::new(3, 9),
            window: IntegrationWindow::new(10, 20),
            hcm: true,
        };
        assert_eq!(
            op.to_command("a.spim"),
            "spim integrate -i a.spim --model power --fit 3:9 --window 10:20 --hcm"
        );
        assert_eq!(op.to_string(), "HCM Integral [10, 20]");
    }
}
