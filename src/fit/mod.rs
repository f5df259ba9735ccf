//! Background-fit strategies.
//!
//! Every strategy is a linear least-squares problem after a transform of
//! the data: `fy(y) ≈ c0·g0(fx(x)) + c1·g1(fx(x))`. The transform pair and
//! the inverse used to evaluate the fitted curve fully describe a model.
//!
//! | model        | fx      | fy      | curve                   |
//! |--------------|---------|---------|-------------------------|
//! | Constant     | x       | y       | c0                      |
//! | Linear       | x       | y       | c0 + c1·x               |
//! | Exponential  | x       | ln y    | exp(c0 + c1·x)          |
//! | Power        | ln x    | ln y    | exp(c0 + c1·ln x)       |
//! | LCPL         | x       | y       | c0·x^r1 + c1·x^r2       |
//!
//! Logarithms are taken of `max(v, 1e-3)`.

pub mod lcpl;
pub mod lstsq;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use lcpl::{lcpl_exponents, LcplExponents};

/// Floor applied before taking logarithms.
pub const LOG_FLOOR: f64 = 1e-3;

#[inline]
fn floored_ln(v: f64) -> f64 {
    v.max(LOG_FLOOR).ln()
}

/// Background model chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitModel {
    Constant,
    Linear,
    Exponential,
    Power,
    /// Linear combination of two power laws.
    Lcpl,
}

impl FitModel {
    pub const ALL: [FitModel; 5] = [
        FitModel::Constant,
        FitModel::Linear,
        FitModel::Exponential,
        FitModel::Power,
        FitModel::Lcpl,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FitModel::Constant => "constant",
            FitModel::Linear => "linear",
            FitModel::Exponential => "exponential",
            FitModel::Power => "power",
            FitModel::Lcpl => "lcpl",
        }
    }
}

impl fmt::Display for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FitModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        FitModel::ALL
            .iter()
            .copied()
            .find(|m| m.name() == lower)
            .or(match lower.as_str() {
                "const" => Some(FitModel::Constant),
                "exp" => Some(FitModel::Exponential),
                "pow" | "powerlaw" => Some(FitModel::Power),
                _ => None,
            })
            .ok_or_else(|| {
                format!(
                    "unknown fit model '{}' (expected one of constant, linear, exponential, power, lcpl)",
                    s
                )
            })
    }
}

/// Fitted coefficients for one series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitCoefficients {
    pub c0: f64,
    pub c1: f64,
}

impl FitCoefficients {
    pub fn new(c0: f64, c1: f64) -> Self {
        Self { c0, c1 }
    }
}

/// A model resolved to concrete basis functions, ready to fit and evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Basis {
    Constant,
    Linear,
    Exponential,
    Power,
    PowerPair { r1: f64, r2: f64 },
}

impl Basis {
    /// Basis for every model except LCPL, whose exponents depend on data.
    pub fn simple(model: FitModel) -> Option<Self> {
        match model {
            FitModel::Constant => Some(Basis::Constant),
            FitModel::Linear => Some(Basis::Linear),
            FitModel::Exponential => Some(Basis::Exponential),
            FitModel::Power => Some(Basis::Power),
            FitModel::Lcpl => None,
        }
    }

    pub fn lcpl(exponents: LcplExponents) -> Self {
        Basis::PowerPair {
            r1: exponents.r1,
            r2: exponents.r2,
        }
    }

    pub fn model(&self) -> FitModel {
        match self {
            Basis::Constant => FitModel::Constant,
            Basis::Linear => FitModel::Linear,
            Basis::Exponential => FitModel::Exponential,
            Basis::Power => FitModel::Power,
            Basis::PowerPair { .. } => FitModel::Lcpl,
        }
    }

    /// Transform applied to the energy axis before solving.
    pub fn fx(&self, x: f64) -> f64 {
        match self {
            Basis::Power => floored_ln(x),
            _ => x,
        }
    }

    /// Transform applied to the data before solving.
    pub fn fy(&self, y: f64) -> f64 {
        match self {
            Basis::Exponential | Basis::Power => floored_ln(y),
            _ => y,
        }
    }

    /// The fitted curve at `x`.
    pub fn evaluate(&self, c: &FitCoefficients, x: f64) -> f64 {
        match *self {
            Basis::Constant => c.c0,
            Basis::Linear => c.c0 + c.c1 * x,
            Basis::Exponential => (c.c0 + c.c1 * x).exp(),
            Basis::Power => (c.c0 + c.c1 * floored_ln(x)).exp(),
            Basis::PowerPair { r1, r2 } => {
                let x = x.max(LOG_FLOOR);
                c.c0 * x.powf(r1) + c.c1 * x.powf(r2)
            }
        }
    }

    /// The fitted curve over a set of energies.
    pub fn curve(&self, c: &FitCoefficients, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(c, x)).collect()
    }

    /// Least-squares fit; `None` when the system is singular.
    pub fn try_fit(&self, x: &[f64], y: &[f64]) -> Option<FitCoefficients> {
        let n = x.len().min(y.len());
        if n == 0 {
            return None;
        }
        let (x, y) = (&x[..n], &y[..n]);

        match *self {
            Basis::Constant => {
                let mean = y.iter().sum::<f64>() / n as f64;
                mean.is_finite().then(|| FitCoefficients::new(mean, mean))
            }
            Basis::Linear | Basis::Exponential | Basis::Power => {
                let ones = vec![1.0; n];
                let fx: Vec<f64> = x.iter().map(|&v| self.fx(v)).collect();
                let fy: Vec<f64> = y.iter().map(|&v| self.fy(v)).collect();
                lstsq::solve2(&ones, &fx, &fy).map(|(c0, c1)| FitCoefficients::new(c0, c1))
            }
            Basis::PowerPair { r1, r2 } => {
                let g1: Vec<f64> = x.iter().map(|&v| v.max(LOG_FLOOR).powf(r1)).collect();
                if r1 == r2 {
                    return lstsq::solve1(&g1, y).map(|c0| FitCoefficients::new(c0, 0.0));
                }
                let g2: Vec<f64> = x.iter().map(|&v| v.max(LOG_FLOOR).powf(r2)).collect();
                lstsq::solve2(&g1, &g2, y).map(|(c0, c1)| FitCoefficients::new(c0, c1))
            }
        }
    }

    /// Least-squares fit; a singular system yields zero coefficients.
    pub fn fit(&self, x: &[f64], y: &[f64]) -> FitCoefficients {
        self.try_fit(x, y).unwrap_or_default()
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::PowerPair { r1, r2 } => write!(f, "lcpl (r1={:.3}, r2={:.3})", r1, r2),
            other => write!(f, "{}", other.model()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    fn close(a: f64, b: f64, rel: f64) -> bool {
        (a - b).abs() <= rel * b.abs().max(1.0)
    }

    #[test]
    fn test_model_names_parse() {
        for m in FitModel::ALL {
            assert_eq!(m.name().parse::<FitModel>().unwrap(), m);
        }
        assert_eq!("Exp".parse::<FitModel>().unwrap(), FitModel::Exponential);
        assert!("quadratic".parse::<FitModel>().is_err());
    }

    #[test]
    fn test_model_serde_lowercase() {
        let json = serde_json::to_string(&FitModel::Lcpl).unwrap();
        assert_eq!(json, "\"lcpl\"");
        let m: FitModel = serde_json::from_str("\"power\"").unwrap();
        assert_eq!(m, FitModel::Power);
    }

    #[test]
    fn test_linear_example_scenario() {
        let x = axis(0.0, 1.0, 5);
        let y = vec![10.0; 5];
        let c = Basis::Linear.fit(&x, &y);
        assert!((c.c0 - 10.0).abs() < 1e-9);
        assert!(c.c1.abs() < 1e-9);
    }

    #[test]
    fn test_constant_replicates_mean() {
        let x = axis(0.0, 1.0, 4);
        let c = Basis::Constant.fit(&x, &[7.5; 4]);
        assert_eq!(c.c0, c.c1);
        assert!((c.c0 - 7.5).abs() < 1e-12);

        let c = Basis::Constant.fit(&x, &[1.0, 2.0, 3.0, 6.0]);
        assert_eq!(c, FitCoefficients::new(3.0, 3.0));
        assert_eq!(Basis::Constant.evaluate(&c, 100.0), 3.0);
    }

    #[test]
    fn test_exponential_reconstructs_endpoints() {
        let x = axis(1.0, 0.25, 12);
        let y: Vec<f64> = x.iter().map(|v| (4.0 - 0.3 * v).exp()).collect();
        let (s, e) = (2, 10);
        let c = Basis::Exponential.fit(&x[s..e], &y[s..e]);
        assert!(close(c.c0, 4.0, 1e-9));
        assert!(close(c.c1, -0.3, 1e-9));
        assert!(close(Basis::Exponential.evaluate(&c, x[s]), y[s], 1e-9));
        assert!(close(Basis::Exponential.evaluate(&c, x[e - 1]), y[e - 1], 1e-9));
    }

    #[test]
    fn test_power_reconstructs_endpoints() {
        let x = axis(200.0, 2.0, 40);
        let y: Vec<f64> = x.iter().map(|v| 5e9 * v.powf(-3.2)).collect();
        let (s, e) = (5, 30);
        let c = Basis::Power.fit(&x[s..e], &y[s..e]);
        assert!(close(c.c1, -3.2, 1e-9));
        assert!(close(Basis::Power.evaluate(&c, x[s]), y[s], 1e-8));
        assert!(close(Basis::Power.evaluate(&c, x[e - 1]), y[e - 1], 1e-8));
    }

    #[test]
    fn test_power_pair_reconstructs_endpoints() {
        let basis = Basis::PowerPair { r1: -2.0, r2: -4.0 };
        let x = axis(50.0, 1.0, 30);
        let truth = FitCoefficients::new(3e4, 2e7);
        let y = basis.curve(&truth, &x);
        let c = basis.fit(&x, &y);
        assert!(close(c.c0, truth.c0, 1e-6));
        assert!(close(c.c1, truth.c1, 1e-6));
        assert!(close(basis.evaluate(&c, x[0]), y[0], 1e-9));
        assert!(close(basis.evaluate(&c, x[29]), y[29], 1e-9));
    }

    #[test]
    fn test_equal_exponents_collapse_to_single_term() {
        let basis = Basis::PowerPair { r1: -1.5, r2: -1.5 };
        let x = axis(10.0, 1.0, 8);
        let y: Vec<f64> = x.iter().map(|v| 40.0 * v.powf(-1.5)).collect();
        let c = basis.fit(&x, &y);
        assert!(close(c.c0, 40.0, 1e-9));
        assert_eq!(c.c1, 0.0);
    }

    #[test]
    fn test_singular_fit_returns_zero() {
        // One sample cannot determine a line.
        let c = Basis::Linear.fit(&[3.0], &[1.0]);
        assert_eq!(c, FitCoefficients::default());
        // Constant energies make the design matrix rank one.
        let c = Basis::Exponential.fit(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]);
        assert_eq!(c, FitCoefficients::default());
        assert!(Basis::Linear.try_fit(&[], &[]).is_none());
    }

    #[test]
    fn test_log_floor_on_nonpositive_data() {
        let x = axis(1.0, 1.0, 4);
        let y = [0.0, -5.0, 0.0, -1.0];
        let c = Basis::Exponential.fit(&x, &y);
        assert!((c.c0 - LOG_FLOOR.ln()).abs() < 1e-9);
        assert!(c.c1.abs() < 1e-9);
    }
}
