//! Two-parameter linear least squares.
//!
//! Columns are equilibrated to unit norm before the normal equations are
//! formed; the 2×2 system is solved by Cholesky. A rank-deficient or
//! non-finite system yields `None`.

use nalgebra::{Matrix2, Vector2};

/// Relative determinant below which the equilibrated system is singular.
const SINGULAR_TOL: f64 = 1e-12;

/// Solve `min ‖a·p + b·q − t‖²` for `(p, q)`.
pub fn solve2(a: &[f64], b: &[f64], t: &[f64]) -> Option<(f64, f64)> {
    debug_assert!(a.len() == b.len() && b.len() == t.len());

    let na = a.iter().map(|v| v * v).sum::<f64>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !(na > 0.0 && nb > 0.0 && na.is_finite() && nb.is_finite()) {
        return None;
    }

    let (mut s11, mut s12, mut s22, mut r1, mut r2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for ((&ai, &bi), &ti) in a.iter().zip(b).zip(t) {
        let (ai, bi) = (ai / na, bi / nb);
        s11 += ai * ai;
        s12 += ai * bi;
        s22 += bi * bi;
        r1 += ai * ti;
        r2 += bi * ti;
    }

    // Unit columns: det = 1 - cos²(angle between columns).
    let det = s11 * s22 - s12 * s12;
    if !(det > SINGULAR_TOL) {
        return None;
    }

    let ata = Matrix2::new(s11, s12, s12, s22);
    let sol = ata.cholesky()?.solve(&Vector2::new(r1, r2));
    let (p, q) = (sol[0] / na, sol[1] / nb);
    if p.is_finite() && q.is_finite() {
        Some((p, q))
    } else {
        None
    }
}

/// Solve `min ‖a·p − t‖²` for a single coefficient.
pub fn solve1(a: &[f64], t: &[f64]) -> Option<f64> {
    let aa: f64 = a.iter().map(|v| v * v).sum();
    if !(aa > 0.0) || !aa.is_finite() {
        return None;
    }
    let at: f64 = a.iter().zip(t).map(|(x, y)| x * y).sum();
    let p = at / aa;
    p.is_finite().then_some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let ones = [1.0; 4];
        let y: Vec<f64> = x.iter().map(|v| 3.0 - 0.5 * v).collect();
        let (p, q) = solve2(&ones, &x, &y).unwrap();
        assert!((p - 3.0).abs() < 1e-10);
        assert!((q + 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_collinear_columns_fail() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert!(solve2(&a, &b, &[1.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_single_sample_is_singular() {
        assert!(solve2(&[1.0], &[5.0], &[2.0]).is_none());
    }

    #[test]
    fn test_zero_column_fails() {
        assert!(solve2(&[0.0, 0.0], &[1.0, 2.0], &[1.0, 1.0]).is_none());
        assert!(solve1(&[0.0, 0.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_badly_scaled_columns() {
        // Columns differing by ~10 orders of magnitude still solve exactly.
        let x: Vec<f64> = (0..20).map(|i| 300.0 + 5.0 * i as f64).collect();
        let a: Vec<f64> = x.iter().map(|v| v.powf(-2.0)).collect();
        let b: Vec<f64> = x.iter().map(|v| v.powf(-4.0)).collect();
        let t: Vec<f64> = a.iter().zip(&b).map(|(p, q)| 4e6 * p + 2e11 * q).collect();
        let (p, q) = solve2(&a, &b, &t).unwrap();
        assert!((p / 4e6 - 1.0).abs() < 1e-6);
        assert!((q / 2e11 - 1.0).abs() < 1e-6);
    }
}
