//! One-sided (Hestenes) Jacobi SVD, used when the faer decomposition of a
//! channel does not reproduce it.

use crate::Result;
use crate::error::CompressionError;
use faer_core::{Mat, MatRef};

const MAX_SWEEPS: usize = 64;
const TOLERANCE: f64 = 1e-12;

/// Thin SVD `mat = u * diag(s) * v^T`, accumulated in `f64`. Singular values are
/// not sorted.
pub fn thin_svd(mat: MatRef<'_, f32>) -> Result<(Mat<f32>, Vec<f32>, Mat<f32>)> {
    // work on the tall orientation so columns are the shorter side
    let transposed = mat.nrows() < mat.ncols();
    let a = if transposed { mat.transpose() } else { mat };
    let m = a.nrows();
    let n = a.ncols();

    let mut w = Mat::<f64>::from_fn(m, n, |i, j| f64::from(a.read(i, j)));
    let mut v = Mat::<f64>::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });

    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in p + 1..n {
                let (alpha, beta, gamma) = column_products(&w, p, q);
                if gamma == 0.0 || gamma.abs() <= TOLERANCE * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let sign = if zeta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;

                rotate_columns(&mut w, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }
        if !rotated {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(CompressionError::DecompositionFailure(format!(
            "Jacobi SVD of a {}x{} matrix did not converge in {} sweeps",
            mat.nrows(),
            mat.ncols(),
            MAX_SWEEPS
        )));
    }

    let sigma: Vec<f64> = (0..n)
        .map(|j| (0..m).map(|i| w.read(i, j).powi(2)).sum::<f64>().sqrt())
        .collect();
    let left = Mat::from_fn(m, n, |i, j| {
        if sigma[j] > 0.0 {
            (w.read(i, j) / sigma[j]) as f32
        } else {
            0.0
        }
    });
    let right = Mat::from_fn(n, n, |i, j| v.read(i, j) as f32);
    let s = sigma.iter().map(|&x| x as f32).collect();

    if transposed {
        Ok((right, s, left))
    } else {
        Ok((left, s, right))
    }
}

fn column_products(w: &Mat<f64>, p: usize, q: usize) -> (f64, f64, f64) {
    let mut alpha = 0.0;
    let mut beta = 0.0;
    let mut gamma = 0.0;
    for i in 0..w.nrows() {
        let x = w.read(i, p);
        let y = w.read(i, q);
        alpha += x * x;
        beta += y * y;
        gamma += x * y;
    }
    (alpha, beta, gamma)
}

/// Right-multiplies columns `p` and `q` by the rotation `[[c, s], [-s, c]]`.
fn rotate_columns(mat: &mut Mat<f64>, p: usize, q: usize, c: f64, s: f64) {
    for i in 0..mat.nrows() {
        let x = mat.read(i, p);
        let y = mat.read(i, q);
        mat.write(i, p, c * x - s * y);
        mat.write(i, q, s * x + c * y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruction_error(mat: &Mat<f32>, u: &Mat<f32>, s: &[f32], v: &Mat<f32>) -> f64 {
        let mut sum = 0.0;
        for i in 0..mat.nrows() {
            for j in 0..mat.ncols() {
                let approx: f64 = (0..s.len())
                    .map(|l| f64::from(u.read(i, l)) * f64::from(s[l]) * f64::from(v.read(j, l)))
                    .sum();
                sum += (approx - f64::from(mat.read(i, j))).powi(2);
            }
        }
        sum.sqrt()
    }

    #[test]
    fn reproduces_tall_and_wide_matrices() {
        for (m, n) in [(7, 4), (4, 7), (5, 5), (1, 6), (6, 1), (1, 1)] {
            let mat = Mat::from_fn(m, n, |i, j| ((i * 5 + j * 11 + i * j) % 13) as f32 * 19.0);
            let (u, s, v) = thin_svd(mat.as_ref()).unwrap();
            assert_eq!(s.len(), m.min(n));
            assert_eq!((u.nrows(), u.ncols()), (m, m.min(n)));
            assert_eq!((v.nrows(), v.ncols()), (n, m.min(n)));
            assert!(reconstruction_error(&mat, &u, &s, &v) < 1e-2, "{}x{}", m, n);
        }
    }

    #[test]
    fn reproduces_wide_matrix_with_zero_row() {
        let mat = Mat::from_fn(8, 10, |i, _| (i * 17) as f32);
        let (u, s, v) = thin_svd(mat.as_ref()).unwrap();
        assert!(reconstruction_error(&mat, &u, &s, &v) < 1e-2);

        let mut sorted = s.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        assert!(sorted[1] < 1e-3, "rank-one input, got {:?}", sorted);
    }

    #[test]
    fn right_factor_is_orthonormal() {
        let mat = Mat::from_fn(6, 4, |i, j| (i + 2 * j * j) as f32);
        let (_, _, v) = thin_svd(mat.as_ref()).unwrap();
        for a in 0..4 {
            for b in 0..4 {
                let dot: f32 = (0..4).map(|i| v.read(i, a) * v.read(i, b)).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-5);
            }
        }
    }
}
