//! Singular value thresholding for tall image-time matrices
//!
//! Shrinks every singular value by `lambda`, zeroing the ones below it.
//! The matrix is tall and skinny (pixels x timesteps), so the
//! factorization reduces to a timesteps-sized problem: either through a
//! two-stage tall-skinny QR (precision) or through the cross product
//! `A^H A` (speed). Both produce the singular values and right singular
//! vectors, and the thresholded result is applied as one local
//! multiplication per worker with `W = V * diag(shrink(sigma)/sigma) * V^H`.
//!
//! The cross-product reduction and the stacking of the per-worker R
//! factors are collectives; the final application is local.

use nalgebra::linalg::{SymmetricEigen, QR, SVD};
use nalgebra::DMatrix;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::dist::{DistMatrix, Layout};
use crate::error::{ReconError, Result};

/// How the tall-skinny singular value decomposition is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvtStrategy {
    /// Per-worker QR, a second QR of the stacked R factors, then an SVD of
    /// the final small R. Numerically the more robust path.
    TallSkinnyQr,
    /// Hermitian eigendecomposition of the collective cross product
    /// `A^H A`. Cheaper, squares the condition number.
    CrossProduct,
}

/// In-place singular value threshold of a row-partitioned tall matrix.
pub fn svt(a: &mut DistMatrix<Complex64>, lambda: f64, strategy: SvtStrategy) -> Result<()> {
    if a.layout() != Layout::RowBlock {
        return Err(ReconError::NotAligned(
            "singular value thresholding requires the row-partitioned layout".into(),
        ));
    }
    if !(lambda >= 0.0) {
        return Err(ReconError::InvalidParameter(format!(
            "singular value threshold {} must be non-negative",
            lambda
        )));
    }
    let t = a.width();
    if t == 0 || a.height() == 0 {
        return Ok(());
    }
    if a.height() < t {
        return Err(ReconError::ShapeMismatch(format!(
            "singular value thresholding expects a tall matrix, got {}x{}",
            a.height(),
            t
        )));
    }

    let (sigma, v) = match strategy {
        SvtStrategy::TallSkinnyQr => tall_skinny_factors(a)?,
        SvtStrategy::CrossProduct => cross_product_factors(a)?,
    };

    let shrink: Vec<f64> = sigma
        .iter()
        .map(|&s| if s > lambda { (s - lambda) / s } else { 0.0 })
        .collect();
    let diag = DMatrix::from_fn(t, t, |i, j| {
        if i == j {
            Complex64::new(shrink[i], 0.0)
        } else {
            Complex64::ZERO
        }
    });
    let w = &v * diag * v.adjoint();

    a.shards_mut().par_iter_mut().for_each(|shard| {
        let h_loc = shard.len() / t;
        if h_loc == 0 {
            return;
        }
        let local = DMatrix::from_column_slice(h_loc, t, shard);
        let updated = local * &w;
        shard.copy_from_slice(updated.as_slice());
    });
    Ok(())
}

/// Singular values and right singular vectors via per-worker QR followed
/// by a QR of the stacked R factors.
fn tall_skinny_factors(a: &DistMatrix<Complex64>) -> Result<(Vec<f64>, DMatrix<Complex64>)> {
    let t = a.width();
    let p = a.grid().num_workers();

    let mut factors = Vec::new();
    let mut stacked_rows = 0;
    for worker in 0..p {
        let shard = a.local(worker);
        let h_loc = shard.len() / t;
        if h_loc == 0 {
            continue;
        }
        let local = DMatrix::from_column_slice(h_loc, t, shard);
        let r = QR::new(local).r();
        stacked_rows += r.nrows();
        factors.push(r);
    }
    let mut stacked = DMatrix::<Complex64>::zeros(stacked_rows, t);
    let mut offset = 0;
    for r in factors {
        stacked
            .view_mut((offset, 0), (r.nrows(), t))
            .copy_from(&r);
        offset += r.nrows();
    }
    let reduced = QR::new(stacked).r();

    let svd = SVD::try_new(reduced, false, true, f64::EPSILON, 0).ok_or_else(|| {
        ReconError::Factorization("SVD of the reduced R factor did not converge".into())
    })?;
    let v_t = svd.v_t.ok_or_else(|| {
        ReconError::Factorization("SVD did not return right singular vectors".into())
    })?;
    let sigma = svd.singular_values.iter().copied().collect();
    Ok((sigma, v_t.adjoint()))
}

/// Singular values and right singular vectors from the Hermitian
/// eigendecomposition of the collective cross product `A^H A`.
fn cross_product_factors(a: &DistMatrix<Complex64>) -> Result<(Vec<f64>, DMatrix<Complex64>)> {
    let t = a.width();
    let p = a.grid().num_workers();

    let mut cross = DMatrix::<Complex64>::zeros(t, t);
    for worker in 0..p {
        let shard = a.local(worker);
        let h_loc = shard.len() / t;
        if h_loc == 0 {
            continue;
        }
        let local = DMatrix::from_column_slice(h_loc, t, shard);
        cross += local.adjoint() * local;
    }

    let eigen = SymmetricEigen::try_new(cross, f64::EPSILON, 0).ok_or_else(|| {
        ReconError::Factorization("eigendecomposition of the cross product did not converge".into())
    })?;
    // Rounding can push tiny eigenvalues slightly negative.
    let sigma = eigen
        .eigenvalues
        .iter()
        .map(|&l| l.max(0.0).sqrt())
        .collect();
    Ok((sigma, eigen.eigenvectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::WorkerGrid;

    fn sample(grid: WorkerGrid, h: usize, w: usize) -> DistMatrix<Complex64> {
        let data: Vec<Complex64> = (0..h * w)
            .map(|i| Complex64::new((i as f64 * 0.83).sin(), (i as f64 * 0.37).cos()))
            .collect();
        DistMatrix::from_global(grid, h, w, Layout::RowBlock, &data).unwrap()
    }

    fn max_abs_diff(a: &DistMatrix<Complex64>, b: &DistMatrix<Complex64>) -> f64 {
        a.to_global()
            .iter()
            .zip(b.to_global().iter())
            .map(|(x, y)| (x - y).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_zero_threshold_is_identity() {
        let grid = WorkerGrid::new(2).unwrap();
        for strategy in [SvtStrategy::TallSkinnyQr, SvtStrategy::CrossProduct] {
            let original = sample(grid, 12, 3);
            let mut a = original.clone();
            svt(&mut a, 0.0, strategy).unwrap();
            assert!(
                max_abs_diff(&a, &original) < 1e-10,
                "{:?} with lambda 0 must reproduce the input",
                strategy
            );
        }
    }

    #[test]
    fn test_threshold_above_spectrum_yields_zero() {
        let grid = WorkerGrid::new(2).unwrap();
        // Rank-1 matrix with largest singular value 0.5.
        let h = 10;
        let t = 3;
        let mut data = vec![Complex64::ZERO; h * t];
        for j in 0..t {
            for i in 0..h {
                let u = ((i + 1) as f64 / h as f64).sin();
                let v = ((j + 1) as f64).cos();
                data[i + j * h] = Complex64::new(u * v, 0.0);
            }
        }
        let norm: f64 = data.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        for z in data.iter_mut() {
            *z *= 0.5 / norm;
        }
        for strategy in [SvtStrategy::TallSkinnyQr, SvtStrategy::CrossProduct] {
            let mut a = DistMatrix::from_global(grid, h, t, Layout::RowBlock, &data).unwrap();
            svt(&mut a, 1.0, strategy).unwrap();
            assert!(
                a.frobenius_norm() < 1e-10,
                "{:?} must annihilate a matrix below the threshold",
                strategy
            );
        }
    }

    #[test]
    fn test_known_spectrum_shrinks_exactly() {
        // Columns scaled canonical basis vectors: singular values 3, 2, 1
        // with canonical singular vectors, so the thresholded matrix is
        // known in closed form.
        let grid = WorkerGrid::new(3).unwrap();
        let h = 9;
        let t = 3;
        let mut data = vec![Complex64::ZERO; h * t];
        data[0] = Complex64::new(3.0, 0.0); // (0,0)
        data[1 + h] = Complex64::new(2.0, 0.0); // (1,1)
        data[2 + 2 * h] = Complex64::new(1.0, 0.0); // (2,2)
        for strategy in [SvtStrategy::TallSkinnyQr, SvtStrategy::CrossProduct] {
            let mut a = DistMatrix::from_global(grid, h, t, Layout::RowBlock, &data).unwrap();
            svt(&mut a, 1.5, strategy).unwrap();
            let g = a.to_global();
            assert!((g[0] - Complex64::new(1.5, 0.0)).norm() < 1e-10, "{:?}", strategy);
            assert!((g[1 + h] - Complex64::new(0.5, 0.0)).norm() < 1e-10, "{:?}", strategy);
            assert!(g[2 + 2 * h].norm() < 1e-10, "{:?}", strategy);
            let off: f64 = g
                .iter()
                .enumerate()
                .filter(|(i, _)| ![0, 1 + h, 2 + 2 * h].contains(i))
                .map(|(_, z)| z.norm())
                .fold(0.0, f64::max);
            assert!(off < 1e-10, "{:?} must not leak off the singular axes", strategy);
        }
    }

    #[test]
    fn test_strategies_agree() {
        let grid = WorkerGrid::new(2).unwrap();
        let original = sample(grid, 16, 4);
        let mut qr_path = original.clone();
        let mut cross_path = original;
        svt(&mut qr_path, 0.3, SvtStrategy::TallSkinnyQr).unwrap();
        svt(&mut cross_path, 0.3, SvtStrategy::CrossProduct).unwrap();
        assert!(
            max_abs_diff(&qr_path, &cross_path) < 1e-8,
            "both strategies must produce the same thresholded matrix"
        );
    }

    #[test]
    fn test_wide_matrix_rejected() {
        let grid = WorkerGrid::new(2).unwrap();
        let mut a = DistMatrix::<Complex64>::zeros(grid, 3, 5, Layout::RowBlock);
        assert!(matches!(
            svt(&mut a, 0.1, SvtStrategy::CrossProduct),
            Err(ReconError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let grid = WorkerGrid::new(2).unwrap();
        let mut a = DistMatrix::<Complex64>::zeros(grid, 5, 2, Layout::RowBlock);
        assert!(matches!(
            svt(&mut a, -0.5, SvtStrategy::TallSkinnyQr),
            Err(ReconError::InvalidParameter(_))
        ));
    }
}
