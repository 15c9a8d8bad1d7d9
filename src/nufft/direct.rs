//! Brute-force evaluation of the non-uniform 2-D Fourier transform
//!
//! Evaluates the defining double sum over the `N0 x N1` uniform frequency
//! grid for every non-uniform sample, with no interpolation. This is the
//! oracle the gridding path is validated against.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::{ReconError, Result};

/// Exact forward transform: uniform-grid coefficients to non-uniform samples.
///
/// # Arguments
/// * `coords` - Interleaved `(x0, x1)` sample coordinates, length `2*M`
/// * `n0`, `n1` - Band limits (must be even and positive)
/// * `f_hat` - Row-major frequency coefficients, `f_hat[k1 + k0*n1]`,
///   length `n0*n1`
/// * `f` - Output samples, length `M`
pub fn direct_forward(
    coords: &[f64],
    n0: usize,
    n1: usize,
    f_hat: &[Complex64],
    f: &mut [Complex64],
) -> Result<()> {
    check_shapes(coords, n0, n1, f_hat.len(), f.len())?;
    let m = coords.len() / 2;
    let half0 = (n0 / 2) as f64;
    let half1 = (n1 / 2) as f64;
    for xi in 0..m {
        let x0 = coords[2 * xi];
        let x1 = coords[2 * xi + 1];
        let mut acc = Complex64::ZERO;
        for ki in 0..n0 {
            let k0 = ki as f64 - half0;
            for kj in 0..n1 {
                let k1 = kj as f64 - half1;
                let theta = -2.0 * PI * (x0 * k0 + x1 * k1);
                acc += Complex64::new(theta.cos(), theta.sin()) * f_hat[kj + ki * n1];
            }
        }
        f[xi] = acc;
    }
    Ok(())
}

/// Exact adjoint transform: non-uniform samples to uniform-grid coefficients.
///
/// Conjugate transpose of [`direct_forward`]; the phase sign flips.
pub fn direct_adjoint(
    coords: &[f64],
    n0: usize,
    n1: usize,
    f: &[Complex64],
    f_hat: &mut [Complex64],
) -> Result<()> {
    check_shapes(coords, n0, n1, f_hat.len(), f.len())?;
    let m = coords.len() / 2;
    let half0 = (n0 / 2) as f64;
    let half1 = (n1 / 2) as f64;
    for v in f_hat.iter_mut() {
        *v = Complex64::ZERO;
    }
    for xi in 0..m {
        let x0 = coords[2 * xi];
        let x1 = coords[2 * xi + 1];
        let sample = f[xi];
        for ki in 0..n0 {
            let k0 = ki as f64 - half0;
            for kj in 0..n1 {
                let k1 = kj as f64 - half1;
                let theta = 2.0 * PI * (x0 * k0 + x1 * k1);
                f_hat[kj + ki * n1] += Complex64::new(theta.cos(), theta.sin()) * sample;
            }
        }
    }
    Ok(())
}

fn check_shapes(
    coords: &[f64],
    n0: usize,
    n1: usize,
    f_hat_len: usize,
    f_len: usize,
) -> Result<()> {
    if n0 == 0 || n1 == 0 || n0 % 2 != 0 || n1 % 2 != 0 {
        return Err(ReconError::InvalidBandwidth { n0, n1 });
    }
    if coords.len() % 2 != 0 || coords.is_empty() {
        return Err(ReconError::ShapeMismatch(format!(
            "coordinate buffer length {} is not a positive multiple of 2",
            coords.len()
        )));
    }
    if f_hat_len != n0 * n1 {
        return Err(ReconError::ShapeMismatch(format!(
            "frequency buffer holds {} coefficients, band limits give {}",
            f_hat_len,
            n0 * n1
        )));
    }
    if f_len != coords.len() / 2 {
        return Err(ReconError::ShapeMismatch(format!(
            "sample buffer holds {} values, trajectory has {}",
            f_len,
            coords.len() / 2
        )));
    }
    Ok(())
}
