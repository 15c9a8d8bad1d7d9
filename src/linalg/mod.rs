//! Elementary kernels over distributed matrices
//!
//! Elementwise updates are purely local; every operand pair is checked
//! for alignment first. The singular-value and temporal-transform kernels
//! live in their own submodules.

use num_complex::Complex64;

use crate::dist::DistMatrix;
use crate::error::Result;

mod svt;
mod temporal;

pub use svt::{svt, SvtStrategy};
pub use temporal::{temporal_adjoint_fft, temporal_fft};

/// `y += alpha * x`, elementwise over aligned operands.
pub fn axpy(alpha: Complex64, x: &DistMatrix<Complex64>, y: &mut DistMatrix<Complex64>) -> Result<()> {
    x.require_aligned(y, "axpy")?;
    for (xs, ys) in x.shards().iter().zip(y.shards_mut()) {
        for (xv, yv) in xs.iter().zip(ys.iter_mut()) {
            *yv += alpha * xv;
        }
    }
    Ok(())
}

/// `x *= alpha`, elementwise.
pub fn scale(alpha: Complex64, x: &mut DistMatrix<Complex64>) {
    for shard in x.shards_mut() {
        for v in shard.iter_mut() {
            *v *= alpha;
        }
    }
}

/// Elementwise soft threshold: magnitudes shrink by `lambda`, phases are
/// preserved, entries at or below the threshold become zero.
pub fn soft_threshold(x: &mut DistMatrix<Complex64>, lambda: f64) {
    for shard in x.shards_mut() {
        for v in shard.iter_mut() {
            let mag = v.norm();
            if mag <= lambda {
                *v = Complex64::ZERO;
            } else {
                *v *= (mag - lambda) / mag;
            }
        }
    }
}
