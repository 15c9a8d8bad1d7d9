//! Unitary Fourier transform along the time axis
//!
//! Applied per pixel row of a row-partitioned image-time matrix, so the
//! transform is fully local to each worker. Both directions carry the
//! `1/sqrt(T)` unitary normalization, which makes the adjoint equal the
//! inverse.

use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{FftDirection, FftPlanner};

use crate::dist::{DistMatrix, Layout};
use crate::error::{ReconError, Result};

/// Forward temporal transform, in place.
pub fn temporal_fft(x: &mut DistMatrix<Complex64>) -> Result<()> {
    transform(x, FftDirection::Forward)
}

/// Adjoint (equals inverse) temporal transform, in place.
pub fn temporal_adjoint_fft(x: &mut DistMatrix<Complex64>) -> Result<()> {
    transform(x, FftDirection::Inverse)
}

fn transform(x: &mut DistMatrix<Complex64>, direction: FftDirection) -> Result<()> {
    if x.layout() != Layout::RowBlock {
        return Err(ReconError::NotAligned(
            "temporal transform requires the row-partitioned image x time layout".into(),
        ));
    }
    let t = x.width();
    if t == 0 {
        return Ok(());
    }
    let fft = FftPlanner::new().plan_fft(t, direction);
    let scale = 1.0 / (t as f64).sqrt();

    x.shards_mut().par_iter_mut().for_each(|shard| {
        let h_loc = shard.len() / t;
        let mut scratch = vec![Complex64::ZERO; fft.get_inplace_scratch_len()];
        let mut row = vec![Complex64::ZERO; t];
        for r in 0..h_loc {
            for ti in 0..t {
                row[ti] = shard[r + ti * h_loc];
            }
            fft.process_with_scratch(&mut row, &mut scratch);
            for ti in 0..t {
                shard[r + ti * h_loc] = row[ti] * scale;
            }
        }
    });
    Ok(())
}
