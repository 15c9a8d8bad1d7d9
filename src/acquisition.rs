//! Forward and adjoint acquisition operator
//!
//! Maps an image-domain time series to measured multi-coil k-space data
//! and back. The forward direction scatters each timestep's image to
//! every coil column, scales by the coil sensitivity profiles, and runs
//! the per-column non-uniform transform; the adjoint reverses the three
//! steps in reverse order. Both directions are pure in their inputs plus
//! the injected coil plans and sensitivity map.
//!
//! The scatter/gather redistribution moves a full redundant copy of the
//! image per coil and dominates communication cost.
//! TODO: compress the scatter by broadcasting one copy per timestep and
//! duplicating on the receiving side.

use num_complex::Complex64;
use std::time::Instant;
use tracing::debug;

use crate::coils::CoilPlans;
use crate::dist::{DistMatrix, Layout};
use crate::error::{ReconError, Result};
use crate::nufft::TransformKind;

/// Replicated per-coil spatial sensitivity profiles, `height x num_coils`,
/// column-major.
pub struct SensitivityMap {
    height: usize,
    num_coils: usize,
    data: Vec<Complex64>,
}

impl SensitivityMap {
    pub fn new(height: usize, num_coils: usize, data: Vec<Complex64>) -> Result<Self> {
        if height == 0 || num_coils == 0 || data.len() != height * num_coils {
            return Err(ReconError::ShapeMismatch(format!(
                "sensitivity buffer holds {} entries, shape is {}x{}",
                data.len(),
                height,
                num_coils
            )));
        }
        Ok(Self {
            height,
            num_coils,
            data,
        })
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn num_coils(&self) -> usize {
        self.num_coils
    }

    /// Sensitivity profile of one coil.
    #[inline]
    pub fn coil(&self, coil: usize) -> &[Complex64] {
        &self.data[coil * self.height..(coil + 1) * self.height]
    }
}

/// The acquisition operator `E` and its adjoint `E^H`.
pub struct Acquisition<'a> {
    plans: &'a CoilPlans,
    sensitivity: &'a SensitivityMap,
    kind: TransformKind,
}

impl<'a> Acquisition<'a> {
    pub fn new(plans: &'a CoilPlans, sensitivity: &'a SensitivityMap) -> Result<Self> {
        let pixels = plans.first_bandwidth() * plans.second_bandwidth();
        if sensitivity.height() != pixels {
            return Err(ReconError::ShapeMismatch(format!(
                "sensitivity height {} does not match the {} image pixels",
                sensitivity.height(),
                pixels
            )));
        }
        if sensitivity.num_coils() != plans.num_coils() {
            return Err(ReconError::ShapeMismatch(format!(
                "sensitivity has {} coils, plans have {}",
                sensitivity.num_coils(),
                plans.num_coils()
            )));
        }
        Ok(Self {
            plans,
            sensitivity,
            kind: TransformKind::Fast,
        })
    }

    /// Select the transform implementation; tests swap in the exact one.
    pub fn with_transform_kind(mut self, kind: TransformKind) -> Self {
        self.kind = kind;
        self
    }

    /// Image sequence (`n0*n1 x numTimesteps`, row-partitioned) to k-space
    /// data (`M x numCoils*numTimesteps`, column-distributed).
    pub fn forward(&self, images: &DistMatrix<Complex64>) -> Result<DistMatrix<Complex64>> {
        self.check_images(images)?;
        let start = Instant::now();
        let mut scattered = self.scatter(images);
        let scatter_time = start.elapsed();

        let start = Instant::now();
        self.scale_by_sensitivities(&mut scattered, false);
        let scale_time = start.elapsed();

        let start = Instant::now();
        let kspace = self.plans.forward(&scattered, self.kind)?;
        let transform_time = start.elapsed();

        debug!(
            scatter_s = scatter_time.as_secs_f64(),
            scale_s = scale_time.as_secs_f64(),
            transform_s = transform_time.as_secs_f64(),
            "acquisition forward"
        );
        Ok(kspace)
    }

    /// Adjoint: k-space data back to an image sequence. Conjugate
    /// transpose of [`forward`](Acquisition::forward): adjoint transform,
    /// conjugate sensitivity scale, then a sum over the coil columns of
    /// each timestep.
    pub fn adjoint(&self, kspace: &DistMatrix<Complex64>) -> Result<DistMatrix<Complex64>> {
        self.check_kspace(kspace)?;
        let start = Instant::now();
        let mut f_hat = self.plans.adjoint(kspace, self.kind)?;
        let transform_time = start.elapsed();

        let start = Instant::now();
        self.scale_by_sensitivities(&mut f_hat, true);
        let scale_time = start.elapsed();

        let start = Instant::now();
        let images = self.gather(&f_hat);
        let gather_time = start.elapsed();

        debug!(
            transform_s = transform_time.as_secs_f64(),
            scale_s = scale_time.as_secs_f64(),
            gather_s = gather_time.as_secs_f64(),
            "acquisition adjoint"
        );
        Ok(images)
    }

    #[inline]
    pub fn transform_kind(&self) -> TransformKind {
        self.kind
    }

    /// Duplicate every timestep column across the coil axis, locally, then
    /// redistribute so each (coil, timestep) column lands whole on its
    /// owning worker.
    fn scatter(&self, images: &DistMatrix<Complex64>) -> DistMatrix<Complex64> {
        let nc = self.plans.num_coils();
        let nt = self.plans.num_timesteps();
        let grid = images.grid();
        let mut expanded =
            DistMatrix::zeros(grid, images.height(), nc * nt, Layout::RowBlock);
        for w in 0..grid.num_workers() {
            let (_, h_loc) = images.row_block(w);
            let src = images.local(w);
            let dst = expanded.local_mut(w);
            for t in 0..nt {
                let col = &src[t * h_loc..(t + 1) * h_loc];
                for c in 0..nc {
                    let j = c + t * nc;
                    dst[j * h_loc..(j + 1) * h_loc].copy_from_slice(col);
                }
            }
        }
        expanded.redistribute(Layout::ColCyclic)
    }

    /// Dual of `scatter`: redistribute back to row blocks and sum the coil
    /// columns of each timestep.
    fn gather(&self, f_hat: &DistMatrix<Complex64>) -> DistMatrix<Complex64> {
        let nc = self.plans.num_coils();
        let nt = self.plans.num_timesteps();
        let expanded = f_hat.redistribute(Layout::RowBlock);
        let grid = expanded.grid();
        let mut images = DistMatrix::zeros(grid, expanded.height(), nt, Layout::RowBlock);
        for w in 0..grid.num_workers() {
            let (_, h_loc) = expanded.row_block(w);
            let src = expanded.local(w);
            let dst = images.local_mut(w);
            for t in 0..nt {
                let out = &mut dst[t * h_loc..(t + 1) * h_loc];
                for c in 0..nc {
                    let j = c + t * nc;
                    let col = &src[j * h_loc..(j + 1) * h_loc];
                    for (o, v) in out.iter_mut().zip(col) {
                        *o += v;
                    }
                }
            }
        }
        images
    }

    /// In-place per-column multiply by the owning coil's sensitivity
    /// profile (conjugated for the adjoint direction).
    fn scale_by_sensitivities(&self, scattered: &mut DistMatrix<Complex64>, conjugate: bool) {
        let nc = self.plans.num_coils();
        let height = scattered.height();
        let p = scattered.grid().num_workers();
        for w in 0..p {
            let w_loc = scattered.local_width(w);
            // Global column of local j_loc is w + j_loc*p.
            let shard = scattered.local_mut(w);
            for j_loc in 0..w_loc {
                let coil = (w + j_loc * p) % nc;
                let sense = self.sensitivity.coil(coil);
                let col = &mut shard[j_loc * height..(j_loc + 1) * height];
                if conjugate {
                    for (v, s) in col.iter_mut().zip(sense) {
                        *v *= s.conj();
                    }
                } else {
                    for (v, s) in col.iter_mut().zip(sense) {
                        *v *= s;
                    }
                }
            }
        }
    }

    fn check_images(&self, images: &DistMatrix<Complex64>) -> Result<()> {
        if images.grid() != self.plans.grid() || images.layout() != Layout::RowBlock {
            return Err(ReconError::NotAligned(
                "image sequence must be row-partitioned on the plans' worker grid".into(),
            ));
        }
        let pixels = self.plans.first_bandwidth() * self.plans.second_bandwidth();
        if images.height() != pixels || images.width() != self.plans.num_timesteps() {
            return Err(ReconError::ShapeMismatch(format!(
                "image sequence is {}x{}, expected {}x{}",
                images.height(),
                images.width(),
                pixels,
                self.plans.num_timesteps()
            )));
        }
        Ok(())
    }

    fn check_kspace(&self, kspace: &DistMatrix<Complex64>) -> Result<()> {
        if kspace.grid() != self.plans.grid() || kspace.layout() != Layout::ColCyclic {
            return Err(ReconError::NotAligned(
                "k-space data must be column-distributed on the plans' worker grid".into(),
            ));
        }
        let width = self.plans.num_coils() * self.plans.num_timesteps();
        if kspace.height() != self.plans.num_nonuniform_points() || kspace.width() != width {
            return Err(ReconError::ShapeMismatch(format!(
                "k-space data is {}x{}, expected {}x{}",
                kspace.height(),
                kspace.width(),
                self.plans.num_nonuniform_points(),
                width
            )));
        }
        Ok(())
    }
}
