//! Per-worker registry of coil/timestep transform plans
//!
//! One reconstruction works against a fixed set of sampling trajectories,
//! one per (coil, timestep) pair. [`CoilPlans`] builds a [`NufftPlan`] for
//! every locally owned trajectory column once, so the solver's repeated
//! forward/adjoint sweeps reuse the precomputed interpolation weights.
//!
//! The registry is an explicit context object: building it is the
//! initialization step, dropping it releases every plan. Use before
//! initialization and double initialization are unrepresentable; the
//! shape and ordering contracts of the trajectory matrix are checked at
//! build time. Trajectory coordinates are copied into the plans, so the
//! input matrix does not need to outlive the registry.
//!
//! Column convention: trajectory, k-space, and scattered image matrices
//! all index their columns by `coil + timestep * num_coils`, so the first
//! `num_coils` columns belong to timestep 0. Trajectories are per column,
//! which permits coil-specific sampling; sharing one trajectory across
//! the coils of a timestep is expressed by repeating the column.

use num_complex::Complex64;
use rayon::prelude::*;

use crate::dist::{DistMatrix, Layout, WorkerGrid};
use crate::error::{ReconError, Result};
use crate::nufft::{direct_adjoint, direct_forward, NufftPlan, TransformKind};

/// The set of transform plans for all locally owned (coil, timestep)
/// columns, on every worker.
pub struct CoilPlans {
    grid: WorkerGrid,
    num_coils: usize,
    num_timesteps: usize,
    num_points: usize,
    n0: usize,
    n1: usize,
    plans: Vec<Vec<NufftPlan>>,
}

impl CoilPlans {
    /// Build one plan per locally owned trajectory column.
    ///
    /// # Arguments
    /// * `trajectories` - Column-distributed real matrix, `2*M` rows of
    ///   interleaved sorted `(x0, x1)` coordinates, one column per
    ///   (coil, timestep) pair grouped per timestep
    /// * `num_coils`, `num_timesteps` - Acquisition geometry; the
    ///   trajectory width must equal their product
    /// * `n0`, `n1` - Band limits (even, positive)
    /// * `os_n0`, `os_n1` - Oversampled grid for the gridding transform
    /// * `cutoff` - Interpolation half-width
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        trajectories: &DistMatrix<f64>,
        num_coils: usize,
        num_timesteps: usize,
        n0: usize,
        n1: usize,
        os_n0: usize,
        os_n1: usize,
        cutoff: usize,
    ) -> Result<Self> {
        if num_coils == 0 || num_timesteps == 0 {
            return Err(ReconError::InvalidParameter(
                "coil and timestep counts must be positive".into(),
            ));
        }
        if trajectories.layout() != Layout::ColCyclic {
            return Err(ReconError::NotAligned(
                "trajectory matrix must be column-distributed".into(),
            ));
        }
        let width = trajectories.width();
        if width != num_coils * num_timesteps {
            return Err(ReconError::TrajectoryWidthMismatch {
                width,
                expected: num_coils * num_timesteps,
            });
        }
        let height = trajectories.height();
        if height == 0 || height % 2 != 0 {
            return Err(ReconError::ShapeMismatch(format!(
                "trajectory matrix height {} is not a positive multiple of 2",
                height
            )));
        }
        let num_points = height / 2;

        let grid = trajectories.grid();
        let p = grid.num_workers();
        let mut plans = Vec::with_capacity(p);
        for w in 0..p {
            let local = trajectories.local(w);
            let w_loc = trajectories.local_width(w);
            let mut worker_plans = Vec::with_capacity(w_loc);
            for j_loc in 0..w_loc {
                let column = &local[j_loc * height..(j_loc + 1) * height];
                let plan =
                    NufftPlan::new(column, n0, n1, os_n0, os_n1, cutoff).map_err(|e| match e {
                        ReconError::UnsortedTrajectory { .. } => ReconError::UnsortedTrajectory {
                            column: trajectories.global_col(w, j_loc),
                        },
                        other => other,
                    })?;
                worker_plans.push(plan);
            }
            plans.push(worker_plans);
        }

        Ok(Self {
            grid,
            num_coils,
            num_timesteps,
            num_points,
            n0,
            n1,
            plans,
        })
    }

    #[inline]
    pub fn grid(&self) -> WorkerGrid {
        self.grid
    }

    #[inline]
    pub fn num_coils(&self) -> usize {
        self.num_coils
    }

    #[inline]
    pub fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    /// Non-uniform samples per trajectory column.
    #[inline]
    pub fn num_nonuniform_points(&self) -> usize {
        self.num_points
    }

    #[inline]
    pub fn first_bandwidth(&self) -> usize {
        self.n0
    }

    #[inline]
    pub fn second_bandwidth(&self) -> usize {
        self.n1
    }

    /// Plan for local column `j_loc` of `worker`.
    #[inline]
    pub fn plan_for_local_column(&self, worker: usize, j_loc: usize) -> &NufftPlan {
        &self.plans[worker][j_loc]
    }

    /// Coil-aware forward transform: one non-uniform transform per locally
    /// owned (coil, timestep) column, `n0*n1` frequency coefficients to
    /// `M` samples each. Columns are independent and processed in
    /// parallel.
    pub fn forward(
        &self,
        f_hat: &DistMatrix<Complex64>,
        kind: TransformKind,
    ) -> Result<DistMatrix<Complex64>> {
        self.check_operand(f_hat, self.n0 * self.n1, "coefficient")?;
        let mut out = DistMatrix::zeros(
            self.grid,
            self.num_points,
            self.num_coils * self.num_timesteps,
            Layout::ColCyclic,
        );
        let in_height = self.n0 * self.n1;
        let out_height = self.num_points;
        out.shards_mut()
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(w, shard)| {
                let src = f_hat.local(w);
                for (j_loc, plan) in self.plans[w].iter().enumerate() {
                    let fh = &src[j_loc * in_height..(j_loc + 1) * in_height];
                    let dst = &mut shard[j_loc * out_height..(j_loc + 1) * out_height];
                    match kind {
                        TransformKind::Fast => plan.forward(fh, dst)?,
                        TransformKind::Direct => {
                            direct_forward(plan.coords(), self.n0, self.n1, fh, dst)?
                        }
                    }
                }
                Ok::<(), ReconError>(())
            })?;
        Ok(out)
    }

    /// Coil-aware adjoint transform, the conjugate transpose of
    /// [`forward`](CoilPlans::forward).
    pub fn adjoint(
        &self,
        f: &DistMatrix<Complex64>,
        kind: TransformKind,
    ) -> Result<DistMatrix<Complex64>> {
        self.check_operand(f, self.num_points, "sample")?;
        let mut out = DistMatrix::zeros(
            self.grid,
            self.n0 * self.n1,
            self.num_coils * self.num_timesteps,
            Layout::ColCyclic,
        );
        let in_height = self.num_points;
        let out_height = self.n0 * self.n1;
        out.shards_mut()
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(w, shard)| {
                let src = f.local(w);
                for (j_loc, plan) in self.plans[w].iter().enumerate() {
                    let fs = &src[j_loc * in_height..(j_loc + 1) * in_height];
                    let dst = &mut shard[j_loc * out_height..(j_loc + 1) * out_height];
                    match kind {
                        TransformKind::Fast => plan.adjoint(fs, dst)?,
                        TransformKind::Direct => {
                            direct_adjoint(plan.coords(), self.n0, self.n1, fs, dst)?
                        }
                    }
                }
                Ok::<(), ReconError>(())
            })?;
        Ok(out)
    }

    fn check_operand(
        &self,
        operand: &DistMatrix<Complex64>,
        height: usize,
        what: &str,
    ) -> Result<()> {
        if operand.grid() != self.grid || operand.layout() != Layout::ColCyclic {
            return Err(ReconError::NotAligned(format!(
                "{} matrix must be column-distributed on the registry's worker grid",
                what
            )));
        }
        if operand.height() != height {
            return Err(ReconError::ShapeMismatch(format!(
                "{} matrix height {} does not match the plans' {}",
                what,
                operand.height(),
                height
            )));
        }
        if operand.width() != self.num_coils * self.num_timesteps {
            return Err(ReconError::ShapeMismatch(format!(
                "{} matrix width {} does not equal coils*timesteps = {}",
                what,
                operand.width(),
                self.num_coils * self.num_timesteps
            )));
        }
        Ok(())
    }
}
