//! Real-time low-rank plus sparse (L+S) reconstruction for dynamic MRI
//!
//! Reconstructs a time-resolved image series from undersampled multi-coil
//! k-space data sampled along non-Cartesian trajectories. The image
//! sequence is decomposed into a slowly varying background (low matrix
//! rank across time) and a dynamic foreground (sparse after a temporal
//! Fourier transform); the measurement model is a coil- and
//! trajectory-aware non-uniform Fourier operator.
//!
//! # Modules
//! - `dist`: dense matrices partitioned over a fixed set of SPMD workers
//! - `nufft`: non-uniform 2-D Fourier transform, gridding and exact paths
//! - `coils`: per-worker registry of precomputed trajectory plans
//! - `acquisition`: the forward/adjoint acquisition operator
//! - `linalg`: elementwise kernels, temporal FFT, singular value
//!   thresholding
//! - `lps`: the alternating-minimization L+S solver
//! - `error`: the error taxonomy shared by all of the above
//!
//! Reconstruction state is modeled as matrices distributed across logical
//! workers that execute identical control flow over their local shards;
//! collectives (redistribution, norms, factorization reductions) must be
//! reached by every worker in the same order.

// Distributed substrate
pub mod dist;
pub mod error;

// Transform and operator modules
pub mod acquisition;
pub mod coils;
pub mod nufft;

// Numerics and the solver
pub mod linalg;
pub mod lps;

pub use acquisition::{Acquisition, SensitivityMap};
pub use coils::CoilPlans;
pub use dist::{DistMatrix, Entry, Layout, WorkerGrid};
pub use error::{ReconError, Result};
pub use linalg::{
    axpy, scale, soft_threshold, svt, temporal_adjoint_fft, temporal_fft, SvtStrategy,
};
pub use lps::{lps, LpsParams, LpsSolution};
pub use nufft::{direct_adjoint, direct_forward, NufftPlan, TransformKind};
