//! Error types for the reconstruction pipeline
//!
//! Failures fall into three classes: precondition violations (shape,
//! alignment, bandwidth, trajectory contracts), numerical factorization
//! failures, and solver convergence failure. All of them propagate
//! immediately to the caller; no operation returns partial results.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Error, Debug)]
pub enum ReconError {
    /// Operand dimensions do not match what the operation requires.
    #[error("dimension mismatch: {0}")]
    ShapeMismatch(String),

    /// Distributed operands do not share the same grid, layout, or shape.
    #[error("distributed operands are not aligned: {0}")]
    NotAligned(String),

    /// The non-uniform transform requires even, positive band limits.
    #[error("band limits must be even positive integers, got {n0}x{n1}")]
    InvalidBandwidth { n0: usize, n1: usize },

    /// The oversampled grid must strictly exceed the band limits.
    #[error("oversampled grid {os_n0}x{os_n1} must strictly exceed band limits {n0}x{n1}")]
    InvalidOversampling {
        os_n0: usize,
        os_n1: usize,
        n0: usize,
        n1: usize,
    },

    /// The interpolation window (2*cutoff+1 points per axis) must fit the
    /// oversampled grid, and the cutoff must be positive.
    #[error("interpolation cutoff {cutoff} does not fit the {os_n0}x{os_n1} oversampled grid")]
    InvalidCutoff {
        cutoff: usize,
        os_n0: usize,
        os_n1: usize,
    },

    /// Trajectory matrix width must equal numCoils * numTimesteps.
    #[error("trajectory matrix width {width} does not equal coils*timesteps = {expected}")]
    TrajectoryWidthMismatch { width: usize, expected: usize },

    /// Trajectory columns must be sorted lexicographically by (x0, x1)
    /// sample coordinate before a transform plan can be built from them.
    #[error("trajectory column {column} is not sorted by sample coordinate")]
    UnsortedTrajectory { column: usize },

    /// A solver or operator parameter is out of its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A small dense factorization (SVD, eigendecomposition) failed to
    /// converge.
    #[error("numerical factorization failed: {0}")]
    Factorization(String),

    /// The L+S iteration hit its iteration cap without meeting the
    /// relative-update tolerance. Distinct from precondition errors so the
    /// caller can choose between relaxing parameters and treating it as a
    /// hard failure of the real-time deadline.
    #[error(
        "L+S decomposition did not converge in {iterations} iterations \
         (relative update {relative_update:.3e}, tolerance {tolerance:.3e})"
    )]
    ConvergenceFailure {
        iterations: usize,
        relative_update: f64,
        tolerance: f64,
    },
}
