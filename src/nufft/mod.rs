//! Non-uniform 2-D Fourier transform between a uniform frequency grid and
//! arbitrarily placed sample points
//!
//! Two implementations share one contract. [`NufftPlan`] is the fast path:
//! Gaussian-kernel gridding over an oversampled uniform grid with cached
//! FFT plans, precomputing the per-sample interpolation weights once at
//! plan time so repeated transforms over the same trajectory are cheap.
//! [`direct_forward`]/[`direct_adjoint`] evaluate the defining double sum
//! exactly at `O(M*N0*N1)` cost per column and serve as the correctness
//! oracle; they never run in the hot path.
//!
//! Conventions: frequency indices range over `[-N/2, N/2)` per axis, the
//! forward map applies the phase `exp(-2*pi*i*(x0*k0 + x1*k1))`, and the
//! adjoint is its conjugate transpose. Forward followed by adjoint is not
//! an identity; correctness is judged against the direct transform only.

mod direct;
mod plan;

pub use direct::{direct_adjoint, direct_forward};
pub use plan::NufftPlan;

/// Selects which of the two transform implementations is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Gridding with precomputed interpolation weights.
    Fast,
    /// Exact evaluation of the defining sum; test oracle.
    Direct,
}
