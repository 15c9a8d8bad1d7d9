//! In-process model of a dense matrix distributed over SPMD workers
//!
//! Reconstruction state is partitioned across a fixed set of cooperating
//! workers that all execute the same control flow over their local shard.
//! Two distribution patterns are supported:
//!
//! - [`Layout::RowBlock`]: each worker owns a contiguous block of rows for
//!   every column (the "image x time" view),
//! - [`Layout::ColCyclic`]: each worker owns whole columns assigned
//!   round-robin (the "row-replicated, column-distributed" view used for
//!   k-space and scattered image data).
//!
//! Redistribution between the two patterns and the Frobenius norm are
//! collectives: they touch every worker's shard in the same order, which
//! every caller must preserve (a worker that skips a collective would
//! deadlock a message-passing realization of this model). Purely local
//! per-column work may be parallelized freely across workers.

use num_complex::Complex64;

use crate::error::{ReconError, Result};

/// Matrix entry types storable in a distributed matrix.
pub trait Entry: Copy + Send + Sync + 'static {
    fn zero() -> Self;
    fn norm_sqr(self) -> f64;
}

impl Entry for f64 {
    #[inline]
    fn zero() -> Self {
        0.0
    }
    #[inline]
    fn norm_sqr(self) -> f64 {
        self * self
    }
}

impl Entry for Complex64 {
    #[inline]
    fn zero() -> Self {
        Complex64::ZERO
    }
    #[inline]
    fn norm_sqr(self) -> f64 {
        Complex64::norm_sqr(&self)
    }
}

/// A fixed set of cooperating workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerGrid {
    num_workers: usize,
}

impl WorkerGrid {
    pub fn new(num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(ReconError::InvalidParameter(
                "worker grid must contain at least one worker".into(),
            ));
        }
        Ok(Self { num_workers })
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}

/// Distribution pattern of a [`DistMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Contiguous row blocks per worker, all columns present locally.
    RowBlock,
    /// Whole columns per worker, assigned round-robin by column index.
    ColCyclic,
}

/// Dense `height x width` matrix partitioned across a [`WorkerGrid`].
///
/// Each worker holds one column-major local shard. Global entry `(i, j)`
/// lives on exactly one worker; which one is determined by the layout.
#[derive(Debug, Clone)]
pub struct DistMatrix<T> {
    grid: WorkerGrid,
    height: usize,
    width: usize,
    layout: Layout,
    shards: Vec<Vec<T>>,
}

impl<T: Entry> DistMatrix<T> {
    /// Zero-filled matrix with the given global shape and layout.
    pub fn zeros(grid: WorkerGrid, height: usize, width: usize, layout: Layout) -> Self {
        let p = grid.num_workers();
        let shards = (0..p)
            .map(|w| {
                let (h, wl) = Self::local_shape_for(grid, height, width, layout, w);
                vec![T::zero(); h * wl]
            })
            .collect();
        Self {
            grid,
            height,
            width,
            layout,
            shards,
        }
    }

    /// Zero-filled matrix with the same grid, shape, and layout as `other`.
    pub fn zeros_like(other: &Self) -> Self {
        Self::zeros(other.grid, other.height, other.width, other.layout)
    }

    /// Build a distributed matrix from a column-major global buffer.
    pub fn from_global(
        grid: WorkerGrid,
        height: usize,
        width: usize,
        layout: Layout,
        data: &[T],
    ) -> Result<Self> {
        if data.len() != height * width {
            return Err(ReconError::ShapeMismatch(format!(
                "global buffer holds {} entries, shape is {}x{}",
                data.len(),
                height,
                width
            )));
        }
        let mut out = Self::zeros(grid, height, width, layout);
        for j in 0..width {
            for i in 0..height {
                out.set(i, j, data[i + j * height]);
            }
        }
        Ok(out)
    }

    /// Gather the full matrix into a column-major global buffer.
    ///
    /// A collective; intended for small operands and tests.
    pub fn to_global(&self) -> Vec<T> {
        let mut out = vec![T::zero(); self.height * self.width];
        for j in 0..self.width {
            for i in 0..self.height {
                out[i + j * self.height] = self.get(i, j);
            }
        }
        out
    }

    #[inline]
    pub fn grid(&self) -> WorkerGrid {
        self.grid
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Contiguous row range `(first_row, num_rows)` owned by `worker` under
    /// the row-block layout. Rows are split as evenly as possible, earlier
    /// workers taking the remainder.
    pub fn row_block(&self, worker: usize) -> (usize, usize) {
        row_block_of(self.height, self.grid.num_workers(), worker)
    }

    /// Local shard height of `worker`.
    pub fn local_height(&self, worker: usize) -> usize {
        match self.layout {
            Layout::RowBlock => self.row_block(worker).1,
            Layout::ColCyclic => self.height,
        }
    }

    /// Local shard width of `worker`.
    pub fn local_width(&self, worker: usize) -> usize {
        match self.layout {
            Layout::RowBlock => self.width,
            Layout::ColCyclic => {
                let p = self.grid.num_workers();
                (self.width + p - 1 - worker) / p
            }
        }
    }

    /// Global column index of local column `j_loc` on `worker` under the
    /// column-cyclic layout.
    #[inline]
    pub fn global_col(&self, worker: usize, j_loc: usize) -> usize {
        worker + j_loc * self.grid.num_workers()
    }

    /// Column-major local buffer of `worker`.
    #[inline]
    pub fn local(&self, worker: usize) -> &[T] {
        &self.shards[worker]
    }

    /// Mutable column-major local buffer of `worker`.
    #[inline]
    pub fn local_mut(&mut self, worker: usize) -> &mut [T] {
        &mut self.shards[worker]
    }

    /// All local shards, for lockstep per-worker loops.
    #[inline]
    pub(crate) fn shards(&self) -> &[Vec<T>] {
        &self.shards
    }

    /// All local shards, mutably.
    #[inline]
    pub(crate) fn shards_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.shards
    }

    /// Read global entry `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> T {
        let (w, idx) = self.locate(i, j);
        self.shards[w][idx]
    }

    /// Write global entry `(i, j)`.
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let (w, idx) = self.locate(i, j);
        self.shards[w][idx] = value;
    }

    fn locate(&self, i: usize, j: usize) -> (usize, usize) {
        debug_assert!(i < self.height && j < self.width);
        let p = self.grid.num_workers();
        match self.layout {
            Layout::RowBlock => {
                let w = owner_of_row(self.height, p, i);
                let (r0, h_loc) = self.row_block(w);
                (w, (i - r0) + j * h_loc)
            }
            Layout::ColCyclic => {
                let w = j % p;
                let j_loc = j / p;
                (w, i + j_loc * self.height)
            }
        }
    }

    /// True when `other` has the identical grid, layout, and global shape,
    /// so that elementwise operations between the two are well defined.
    pub fn same_distribution(&self, other: &Self) -> bool {
        self.grid == other.grid
            && self.layout == other.layout
            && self.height == other.height
            && self.width == other.width
    }

    /// Reject mismatched operands with a descriptive alignment error.
    pub fn require_aligned(&self, other: &Self, what: &str) -> Result<()> {
        if self.same_distribution(other) {
            Ok(())
        } else {
            Err(ReconError::NotAligned(format!(
                "{}: {}x{} {:?} vs {}x{} {:?}",
                what, self.height, self.width, self.layout, other.height, other.width, other.layout
            )))
        }
    }

    /// Move the matrix into the target layout, preserving global content.
    ///
    /// A collective: every worker contributes its shard and receives its
    /// share of the result.
    pub fn redistribute(&self, target: Layout) -> Self {
        if target == self.layout {
            return self.clone();
        }
        let p = self.grid.num_workers();
        let h = self.height;
        let mut out = Self::zeros(self.grid, self.height, self.width, target);
        match (self.layout, target) {
            (Layout::RowBlock, Layout::ColCyclic) => {
                for sw in 0..p {
                    let (r0, h_loc) = self.row_block(sw);
                    let src = &self.shards[sw];
                    for j in 0..self.width {
                        let tw = j % p;
                        let j_loc = j / p;
                        let dst = &mut out.shards[tw][j_loc * h + r0..j_loc * h + r0 + h_loc];
                        dst.copy_from_slice(&src[j * h_loc..j * h_loc + h_loc]);
                    }
                }
            }
            (Layout::ColCyclic, Layout::RowBlock) => {
                for sw in 0..p {
                    let src = &self.shards[sw];
                    let w_loc = self.local_width(sw);
                    for j_loc in 0..w_loc {
                        let j = self.global_col(sw, j_loc);
                        for tw in 0..p {
                            let (r0, h_loc) = out.row_block(tw);
                            let dst = &mut out.shards[tw][j * h_loc..(j + 1) * h_loc];
                            dst.copy_from_slice(&src[j_loc * h + r0..j_loc * h + r0 + h_loc]);
                        }
                    }
                }
            }
            _ => unreachable!("layouts are equal"),
        }
        out
    }

    /// Frobenius norm. A collective reduction over all workers.
    pub fn frobenius_norm(&self) -> f64 {
        let sum: f64 = self
            .shards
            .iter()
            .map(|shard| shard.iter().map(|v| v.norm_sqr()).sum::<f64>())
            .sum();
        sum.sqrt()
    }

    fn local_shape_for(
        grid: WorkerGrid,
        height: usize,
        width: usize,
        layout: Layout,
        worker: usize,
    ) -> (usize, usize) {
        let p = grid.num_workers();
        match layout {
            Layout::RowBlock => (row_block_of(height, p, worker).1, width),
            Layout::ColCyclic => (height, (width + p - 1 - worker) / p),
        }
    }
}

/// Contiguous row range `(first_row, num_rows)` of `worker` when `height`
/// rows are split over `p` workers.
#[inline]
fn row_block_of(height: usize, p: usize, worker: usize) -> (usize, usize) {
    let base = height / p;
    let rem = height % p;
    let start = worker * base + worker.min(rem);
    let len = base + usize::from(worker < rem);
    (start, len)
}

/// Worker owning global row `i` under the row-block layout.
#[inline]
fn owner_of_row(height: usize, p: usize, i: usize) -> usize {
    let base = height / p;
    let rem = height % p;
    let split = rem * (base + 1);
    if i < split {
        i / (base + 1)
    } else {
        rem + (i - split) / base.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(grid: WorkerGrid, h: usize, w: usize, layout: Layout) -> DistMatrix<f64> {
        let data: Vec<f64> = (0..h * w).map(|i| i as f64 + 1.0).collect();
        DistMatrix::from_global(grid, h, w, layout, &data).unwrap()
    }

    #[test]
    fn test_row_block_partition_covers_all_rows() {
        for h in [1, 5, 7, 12] {
            for p in [1, 2, 3, 5] {
                let mut total = 0;
                let mut next = 0;
                for w in 0..p {
                    let (r0, len) = row_block_of(h, p, w);
                    assert_eq!(r0, next, "blocks must be contiguous");
                    next += len;
                    total += len;
                }
                assert_eq!(total, h, "blocks must cover all {} rows", h);
                for i in 0..h {
                    let w = owner_of_row(h, p, i);
                    let (r0, len) = row_block_of(h, p, w);
                    assert!(i >= r0 && i < r0 + len, "row {} misrouted to {}", i, w);
                }
            }
        }
    }

    #[test]
    fn test_col_cyclic_local_widths() {
        let grid = WorkerGrid::new(2).unwrap();
        let m = DistMatrix::<f64>::zeros(grid, 3, 5, Layout::ColCyclic);
        assert_eq!(m.local_width(0), 3); // columns 0, 2, 4
        assert_eq!(m.local_width(1), 2); // columns 1, 3
        assert_eq!(m.global_col(1, 1), 3);
    }

    #[test]
    fn test_get_set_roundtrip_both_layouts() {
        let grid = WorkerGrid::new(3).unwrap();
        for layout in [Layout::RowBlock, Layout::ColCyclic] {
            let m = filled(grid, 7, 4, layout);
            for j in 0..4 {
                for i in 0..7 {
                    assert_eq!(m.get(i, j), (i + j * 7) as f64 + 1.0);
                }
            }
        }
    }

    #[test]
    fn test_redistribute_roundtrip_preserves_content() {
        let grid = WorkerGrid::new(3).unwrap();
        let m = filled(grid, 8, 6, Layout::RowBlock);
        let cyc = m.redistribute(Layout::ColCyclic);
        let back = cyc.redistribute(Layout::RowBlock);
        assert_eq!(m.to_global(), cyc.to_global());
        assert_eq!(m.to_global(), back.to_global());
    }

    #[test]
    fn test_frobenius_norm_matches_dense() {
        let grid = WorkerGrid::new(2).unwrap();
        let m = filled(grid, 4, 3, Layout::ColCyclic);
        let expected: f64 = (1..=12).map(|v| (v * v) as f64).sum::<f64>().sqrt();
        assert!((m.frobenius_norm() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_require_aligned_rejects_layout_mismatch() {
        let grid = WorkerGrid::new(2).unwrap();
        let a = DistMatrix::<f64>::zeros(grid, 4, 4, Layout::RowBlock);
        let b = DistMatrix::<f64>::zeros(grid, 4, 4, Layout::ColCyclic);
        assert!(matches!(
            a.require_aligned(&b, "test"),
            Err(ReconError::NotAligned(_))
        ));
    }

    #[test]
    fn test_zero_worker_grid_rejected() {
        assert!(WorkerGrid::new(0).is_err());
    }
}
