// src/accel/parallel.rs
// Rayon-backed BVH builder: forks subtree construction above a size cutoff.
// Produces identical trees to the serial backend since the split logic is shared.
// RELEVANT FILES:src/accel/sah.rs,src/accel/mod.rs

use crate::accel::sah::{build_with, refit_handle};
use crate::accel::types::{BuildOptions, BvhHandle, Triangle};
use crate::accel::SpatialIndexBuilder;
use crate::error::Result;

/// Subtrees at or below this primitive count are built inline; forking
/// smaller ranges costs more in scheduling than it saves.
const FORK_CUTOFF: usize = 2048;

/// Parallel surface-area-heuristic builder
pub struct ParallelSahBuilder {
    cutoff: usize,
}

impl ParallelSahBuilder {
    pub fn new() -> Self {
        Self {
            cutoff: FORK_CUTOFF,
        }
    }

    /// Lower the fork cutoff; used by tests to exercise the parallel
    /// path on small inputs.
    pub fn with_cutoff(cutoff: usize) -> Self {
        Self {
            cutoff: cutoff.max(1),
        }
    }
}

impl Default for ParallelSahBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndexBuilder for ParallelSahBuilder {
    fn build(&self, triangles: &[Triangle], options: &BuildOptions) -> Result<BvhHandle> {
        build_with(triangles, options, Some(self.cutoff))
    }

    fn refit(&self, handle: &mut BvhHandle, triangles: &[Triangle]) -> Result<()> {
        // Refit is a cheap bottom-up sweep; not worth forking.
        refit_handle(handle, triangles)
    }

    fn name(&self) -> &'static str {
        "parallel-sah"
    }
}
