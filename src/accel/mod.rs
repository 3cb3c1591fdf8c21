// src/accel/mod.rs
// Spatial index (BVH) construction with a capability-checked choice of backend.
// This module provides parallel building when the machine supports it and a
// single-threaded fallback that is always available, behind one interface.
// RELEVANT FILES:src/accel/types.rs,src/accel/sah.rs,src/accel/parallel.rs

pub mod parallel;
pub mod sah;
pub mod types;

pub use parallel::ParallelSahBuilder;
pub use sah::SerialSahBuilder;
pub use types::{Aabb, BuildOptions, BuildStats, BvhHandle, BvhNode, Triangle};

use std::sync::Once;

use crate::error::Result;

/// Interchangeable spatial-index construction backend.
///
/// `refit` updates node bounds in place given unchanged topology; the
/// triangle count must match the build or a precondition error is
/// returned.
pub trait SpatialIndexBuilder: Send + Sync {
    fn build(&self, triangles: &[Triangle], options: &BuildOptions) -> Result<BvhHandle>;
    fn refit(&self, handle: &mut BvhHandle, triangles: &[Triangle]) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Backend selection for `create_builder`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// Use the parallel builder when the host reports more than one
    /// available thread, otherwise fall back to serial
    Auto,
    /// Force the single-threaded builder
    Serial,
    /// Force the parallel builder
    Threads,
}

static FALLBACK_WARNING: Once = Once::new();

/// Capability-checked factory: returns the parallel builder when the
/// runtime supports it, otherwise the serial fallback with a one-time
/// warning. Never fails.
pub fn create_builder(parallelism: Parallelism) -> Box<dyn SpatialIndexBuilder> {
    match parallelism {
        Parallelism::Serial => Box::new(SerialSahBuilder::new()),
        Parallelism::Threads => Box::new(ParallelSahBuilder::new()),
        Parallelism::Auto => {
            let threads = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            if threads > 1 {
                Box::new(ParallelSahBuilder::new())
            } else {
                FALLBACK_WARNING.call_once(|| {
                    log::warn!(
                        "parallel index build unavailable (1 thread reported), \
                         using single-threaded builder"
                    );
                });
                Box::new(SerialSahBuilder::new())
            }
        }
    }
}
