// src/backend.rs
// Traits for the external collaborators the scheduler drives: the
// sampling backend, the rasterized fallback, and the denoise stage.
// The scheduler treats all three as opaque, deterministic-given-inputs
// operations.
// RELEVANT FILES:src/scheduler.rs,src/orchestrator.rs,src/targets.rs

use crate::camera::CameraView;
use crate::error::Result;
use crate::scene::SceneSnapshot;
use crate::targets::{RenderTargetSet, TargetRole};
use crate::tiles::TileRect;

/// Everything the sampling backend needs to shade one tile
#[derive(Debug, Clone, Copy)]
pub struct TileRequest<'a> {
    pub view: &'a CameraView,
    /// Pixel-space scissor/viewport rectangle for this tile
    pub scissor: TileRect,
    /// Per-pass stratification index; identical seeds with identical
    /// inputs must produce identical radiance
    pub seed: u32,
    /// Accumulation weight for this pass: `opacity / (samples + 1)`
    pub weight: f32,
    /// Maximum path depth
    pub bounces: u32,
    /// Surface the tile writes into
    pub role: TargetRole,
}

/// Produces one tile's worth of pixel radiance into a target surface.
pub trait SamplingBackend {
    /// Re-bind GPU-resident scene resources after a build or rebuild.
    /// `bvh_changed == false` results do not require calling this.
    fn bind_scene(&mut self, snapshot: &SceneSnapshot) -> Result<()>;

    /// Render exactly one tile, restricted to `request.scissor`,
    /// blending into the target with `request.weight`
    fn render_tile(&mut self, targets: &mut RenderTargetSet, request: &TileRequest<'_>)
        -> Result<()>;

    /// Fold the freshly written blend target over the prior one
    /// (two-operand over-composite). Only invoked when the output
    /// carries transparency; opaque backends keep the default no-op.
    fn composite_blend(
        &mut self,
        _targets: &mut RenderTargetSet,
        _scissor: TileRect,
        _parity: bool,
    ) -> Result<()> {
        Ok(())
    }
}

/// Cheap rasterized preview used while the stochastic image warms up
pub trait Rasterizer {
    fn render(&mut self, snapshot: &SceneSnapshot, view: &CameraView) -> Result<()>;
}

/// Opaque buffer-to-buffer denoise / temporal-resolve stage, invoked by
/// the embedding application after reading the accumulated target
pub trait DenoiseStage {
    fn process(&mut self, color: &mut [f32], width: u32, height: u32) -> Result<()>;
}
