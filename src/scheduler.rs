// src/scheduler.rs
// TileScheduler: the resumable step machine that advances one tile of
// stochastic sampling per call and accumulates passes with running-average
// weights. The suspension point is plain enumerated state plus a tile
// cursor, never implicit continuation state.
// RELEVANT FILES:src/tiles.rs,src/targets.rs,src/backend.rs,src/orchestrator.rs

use glam::Vec3;

use crate::backend::{SamplingBackend, TileRequest};
use crate::camera::CameraView;
use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;
use crate::targets::{RenderTargetSet, TargetRole};
use crate::tiles::{SubFrame, TileGrid, TileRect};

/// Resumable accumulation progress.
///
/// `samples` is fractional while a pass is mid-cycle and snapped to the
/// nearest integer when a full tile cycle completes. `seed` advances
/// once per completed pass. `round_robin` is the continuously-advancing
/// tile cursor used when tile order is not pinned to raster order; it is
/// scoped to this state and cleared by reset, so a fixed seed replays
/// the same coverage pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleState {
    pub samples: f32,
    pub tile_cursor: u32,
    pub round_robin: u32,
    pub seed: u32,
}

impl SampleState {
    pub fn fresh(seed: u32) -> Self {
        Self {
            samples: 0.0,
            tile_cursor: 0,
            round_robin: 0,
            seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    Accumulating {
        /// Per-pass pixel weight, `opacity / (samples + 1)`
        weight: f32,
    },
}

/// Result of one `step()` call
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    /// The scissor rect that was rendered
    pub tile: TileRect,
    /// True when this step finished a full pass over the grid
    pub pass_completed: bool,
    pub samples: f32,
}

/// Drives one sample pass over the image as a sequence of single-tile
/// `step()` calls, accumulating into a `RenderTargetSet`.
pub struct TileScheduler {
    targets: RenderTargetSet,
    camera: CameraView,
    tiles: (u32, u32),
    subframe: SubFrame,
    grid: TileGrid,
    state: State,
    progress: SampleState,
    opacity: f32,
    bounces: u32,
    alpha: bool,
    stable_tiles: bool,
    stable_noise: bool,
    disposed: bool,
}

impl TileScheduler {
    pub fn new(gpu: &GpuContext) -> Self {
        let camera = CameraView::perspective(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            45f32.to_radians(),
            1.0,
            0.1,
            1000.0,
        );
        Self {
            targets: RenderTargetSet::new(gpu),
            camera,
            tiles: (2, 2),
            subframe: SubFrame::FULL,
            grid: TileGrid::new(2, 2, 1, 1),
            state: State::Idle,
            progress: SampleState::fresh(0),
            opacity: 1.0,
            bounces: 4,
            alpha: false,
            stable_tiles: true,
            stable_noise: false,
            disposed: false,
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.disposed {
            Err(RenderError::Disposed("tile scheduler"))
        } else {
            Ok(())
        }
    }

    /// Accumulated sample count; fractional mid-pass
    pub fn samples(&self) -> f32 {
        self.progress.samples
    }

    pub fn sample_state(&self) -> SampleState {
        self.progress
    }

    /// Install saved progress (multi-view scheduling swaps per-view
    /// state in and out around inner steps).
    pub fn restore_sample_state(&mut self, state: SampleState) {
        self.progress = state;
        // A restored mid-pass cursor stays resumable only if the pass
        // has actually started.
        if state.tile_cursor > 0 || state.samples > 0.0 {
            let weight = self.opacity / (self.progress.samples.floor() + 1.0);
            self.state = State::Accumulating { weight };
        } else {
            self.state = State::Idle;
        }
    }

    pub fn set_camera(&mut self, camera: &CameraView) {
        self.camera = *camera;
    }

    pub fn camera(&self) -> &CameraView {
        &self.camera
    }

    /// Tile grid dimensions; takes effect at the next pass boundary
    pub fn set_tiles(&mut self, x: u32, y: u32) {
        self.tiles = (x.max(1), y.max(1));
    }

    pub fn tiles(&self) -> (u32, u32) {
        self.tiles
    }

    pub fn set_subframe(&mut self, subframe: SubFrame) {
        self.subframe = subframe;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }

    pub fn set_bounces(&mut self, bounces: u32) {
        self.bounces = bounces;
    }

    /// Enable alpha output, routing passes through the blend targets
    pub fn set_alpha(&mut self, alpha: bool) {
        self.alpha = alpha;
    }

    pub fn set_stable_tiles(&mut self, stable: bool) {
        self.stable_tiles = stable;
    }

    pub fn set_stable_noise(&mut self, stable: bool) {
        self.stable_noise = stable;
    }

    pub fn targets(&self) -> &RenderTargetSet {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut RenderTargetSet {
        &mut self.targets
    }

    /// Resize the accumulation targets; a reallocation discards all
    /// progress (returns true in that case).
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        self.check_alive()?;
        let reallocated = self.targets.resize(width, height)?;
        if reallocated {
            self.reset()?;
        }
        Ok(reallocated)
    }

    /// Unconditional cancellation: discards any in-flight pass state,
    /// zeroes the sample counter, and clears every target.
    pub fn reset(&mut self) -> Result<()> {
        self.check_alive()?;
        let seed = if self.stable_noise {
            0
        } else {
            // Noise keeps advancing across resets so a moving camera
            // does not replay the identical error pattern.
            self.progress.seed
        };
        self.state = State::Idle;
        self.progress = SampleState::fresh(seed);
        self.targets.reset_parity();
        self.targets.clear()
    }

    /// Advance exactly one tile's worth of sampling and return. After
    /// `tiles_x * tiles_y` steps from a fresh start, `samples` has
    /// increased by exactly 1.
    pub fn step(&mut self, backend: &mut dyn SamplingBackend) -> Result<StepOutcome> {
        self.check_alive()?;

        // Pass boundary (including the Idle -> Accumulating transition):
        // derive this pass's grid and per-pixel weight.
        if matches!(self.state, State::Idle) || self.progress.tile_cursor == 0 {
            let (tx, ty) = self.tiles;
            self.grid = TileGrid::with_subframe(
                tx,
                ty,
                self.targets.width(),
                self.targets.height(),
                self.subframe,
            );
            let weight = self.opacity / (self.progress.samples + 1.0);
            if matches!(self.state, State::Idle) {
                log::debug!("accumulation start: {}x{} tiles, weight {}", tx, ty, weight);
            }
            self.state = State::Accumulating { weight };
        }

        let weight = match self.state {
            State::Accumulating { weight } => weight,
            State::Idle => unreachable!("state set above"),
        };
        let total = self.grid.total();

        let tile_index = if self.stable_tiles {
            self.progress.tile_cursor
        } else {
            self.progress.round_robin % total
        };
        let scissor = self.grid.tile_rect(tile_index);

        let parity = self.targets.blend_parity();
        let role = if self.alpha {
            TargetRole::Blend(parity)
        } else {
            TargetRole::Primary
        };

        let request = TileRequest {
            view: &self.camera,
            scissor,
            seed: self.progress.seed,
            weight,
            bounces: self.bounces,
            role,
        };
        backend.render_tile(&mut self.targets, &request)?;
        if self.alpha {
            backend.composite_blend(&mut self.targets, scissor, parity)?;
        }

        self.progress.samples += 1.0 / total as f32;
        self.progress.tile_cursor += 1;
        if !self.stable_tiles {
            self.progress.round_robin = self.progress.round_robin.wrapping_add(1);
        }

        let pass_completed = self.progress.tile_cursor >= total;
        if pass_completed {
            // Snap away the 1/total floating-point drift and advance the
            // stratification sequence for the next pass.
            self.progress.samples = self.progress.samples.round();
            self.progress.seed = self.progress.seed.wrapping_add(1);
            self.progress.tile_cursor = 0;
            if self.alpha {
                self.targets.swap_blend();
            }
        }

        Ok(StepOutcome {
            tile: scissor,
            pass_completed,
            samples: self.progress.samples,
        })
    }

    /// Releases the render targets; the scheduler is unusable afterwards
    pub fn dispose(&mut self) {
        self.targets.dispose();
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every tile request without touching pixels
    struct RecordingBackend {
        tiles: Vec<(TileRect, f32, u32)>,
        blends: u32,
    }

    impl RecordingBackend {
        fn new() -> Self {
            Self {
                tiles: Vec::new(),
                blends: 0,
            }
        }
    }

    impl SamplingBackend for RecordingBackend {
        fn bind_scene(&mut self, _snapshot: &crate::scene::SceneSnapshot) -> Result<()> {
            Ok(())
        }

        fn render_tile(
            &mut self,
            _targets: &mut RenderTargetSet,
            request: &TileRequest<'_>,
        ) -> Result<()> {
            self.tiles.push((request.scissor, request.weight, request.seed));
            Ok(())
        }

        fn composite_blend(
            &mut self,
            _targets: &mut RenderTargetSet,
            _scissor: TileRect,
            _parity: bool,
        ) -> Result<()> {
            self.blends += 1;
            Ok(())
        }
    }

    fn scheduler_with_grid(tx: u32, ty: u32, w: u32, h: u32) -> TileScheduler {
        let mut s = TileScheduler::new(&GpuContext::NotAvailable);
        s.set_tiles(tx, ty);
        s.resize(w, h).unwrap();
        s
    }

    #[test]
    fn samples_increase_by_exactly_one_per_pass() {
        let mut s = scheduler_with_grid(3, 2, 60, 40);
        let mut backend = RecordingBackend::new();
        for _ in 0..6 {
            s.step(&mut backend).unwrap();
        }
        assert_eq!(s.samples(), 1.0);
        for _ in 0..6 {
            s.step(&mut backend).unwrap();
        }
        assert_eq!(s.samples(), 2.0);
    }

    #[test]
    fn mid_pass_samples_are_fractional() {
        let mut s = scheduler_with_grid(2, 1, 16, 16);
        let mut backend = RecordingBackend::new();
        let out = s.step(&mut backend).unwrap();
        assert_eq!(out.samples, 0.5);
        assert!(!out.pass_completed);
        assert_eq!(s.sample_state().tile_cursor, 1);
        let out = s.step(&mut backend).unwrap();
        assert!(out.pass_completed);
        assert_eq!(out.samples, 1.0);
    }

    #[test]
    fn monotonic_and_no_drift_over_many_passes() {
        let mut s = scheduler_with_grid(3, 3, 30, 30);
        let mut backend = RecordingBackend::new();
        let mut last = 0.0f32;
        for _ in 0..9 * 50 {
            let out = s.step(&mut backend).unwrap();
            assert!(out.samples >= last);
            last = out.samples;
        }
        // 1/9 is not representable; the pass-boundary rounding must have
        // kept the counter exact anyway.
        assert_eq!(s.samples(), 50.0);
    }

    #[test]
    fn weight_decreases_per_pass() {
        let mut s = scheduler_with_grid(2, 2, 8, 8);
        let mut backend = RecordingBackend::new();
        for _ in 0..8 {
            s.step(&mut backend).unwrap();
        }
        assert_eq!(backend.tiles[0].1, 1.0);
        assert_eq!(backend.tiles[4].1, 0.5);
    }

    #[test]
    fn seed_advances_once_per_pass() {
        let mut s = scheduler_with_grid(2, 2, 8, 8);
        let mut backend = RecordingBackend::new();
        for _ in 0..8 {
            s.step(&mut backend).unwrap();
        }
        let seeds: Vec<u32> = backend.tiles.iter().map(|t| t.2).collect();
        assert_eq!(seeds, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut s = scheduler_with_grid(2, 2, 8, 8);
        let mut backend = RecordingBackend::new();
        for _ in 0..3 {
            s.step(&mut backend).unwrap();
        }
        s.reset().unwrap();
        s.reset().unwrap();
        assert_eq!(s.samples(), 0.0);
        assert_eq!(s.sample_state().tile_cursor, 0);
        assert_eq!(s.sample_state().round_robin, 0);
    }

    #[test]
    fn stable_noise_replays_seed_after_reset() {
        let mut s = scheduler_with_grid(1, 1, 4, 4);
        s.set_stable_noise(true);
        let mut backend = RecordingBackend::new();
        for _ in 0..3 {
            s.step(&mut backend).unwrap();
        }
        s.reset().unwrap();
        s.step(&mut backend).unwrap();
        assert_eq!(backend.tiles.last().unwrap().2, 0);
    }

    #[test]
    fn unstable_noise_keeps_advancing_after_reset() {
        let mut s = scheduler_with_grid(1, 1, 4, 4);
        let mut backend = RecordingBackend::new();
        for _ in 0..3 {
            s.step(&mut backend).unwrap();
        }
        s.reset().unwrap();
        s.step(&mut backend).unwrap();
        assert_eq!(backend.tiles.last().unwrap().2, 3);
    }

    #[test]
    fn round_robin_covers_every_tile_each_pass() {
        let mut s = scheduler_with_grid(2, 2, 8, 8);
        s.set_stable_tiles(false);
        let mut backend = RecordingBackend::new();
        // Two passes: every pass must touch 4 distinct tiles.
        for pass in 0..2 {
            let start = pass * 4;
            for _ in 0..4 {
                s.step(&mut backend).unwrap();
            }
            let mut rects: Vec<TileRect> =
                backend.tiles[start..start + 4].iter().map(|t| t.0).collect();
            rects.sort_by_key(|r| (r.y, r.x));
            rects.dedup();
            assert_eq!(rects.len(), 4);
        }
    }

    #[test]
    fn alpha_passes_swap_blend_parity() {
        let mut s = scheduler_with_grid(2, 1, 8, 8);
        s.set_alpha(true);
        let mut backend = RecordingBackend::new();
        assert!(!s.targets().blend_parity());
        s.step(&mut backend).unwrap();
        s.step(&mut backend).unwrap();
        assert!(s.targets().blend_parity());
        assert_eq!(backend.blends, 2);
    }

    #[test]
    fn step_after_dispose_is_fatal() {
        let mut s = scheduler_with_grid(2, 2, 8, 8);
        let mut backend = RecordingBackend::new();
        s.dispose();
        assert!(matches!(
            s.step(&mut backend),
            Err(RenderError::Disposed(_))
        ));
    }

    #[test]
    fn resize_discards_progress() {
        let mut s = scheduler_with_grid(2, 2, 8, 8);
        let mut backend = RecordingBackend::new();
        for _ in 0..5 {
            s.step(&mut backend).unwrap();
        }
        assert!(s.resize(16, 16).unwrap());
        assert_eq!(s.samples(), 0.0);
    }
}
