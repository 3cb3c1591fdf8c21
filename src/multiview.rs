// src/multiview.rs
// Multi-view scheduling for light-field/quilt displays: cycles N
// synthetically offset views per accumulation cycle, reusing the tile
// scheduler as the inner step machine.
// RELEVANT FILES:src/scheduler.rs,src/camera.rs,src/tiles.rs

use serde::{Deserialize, Serialize};

use crate::backend::SamplingBackend;
use crate::camera::CameraView;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::scheduler::{SampleState, StepOutcome, TileScheduler};
use crate::tiles::SubFrame;

/// Physical description of the target light-field display, from which
/// every synthetic view's offset and projection are derived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub view_count: u32,
    /// Total viewing cone in radians
    pub cone_angle: f32,
    /// Distance to the zero-parallax plane; also the baseline scale for
    /// view offsets
    pub focus_distance: f32,
    /// Vertical field of view in radians
    pub fov: f32,
    pub aspect: f32,
    /// Quilt atlas layout the views are packed into
    pub quilt_columns: u32,
    pub quilt_rows: u32,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            view_count: 48,
            cone_angle: 35f32.to_radians(),
            focus_distance: 2.0,
            fov: 14f32.to_radians(),
            aspect: 0.75,
            quilt_columns: 8,
            quilt_rows: 6,
        }
    }
}

impl DisplayGeometry {
    /// Sheared/offset camera for view `index`, derived from one
    /// authored camera. The view slides along the camera's right axis
    /// and its projection is sheared back so the focal plane does not
    /// move.
    pub fn view_camera(&self, base: &CameraView, index: u32) -> CameraView {
        let fraction = if self.view_count <= 1 {
            0.5
        } else {
            index as f32 / (self.view_count - 1) as f32
        };
        let angle = (fraction - 0.5) * self.cone_angle;
        let offset = self.focus_distance * angle.tan();

        let right = base.right();
        let mut cam = *base;
        cam.position += right * offset;
        cam.target += right * offset;
        cam.update();

        let half_width = self.focus_distance * (self.fov * 0.5).tan() * self.aspect;
        let mut proj = glam::Mat4::perspective_rh(self.fov, self.aspect, 0.1, 1000.0);
        proj.z_axis.x = -offset / half_width;
        cam.inverse_projection = proj.inverse();
        cam
    }

    /// Normalized quilt cell for view `index`, packed row-major from the
    /// bottom-left like quilt atlases expect
    pub fn subframe(&self, index: u32) -> SubFrame {
        let col = index % self.quilt_columns;
        let row = index / self.quilt_columns;
        SubFrame {
            x: col as f32 / self.quilt_columns as f32,
            y: row as f32 / self.quilt_rows as f32,
            width: 1.0 / self.quilt_columns as f32,
            height: 1.0 / self.quilt_rows as f32,
        }
    }
}

/// Cycles the tile scheduler through every view of a quilt.
///
/// Each view runs one full sample pass over its sub-frame before the
/// view cursor advances; one trip through all views is one quilt
/// sample. Reported `samples` is normalized by the view count so
/// progress reads the same as the single-view case.
pub struct QuiltScheduler {
    inner: TileScheduler,
    geometry: DisplayGeometry,
    base_camera: CameraView,
    view_cursor: u32,
    view_states: Vec<SampleState>,
}

impl QuiltScheduler {
    pub fn new(gpu: &GpuContext, geometry: DisplayGeometry) -> Self {
        let inner = TileScheduler::new(gpu);
        let base_camera = *inner.camera();
        let views = geometry.view_count.max(1) as usize;
        Self {
            inner,
            geometry,
            base_camera,
            view_cursor: 0,
            view_states: vec![SampleState::fresh(0); views],
        }
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    pub fn inner(&self) -> &TileScheduler {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut TileScheduler {
        &mut self.inner
    }

    pub fn set_camera(&mut self, camera: &CameraView) {
        self.base_camera = *camera;
    }

    pub fn view_cursor(&self) -> u32 {
        self.view_cursor
    }

    /// Quilt-level progress: total per-view passes divided by view count
    pub fn samples(&self) -> f32 {
        let total: f32 = self.view_states.iter().map(|s| s.samples).sum();
        total / self.view_states.len() as f32
    }

    /// Resize the shared quilt target; reallocation clears all per-view
    /// progress.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        let reallocated = self.inner.resize(width, height)?;
        if reallocated {
            self.reset()?;
        }
        Ok(reallocated)
    }

    /// One inner tile step for the current view; advances the view
    /// cursor when that view's pass completes.
    pub fn step(&mut self, backend: &mut dyn SamplingBackend) -> Result<StepOutcome> {
        let view = self.view_cursor;
        let camera = self.geometry.view_camera(&self.base_camera, view);
        self.inner.set_camera(&camera);
        self.inner.set_subframe(self.geometry.subframe(view));
        self.inner
            .restore_sample_state(self.view_states[view as usize]);

        let outcome = self.inner.step(backend)?;
        self.view_states[view as usize] = self.inner.sample_state();

        if outcome.pass_completed {
            self.view_cursor = (self.view_cursor + 1) % self.view_states.len() as u32;
        }

        Ok(StepOutcome {
            samples: self.samples(),
            ..outcome
        })
    }

    /// Clears the per-view tile cursors and the outer view cycle
    pub fn reset(&mut self) -> Result<()> {
        self.inner.reset()?;
        let seed = self.inner.sample_state().seed;
        for state in self.view_states.iter_mut() {
            *state = SampleState::fresh(seed);
        }
        self.view_cursor = 0;
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TileRequest;
    use crate::error::Result;
    use crate::scene::SceneSnapshot;
    use crate::targets::RenderTargetSet;
    use crate::tiles::TileRect;

    struct RecordingBackend {
        rects: Vec<TileRect>,
    }

    impl SamplingBackend for RecordingBackend {
        fn bind_scene(&mut self, _snapshot: &SceneSnapshot) -> Result<()> {
            Ok(())
        }
        fn render_tile(
            &mut self,
            _targets: &mut RenderTargetSet,
            request: &TileRequest<'_>,
        ) -> Result<()> {
            self.rects.push(request.scissor);
            Ok(())
        }
    }

    fn two_view_quilt() -> QuiltScheduler {
        let geometry = DisplayGeometry {
            view_count: 2,
            quilt_columns: 2,
            quilt_rows: 1,
            ..Default::default()
        };
        let mut quilt = QuiltScheduler::new(&GpuContext::NotAvailable, geometry);
        quilt.inner_mut().set_tiles(2, 1);
        quilt.resize(64, 32).unwrap();
        quilt
    }

    #[test]
    fn samples_normalized_by_view_count() {
        let mut quilt = two_view_quilt();
        let mut backend = RecordingBackend { rects: Vec::new() };

        // View 0: one full 2-tile pass.
        quilt.step(&mut backend).unwrap();
        let out = quilt.step(&mut backend).unwrap();
        assert!(out.pass_completed);
        assert_eq!(quilt.samples(), 0.5);
        assert_eq!(quilt.view_cursor(), 1);

        // View 1 completes the quilt sample.
        quilt.step(&mut backend).unwrap();
        quilt.step(&mut backend).unwrap();
        assert_eq!(quilt.samples(), 1.0);
        assert_eq!(quilt.view_cursor(), 0);
    }

    #[test]
    fn views_render_into_their_quilt_cells() {
        let mut quilt = two_view_quilt();
        let mut backend = RecordingBackend { rects: Vec::new() };
        for _ in 0..4 {
            quilt.step(&mut backend).unwrap();
        }
        // First view's tiles stay in the left half, second view's in the
        // right half of the 64-wide quilt.
        assert!(backend.rects[0..2].iter().all(|r| r.x + r.width <= 32));
        assert!(backend.rects[2..4].iter().all(|r| r.x >= 32));
    }

    #[test]
    fn reset_clears_view_cycle_and_tile_cursor() {
        let mut quilt = two_view_quilt();
        let mut backend = RecordingBackend { rects: Vec::new() };
        for _ in 0..3 {
            quilt.step(&mut backend).unwrap();
        }
        assert_eq!(quilt.view_cursor(), 1);
        quilt.reset().unwrap();
        assert_eq!(quilt.view_cursor(), 0);
        assert_eq!(quilt.samples(), 0.0);
        assert_eq!(quilt.inner().sample_state().tile_cursor, 0);
    }

    #[test]
    fn derived_views_spread_across_the_cone() {
        let geometry = DisplayGeometry {
            view_count: 3,
            ..Default::default()
        };
        let base = *TileScheduler::new(&GpuContext::NotAvailable).camera();
        let left = geometry.view_camera(&base, 0);
        let center = geometry.view_camera(&base, 1);
        let right = geometry.view_camera(&base, 2);

        let spread_l = (left.position - base.position).dot(base.right());
        let spread_c = (center.position - base.position).length();
        let spread_r = (right.position - base.position).dot(base.right());
        assert!(spread_l < 0.0);
        assert!(spread_c < 1e-6);
        assert!(spread_r > 0.0);
        assert!((spread_l + spread_r).abs() < 1e-5);
    }
}
