// src/orchestrator.rs
// RenderOrchestrator: binds scene + camera to the schedulers, advances
// accumulation once per host frame, and decides what the application
// composites to the screen (fallback, low-res preview, converging image).
// RELEVANT FILES:src/scheduler.rs,src/scene/build.rs,src/config.rs,src/backend.rs

use std::time::Instant;

use crate::accel::Parallelism;
use crate::backend::{Rasterizer, SamplingBackend};
use crate::camera::CameraView;
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;
use crate::scene::{GenerateResult, SceneBuildPipeline, SceneGraph};
use crate::scheduler::TileScheduler;

/// Wall-clock source, injectable so tests can drive fades manually
pub trait Clock {
    /// Monotonic seconds since an arbitrary origin
    fn now(&self) -> f64;
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
    /// Used while low-res and full-res partial images sum to coverage
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeSource {
    /// Rasterized preview of the scene
    Fallback,
    /// The low-resolution accumulation target
    LowRes,
    /// The full-resolution accumulation target
    FullRes,
}

/// One image the application must composite this frame, in order
#[derive(Debug, Clone, Copy)]
pub struct CompositeOp {
    pub source: CompositeSource,
    pub blend: BlendMode,
    pub opacity: f32,
}

/// What one `render_sample` call did
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Composite list, in draw order; never empty after a scene bind
    pub ops: Vec<CompositeOp>,
    /// Whether the full-resolution scheduler advanced a tile
    pub stepped: bool,
    pub samples: f32,
    pub fade: f32,
}

/// Top-level policy layer owning the build pipeline and both schedulers.
pub struct RenderOrchestrator {
    pipeline: SceneBuildPipeline,
    full: TileScheduler,
    low: TileScheduler,
    config: RenderConfig,
    clock: Box<dyn Clock>,
    camera: CameraView,
    drawing_size: (u32, u32),
    reset_time: Option<f64>,
    fade_start: Option<f64>,
    fade: f32,
    paused: bool,
    path_tracing_enabled: bool,
    scene_bound: bool,
}

impl RenderOrchestrator {
    pub fn new(gpu: &GpuContext, config: RenderConfig) -> Self {
        Self::with_clock(gpu, config, Box::new(SystemClock::new()))
    }

    pub fn with_clock(gpu: &GpuContext, config: RenderConfig, clock: Box<dyn Clock>) -> Self {
        let camera = *TileScheduler::new(gpu).camera();
        let mut low = TileScheduler::new(gpu);
        // The preview pass trades tiling for latency: one tile per pass
        // so every host frame refreshes the whole preview image.
        low.set_tiles(1, 1);
        Self {
            pipeline: SceneBuildPipeline::new(Parallelism::Auto),
            full: TileScheduler::new(gpu),
            low,
            config,
            clock,
            camera,
            drawing_size: (1, 1),
            reset_time: None,
            fade_start: None,
            fade: 0.0,
            paused: false,
            path_tracing_enabled: true,
            scene_bound: false,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RenderConfig {
        &mut self.config
    }

    /// Read-only progress counter of the converging image
    pub fn samples(&self) -> f32 {
        self.full.samples()
    }

    pub fn fade(&self) -> f32 {
        self.fade
    }

    pub fn pipeline(&self) -> &SceneBuildPipeline {
        &self.pipeline
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_path_tracing_enabled(&mut self, enabled: bool) {
        self.path_tracing_enabled = enabled;
    }

    /// Drawing-buffer size the displayed image is composited into;
    /// target resolutions are re-synced from it inside `render_sample`.
    pub fn set_drawing_size(&mut self, width: u32, height: u32) {
        self.drawing_size = (width.max(1), height.max(1));
    }

    /// Builds (or refits) the scene, re-binds sampling resources, and
    /// restarts accumulation from sample zero.
    pub fn set_scene(
        &mut self,
        graph: &SceneGraph,
        camera: &CameraView,
        backend: &mut dyn SamplingBackend,
    ) -> Result<GenerateResult> {
        self.set_scene_with_progress(graph, camera, backend, |_| {})
    }

    pub fn set_scene_with_progress(
        &mut self,
        graph: &SceneGraph,
        camera: &CameraView,
        backend: &mut dyn SamplingBackend,
        progress: impl FnMut(f32),
    ) -> Result<GenerateResult> {
        let result = self.pipeline.generate_with_progress(graph, progress)?;
        self.bind_current(camera, backend)?;
        Ok(result)
    }

    /// Starts an asynchronous scene build; completes with
    /// `finish_scene_async`. A second start before completion is
    /// rejected with `AlreadyRunning`.
    pub fn set_scene_async(&mut self, graph: &SceneGraph) -> Result<()> {
        self.pipeline.generate_async(graph)
    }

    pub fn is_scene_building(&self) -> bool {
        self.pipeline.is_building()
    }

    /// Joins the outstanding asynchronous build, then re-binds and
    /// resets exactly like the synchronous path.
    pub fn finish_scene_async(
        &mut self,
        camera: &CameraView,
        backend: &mut dyn SamplingBackend,
    ) -> Result<GenerateResult> {
        let result = self.pipeline.finish_async()?;
        self.bind_current(camera, backend)?;
        Ok(result)
    }

    fn bind_current(
        &mut self,
        camera: &CameraView,
        backend: &mut dyn SamplingBackend,
    ) -> Result<()> {
        let snapshot = self
            .pipeline
            .snapshot()
            .ok_or_else(|| RenderError::precondition("scene build produced no snapshot"))?;
        backend.bind_scene(snapshot)?;
        self.camera = *camera;
        self.scene_bound = true;
        self.update_camera()
    }

    pub fn set_camera(&mut self, camera: &CameraView) {
        self.camera = *camera;
    }

    pub fn camera(&self) -> &CameraView {
        &self.camera
    }

    /// Push the camera's current matrices into both schedulers and
    /// restart their accumulation.
    pub fn update_camera(&mut self) -> Result<()> {
        self.full.set_camera(&self.camera);
        self.low.set_camera(&self.camera);
        self.reset()
    }

    /// Cancel in-flight accumulation and restart from sample 0
    pub fn reset(&mut self) -> Result<()> {
        self.full.reset()?;
        self.low.reset()?;
        self.fade = 0.0;
        self.fade_start = None;
        self.reset_time = None;
        Ok(())
    }

    /// Advance exactly one host-frame's worth of scheduling and return
    /// the composite list for display.
    pub fn render_sample(
        &mut self,
        backend: &mut dyn SamplingBackend,
        rasterizer: &mut dyn Rasterizer,
    ) -> Result<FrameOutput> {
        if !self.scene_bound {
            return Err(RenderError::precondition(
                "render_sample called before a successful set_scene",
            ));
        }

        self.apply_config();
        self.sync_resolution()?;

        let now = self.clock.now();
        let reset_time = *self.reset_time.get_or_insert(now);

        // 1. Advance full-resolution accumulation after the configured
        //    post-reset delay.
        let mut stepped = false;
        if !self.paused
            && self.path_tracing_enabled
            && now - reset_time >= self.config.render_delay as f64
        {
            self.full.step(backend)?;
            stepped = true;
        }

        // 2. Fade ramps 0 -> 1 once enough samples accumulated.
        if self.path_tracing_enabled && self.full.samples() >= self.config.min_samples {
            let fade_start = *self.fade_start.get_or_insert(now);
            self.fade = if self.config.fade_duration <= 0.0 {
                1.0
            } else {
                (((now - fade_start) / self.config.fade_duration as f64).min(1.0)) as f32
            };
        }

        // 3. Emit the composite list. While warming up, either the
        //    rasterized fallback or a continuously-updated low-res
        //    accumulation keeps the screen non-blank; the converging
        //    image is laid over it with the fade opacity.
        let mut ops = Vec::with_capacity(2);
        let crossfading_low_res = self.config.dynamic_low_res && self.fade < 1.0;

        if !self.path_tracing_enabled || self.fade < 1.0 {
            if self.config.dynamic_low_res {
                self.low.step(backend)?;
                ops.push(CompositeOp {
                    source: CompositeSource::LowRes,
                    blend: BlendMode::Additive,
                    opacity: 1.0 - self.fade,
                });
            } else {
                let snapshot = self
                    .pipeline
                    .snapshot()
                    .ok_or_else(|| RenderError::precondition("scene unbound mid-frame"))?;
                rasterizer.render(snapshot, &self.camera)?;
                ops.push(CompositeOp {
                    source: CompositeSource::Fallback,
                    blend: BlendMode::Normal,
                    opacity: 1.0,
                });
            }
        }

        if self.path_tracing_enabled && self.fade > 0.0 {
            ops.push(CompositeOp {
                source: CompositeSource::FullRes,
                blend: if crossfading_low_res {
                    BlendMode::Additive
                } else {
                    BlendMode::Normal
                },
                opacity: self.fade,
            });
        }

        debug_assert!(!ops.is_empty(), "displayed frame would be blank");
        Ok(FrameOutput {
            ops,
            stepped,
            samples: self.full.samples(),
            fade: self.fade,
        })
    }

    pub fn full_scheduler(&self) -> &TileScheduler {
        &self.full
    }

    pub fn low_scheduler(&self) -> &TileScheduler {
        &self.low
    }

    pub fn dispose(&mut self) {
        self.full.dispose();
        self.low.dispose();
    }

    fn apply_config(&mut self) {
        let c = self.config;
        self.full.set_tiles(c.tiles.0, c.tiles.1);
        self.full.set_bounces(c.bounces);
        self.full.set_stable_tiles(c.stable_tiles);
        self.full.set_stable_noise(c.stable_noise);
        self.low.set_bounces(c.bounces.min(2));
        self.low.set_stable_noise(c.stable_noise);
    }

    fn sync_resolution(&mut self) -> Result<()> {
        let (dw, dh) = self.drawing_size;
        let scale = self.config.render_scale.max(0.01);
        let fw = ((dw as f32 * scale) as u32).max(1);
        let fh = ((dh as f32 * scale) as u32).max(1);
        let full_resized = self.full.resize(fw, fh)?;

        let low_scale = self.config.low_res_scale.clamp(0.01, 1.0);
        let lw = ((dw as f32 * low_scale) as u32).max(1);
        let lh = ((dh as f32 * low_scale) as u32).max(1);
        let low_resized = self.low.resize(lw, lh)?;

        if full_resized || low_resized {
            // Accumulation restarted under us; the fade clock restarts
            // with it.
            self.fade = 0.0;
            self.fade_start = None;
            self.reset_time = None;
        }
        Ok(())
    }
}
