//! Progressive tile-based path tracing scheduler.
//!
//! Drives a GPU-executed stochastic sampling backend incrementally
//! across host frames: a scene graph is flattened into a BVH-indexed
//! snapshot, one tile of one sample pass is rendered per `step()`, and
//! an orchestrator crossfades the converging image over a rasterized or
//! low-resolution preview. The sampling math itself, the rasterizer,
//! and any denoise stage are external collaborators behind traits.

pub mod accel;
pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod gpu;
pub mod multiview;
pub mod orchestrator;
pub mod scene;
pub mod scheduler;
pub mod targets;
pub mod tiles;

pub use backend::{DenoiseStage, Rasterizer, SamplingBackend, TileRequest};
pub use camera::{CameraView, Projection};
pub use config::RenderConfig;
pub use error::{RenderError, Result};
pub use gpu::GpuContext;
pub use multiview::{DisplayGeometry, QuiltScheduler};
pub use orchestrator::{
    BlendMode, Clock, CompositeOp, CompositeSource, FrameOutput, RenderOrchestrator, SystemClock,
};
pub use scene::{
    Background, ColorSpace, GenerateResult, Light, LightKind, Material, MeshData, NodeKind,
    SceneBuildPipeline, SceneGraph, SceneNode, SceneSnapshot, SceneStats, TextureRef,
    TextureSource,
};
pub use scheduler::{SampleState, StepOutcome, TileScheduler};
pub use targets::{RenderTargetSet, TargetRole};
pub use tiles::{SubFrame, TileGrid, TileRect};
