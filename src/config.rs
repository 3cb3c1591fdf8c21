// src/config.rs
// Enumerated render configuration consumed by the orchestrator and schedulers.
// This file exists so every tunable is an explicit documented field instead of a dynamic key/value bag.
// RELEVANT FILES:src/orchestrator.rs,src/scheduler.rs,src/tiles.rs

use serde::{Deserialize, Serialize};

/// Configuration for progressive rendering.
///
/// All duration fields are in seconds. Changes to `tiles` take effect at
/// the next sample-pass boundary; changes to scale fields take effect at
/// the next resolution sync inside `render_sample`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Tile grid dimensions (columns, rows) for one sample pass
    pub tiles: (u32, u32),
    /// Maximum path depth forwarded to the sampling backend
    pub bounces: u32,
    /// Full-resolution target scale relative to the drawing buffer
    pub render_scale: f32,
    /// Accumulated samples required before the crossfade may start
    pub min_samples: f32,
    /// Seconds to wait after a reset before accumulation starts
    pub render_delay: f32,
    /// Seconds over which the converging image fades in
    pub fade_duration: f32,
    /// Show a continuously-updated low-resolution accumulation instead of
    /// the rasterized fallback while the full-resolution image warms up
    pub dynamic_low_res: bool,
    /// Low-resolution target scale relative to the drawing buffer
    pub low_res_scale: f32,
    /// Visit tiles in fixed raster order (required when a temporal or
    /// denoise stage expects a deterministic coverage pattern); when
    /// false, a round-robin cursor spreads coverage across frames
    pub stable_tiles: bool,
    /// Reuse the same stratification sequence after every reset so a
    /// static scene converges to an identical image
    pub stable_noise: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tiles: (2, 2),
            bounces: 4,
            render_scale: 1.0,
            min_samples: 4.0,
            render_delay: 0.0,
            fade_duration: 0.5,
            dynamic_low_res: false,
            low_res_scale: 0.25,
            stable_tiles: true,
            stable_noise: false,
        }
    }
}

impl RenderConfig {
    pub fn with_tiles(mut self, x: u32, y: u32) -> Self {
        self.tiles = (x.max(1), y.max(1));
        self
    }

    pub fn with_dynamic_low_res(mut self, scale: f32) -> Self {
        self.dynamic_low_res = true;
        self.low_res_scale = scale;
        self
    }

    /// Tiles per sample pass for the current grid setting
    pub fn total_tiles(&self) -> u32 {
        self.tiles.0.max(1) * self.tiles.1.max(1)
    }
}
