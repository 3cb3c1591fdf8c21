// src/tiles.rs
// Tile grid arithmetic for one sample pass.
// Breaks the active sub-frame region into a W x H partition of scissor
// rects, visited one per step() call.
// RELEVANT FILES:src/scheduler.rs,src/targets.rs

use serde::{Deserialize, Serialize};

/// Normalized viewport rectangle addressing a sub-region of a shared
/// target; multi-view rendering points each view at its quilt cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubFrame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SubFrame {
    pub const FULL: SubFrame = SubFrame {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };
}

impl Default for SubFrame {
    fn default() -> Self {
        Self::FULL
    }
}

/// Pixel-space scissor rectangle for one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Logical tile partition of the active sub-frame, derived once per pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    tiles_x: u32,
    tiles_y: u32,
    region: TileRect,
}

impl TileGrid {
    pub fn new(tiles_x: u32, tiles_y: u32, target_width: u32, target_height: u32) -> Self {
        Self::with_subframe(tiles_x, tiles_y, target_width, target_height, SubFrame::FULL)
    }

    pub fn with_subframe(
        tiles_x: u32,
        tiles_y: u32,
        target_width: u32,
        target_height: u32,
        subframe: SubFrame,
    ) -> Self {
        let x0 = (subframe.x * target_width as f32).round().max(0.0) as u32;
        let y0 = (subframe.y * target_height as f32).round().max(0.0) as u32;
        let x1 = ((subframe.x + subframe.width) * target_width as f32)
            .round()
            .min(target_width as f32) as u32;
        let y1 = ((subframe.y + subframe.height) * target_height as f32)
            .round()
            .min(target_height as f32) as u32;
        Self {
            tiles_x: tiles_x.max(1),
            tiles_y: tiles_y.max(1),
            region: TileRect {
                x: x0,
                y: y0,
                width: x1.saturating_sub(x0),
                height: y1.saturating_sub(y0),
            },
        }
    }

    pub fn total(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.tiles_x, self.tiles_y)
    }

    pub fn region(&self) -> TileRect {
        self.region
    }

    /// Scissor rect for tile `index` in raster order. Tile edges come
    /// from exact integer partition, so the grid tiles the region with
    /// no gaps, overlaps, or phantom empty columns.
    pub fn tile_rect(&self, index: u32) -> TileRect {
        debug_assert!(index < self.total());
        let cx = index % self.tiles_x;
        let cy = index / self.tiles_x;

        let x0 = self.region.x + cx * self.region.width / self.tiles_x;
        let x1 = self.region.x + (cx + 1) * self.region.width / self.tiles_x;
        let y0 = self.region.y + cy * self.region.height / self.tiles_y;
        let y1 = self.region.y + (cy + 1) * self.region.height / self.tiles_y;

        TileRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}
