// src/accel/types.rs
// Core types for the BVH spatial index: AABB, nodes, triangles, build options.
// GPU-compatible layouts so CPU-built trees can be uploaded without repacking.
// RELEVANT FILES:src/accel/sah.rs,src/accel/parallel.rs,src/accel/mod.rs

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Axis-aligned bounding box, padded to a GPU-friendly 32-byte layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    pub min: [f32; 3],
    pub _pad0: f32,
    pub max: [f32; 3],
    pub _pad1: f32,
}

impl Aabb {
    /// Inverted bounds, the identity for union operations
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            _pad0: 0.0,
            max: [f32::NEG_INFINITY; 3],
            _pad1: 0.0,
        }
    }

    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min,
            _pad0: 0.0,
            max,
            _pad1: 0.0,
        }
    }

    pub fn grow_point(&mut self, p: [f32; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn grow(&mut self, other: &Aabb) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    pub fn union(a: &Aabb, b: &Aabb) -> Aabb {
        let mut out = *a;
        out.grow(b);
        out
    }

    pub fn centroid(&self) -> Vec3 {
        (Vec3::from(self.min) + Vec3::from(self.max)) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        Vec3::from(self.max) - Vec3::from(self.min)
    }

    /// min <= max on every axis
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }

    /// Surface area for SAH split cost
    pub fn surface_area(&self) -> f32 {
        let e = self.extent();
        if e.x < 0.0 || e.y < 0.0 || e.z < 0.0 {
            return 0.0;
        }
        2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.min[i] && self.max[i] >= other.max[i])
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// One world-space triangle handed to the index builder
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    pub v0: [f32; 3],
    pub _pad0: f32,
    pub v1: [f32; 3],
    pub _pad1: f32,
    pub v2: [f32; 3],
    pub _pad2: f32,
}

impl Triangle {
    pub fn new(v0: [f32; 3], v1: [f32; 3], v2: [f32; 3]) -> Self {
        Self {
            v0,
            _pad0: 0.0,
            v1,
            _pad1: 0.0,
            v2,
            _pad2: 0.0,
        }
    }

    pub fn aabb(&self) -> Aabb {
        let mut out = Aabb::empty();
        out.grow_point(self.v0);
        out.grow_point(self.v1);
        out.grow_point(self.v2);
        out
    }
}

/// BVH node, layout shared with the GPU traversal kernel
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BvhNode {
    pub aabb: Aabb,
    /// 0 = internal, 1 = leaf
    pub kind: u32,
    /// internal: left child index; leaf: first primitive slot
    pub left: u32,
    /// internal: right child index; leaf: primitive count
    pub right: u32,
    pub parent: u32,
}

pub const NODE_INTERNAL: u32 = 0;
pub const NODE_LEAF: u32 = 1;

impl BvhNode {
    pub fn internal(aabb: Aabb, left: u32, right: u32) -> Self {
        Self {
            aabb,
            kind: NODE_INTERNAL,
            left,
            right,
            parent: u32::MAX,
        }
    }

    pub fn leaf(aabb: Aabb, first: u32, count: u32) -> Self {
        Self {
            aabb,
            kind: NODE_LEAF,
            left: first,
            right: count,
            parent: u32::MAX,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NODE_LEAF
    }
}

/// Build parameters
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Stop splitting below this primitive count
    pub max_leaf_size: u32,
    /// Hard recursion cap
    pub max_depth: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            max_depth: 48,
        }
    }
}

/// Statistics reported for diagnostics after a build
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    pub build_time_ms: f32,
    pub leaf_count: u32,
    pub internal_count: u32,
    pub max_depth: u32,
}

/// A built spatial index: node array plus the primitive index
/// permutation leaves refer into.
#[derive(Debug)]
pub struct BvhHandle {
    pub nodes: Vec<BvhNode>,
    pub indices: Vec<u32>,
    pub world_aabb: Aabb,
    pub triangle_count: u32,
    pub stats: BuildStats,
}

/// Union of all triangle bounds
pub fn scene_aabb(triangles: &[Triangle]) -> Aabb {
    let mut out = Aabb::empty();
    for t in triangles {
        out.grow(&t.aabb());
    }
    out
}

/// Per-primitive bounds in triangle order
pub fn triangle_aabbs(triangles: &[Triangle]) -> Vec<Aabb> {
    triangles.iter().map(|t| t.aabb()).collect()
}
