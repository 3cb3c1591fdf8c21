// src/scene/mod.rs
// Scene graph input model: nodes, meshes, materials, textures, lights.
// This is the authoring-side structure the build pipeline flattens into a
// traversal-ready SceneSnapshot.
// RELEVANT FILES:src/scene/build.rs,src/accel/mod.rs

pub mod build;

pub use build::{
    GenerateResult, GeometryBuffers, ResolvedLight, ResolvedMaterial, SceneBuildPipeline,
    SceneSnapshot, SceneStats,
};

use glam::Mat4;

/// Identity of a texture's pixel source (image handle, not pixel data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSource(pub u64);

/// Declared interpretation of a texture's pixel values.
///
/// Part of the deduplication key: the same pixel source consumed in two
/// color spaces is two distinct GPU resources, because samplers bake the
/// transfer function into how texels are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// A texture binding on a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureRef {
    pub source: TextureSource,
    pub color_space: ColorSpace,
}

impl TextureRef {
    pub fn srgb(source: u64) -> Self {
        Self {
            source: TextureSource(source),
            color_space: ColorSpace::Srgb,
        }
    }

    pub fn linear(source: u64) -> Self {
        Self {
            source: TextureSource(source),
            color_space: ColorSpace::Linear,
        }
    }
}

/// Authoring-side material; deduplicated by value during the build
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color: [f32; 4],
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: [f32; 3],
    pub base_color_map: Option<TextureRef>,
    pub normal_map: Option<TextureRef>,
    pub roughness_map: Option<TextureRef>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            roughness: 1.0,
            metalness: 0.0,
            emissive: [0.0; 3],
            base_color_map: None,
            normal_map: None,
            roughness_map: None,
        }
    }
}

/// Mesh vertex data. Positions and indices are required; the remaining
/// attribute arrays are optional and padded with defaults when merged.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub tangents: Option<Vec<[f32; 4]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub indices: Vec<u32>,
    pub material: Material,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Directional,
}

#[derive(Debug, Clone)]
pub struct Light {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

/// Scene background consumed by ray misses and the rasterized fallback
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    Color([f32; 3]),
    Texture(TextureRef),
}

impl Default for Background {
    fn default() -> Self {
        Background::Color([0.0; 3])
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(MeshData),
    Light(Light),
}

/// One node in the flat scene graph
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub parent: Option<u32>,
    pub transform: Mat4,
    pub visible: bool,
    pub kind: NodeKind,
}

/// Flat scene graph with parent links.
///
/// Nodes are stored parent-before-child (enforced by `add_node`), so a
/// single forward pass can resolve world transforms.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    pub background: Background,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node; the parent, when given, must already exist.
    pub fn add_node(&mut self, parent: Option<u32>, transform: Mat4, kind: NodeKind) -> u32 {
        if let Some(p) = parent {
            assert!(
                (p as usize) < self.nodes.len(),
                "parent node {} does not exist yet",
                p
            );
        }
        self.nodes.push(SceneNode {
            parent,
            transform,
            visible: true,
            kind,
        });
        (self.nodes.len() - 1) as u32
    }

    pub fn add_mesh(&mut self, parent: Option<u32>, transform: Mat4, mesh: MeshData) -> u32 {
        self.add_node(parent, transform, NodeKind::Mesh(mesh))
    }

    pub fn add_light(&mut self, parent: Option<u32>, transform: Mat4, light: Light) -> u32 {
        self.add_node(parent, transform, NodeKind::Light(light))
    }

    pub fn node(&self, id: u32) -> &SceneNode {
        &self.nodes[id as usize]
    }

    pub fn node_mut(&mut self, id: u32) -> &mut SceneNode {
        &mut self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    /// World transform by parent-chain multiplication
    pub fn world_transform(&self, id: u32) -> Mat4 {
        let node = &self.nodes[id as usize];
        match node.parent {
            Some(p) => self.world_transform(p) * node.transform,
            None => node.transform,
        }
    }

    /// A node renders only when it and all ancestors are visible
    pub fn effectively_visible(&self, id: u32) -> bool {
        let node = &self.nodes[id as usize];
        if !node.visible {
            return false;
        }
        match node.parent {
            Some(p) => self.effectively_visible(p),
            None => true,
        }
    }
}
