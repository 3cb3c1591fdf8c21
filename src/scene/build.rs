// src/scene/build.rs
// SceneBuildPipeline: flattens a scene graph into merged geometry buffers,
// deduplicated material/texture lists, a light list, and a BVH.
// A repeat generate() with unchanged membership refits bounds instead of
// rebuilding; an async variant moves the index build onto a worker thread.
// RELEVANT FILES:src/scene/mod.rs,src/accel/mod.rs,src/orchestrator.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use glam::{Mat3, Mat4, Vec3};

use crate::accel::{
    create_builder, BuildOptions, BuildStats, BvhHandle, Parallelism, SpatialIndexBuilder,
    Triangle,
};
use crate::error::{RenderError, Result};
use crate::scene::{Background, LightKind, MeshData, NodeKind, SceneGraph, TextureRef};

/// Merged vertex/index buffers. Optional authoring attributes are padded
/// with defaults so every array has one entry per merged vertex.
#[derive(Debug, Clone, Default)]
pub struct GeometryBuffers {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 4]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
    /// One entry per triangle, indexing into the deduplicated material list
    pub material_ids: Vec<u32>,
}

impl GeometryBuffers {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn triangles(&self) -> Vec<Triangle> {
        self.indices
            .chunks_exact(3)
            .map(|tri| {
                Triangle::new(
                    self.positions[tri[0] as usize],
                    self.positions[tri[1] as usize],
                    self.positions[tri[2] as usize],
                )
            })
            .collect()
    }
}

/// Material with texture slots resolved to deduplicated list indices
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMaterial {
    pub base_color: [f32; 4],
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: [f32; 3],
    pub base_color_map: Option<u32>,
    pub normal_map: Option<u32>,
    pub roughness_map: Option<u32>,
}

/// Light with its transform baked in
#[derive(Debug, Clone)]
pub struct ResolvedLight {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: [f32; 3],
    pub direction: [f32; 3],
}

/// Immutable-until-rebuilt bundle the scheduler traverses.
///
/// Owned by the pipeline that produced it; consumers hold a read
/// reference and must go through `generate()` for any geometry change.
#[derive(Debug)]
pub struct SceneSnapshot {
    pub geometry: GeometryBuffers,
    pub index: BvhHandle,
    pub materials: Vec<ResolvedMaterial>,
    pub textures: Vec<TextureRef>,
    pub lights: Vec<ResolvedLight>,
    pub background: Background,
}

/// Outcome of one `generate()` call
#[derive(Debug, Clone, Copy)]
pub struct GenerateResult {
    /// False when only a bounds refit ran, in which case GPU-side BVH
    /// buffers need no re-upload
    pub bvh_changed: bool,
    pub stats: SceneStats,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SceneStats {
    pub triangle_count: u32,
    pub vertex_count: u32,
    pub material_count: u32,
    pub texture_count: u32,
    pub light_count: u32,
    pub build: BuildStats,
}

/// Per-mesh placement inside the merged buffers, cached for refit
#[derive(Debug, Clone)]
struct MeshEntry {
    node: u32,
    vertex_offset: u32,
    vertex_count: u32,
    index_offset: u32,
    index_count: u32,
    /// Winding was reversed at merge time (negative-determinant transform)
    flipped: bool,
}

#[derive(Debug, Clone)]
struct BuildCache {
    /// Membership + topology key: (node, vertex count, index count) per
    /// visible mesh, in traversal order
    signature: Vec<(u32, u32, u32)>,
    entries: Vec<MeshEntry>,
    fallback: bool,
}

struct MergedScene {
    geometry: GeometryBuffers,
    materials: Vec<ResolvedMaterial>,
    textures: Vec<TextureRef>,
    entries: Vec<MeshEntry>,
    fallback: bool,
}

enum Pending {
    /// Refit completed synchronously during generate_async
    Ready(GenerateResult),
    Building {
        worker: JoinHandle<Result<BvhHandle>>,
        staged: Box<StagedBuild>,
    },
}

struct StagedBuild {
    geometry: GeometryBuffers,
    materials: Vec<ResolvedMaterial>,
    textures: Vec<TextureRef>,
    lights: Vec<ResolvedLight>,
    background: Background,
    entries: Vec<MeshEntry>,
    signature: Vec<(u32, u32, u32)>,
    fallback: bool,
}

/// Converts a scene graph into a SceneSnapshot, caching enough state to
/// refit instead of rebuild when only transforms change.
pub struct SceneBuildPipeline {
    builder: Arc<dyn SpatialIndexBuilder>,
    options: BuildOptions,
    snapshot: Option<SceneSnapshot>,
    cache: Option<BuildCache>,
    pending: Option<Pending>,
}

impl SceneBuildPipeline {
    pub fn new(parallelism: Parallelism) -> Self {
        Self {
            builder: Arc::from(create_builder(parallelism)),
            options: BuildOptions::default(),
            snapshot: None,
            cache: None,
            pending: None,
        }
    }

    pub fn with_build_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn snapshot(&self) -> Option<&SceneSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn builder_name(&self) -> &'static str {
        self.builder.name()
    }

    /// Full or incremental scene build. Unchanged mesh membership and
    /// topology takes the refit path (`bvh_changed == false`).
    pub fn generate(&mut self, graph: &SceneGraph) -> Result<GenerateResult> {
        self.generate_with_progress(graph, |_| {})
    }

    /// `generate` with a coarse progress callback in [0, 1]
    pub fn generate_with_progress(
        &mut self,
        graph: &SceneGraph,
        mut progress: impl FnMut(f32),
    ) -> Result<GenerateResult> {
        if self.pending.is_some() {
            return Err(RenderError::AlreadyRunning("scene build"));
        }
        progress(0.0);

        let signature = membership_signature(graph)?;
        if self.can_refit(&signature) {
            let result = self.refit_in_place(graph)?;
            progress(1.0);
            return Ok(result);
        }

        let merged = merge_scene(graph)?;
        let lights = resolve_lights(graph);
        progress(0.5);

        let triangles = merged.geometry.triangles();
        let index = self.builder.build(&triangles, &self.options)?;
        progress(1.0);

        Ok(self.install(merged, lights, graph.background.clone(), signature, index))
    }

    /// Starts an asynchronous build. The merge runs on the calling
    /// thread; the index build runs on a worker. A second call (or a
    /// sync `generate`) before `finish_async` is rejected.
    pub fn generate_async(&mut self, graph: &SceneGraph) -> Result<()> {
        if self.pending.is_some() {
            return Err(RenderError::AlreadyRunning("scene build"));
        }

        let signature = membership_signature(graph)?;
        if self.can_refit(&signature) {
            let result = self.refit_in_place(graph)?;
            self.pending = Some(Pending::Ready(result));
            return Ok(());
        }

        let merged = merge_scene(graph)?;
        let lights = resolve_lights(graph);
        let triangles = merged.geometry.triangles();
        let builder = Arc::clone(&self.builder);
        let options = self.options;
        let worker = std::thread::spawn(move || builder.build(&triangles, &options));

        self.pending = Some(Pending::Building {
            worker,
            staged: Box::new(StagedBuild {
                geometry: merged.geometry,
                materials: merged.materials,
                textures: merged.textures,
                lights,
                background: graph.background.clone(),
                entries: merged.entries,
                signature,
                fallback: merged.fallback,
            }),
        });
        Ok(())
    }

    /// True while an asynchronous build has not been finished
    pub fn is_building(&self) -> bool {
        self.pending.is_some()
    }

    /// Joins the outstanding asynchronous build and installs the result.
    /// Errors from the worker propagate to this caller.
    pub fn finish_async(&mut self) -> Result<GenerateResult> {
        match self.pending.take() {
            None => Err(RenderError::precondition(
                "finish_async called with no build outstanding",
            )),
            Some(Pending::Ready(result)) => Ok(result),
            Some(Pending::Building { worker, staged }) => {
                let index = worker
                    .join()
                    .map_err(|_| RenderError::build("index build worker panicked"))??;
                let staged = *staged;
                let merged = MergedScene {
                    geometry: staged.geometry,
                    materials: staged.materials,
                    textures: staged.textures,
                    entries: staged.entries,
                    fallback: staged.fallback,
                };
                Ok(self.install(
                    merged,
                    staged.lights,
                    staged.background,
                    staged.signature,
                    index,
                ))
            }
        }
    }

    fn can_refit(&self, signature: &[(u32, u32, u32)]) -> bool {
        self.snapshot.is_some()
            && self
                .cache
                .as_ref()
                .map_or(false, |c| c.signature == signature)
    }

    fn install(
        &mut self,
        merged: MergedScene,
        lights: Vec<ResolvedLight>,
        background: Background,
        signature: Vec<(u32, u32, u32)>,
        index: BvhHandle,
    ) -> GenerateResult {
        let stats = SceneStats {
            triangle_count: merged.geometry.triangle_count() as u32,
            vertex_count: merged.geometry.positions.len() as u32,
            material_count: merged.materials.len() as u32,
            texture_count: merged.textures.len() as u32,
            light_count: lights.len() as u32,
            build: index.stats,
        };
        self.snapshot = Some(SceneSnapshot {
            geometry: merged.geometry,
            index,
            materials: merged.materials,
            textures: merged.textures,
            lights,
            background,
        });
        self.cache = Some(BuildCache {
            signature,
            entries: merged.entries,
            fallback: merged.fallback,
        });
        log::debug!(
            "scene rebuild: {} tris, {} materials, {} textures ({})",
            stats.triangle_count,
            stats.material_count,
            stats.texture_count,
            self.builder.name()
        );
        GenerateResult {
            bvh_changed: true,
            stats,
        }
    }

    /// Re-transforms merged geometry from the (membership-identical)
    /// graph and refits the index bounds.
    fn refit_in_place(&mut self, graph: &SceneGraph) -> Result<GenerateResult> {
        let snapshot = self
            .snapshot
            .as_mut()
            .ok_or_else(|| RenderError::precondition("refit without a prior build"))?;
        let cache = self
            .cache
            .as_mut()
            .ok_or_else(|| RenderError::precondition("refit without cached build state"))?;

        if !cache.fallback {
            for entry in cache.entries.iter_mut() {
                let mesh = mesh_at(graph, entry.node)?;
                let world = graph.world_transform(entry.node);
                transform_into(&mut snapshot.geometry, entry, mesh, &world);

                let flipped = world.determinant() < 0.0;
                if flipped != entry.flipped {
                    reverse_winding(&mut snapshot.geometry.indices, entry);
                    entry.flipped = flipped;
                }
            }
        }
        snapshot.lights = resolve_lights(graph);
        snapshot.background = graph.background.clone();

        let triangles = snapshot.geometry.triangles();
        self.builder.refit(&mut snapshot.index, &triangles)?;

        let stats = SceneStats {
            triangle_count: snapshot.geometry.triangle_count() as u32,
            vertex_count: snapshot.geometry.positions.len() as u32,
            material_count: snapshot.materials.len() as u32,
            texture_count: snapshot.textures.len() as u32,
            light_count: snapshot.lights.len() as u32,
            build: snapshot.index.stats,
        };
        log::debug!("scene refit: {} tris", stats.triangle_count);
        Ok(GenerateResult {
            bvh_changed: false,
            stats,
        })
    }
}

fn mesh_at(graph: &SceneGraph, node: u32) -> Result<&MeshData> {
    match &graph.node(node).kind {
        NodeKind::Mesh(mesh) => Ok(mesh),
        _ => Err(RenderError::precondition(format!(
            "node {} is no longer a mesh",
            node
        ))),
    }
}

/// Membership + topology key for the refit decision. Also where the
/// missing-position precondition is enforced, so both generate paths
/// share the validation.
fn membership_signature(graph: &SceneGraph) -> Result<Vec<(u32, u32, u32)>> {
    let mut signature = Vec::new();
    for (id, node) in graph.nodes().iter().enumerate() {
        let id = id as u32;
        if !graph.effectively_visible(id) {
            continue;
        }
        if let NodeKind::Mesh(mesh) = &node.kind {
            validate_mesh(id, mesh)?;
            signature.push((id, mesh.positions.len() as u32, mesh.indices.len() as u32));
        }
    }
    Ok(signature)
}

fn validate_mesh(id: u32, mesh: &MeshData) -> Result<()> {
    if mesh.positions.is_empty() {
        return Err(RenderError::precondition(format!(
            "mesh node {} has no position attribute",
            id
        )));
    }
    if mesh.indices.len() % 3 != 0 {
        return Err(RenderError::precondition(format!(
            "mesh node {} index count {} is not a multiple of 3",
            id,
            mesh.indices.len()
        )));
    }
    let vertex_count = mesh.positions.len() as u32;
    if mesh.indices.iter().any(|&i| i >= vertex_count) {
        return Err(RenderError::precondition(format!(
            "mesh node {} has out-of-range indices",
            id
        )));
    }
    for (name, len) in [
        ("normals", mesh.normals.as_ref().map(Vec::len)),
        ("uvs", mesh.uvs.as_ref().map(Vec::len)),
    ] {
        if let Some(len) = len {
            if len != mesh.positions.len() {
                return Err(RenderError::precondition(format!(
                    "mesh node {} attribute {} length {} does not match {} positions",
                    id,
                    name,
                    len,
                    mesh.positions.len()
                )));
            }
        }
    }
    Ok(())
}

fn merge_scene(graph: &SceneGraph) -> Result<MergedScene> {
    let mut geometry = GeometryBuffers::default();
    let mut entries = Vec::new();
    let mut authored: Vec<crate::scene::Material> = Vec::new();
    let mut materials: Vec<ResolvedMaterial> = Vec::new();
    let mut textures: Vec<TextureRef> = Vec::new();
    let mut texture_slots: HashMap<TextureRef, u32> = HashMap::new();

    let mut intern_texture = |map: Option<TextureRef>,
                              textures: &mut Vec<TextureRef>,
                              slots: &mut HashMap<TextureRef, u32>|
     -> Option<u32> {
        map.map(|tex| {
            *slots.entry(tex).or_insert_with(|| {
                textures.push(tex);
                (textures.len() - 1) as u32
            })
        })
    };

    for (id, node) in graph.nodes().iter().enumerate() {
        let id = id as u32;
        if !graph.effectively_visible(id) {
            continue;
        }
        let mesh = match &node.kind {
            NodeKind::Mesh(mesh) => mesh,
            _ => continue,
        };

        // Dedup by authored material value; resolve texture slots on
        // first appearance only.
        let material_id = match authored.iter().position(|m| m == &mesh.material) {
            Some(found) => found as u32,
            None => {
                authored.push(mesh.material.clone());
                let m = &mesh.material;
                materials.push(ResolvedMaterial {
                    base_color: m.base_color,
                    roughness: m.roughness,
                    metalness: m.metalness,
                    emissive: m.emissive,
                    base_color_map: intern_texture(
                        m.base_color_map,
                        &mut textures,
                        &mut texture_slots,
                    ),
                    normal_map: intern_texture(m.normal_map, &mut textures, &mut texture_slots),
                    roughness_map: intern_texture(
                        m.roughness_map,
                        &mut textures,
                        &mut texture_slots,
                    ),
                });
                (materials.len() - 1) as u32
            }
        };

        let world = graph.world_transform(id);
        let vertex_offset = geometry.positions.len() as u32;
        let index_offset = geometry.indices.len() as u32;

        append_vertices(&mut geometry, mesh, &world);

        let flipped = world.determinant() < 0.0;
        for tri in mesh.indices.chunks_exact(3) {
            let (a, b, c) = if flipped {
                (tri[0], tri[2], tri[1])
            } else {
                (tri[0], tri[1], tri[2])
            };
            geometry.indices.push(vertex_offset + a);
            geometry.indices.push(vertex_offset + b);
            geometry.indices.push(vertex_offset + c);
            geometry.material_ids.push(material_id);
        }

        entries.push(MeshEntry {
            node: id,
            vertex_offset,
            vertex_count: mesh.positions.len() as u32,
            index_offset,
            index_count: mesh.indices.len() as u32,
            flipped,
        });
    }

    // Downstream consumers never see an empty buffer: substitute a
    // degenerate triangle when nothing renderable exists.
    let fallback = geometry.positions.is_empty();
    if fallback {
        let m = crate::scene::Material::default();
        materials.push(ResolvedMaterial {
            base_color: m.base_color,
            roughness: m.roughness,
            metalness: m.metalness,
            emissive: m.emissive,
            base_color_map: None,
            normal_map: None,
            roughness_map: None,
        });
        geometry.positions.extend([
            [0.0, 0.0, 0.0],
            [1e-5, 0.0, 0.0],
            [0.0, 1e-5, 0.0],
        ]);
        geometry.normals.extend([[0.0, 0.0, 1.0]; 3]);
        geometry.tangents.extend([[1.0, 0.0, 0.0, 1.0]; 3]);
        geometry.uvs.extend([[0.0, 0.0]; 3]);
        geometry.colors.extend([[1.0, 1.0, 1.0, 1.0]; 3]);
        geometry.indices.extend([0, 1, 2]);
        geometry.material_ids.push((materials.len() - 1) as u32);
    }

    Ok(MergedScene {
        geometry,
        materials,
        textures,
        entries,
        fallback,
    })
}

/// Appends one mesh's world-transformed vertex data, padding absent
/// attributes with defaults.
fn append_vertices(geometry: &mut GeometryBuffers, mesh: &MeshData, world: &Mat4) {
    let normal_matrix = Mat3::from_mat4(*world).inverse().transpose();

    for (i, p) in mesh.positions.iter().enumerate() {
        geometry
            .positions
            .push(world.transform_point3(Vec3::from(*p)).into());

        let normal = mesh
            .normals
            .as_ref()
            .map(|n| (normal_matrix * Vec3::from(n[i])).normalize_or_zero().into())
            .unwrap_or([0.0, 0.0, 1.0]);
        geometry.normals.push(normal);

        let tangent = mesh
            .tangents
            .as_ref()
            .map(|t| {
                let t = t[i];
                let xyz = (normal_matrix * Vec3::new(t[0], t[1], t[2])).normalize_or_zero();
                [xyz.x, xyz.y, xyz.z, t[3]]
            })
            .unwrap_or([1.0, 0.0, 0.0, 1.0]);
        geometry.tangents.push(tangent);

        geometry
            .uvs
            .push(mesh.uvs.as_ref().map(|u| u[i]).unwrap_or([0.0, 0.0]));
        geometry.colors.push(
            mesh.colors
                .as_ref()
                .map(|c| c[i])
                .unwrap_or([1.0, 1.0, 1.0, 1.0]),
        );
    }
}

/// Overwrites one mesh entry's vertex range with re-transformed data
fn transform_into(geometry: &mut GeometryBuffers, entry: &MeshEntry, mesh: &MeshData, world: &Mat4) {
    let normal_matrix = Mat3::from_mat4(*world).inverse().transpose();
    let base = entry.vertex_offset as usize;
    for i in 0..entry.vertex_count as usize {
        geometry.positions[base + i] = world
            .transform_point3(Vec3::from(mesh.positions[i]))
            .into();
        if let Some(normals) = &mesh.normals {
            geometry.normals[base + i] = (normal_matrix * Vec3::from(normals[i]))
                .normalize_or_zero()
                .into();
        }
        if let Some(tangents) = &mesh.tangents {
            let t = tangents[i];
            let xyz = (normal_matrix * Vec3::new(t[0], t[1], t[2])).normalize_or_zero();
            geometry.tangents[base + i] = [xyz.x, xyz.y, xyz.z, t[3]];
        }
    }
}

fn reverse_winding(indices: &mut [u32], entry: &MeshEntry) {
    let start = entry.index_offset as usize;
    let end = start + entry.index_count as usize;
    for tri in indices[start..end].chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}

fn resolve_lights(graph: &SceneGraph) -> Vec<ResolvedLight> {
    let mut lights = Vec::new();
    for (id, node) in graph.nodes().iter().enumerate() {
        let id = id as u32;
        if !graph.effectively_visible(id) {
            continue;
        }
        if let NodeKind::Light(light) = &node.kind {
            let world = graph.world_transform(id);
            lights.push(ResolvedLight {
                kind: light.kind,
                color: light.color,
                intensity: light.intensity,
                position: world.transform_point3(Vec3::ZERO).into(),
                direction: world.transform_vector3(Vec3::NEG_Z).normalize_or_zero().into(),
            });
        }
    }
    lights
}
