// src/accel/sah.rs
// Single-threaded SAH BVH builder and the shared split/refit machinery.
// This file exists as the always-available fallback backend and hosts the
// recursion the parallel builder reuses.
// RELEVANT FILES:src/accel/types.rs,src/accel/parallel.rs,src/accel/mod.rs

use std::time::Instant;

use crate::accel::types::{
    scene_aabb, triangle_aabbs, Aabb, BuildOptions, BuildStats, BvhHandle, BvhNode, Triangle,
};
use crate::accel::SpatialIndexBuilder;
use crate::error::{RenderError, Result};

/// Serial surface-area-heuristic builder
pub struct SerialSahBuilder;

impl SerialSahBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SerialSahBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndexBuilder for SerialSahBuilder {
    fn build(&self, triangles: &[Triangle], options: &BuildOptions) -> Result<BvhHandle> {
        build_with(triangles, options, None)
    }

    fn refit(&self, handle: &mut BvhHandle, triangles: &[Triangle]) -> Result<()> {
        refit_handle(handle, triangles)
    }

    fn name(&self) -> &'static str {
        "serial-sah"
    }
}

/// Full build shared by the serial and parallel backends. `parallel_cutoff`
/// is the subtree size above which the recursion may fork; `None` keeps
/// everything on the calling thread.
pub(crate) fn build_with(
    triangles: &[Triangle],
    options: &BuildOptions,
    parallel_cutoff: Option<usize>,
) -> Result<BvhHandle> {
    if triangles.is_empty() {
        return Err(RenderError::build("cannot build index from zero triangles"));
    }
    let start = Instant::now();

    let aabbs = triangle_aabbs(triangles);
    let world_aabb = scene_aabb(triangles);
    let mut indices: Vec<u32> = (0..triangles.len() as u32).collect();

    let mut nodes = build_subtree(&aabbs, &mut indices, 0, 0, options, parallel_cutoff);
    let mut stats = finalize(&mut nodes);
    stats.build_time_ms = start.elapsed().as_secs_f32() * 1000.0;

    Ok(BvhHandle {
        nodes,
        indices,
        world_aabb,
        triangle_count: triangles.len() as u32,
        stats,
    })
}

/// Builds one subtree over `indices` (a contiguous permutation slice whose
/// global base offset is `base`). The returned vector's root is element 0
/// and all internal child links are local to the vector.
pub(crate) fn build_subtree(
    aabbs: &[Aabb],
    indices: &mut [u32],
    base: u32,
    depth: u32,
    options: &BuildOptions,
    parallel_cutoff: Option<usize>,
) -> Vec<BvhNode> {
    let mut bounds = Aabb::empty();
    for &i in indices.iter() {
        bounds.grow(&aabbs[i as usize]);
    }

    let count = indices.len();
    if count as u32 <= options.max_leaf_size || depth >= options.max_depth {
        return vec![BvhNode::leaf(bounds, base, count as u32)];
    }

    let mid = choose_split(aabbs, indices, &bounds);
    let (left_ids, right_ids) = indices.split_at_mut(mid);

    let fork = parallel_cutoff.map_or(false, |cutoff| count > cutoff);
    let (left, right) = if fork {
        rayon::join(
            || build_subtree(aabbs, left_ids, base, depth + 1, options, parallel_cutoff),
            || {
                build_subtree(
                    aabbs,
                    right_ids,
                    base + mid as u32,
                    depth + 1,
                    options,
                    parallel_cutoff,
                )
            },
        )
    } else {
        (
            build_subtree(aabbs, left_ids, base, depth + 1, options, parallel_cutoff),
            build_subtree(
                aabbs,
                right_ids,
                base + mid as u32,
                depth + 1,
                options,
                parallel_cutoff,
            ),
        )
    };

    // Merge: [root, left subtree, right subtree], relinking child indices.
    let left_len = left.len() as u32;
    let mut nodes = Vec::with_capacity(1 + left.len() + right.len());
    nodes.push(BvhNode::internal(bounds, 1, 1 + left_len));
    nodes.extend(left.into_iter().map(|n| offset_node(n, 1)));
    nodes.extend(right.into_iter().map(|n| offset_node(n, 1 + left_len)));
    nodes
}

fn offset_node(mut node: BvhNode, offset: u32) -> BvhNode {
    if !node.is_leaf() {
        node.left += offset;
        node.right += offset;
    }
    nodes_debug_assert(&node);
    node
}

#[inline]
fn nodes_debug_assert(node: &BvhNode) {
    debug_assert!(node.aabb.is_valid() || node.is_leaf());
}

/// SAH sweep on the dominant centroid axis; returns the partition point
/// (never 0 or len, so recursion always terminates).
fn choose_split(aabbs: &[Aabb], indices: &mut [u32], bounds: &Aabb) -> usize {
    let count = indices.len();

    let mut centroid_bounds = Aabb::empty();
    for &i in indices.iter() {
        let c = aabbs[i as usize].centroid();
        centroid_bounds.grow_point(c.into());
    }
    let extent = centroid_bounds.extent();
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };

    // Degenerate centroid spread: any split is as good as another.
    if extent[axis] <= f32::EPSILON {
        return count / 2;
    }

    indices.sort_unstable_by(|&a, &b| {
        let ca = aabbs[a as usize].centroid()[axis];
        let cb = aabbs[b as usize].centroid()[axis];
        ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
    });

    // Suffix areas right-to-left, then sweep left-to-right accumulating
    // prefix areas and evaluating the SAH cost at every cut.
    let mut suffix = vec![0.0f32; count];
    let mut acc = Aabb::empty();
    for i in (1..count).rev() {
        acc.grow(&aabbs[indices[i] as usize]);
        suffix[i] = acc.surface_area();
    }

    let parent_area = bounds.surface_area().max(f32::MIN_POSITIVE);
    let mut best_cost = f32::INFINITY;
    let mut best_mid = count / 2;
    let mut prefix = Aabb::empty();
    for i in 1..count {
        prefix.grow(&aabbs[indices[i - 1] as usize]);
        let cost = (prefix.surface_area() * i as f32 + suffix[i] * (count - i) as f32)
            / parent_area;
        if cost < best_cost {
            best_cost = cost;
            best_mid = i;
        }
    }
    best_mid
}

/// Post-build pass: fill parent links and compute node statistics.
pub(crate) fn finalize(nodes: &mut [BvhNode]) -> BuildStats {
    let mut stats = BuildStats::default();
    let mut stack: Vec<(u32, u32)> = vec![(0, 0)];
    while let Some((idx, depth)) = stack.pop() {
        stats.max_depth = stats.max_depth.max(depth);
        let node = nodes[idx as usize];
        if node.is_leaf() {
            stats.leaf_count += 1;
        } else {
            stats.internal_count += 1;
            nodes[node.left as usize].parent = idx;
            nodes[node.right as usize].parent = idx;
            stack.push((node.left, depth + 1));
            stack.push((node.right, depth + 1));
        }
    }
    stats
}

/// Bottom-up bounds refresh for unchanged topology.
pub(crate) fn refit_handle(handle: &mut BvhHandle, triangles: &[Triangle]) -> Result<()> {
    if triangles.len() as u32 != handle.triangle_count {
        return Err(RenderError::precondition(format!(
            "refit triangle count mismatch: expected {}, got {}",
            handle.triangle_count,
            triangles.len()
        )));
    }
    let aabbs = triangle_aabbs(triangles);
    refit_node(&mut handle.nodes, &handle.indices, &aabbs, 0);
    handle.world_aabb = handle.nodes[0].aabb;
    Ok(())
}

fn refit_node(nodes: &mut [BvhNode], indices: &[u32], aabbs: &[Aabb], idx: u32) -> Aabb {
    let node = nodes[idx as usize];
    let bounds = if node.is_leaf() {
        let mut b = Aabb::empty();
        for slot in node.left..node.left + node.right {
            b.grow(&aabbs[indices[slot as usize] as usize]);
        }
        b
    } else {
        let l = refit_node(nodes, indices, aabbs, node.left);
        let r = refit_node(nodes, indices, aabbs, node.right);
        Aabb::union(&l, &r)
    };
    nodes[idx as usize].aabb = bounds;
    bounds
}
