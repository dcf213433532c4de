use std::collections::{BinaryHeap, HashMap, VecDeque};

use bytemuck::{NoUninit, Zeroable};
use glam::Vec3;
use lumen_math::bounds::{NormalCone, Sphere};

use super::handles::MaterialId;

/// GPU-resident cluster descriptor: at most 128 triangles, a bounding
/// sphere and normal cone for culling, the LOD error bracket used for
/// selection, and the byte range into the shared index/meshlet-data
/// buffers. Matches the packed layout `spec.md` §6 calls for.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Zeroable, NoUninit)]
pub struct GpuCluster {
    pub bounding_sphere: [f32; 4], // xyz = center, w = radius
    pub cone_axis_cutoff: [f32; 4], // xyz = axis, w = cutoff
    pub lod_error: f32,
    pub parent_lod_error: f32,
    pub material_id: u32,
    pub byte_offset: u32,
    pub triangle_count: u32,
    pub vertex_offset: u32,
    pub _pad: [u32; 2],
}

impl GpuCluster {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub const MAX_TRIANGLES: usize = 128;
}

/// CPU-side cluster record built by the offline hierarchy builder, before
/// it's packed into `GpuCluster` and uploaded. `positions` is the
/// cluster's own local vertex buffer; `triangle_indices` are local 16-bit
/// indices into it, widened for CPU use.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub positions: Vec<Vec3>,
    pub triangle_indices: Vec<u32>,
    pub bounds: Sphere,
    pub cone: NormalCone,
    pub lod_error: f32,
    pub parent_lod_error: f32,
    pub material: MaterialId,
}

impl Cluster {
    /// `lodError(c) <= tau < parentLodError(c)` is the selection contract
    /// from `spec.md` 4.C; `tau` is the caller's screen-space error
    /// threshold for the current view.
    pub fn is_selected_at(&self, tau: f32) -> bool {
        self.lod_error <= tau && tau < self.parent_lod_error
    }
}

/// One level of the LOD DAG: a parent cluster's error bracket and the
/// children it simplifies. Non-overlapping triangulation is an invariant
/// enforced at build time (`spec.md` 4.C), not checked at runtime.
#[derive(Debug, Clone)]
pub struct LodGroup {
    pub clusters: Vec<usize>,
    pub parent_error: f32,
    pub child_error: f32,
}

/// A 4-wide BVH node over the cluster hierarchy. Leaf nodes reference a
/// contiguous cluster range instead of children.
#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub bounds: Sphere,
    pub lod_error_min: f32,
    pub lod_error_max: f32,
    pub mip_level: u32,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Internal { children: [Option<u32>; 4] },
    Leaf { cluster_start: u32, cluster_count: u32 },
}

impl HierarchyNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// A full mesh's cluster hierarchy: immutable per scene epoch once built,
/// shared by every instance of the mesh (`spec.md` §3 lifecycle rule).
#[derive(Debug, Clone, Default)]
pub struct MeshHierarchy {
    pub clusters: Vec<Cluster>,
    pub nodes: Vec<HierarchyNode>,
    pub root: Option<u32>,
    pub bounds: Option<Sphere>,
}

pub fn projected_error(lod_error: f32, distance: f32, screen_height_px: f32, fov_y: f32) -> f32 {
    // Project a world-space error radius to pixels: error subtends an
    // angle of roughly `error / distance` radians, and the vertical field
    // of view maps `fov_y` radians onto `screen_height_px` pixels.
    if distance <= f32::EPSILON {
        return f32::MAX;
    }
    let angular_error = lod_error / distance;
    angular_error * (screen_height_px / fov_y)
}

const LOD_GROUP_SIZE: usize = 4;
const MAX_HIERARCHY_LEVELS: u32 = 32;
const BVH_LEAF_SIZE: usize = 4;

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Partitions `indices` into triangle groups of at most
/// `GpuCluster::MAX_TRIANGLES`, growing each cluster outward from a seed
/// triangle along shared edges (`spec.md` 4.C step 1). Triangle IDs are
/// positions into the `indices` triple list, not vertex indices.
fn greedy_cluster_triangles(indices: &[u32]) -> Vec<Vec<u32>> {
    let triangle_count = (indices.len() / 3) as u32;
    if triangle_count == 0 {
        return Vec::new();
    }

    let mut edge_to_triangles: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
    for t in 0..triangle_count {
        for k in 0..3u32 {
            let a = indices[(t * 3 + k) as usize];
            let b = indices[(t * 3 + (k + 1) % 3) as usize];
            edge_to_triangles.entry(edge_key(a, b)).or_default().push(t);
        }
    }

    let mut visited = vec![false; triangle_count as usize];
    let mut clusters = Vec::new();

    for seed in 0..triangle_count {
        if visited[seed as usize] {
            continue;
        }

        let mut cluster = Vec::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(seed);

        while let Some(t) = frontier.pop_front() {
            if visited[t as usize] {
                continue;
            }
            if cluster.len() >= GpuCluster::MAX_TRIANGLES {
                // Leave `t` unvisited; it (and anything still queued) is
                // picked up as a fresh seed by the outer loop.
                break;
            }

            visited[t as usize] = true;
            cluster.push(t);

            for k in 0..3u32 {
                let a = indices[(t * 3 + k) as usize];
                let b = indices[(t * 3 + (k + 1) % 3) as usize];
                if let Some(neighbors) = edge_to_triangles.get(&edge_key(a, b)) {
                    for &n in neighbors {
                        if !visited[n as usize] {
                            frontier.push_back(n);
                        }
                    }
                }
            }
        }

        clusters.push(cluster);
    }

    clusters
}

fn face_normal(positions: &[Vec3], indices: &[u32], tri: u32) -> Vec3 {
    let a = positions[indices[(tri * 3) as usize] as usize];
    let b = positions[indices[(tri * 3 + 1) as usize] as usize];
    let c = positions[indices[(tri * 3 + 2) as usize] as usize];
    (b - a).cross(c - a).normalize_or_zero()
}

/// Averages the per-triangle normal (vertex-attribute normals if supplied,
/// else the geometric face normal) into a cone axis, with `cutoff` the
/// worst-case (minimum) dot product any triangle's normal makes with it.
fn normal_cone_from_mesh(tri_ids: &[u32], positions: &[Vec3], indices: &[u32], normals: &[Vec3]) -> NormalCone {
    let mut axis = Vec3::ZERO;
    let mut face_normals = Vec::with_capacity(tri_ids.len());

    for &tri in tri_ids {
        let face = if normals.is_empty() {
            face_normal(positions, indices, tri)
        } else {
            let i0 = indices[(tri * 3) as usize] as usize;
            let i1 = indices[(tri * 3 + 1) as usize] as usize;
            let i2 = indices[(tri * 3 + 2) as usize] as usize;
            (normals[i0] + normals[i1] + normals[i2]).normalize_or_zero()
        };
        axis += face;
        face_normals.push(face);
    }

    let axis = axis.normalize_or_zero();
    let axis = if axis == Vec3::ZERO { Vec3::Y } else { axis };
    let cutoff = face_normals.iter().map(|n| n.dot(axis)).fold(1.0, f32::min);

    NormalCone { axis, cutoff }
}

fn bounding_sphere(positions: &[Vec3]) -> Sphere {
    if positions.is_empty() {
        return Sphere::new(Vec3::ZERO, 0.0);
    }
    let mut min = positions[0];
    let mut max = positions[0];
    for &p in positions {
        min = min.min(p);
        max = max.max(p);
    }
    let center = (min + max) * 0.5;
    let radius = positions.iter().map(|&p| (p - center).length()).fold(0.0, f32::max);
    Sphere::new(center, radius)
}

/// Builds one `Cluster` from a set of triangle IDs into `indices`,
/// remapping vertices into the cluster's own local buffer. `normals`
/// empty means "derive from geometry" (used for simplified levels, which
/// have no surviving vertex-attribute normals to weld).
fn build_cluster_from_mesh(tri_ids: &[u32], positions: &[Vec3], indices: &[u32], normals: &[Vec3], lod_error: f32, parent_lod_error: f32) -> Cluster {
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut local_positions = Vec::new();
    let mut triangle_indices = Vec::with_capacity(tri_ids.len() * 3);

    for &tri in tri_ids {
        for k in 0..3u32 {
            let global = indices[(tri * 3 + k) as usize];
            let local = *remap.entry(global).or_insert_with(|| {
                local_positions.push(positions[global as usize]);
                (local_positions.len() - 1) as u32
            });
            triangle_indices.push(local);
        }
    }

    let bounds = bounding_sphere(&local_positions);
    let cone = normal_cone_from_mesh(tri_ids, positions, indices, normals);

    Cluster {
        positions: local_positions,
        triangle_indices,
        bounds,
        cone,
        lod_error,
        parent_lod_error,
        // Registration assigns the real material id; the builder only
        // knows geometry.
        material: MaterialId(0),
    }
}

/// A vertex's accumulated quadric error matrix (upper triangle of the
/// symmetric 4x4 fundamental error quadric), summed from its incident
/// triangle planes (`spec.md` 4.C step 3).
#[derive(Debug, Clone, Copy)]
struct Quadric {
    a2: f32,
    ab: f32,
    ac: f32,
    ad: f32,
    b2: f32,
    bc: f32,
    bd: f32,
    c2: f32,
    cd: f32,
    d2: f32,
}

impl Quadric {
    const ZERO: Quadric = Quadric { a2: 0.0, ab: 0.0, ac: 0.0, ad: 0.0, b2: 0.0, bc: 0.0, bd: 0.0, c2: 0.0, cd: 0.0, d2: 0.0 };

    fn from_plane(normal: Vec3, point_on_plane: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        let d = -n.dot(point_on_plane);
        Self {
            a2: n.x * n.x,
            ab: n.x * n.y,
            ac: n.x * n.z,
            ad: n.x * d,
            b2: n.y * n.y,
            bc: n.y * n.z,
            bd: n.y * d,
            c2: n.z * n.z,
            cd: n.z * d,
            d2: d * d,
        }
    }

    fn add(self, other: Self) -> Self {
        Self {
            a2: self.a2 + other.a2,
            ab: self.ab + other.ab,
            ac: self.ac + other.ac,
            ad: self.ad + other.ad,
            b2: self.b2 + other.b2,
            bc: self.bc + other.bc,
            bd: self.bd + other.bd,
            c2: self.c2 + other.c2,
            cd: self.cd + other.cd,
            d2: self.d2 + other.d2,
        }
    }

    fn error(&self, p: Vec3) -> f32 {
        p.x * p.x * self.a2
            + 2.0 * p.x * p.y * self.ab
            + 2.0 * p.x * p.z * self.ac
            + 2.0 * p.x * self.ad
            + p.y * p.y * self.b2
            + 2.0 * p.y * p.z * self.bc
            + 2.0 * p.y * self.bd
            + p.z * p.z * self.c2
            + 2.0 * p.z * self.cd
            + self.d2
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    cost: f32,
    a: u32,
    b: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // `BinaryHeap` is a max-heap; invert so the cheapest edge pops first.
        other.cost.partial_cmp(&self.cost).unwrap_or(std::cmp::Ordering::Equal)
    }
}

fn pos_key(p: Vec3) -> (u32, u32, u32) {
    (p.x.to_bits(), p.y.to_bits(), p.z.to_bits())
}

fn find(parent: &mut [u32], mut v: u32) -> u32 {
    while parent[v as usize] != v {
        parent[v as usize] = parent[parent[v as usize] as usize];
        v = parent[v as usize];
    }
    v
}

/// Quadric-error-simplifies one LOD group: welds the group's clusters
/// back into shared topology, locks every vertex touching a boundary edge
/// (a true mesh boundary, or a seam against a cluster outside the group),
/// and greedily collapses the cheapest unlocked edge until the triangle
/// count is roughly halved (`spec.md` 4.C step 3). Returns the simplified
/// local geometry and the worst collapse cost applied, used as the
/// group's `lodError`.
fn simplify_group(group: &[&Cluster]) -> (Vec<Vec3>, Vec<u32>, f32) {
    let mut welded_positions: Vec<Vec3> = Vec::new();
    let mut welded_lookup: HashMap<(u32, u32, u32), u32> = HashMap::new();
    let mut welded_indices: Vec<u32> = Vec::new();

    for cluster in group {
        let mut local_to_welded = vec![0u32; cluster.positions.len()];
        for (local, &p) in cluster.positions.iter().enumerate() {
            let key = pos_key(p);
            let welded = *welded_lookup.entry(key).or_insert_with(|| {
                welded_positions.push(p);
                (welded_positions.len() - 1) as u32
            });
            local_to_welded[local] = welded;
        }
        for &local in &cluster.triangle_indices {
            welded_indices.push(local_to_welded[local as usize]);
        }
    }

    let vertex_count = welded_positions.len();
    if vertex_count == 0 || welded_indices.len() < 3 {
        return (Vec::new(), Vec::new(), 0.0);
    }

    let mut edge_counts: HashMap<(u32, u32), u32> = HashMap::new();
    for tri in welded_indices.chunks_exact(3) {
        for k in 0..3 {
            let a = tri[k];
            let b = tri[(k + 1) % 3];
            *edge_counts.entry(edge_key(a, b)).or_insert(0) += 1;
        }
    }

    let mut locked = vec![false; vertex_count];
    for (&(a, b), &count) in &edge_counts {
        if count == 1 {
            locked[a as usize] = true;
            locked[b as usize] = true;
        }
    }

    let mut quadrics = vec![Quadric::ZERO; vertex_count];
    for tri in welded_indices.chunks_exact(3) {
        let a = welded_positions[tri[0] as usize];
        let b = welded_positions[tri[1] as usize];
        let c = welded_positions[tri[2] as usize];
        let normal = (b - a).cross(c - a);
        if normal.length_squared() < f32::EPSILON {
            continue;
        }
        let q = Quadric::from_plane(normal, a);
        for &v in &[tri[0], tri[1], tri[2]] {
            quadrics[v as usize] = quadrics[v as usize].add(q);
        }
    }

    let mut parent: Vec<u32> = (0..vertex_count as u32).collect();
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
    for &(a, b) in edge_counts.keys() {
        if locked[a as usize] || locked[b as usize] {
            continue;
        }
        let midpoint = (welded_positions[a as usize] + welded_positions[b as usize]) * 0.5;
        let cost = quadrics[a as usize].add(quadrics[b as usize]).error(midpoint);
        if cost.is_finite() {
            heap.push(HeapEntry { cost, a, b });
        }
    }

    let triangle_count = welded_indices.len() / 3;
    let target_triangle_count = (triangle_count / 2).max(1);
    let mut remaining_triangles = triangle_count;
    let mut max_cost = 0.0f32;

    while remaining_triangles > target_triangle_count {
        let entry = match heap.pop() {
            Some(entry) => entry,
            None => break,
        };
        let ra = find(&mut parent, entry.a);
        let rb = find(&mut parent, entry.b);
        if ra == rb || locked[ra as usize] || locked[rb as usize] {
            continue;
        }

        parent[rb as usize] = ra;
        quadrics[ra as usize] = quadrics[ra as usize].add(quadrics[rb as usize]);
        max_cost = max_cost.max(entry.cost);

        remaining_triangles = welded_indices
            .chunks_exact(3)
            .filter(|tri| {
                let v0 = find(&mut parent, tri[0]);
                let v1 = find(&mut parent, tri[1]);
                let v2 = find(&mut parent, tri[2]);
                v0 != v1 && v1 != v2 && v0 != v2
            })
            .count();
    }

    let mut welded_to_final: HashMap<u32, u32> = HashMap::new();
    let mut final_positions = Vec::new();
    let mut final_indices = Vec::new();

    for tri in welded_indices.chunks_exact(3) {
        let v0 = find(&mut parent, tri[0]);
        let v1 = find(&mut parent, tri[1]);
        let v2 = find(&mut parent, tri[2]);
        if v0 == v1 || v1 == v2 || v0 == v2 {
            continue;
        }
        for v in [v0, v1, v2] {
            let final_id = *welded_to_final.entry(v).or_insert_with(|| {
                final_positions.push(welded_positions[v as usize]);
                (final_positions.len() - 1) as u32
            });
            final_indices.push(final_id);
        }
    }

    (final_positions, final_indices, max_cost)
}

fn sah_cost(clusters: &[Cluster], ids: &[usize]) -> f32 {
    match ids.iter().map(|&i| clusters[i].bounds).reduce(Sphere::merge) {
        Some(bounds) => bounds.radius * bounds.radius * ids.len() as f32,
        None => 0.0,
    }
}

fn centroid_spread_axis(clusters: &[Cluster], range: &[usize]) -> usize {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for &i in range {
        let c = clusters[i].bounds.center;
        min = min.min(c);
        max = max.max(c);
    }
    let extent = (max - min).to_array();
    if extent[0] >= extent[1] && extent[0] >= extent[2] {
        0
    } else if extent[1] >= extent[2] {
        1
    } else {
        2
    }
}

/// Sorts `range` along its widest centroid axis and returns the split
/// point minimizing the surface-area-heuristic cost of the two halves
/// (`spec.md` 4.C step 6).
fn sah_split(clusters: &[Cluster], range: &mut [usize]) -> usize {
    let n = range.len();
    if n <= 1 {
        return n;
    }

    let axis = centroid_spread_axis(clusters, range);
    range.sort_by(|&a, &b| {
        let ca = clusters[a].bounds.center.to_array()[axis];
        let cb = clusters[b].bounds.center.to_array()[axis];
        ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut best_cost = f32::MAX;
    let mut best_split = n / 2;
    for split in 1..n {
        let cost = sah_cost(clusters, &range[..split]) + sah_cost(clusters, &range[split..]);
        if cost < best_cost {
            best_cost = cost;
            best_split = split;
        }
    }
    best_split
}

fn build_bvh_range(clusters: &[Cluster], order: &mut [usize], start: usize, end: usize, depth: u32, nodes: &mut Vec<HierarchyNode>) -> u32 {
    let range = &order[start..end];
    let bounds = range
        .iter()
        .map(|&i| clusters[i].bounds)
        .reduce(Sphere::merge)
        .unwrap_or(Sphere::new(Vec3::ZERO, 0.0));
    let lod_error_min = range.iter().map(|&i| clusters[i].lod_error).fold(f32::MAX, f32::min);
    let lod_error_max = range.iter().map(|&i| clusters[i].parent_lod_error).fold(0.0, f32::max);

    if end - start <= BVH_LEAF_SIZE {
        nodes.push(HierarchyNode {
            bounds,
            lod_error_min,
            lod_error_max,
            mip_level: depth,
            kind: NodeKind::Leaf { cluster_start: start as u32, cluster_count: (end - start) as u32 },
        });
        return (nodes.len() - 1) as u32;
    }

    // Two nested binary SAH splits give a 4-wide partition of this range
    // directly, rather than collapsing a binary tree after the fact.
    let mid = start + sah_split(clusters, &mut order[start..end]);
    let q0 = start + sah_split(clusters, &mut order[start..mid]);
    let q2 = mid + sah_split(clusters, &mut order[mid..end]);
    let quadrants = [(start, q0), (q0, mid), (mid, q2), (q2, end)];

    let mut children = [None; 4];
    for (slot, &(s, e)) in quadrants.iter().enumerate() {
        if s < e {
            children[slot] = Some(build_bvh_range(clusters, order, s, e, depth + 1, nodes));
        }
    }

    nodes.push(HierarchyNode { bounds, lod_error_min, lod_error_max, mip_level: depth, kind: NodeKind::Internal { children } });
    (nodes.len() - 1) as u32
}

fn build_cluster_bvh(clusters: &[Cluster]) -> (Vec<HierarchyNode>, Vec<usize>, u32) {
    let mut order: Vec<usize> = (0..clusters.len()).collect();
    let mut nodes = Vec::new();
    let root = build_bvh_range(clusters, &mut order, 0, order.len(), 0, &mut nodes);
    (nodes, order, root)
}

/// Builds the full cluster hierarchy for one mesh: greedy-adjacency
/// clustering into ≤128-triangle clusters, iterative LOD-group
/// simplification (quadric-error collapse with locked group boundaries)
/// until a single root remains or `MAX_HIERARCHY_LEVELS` is hit, and a
/// 4-wide SAH BVH over every cluster produced at every level
/// (`spec.md` 4.C). Called both at mesh registration time and from tests
/// against small synthetic meshes.
pub fn build_mesh_hierarchy(positions: &[Vec3], indices: &[u32], normals: &[Vec3]) -> MeshHierarchy {
    if positions.is_empty() || indices.len() < 3 {
        return MeshHierarchy::default();
    }

    let mut all_clusters: Vec<Cluster> = Vec::new();
    let mut current_level: Vec<u32> = greedy_cluster_triangles(indices)
        .into_iter()
        .map(|tri_ids| {
            let cluster = build_cluster_from_mesh(&tri_ids, positions, indices, normals, 0.0, f32::MAX);
            all_clusters.push(cluster);
            (all_clusters.len() - 1) as u32
        })
        .collect();

    let mut level = 0;
    while current_level.len() > 1 && level < MAX_HIERARCHY_LEVELS {
        level += 1;
        let mut next_level = Vec::new();

        for group_ids in current_level.chunks(LOD_GROUP_SIZE) {
            let group: Vec<&Cluster> = group_ids.iter().map(|&id| &all_clusters[id as usize]).collect();
            let (group_positions, group_indices, group_error) = simplify_group(&group);

            let inherited_error = group_ids.iter().map(|&id| all_clusters[id as usize].lod_error).fold(0.0, f32::max);
            let parent_error = group_error.max(inherited_error);
            for &id in group_ids {
                all_clusters[id as usize].parent_lod_error = parent_error;
            }

            if group_indices.len() < 3 {
                continue;
            }

            for tri_ids in greedy_cluster_triangles(&group_indices) {
                let cluster = build_cluster_from_mesh(&tri_ids, &group_positions, &group_indices, &[], parent_error, f32::MAX);
                all_clusters.push(cluster);
                next_level.push((all_clusters.len() - 1) as u32);
            }
        }

        if next_level.is_empty() || next_level.len() >= current_level.len() {
            // Every group already bottomed out (can't halve further
            // without violating locked boundaries); stop instead of
            // looping without making progress.
            break;
        }
        current_level = next_level;
    }

    // Whatever's left at the top never gets simplified further, so it's
    // selectable at any screen-space error.
    for &id in &current_level {
        all_clusters[id as usize].parent_lod_error = f32::MAX;
    }

    let (nodes, order, root) = build_cluster_bvh(&all_clusters);
    let bounds = nodes.get(root as usize).map(|node| node.bounds);
    let clusters = order.into_iter().map(|i| all_clusters[i].clone()).collect();

    MeshHierarchy { clusters, nodes, root: Some(root), bounds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::bounds::{NormalCone, Sphere};

    fn cluster(lod_error: f32, parent_error: f32) -> Cluster {
        Cluster {
            positions: Vec::new(),
            triangle_indices: Vec::new(),
            bounds: Sphere::new(Vec3::ZERO, 1.0),
            cone: NormalCone {
                axis: Vec3::Y,
                cutoff: 0.0,
            },
            lod_error,
            parent_lod_error: parent_error,
            material: MaterialId(0),
        }
    }

    #[test]
    fn selection_bracket_is_half_open() {
        let c = cluster(1.0, 4.0);
        assert!(!c.is_selected_at(0.5));
        assert!(c.is_selected_at(1.0));
        assert!(c.is_selected_at(3.999));
        assert!(!c.is_selected_at(4.0));
    }

    #[test]
    fn projected_error_shrinks_with_distance() {
        let near = projected_error(1.0, 1.0, 1080.0, 1.0);
        let far = projected_error(1.0, 100.0, 1080.0, 1.0);
        assert!(near > far);
    }

    fn unit_triangle() -> (Vec<Vec3>, Vec<u32>, Vec<Vec3>) {
        let positions = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let normals = vec![Vec3::Z; 3];
        (positions, vec![0, 1, 2], normals)
    }

    /// An `n` x `n` grid of quads (two triangles each), enough triangles
    /// to force more than one level-0 cluster and at least one LOD group.
    fn grid_mesh(n: u32) -> (Vec<Vec3>, Vec<u32>, Vec<Vec3>) {
        let mut positions = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                positions.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        let normals = vec![Vec3::Z; positions.len()];

        let mut indices = Vec::new();
        let stride = n + 1;
        for y in 0..n {
            for x in 0..n {
                let i0 = y * stride + x;
                let i1 = i0 + 1;
                let i2 = i0 + stride;
                let i3 = i2 + 1;
                indices.extend_from_slice(&[i0, i1, i3, i0, i3, i2]);
            }
        }
        (positions, indices, normals)
    }

    #[test]
    fn single_triangle_builds_a_single_leaf_root() {
        let (positions, indices, normals) = unit_triangle();
        let hierarchy = build_mesh_hierarchy(&positions, &indices, &normals);

        assert_eq!(hierarchy.clusters.len(), 1);
        let root = hierarchy.root.expect("root must be set");
        let node = &hierarchy.nodes[root as usize];
        assert!(node.is_leaf());
        assert_eq!(hierarchy.clusters[0].parent_lod_error, f32::MAX);
    }

    #[test]
    fn every_cluster_satisfies_the_lod_error_bracket() {
        // 16x16 quads = 512 triangles: well past one cluster, forcing at
        // least one round of LOD grouping and simplification.
        let (positions, indices, normals) = grid_mesh(16);
        let hierarchy = build_mesh_hierarchy(&positions, &indices, &normals);

        assert!(hierarchy.clusters.len() > 1);
        for c in &hierarchy.clusters {
            assert!(c.parent_lod_error >= c.lod_error, "cluster bracket inverted: {} < {}", c.parent_lod_error, c.lod_error);
        }
    }

    #[test]
    fn bvh_leaf_ranges_partition_every_cluster_exactly_once() {
        let (positions, indices, normals) = grid_mesh(16);
        let hierarchy = build_mesh_hierarchy(&positions, &indices, &normals);

        let mut covered = vec![false; hierarchy.clusters.len()];
        for node in &hierarchy.nodes {
            if let NodeKind::Leaf { cluster_start, cluster_count } = node.kind {
                for i in cluster_start..cluster_start + cluster_count {
                    assert!(!covered[i as usize], "cluster {i} covered by more than one leaf");
                    covered[i as usize] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c), "every cluster must be reachable from some BVH leaf");
    }
}
