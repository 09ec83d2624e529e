//! Working vertex/edge/triangle graph built from host mesh streams.
//!
//! Incoming vertices are deduplicated by position into topological vertices;
//! triangles connect them through reference-counted directed edges. The
//! arenas are pre-reserved so handles stay valid for a whole generation run,
//! and triangles are flagged removed in place rather than erased.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use log::debug;
use meshlod_core::{
    Error, IndexBuffer, IndexWidth, Mesh, Point3f, QualityMode, Result, Vector3f, VertexData,
    POSITION_ELEMENT_SIZE,
};

use crate::vector_set::VectorSet;

/// Sentinel for edges whose collapse would invert a face normal.
pub(crate) const NEVER_COLLAPSE_COST: f32 = f32::MAX;
/// Sentinel for costs that have not been computed yet.
pub(crate) const UNINITIALIZED_COLLAPSE_COST: f32 = f32::INFINITY;

/// Handle into the vertex arena. Stable for a whole generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexId(pub(crate) u32);

/// Handle into the triangle arena. Stable for a whole generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangleId(pub(crate) u32);

impl VertexId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl TriangleId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A directed edge stored in its source vertex's edge set.
///
/// Both directions of a shared position pair exist independently because
/// collapse cost is asymmetric. `ref_count` is the number of triangles using
/// this exact direction; 1 marks a border edge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub dst: VertexId,
    pub ref_count: u32,
    pub collapse_cost: f32,
}

impl Edge {
    pub fn new(dst: VertexId) -> Self {
        Self {
            dst,
            ref_count: 0,
            collapse_cost: UNINITIALIZED_COLLAPSE_COST,
        }
    }
}

// Uniqueness within a vertex's edge set is by destination only.
impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.dst == other.dst
    }
}

/// A topological vertex: one unique position.
#[derive(Debug, Clone)]
pub(crate) struct Vertex {
    pub position: Point3f,
    pub normal: Vector3f,
    /// True when this position was shared by several distinct incoming
    /// vertices (UV seams, submesh boundaries)
    pub seam: bool,
    pub has_profile: bool,
    pub is_outer_wall: bool,
    /// Cheapest neighbor to merge into, kept in sync with the cost queue
    pub collapse_to: Option<VertexId>,
    pub edges: VectorSet<Edge>,
    pub triangles: VectorSet<TriangleId>,
}

impl Vertex {
    fn new(position: Point3f) -> Self {
        Self {
            position,
            normal: Vector3f::zeros(),
            seam: false,
            has_profile: false,
            is_outer_wall: false,
            collapse_to: None,
            edges: VectorSet::new(),
            triangles: VectorSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Triangle {
    pub vertices: [VertexId; 3],
    /// Original index-buffer slots, one per corner
    pub vertex_ids: [u32; 3],
    pub normal: Vector3f,
    pub submesh: usize,
    pub removed: bool,
    /// Set the first time a corner slot is relocated after a compression
    /// snapshot; unflagged triangles are identical across the paired levels
    pub vertex_changed: bool,
    /// Slot triple cached at the last compression snapshot
    pub prev_lod: [u32; 3],
}

impl Triangle {
    pub fn has_vertex(&self, v: VertexId) -> bool {
        self.vertices[0] == v || self.vertices[1] == v || self.vertices[2] == v
    }

    pub fn vertex_id_of(&self, v: VertexId) -> u32 {
        for i in 0..3 {
            if self.vertices[i] == v {
                return self.vertex_ids[i];
            }
        }
        debug_assert!(false, "vertex not part of triangle");
        0
    }

    pub fn is_malformed(&self) -> bool {
        self.vertices[0] == self.vertices[1]
            || self.vertices[0] == self.vertices[2]
            || self.vertices[1] == self.vertices[2]
    }
}

/// Per-submesh bookkeeping of live index counts and bake state.
#[derive(Debug, Clone)]
pub(crate) struct IndexBufferInfo {
    pub width: IndexWidth,
    /// Index contribution of all live triangles of this submesh
    pub index_count: usize,
    /// Live index count at the last compression snapshot
    pub prev_index_count: usize,
    /// Indices of triangles changed or removed since the snapshot
    pub prev_only_index_count: usize,
}

/// Exact-position key over f32 bit patterns, with -0.0 folded into 0.0.
fn position_key(p: &Point3f) -> [u32; 3] {
    let bits = |v: f32| if v == 0.0 { 0.0f32.to_bits() } else { v.to_bits() };
    [bits(p.x), bits(p.y), bits(p.z)]
}

/// Face normal from two edge vectors; zero-area triangles yield a zero
/// normal which downstream heuristics tolerate.
pub(crate) fn face_normal(p0: &Point3f, p1: &Point3f, p2: &Point3f) -> Vector3f {
    let e1 = p1 - p0;
    let e2 = p2 - p1;
    let n = e1.cross(&e2);
    n.try_normalize(0.0).unwrap_or(n)
}

/// The working topology of one generation run.
pub(crate) struct LodData {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
    pub index_buffer_infos: Vec<IndexBufferInfo>,
    /// Effective normal-aware costing flag; cleared when a consumed stream
    /// carries no normals
    pub use_vertex_normals: bool,
    quality: QualityMode,
    unique_vertex_map: HashMap<[u32; 3], VertexId>,
    shared_lookup: Vec<VertexId>,
    dedicated_lookup: Vec<VertexId>,
}

impl LodData {
    pub fn new(quality: QualityMode, use_vertex_normals: bool) -> Self {
        Self {
            vertices: Vec::new(),
            triangles: Vec::new(),
            index_buffer_infos: Vec::new(),
            use_vertex_normals,
            quality,
            unique_vertex_map: HashMap::new(),
            shared_lookup: Vec::new(),
            dedicated_lookup: Vec::new(),
        }
    }

    /// Reserve the arenas from an upfront vertex count estimate. Handles are
    /// plain indices, so meshes denser than the estimate merely reallocate.
    fn tune_container_size(&mut self, mesh: &Mesh) {
        let mut vertex_count = 0;
        let mut shared_added = false;
        for (i, submesh) in mesh.submeshes.iter().enumerate() {
            if let Some(data) = &submesh.vertex_data {
                vertex_count += data.vertex_count;
            } else if !shared_added {
                shared_added = true;
                vertex_count += mesh.vertex_data(i).map_or(0, |d| d.vertex_count);
            }
        }

        self.unique_vertex_map = HashMap::with_capacity(vertex_count);
        self.vertices.reserve(vertex_count);
        // There are fewer than 2 * vertex_count triangles, unless the input
        // stacks many triangles onto identical positions.
        self.triangles.reserve(2 * vertex_count);
        self.index_buffer_infos = mesh
            .submeshes
            .iter()
            .map(|s| IndexBufferInfo {
                width: s.indices.width(),
                index_count: 0,
                prev_index_count: 0,
                prev_only_index_count: 0,
            })
            .collect();
    }

    /// Ingest all submeshes of the host mesh.
    pub fn build(&mut self, mesh: &Mesh) -> Result<()> {
        if mesh.submeshes.is_empty() {
            return Err(Error::InvalidData("mesh has no submeshes".to_string()));
        }
        self.tune_container_size(mesh);
        for (submesh_id, submesh) in mesh.submeshes.iter().enumerate() {
            let shared = submesh.uses_shared_vertices();
            let data = mesh.vertex_data(submesh_id).ok_or_else(|| {
                Error::InvalidData(format!("submesh {submesh_id} has no vertex stream"))
            })?;
            self.add_vertex_data(data, shared)?;
            self.add_index_data(&submesh.indices, shared, submesh_id)?;
        }
        Ok(())
    }

    /// Look up a topological vertex by exact position. Only valid between
    /// `build` and `clear_build_state`.
    pub fn find_vertex(&self, position: &Point3f) -> Option<VertexId> {
        self.unique_vertex_map.get(&position_key(position)).copied()
    }

    /// Drop the lookup structures needed only while building.
    pub fn clear_build_state(&mut self) {
        self.unique_vertex_map = HashMap::new();
        self.shared_lookup = Vec::new();
        self.dedicated_lookup = Vec::new();
    }

    fn add_vertex_data(&mut self, data: &VertexData, use_shared_lookup: bool) -> Result<()> {
        if use_shared_lookup && !self.shared_lookup.is_empty() {
            // The shared stream was already ingested.
            return Ok(());
        }
        if data.vertex_count == 0 {
            return Err(Error::InvalidData("empty vertex stream".to_string()));
        }
        if data.position.size != POSITION_ELEMENT_SIZE {
            return Err(Error::Unsupported(format!(
                "position element must be {POSITION_ELEMENT_SIZE} bytes (3 x f32), got {}",
                data.position.size
            )));
        }
        self.use_vertex_normals &= data.has_normals();

        let mut lookup = Vec::with_capacity(data.vertex_count);
        for i in 0..data.vertex_count {
            let position = data.position(i);
            let (id, existed) = match self.unique_vertex_map.entry(position_key(&position)) {
                Entry::Occupied(entry) => {
                    let id = *entry.get();
                    self.vertices[id.index()].seam = true;
                    (id, true)
                }
                Entry::Vacant(entry) => {
                    let id = VertexId(self.vertices.len() as u32);
                    self.vertices.push(Vertex::new(position));
                    entry.insert(id);
                    (id, false)
                }
            };
            if self.use_vertex_normals {
                let incoming = data.normal(i);
                let vertex = &mut self.vertices[id.index()];
                if existed {
                    if vertex.normal.x != incoming.x {
                        vertex.normal += incoming;
                        if vertex.normal.norm_squared() < 1e-12 {
                            vertex.normal = Vector3f::x();
                        }
                        vertex.normal.normalize_mut();
                    }
                } else {
                    vertex.normal = incoming.try_normalize(0.0).unwrap_or(incoming);
                }
            }
            lookup.push(id);
        }
        if use_shared_lookup {
            self.shared_lookup = lookup;
        } else {
            self.dedicated_lookup = lookup;
        }
        Ok(())
    }

    fn add_index_data(
        &mut self,
        indices: &IndexBuffer,
        use_shared_lookup: bool,
        submesh: usize,
    ) -> Result<()> {
        self.index_buffer_infos[submesh].width = indices.width();
        self.index_buffer_infos[submesh].index_count = indices.len();
        if indices.is_empty() {
            // Zero-length streams are skipped before any access; some
            // graphics backends fault on zero-length buffer locks.
            return Ok(());
        }
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "index stream of submesh {submesh} is not a whole number of triangles"
            )));
        }

        for t in 0..indices.len() / 3 {
            let mut vertices = [VertexId(0); 3];
            let mut vertex_ids = [0u32; 3];
            for k in 0..3 {
                let slot = indices.get(t * 3 + k);
                let lookup = if use_shared_lookup {
                    &self.shared_lookup
                } else {
                    &self.dedicated_lookup
                };
                vertices[k] = *lookup.get(slot as usize).ok_or_else(|| {
                    Error::InvalidData(format!(
                        "index {slot} of submesh {submesh} exceeds its vertex stream"
                    ))
                })?;
                vertex_ids[k] = slot;
            }

            let id = TriangleId(self.triangles.len() as u32);
            let mut triangle = Triangle {
                vertices,
                vertex_ids,
                normal: Vector3f::zeros(),
                submesh,
                removed: false,
                vertex_changed: false,
                prev_lod: [0; 3],
            };
            if triangle.is_malformed() {
                debug!(
                    "malformed triangle {} in submesh {submesh} (duplicate topological vertex), \
                     excluded from LOD calculations",
                    id.0
                );
                triangle.removed = true;
                self.index_buffer_infos[submesh].index_count -= 3;
                self.triangles.push(triangle);
                continue;
            }
            triangle.normal = face_normal(
                &self.vertices[vertices[0].index()].position,
                &self.vertices[vertices[1].index()].position,
                &self.vertices[vertices[2].index()].position,
            );
            self.triangles.push(triangle);
            self.add_triangle_to_edges(id);
        }
        Ok(())
    }

    fn is_duplicate_of(&self, id: TriangleId, other: TriangleId) -> bool {
        let a = &self.triangles[id.index()];
        let b = &self.triangles[other.index()];
        a.vertices
            .iter()
            .all(|v| b.vertices.contains(v))
    }

    /// Find a live triangle covering the same three topological vertices.
    fn find_duplicate_triangle(&self, id: TriangleId) -> Option<TriangleId> {
        let first = self.triangles[id.index()].vertices[0];
        self.vertices[first.index()]
            .triangles
            .iter()
            .copied()
            .find(|&other| self.is_duplicate_of(id, other))
    }

    fn add_triangle_to_edges(&mut self, id: TriangleId) {
        if self.quality == QualityMode::Best {
            if let Some(duplicate) = self.find_duplicate_triangle(id) {
                debug!(
                    "triangle {} duplicates triangle {}, excluded from LOD calculations",
                    id.0, duplicate.0
                );
                let submesh = self.triangles[id.index()].submesh;
                self.triangles[id.index()].removed = true;
                self.index_buffer_infos[submesh].index_count -= 3;
                return;
            }
        }
        let vertices = self.triangles[id.index()].vertices;
        for v in vertices {
            self.vertices[v.index()].triangles.add_not_exists(id);
        }
        for i in 0..3 {
            for n in 0..3 {
                if i != n {
                    self.add_edge(vertices[i], vertices[n]);
                }
            }
        }
    }

    pub fn add_edge(&mut self, v: VertexId, dst: VertexId) {
        debug_assert!(v != dst);
        let edges = &mut self.vertices[v.index()].edges;
        match edges.find_mut(&Edge::new(dst)) {
            Some(edge) => edge.ref_count += 1,
            None => {
                let mut edge = Edge::new(dst);
                edge.ref_count = 1;
                edges.add_not_exists(edge);
            }
        }
    }

    pub fn remove_edge(&mut self, v: VertexId, dst: VertexId) {
        let edges = &mut self.vertices[v.index()].edges;
        match edges.find_mut(&Edge::new(dst)) {
            Some(edge) if edge.ref_count > 1 => edge.ref_count -= 1,
            Some(_) => edges.remove_exists(&Edge::new(dst)),
            None => debug_assert!(false, "removing a nonexistent edge"),
        }
    }

    pub fn is_border_vertex(&self, v: VertexId) -> bool {
        self.vertices[v.index()]
            .edges
            .iter()
            .any(|e| e.ref_count == 1)
    }

    /// Detach a triangle from the edge and triangle sets of its corners,
    /// skipping `skip` whose sets are being torn down wholesale by the
    /// caller.
    pub fn remove_triangle_from_edges(&mut self, id: TriangleId, skip: Option<VertexId>) {
        let vertices = self.triangles[id.index()].vertices;
        for &v in &vertices {
            if Some(v) != skip {
                self.vertices[v.index()].triangles.remove_exists(&id);
            }
        }
        for i in 0..3 {
            for n in 0..3 {
                if i != n && Some(vertices[i]) != skip {
                    self.remove_edge(vertices[i], vertices[n]);
                }
            }
        }
    }

    /// Relocate the corner of `id` holding slot `old_id` onto `dst`,
    /// rewiring the two remaining corners' edges.
    pub fn replace_vertex_id(&mut self, id: TriangleId, old_id: u32, new_id: u32, dst: VertexId) {
        self.vertices[dst.index()].triangles.add_not_exists(id);
        // The triangle is intentionally not detached from the collapsing
        // source vertex; its sets are cleared wholesale afterwards.
        let vertices = self.triangles[id.index()].vertices;
        let vertex_ids = self.triangles[id.index()].vertex_ids;
        for i in 0..3 {
            if vertex_ids[i] == old_id {
                for n in 0..3 {
                    if i != n {
                        self.remove_edge(vertices[n], vertices[i]);
                        self.add_edge(vertices[n], dst);
                        self.add_edge(dst, vertices[n]);
                    }
                }
                self.triangles[id.index()].vertices[i] = dst;
                self.triangles[id.index()].vertex_ids[i] = new_id;
                return;
            }
        }
        debug_assert!(false, "slot to relocate not found");
    }

    /// Recompute a triangle's face normal from current positions.
    pub fn update_triangle_normal(&mut self, id: TriangleId) {
        let [a, b, c] = self.triangles[id.index()].vertices;
        self.triangles[id.index()].normal = face_normal(
            &self.vertices[a.index()].position,
            &self.vertices[b.index()].position,
            &self.vertices[c.index()].position,
        );
    }
}
