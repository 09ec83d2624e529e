//! Outer wall detection through an incremental convex hull.
//!
//! The hull is seeded with a tetrahedron of four extreme vertices and grown
//! by repeatedly lifting it towards the furthest remaining vertex. Vertices
//! are then classified by flood-filling the mesh from each hull face across
//! triangles whose normals stay within the configured walk angle, so walls
//! facing the hull are marked while cavities and enclosed geometry are not.

use meshlod_core::{
    Error, IndexBuffer, IndexWidth, Mesh, Point3f, Result, SubMesh, Vector3f, VertexData,
};

use crate::topology::{face_normal, LodData, VertexId};

#[derive(Debug, Clone, Copy)]
struct HullTriangle {
    vertices: [VertexId; 3],
    normal: Vector3f,
    removed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct OutsideData {
    is_inside_hull: bool,
}

/// Undirected horizon edge, stored with ordered endpoints so duplicates
/// from adjacent triangles compare equal.
type HullEdge = (u32, u32);

pub(crate) struct OutsideMarker {
    hull: Vec<HullTriangle>,
    outside: Vec<OutsideData>,
    centroid: Point3f,
    /// Tolerance for coplanarity decisions, scaled to the mesh size
    epsilon: f32,
    walk_angle: f32,
}

impl OutsideMarker {
    pub fn new(bounding_sphere_radius: f32, walk_angle: f32) -> Self {
        Self {
            hull: Vec::new(),
            outside: Vec::new(),
            centroid: Point3f::origin(),
            epsilon: bounding_sphere_radius * f32::EPSILON * 4.0,
            walk_angle,
        }
    }

    /// Classify every vertex of `data`, writing the outer-wall flags.
    pub fn mark_outside(&mut self, data: &mut LodData) -> Result<()> {
        self.generate_hull(data)?;
        self.mark_vertices(data);
        Ok(())
    }

    fn generate_hull(&mut self, data: &LodData) -> Result<()> {
        self.init_hull(data)?;
        let mut i = 0;
        // add_vertex appends new faces, which are revisited in turn.
        while i < self.hull.len() {
            if !self.hull[i].removed {
                if let Some(furthest) = self.get_furthest_vertex(data, i) {
                    self.add_vertex(data, furthest);
                }
            }
            i += 1;
        }
        self.hull.retain(|t| !t.removed);
        Ok(())
    }

    fn init_hull(&mut self, data: &LodData) -> Result<()> {
        self.hull.clear();
        self.hull.reserve(data.vertices.len());
        self.outside.clear();
        self.outside
            .resize(data.vertices.len(), OutsideData::default());

        // Four extreme vertices guaranteed to lie on the hull seed the
        // algorithm: lowest, furthest from it, furthest from their line,
        // furthest from their plane.
        let degenerate =
            || Error::Algorithm("cannot mark outside vertices of a degenerate mesh".to_string());

        let mut v0 = None;
        let mut min_y = f32::MAX;
        for (i, vertex) in data.vertices.iter().enumerate() {
            if vertex.position.y < min_y {
                min_y = vertex.position.y;
                v0 = Some(VertexId(i as u32));
            }
        }
        let v0 = v0.ok_or_else(degenerate)?;
        let p0 = data.vertices[v0.index()].position;

        let mut v1 = None;
        let mut max_dist = 0.0;
        for (i, vertex) in data.vertices.iter().enumerate() {
            let dist = (vertex.position - p0).norm_squared();
            if dist > max_dist {
                max_dist = dist;
                v1 = Some(VertexId(i as u32));
            }
        }
        let v1 = v1.ok_or_else(degenerate)?;
        let p1 = data.vertices[v1.index()].position;

        let mut v2 = None;
        let mut max_dist = 0.0;
        for (i, vertex) in data.vertices.iter().enumerate() {
            let dist = point_to_line_squared_distance(&p0, &p1, &vertex.position);
            if dist > max_dist {
                max_dist = dist;
                v2 = Some(VertexId(i as u32));
            }
        }
        let v2 = v2.ok_or_else(degenerate)?;
        let p2 = data.vertices[v2.index()].position;

        let mut v3 = None;
        let mut max_dist = 0.0;
        let plane_normal = face_normal(&p0, &p1, &p2);
        for (i, vertex) in data.vertices.iter().enumerate() {
            let dist = plane_normal.dot(&(vertex.position - p0)).abs();
            if dist > max_dist {
                max_dist = dist;
                v3 = Some(VertexId(i as u32));
            }
        }
        let v3 = v3.ok_or_else(degenerate)?;
        let p3 = data.vertices[v3.index()].position;

        // A positive volume guarantees the centroid lies strictly inside.
        if tetrahedron_volume(&p0, &p1, &p2, &p3) <= self.epsilon {
            return Err(degenerate());
        }
        self.centroid = Point3f::from((p0.coords + p1.coords + p2.coords + p3.coords) / 4.0);

        for v in [v0, v1, v2, v3] {
            self.outside[v.index()].is_inside_hull = true;
        }
        self.create_triangle(data, v0, v1, v2);
        self.create_triangle(data, v0, v1, v3);
        self.create_triangle(data, v0, v2, v3);
        self.create_triangle(data, v1, v2, v3);
        Ok(())
    }

    /// Append a hull face wound to face away from the centroid.
    fn create_triangle(&mut self, data: &LodData, v0: VertexId, v1: VertexId, v2: VertexId) {
        let mut triangle = HullTriangle {
            vertices: [v0, v1, v2],
            normal: Vector3f::zeros(),
            removed: false,
        };
        self.compute_hull_normal(data, &mut triangle);
        if self.is_visible(data, &triangle, &self.centroid) {
            triangle.vertices.swap(0, 1);
            self.compute_hull_normal(data, &mut triangle);
        }
        self.hull.push(triangle);
    }

    fn compute_hull_normal(&self, data: &LodData, triangle: &mut HullTriangle) {
        let [a, b, c] = triangle.vertices;
        triangle.normal = face_normal(
            &data.vertices[a.index()].position,
            &data.vertices[b.index()].position,
            &data.vertices[c.index()].position,
        );
    }

    fn is_visible(&self, data: &LodData, triangle: &HullTriangle, point: &Point3f) -> bool {
        // No epsilon: the point is assumed off the triangle plane.
        let anchor = data.vertices[triangle.vertices[0].index()].position;
        triangle.normal.dot(&anchor.coords) < triangle.normal.dot(&point.coords)
    }

    /// The vertex furthest in front of hull face `tri`, if any remains.
    fn get_furthest_vertex(&self, data: &LodData, tri: usize) -> Option<VertexId> {
        let triangle = &self.hull[tri];
        let anchor = data.vertices[triangle.vertices[0].index()].position;
        let mut furthest = None;
        let mut furthest_distance = 0.0;
        for (i, vertex) in data.vertices.iter().enumerate() {
            if self.outside[i].is_inside_hull {
                continue;
            }
            let dist = triangle.normal.dot(&(vertex.position - anchor));
            if dist > furthest_distance {
                furthest_distance = dist;
                furthest = Some(VertexId(i as u32));
            }
        }
        furthest
    }

    /// Grow the hull to contain `vertex`: drop the faces it sees, then fan
    /// new faces from their horizon to the vertex.
    fn add_vertex(&mut self, data: &LodData, vertex: VertexId) {
        self.outside[vertex.index()].is_inside_hull = true;
        let visible = self.get_visible_triangles(data, vertex);
        if visible.is_empty() {
            // Inside the hull.
            return;
        }
        let horizon = self.get_horizon(&visible);
        self.fill_horizon(data, &horizon, vertex);
    }

    /// Hull faces facing `target`. Empty when the target is inside the hull
    /// or on one of its faces.
    fn get_visible_triangles(&self, data: &LodData, target: VertexId) -> Vec<usize> {
        let target_pos = data.vertices[target.index()].position;
        let mut visible = Vec::new();
        for (i, triangle) in self.hull.iter().enumerate() {
            if triangle.removed {
                continue;
            }
            let anchor = data.vertices[triangle.vertices[0].index()].position;
            let dot1 = triangle.normal.dot(&anchor.coords);
            let dot2 = triangle.normal.dot(&target_pos.coords);
            if (dot2 - dot1).abs() <= self.epsilon {
                // The target is on the face plane; only targets outside the
                // face itself grow the hull.
                if self.is_inside_triangle(data, &target_pos, triangle) {
                    return Vec::new();
                }
                visible.push(i);
            } else if dot1 < dot2 {
                visible.push(i);
            }
        }
        visible
    }

    /// Boundary edges of the visible patch: edges used by exactly one
    /// visible face. Also retires the patch's faces.
    fn get_horizon(&mut self, visible: &[usize]) -> Vec<HullEdge> {
        let mut edges = Vec::with_capacity(visible.len() * 3);
        for &i in visible {
            let [a, b, c] = self.hull[i].vertices;
            edges.push(undirected_edge(a, b));
            edges.push(undirected_edge(b, c));
            edges.push(undirected_edge(c, a));
            self.hull[i].removed = true;
        }
        debug_assert!(!edges.is_empty());
        edges.sort_unstable();
        let mut horizon = Vec::new();
        let mut i = 0;
        while i < edges.len() {
            let mut j = i + 1;
            while j < edges.len() && edges[j] == edges[i] {
                j += 1;
            }
            // Interior edges appear once per adjacent visible face.
            if j - i == 1 {
                horizon.push(edges[i]);
            }
            i = j;
        }
        horizon
    }

    fn fill_horizon(&mut self, data: &LodData, horizon: &[HullEdge], target: VertexId) {
        for &(a, b) in horizon {
            self.create_triangle(data, VertexId(a), VertexId(b), target);
        }
    }

    /// Whether `target`, assumed on the triangle's plane, falls within the
    /// triangle (edges and corners included).
    fn is_inside_triangle(&self, data: &LodData, target: &Point3f, triangle: &HullTriangle) -> bool {
        let p0 = data.vertices[triangle.vertices[0].index()].position;
        let p1 = data.vertices[triangle.vertices[1].index()].position;
        let p2 = data.vertices[triangle.vertices[2].index()].position;
        let n = &triangle.normal;

        let d0 = point_to_line_dir(target, &p0, &p1, n);
        if d0.abs() <= self.epsilon {
            return self.is_inside_line(target, &p0, &p1);
        }
        let b0 = d0 < 0.0;

        let d1 = point_to_line_dir(target, &p1, &p2, n);
        if d1.abs() <= self.epsilon {
            return self.is_inside_line(target, &p1, &p2);
        }
        let b1 = d1 < 0.0;

        if b0 != b1 {
            return false;
        }

        let d2 = point_to_line_dir(target, &p2, &p0, n);
        if d2.abs() <= self.epsilon {
            return self.is_inside_line(target, &p2, &p0);
        }
        let b2 = d2 < 0.0;

        b1 == b2
    }

    fn is_same_position(&self, p0: &Point3f, p1: &Point3f) -> bool {
        (p0.x - p1.x).abs() <= self.epsilon
            && (p0.y - p1.y).abs() <= self.epsilon
            && (p0.z - p1.z).abs() <= self.epsilon
    }

    /// Whether `target` lies between `p0` and `p1`, all three assumed
    /// collinear.
    fn is_inside_line(&self, target: &Point3f, p0: &Point3f, p1: &Point3f) -> bool {
        let v1 = p1 - p0;
        let v2 = target - p0;
        self.is_same_position(target, p1)
            || (v1.dot(&v2) > 0.0 && v1.norm_squared() > v2.norm_squared())
    }

    /// Flood-fill outer-wall flags from each hull face across triangles
    /// whose normals stay within the walk angle of the face.
    fn mark_vertices(&self, data: &mut LodData) {
        for vertex in &mut data.vertices {
            vertex.is_outer_wall = false;
        }
        let mut stack: Vec<VertexId> = Vec::new();
        let mut in_pass = vec![false; data.vertices.len()];
        for hull_triangle in &self.hull {
            stack.clear();
            in_pass.iter_mut().for_each(|v| *v = false);
            push_wall_vertices(data, &mut stack, &mut in_pass, hull_triangle.vertices);
            while let Some(v) = stack.pop() {
                for i in 0..data.vertices[v.index()].triangles.len() {
                    let t = data.vertices[v.index()].triangles[i];
                    if hull_triangle.normal.dot(&data.triangles[t.index()].normal)
                        > self.walk_angle
                    {
                        let vertices = data.triangles[t.index()].vertices;
                        push_wall_vertices(data, &mut stack, &mut in_pass, vertices);
                    }
                }
            }
        }
    }

    /// Bake the current hull into a standalone one-submesh mesh, mainly for
    /// visual debugging of outside marking.
    pub fn build_hull_mesh(&mut self, data: &LodData) -> Result<Mesh> {
        self.generate_hull(data)?;
        debug_assert!(!self.hull.is_empty());

        let vertex_count = self.hull.len() * 3;
        let width = if vertex_count <= usize::from(u16::MAX) + 1 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        };
        let mut positions = Vec::with_capacity(vertex_count);
        let mut indices = IndexBuffer::with_capacity(width, vertex_count);
        for triangle in &self.hull {
            for v in triangle.vertices {
                indices.push(positions.len() as u32);
                positions.push(data.vertices[v.index()].position);
            }
        }

        let mut mesh = Mesh::new();
        mesh.shared_vertex_data = Some(VertexData::from_positions(&positions));
        mesh.add_submesh(SubMesh::new(None, indices));
        Ok(mesh)
    }
}

fn undirected_edge(a: VertexId, b: VertexId) -> HullEdge {
    if a.0 <= b.0 {
        (a.0, b.0)
    } else {
        (b.0, a.0)
    }
}

fn point_to_line_squared_distance(x1: &Point3f, x2: &Point3f, p: &Point3f) -> f32 {
    let up = (x2 - x1).cross(&(x1 - p)).norm_squared();
    let down = (x2 - x1).norm_squared();
    up / down
}

fn tetrahedron_volume(a: &Point3f, b: &Point3f, c: &Point3f, d: &Point3f) -> f32 {
    ((a - d).dot(&(b - d).cross(&(c - d)))).abs() / 6.0
}

/// Signed side of `target` relative to line `p0`-`p1` within the plane of
/// normal `n`.
fn point_to_line_dir(target: &Point3f, p0: &Point3f, p1: &Point3f, n: &Vector3f) -> f32 {
    n.cross(&(p1 - p0)).dot(&(target - p0))
}

fn push_wall_vertices(
    data: &mut LodData,
    stack: &mut Vec<VertexId>,
    in_pass: &mut [bool],
    vertices: [VertexId; 3],
) {
    for v in vertices {
        if !in_pass[v.index()] {
            in_pass[v.index()] = true;
            data.vertices[v.index()].is_outer_wall = true;
            stack.push(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlod_core::QualityMode;

    fn tetrahedron_positions(scale: f32, offset: Vector3f) -> Vec<Point3f> {
        [
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, 0.0, 1.0),
        ]
        .iter()
        .map(|p| Point3f::from(p.coords * scale + offset))
        .collect()
    }

    fn tetrahedron_indices(base: u32) -> Vec<u32> {
        vec![
            base,
            base + 1,
            base + 2,
            base,
            base + 1,
            base + 3,
            base,
            base + 2,
            base + 3,
            base + 1,
            base + 2,
            base + 3,
        ]
    }

    fn build_data(positions: &[Point3f], indices: Vec<u32>) -> (LodData, f32) {
        let mut mesh = Mesh::new();
        mesh.add_submesh(SubMesh::new(
            Some(VertexData::from_positions(positions)),
            IndexBuffer::U32(indices),
        ));
        let radius = mesh.bounding_sphere_radius();
        let mut data = LodData::new(QualityMode::Normal, false);
        data.build(&mesh).unwrap();
        (data, radius)
    }

    #[test]
    fn test_hull_of_tetrahedron() {
        let positions = tetrahedron_positions(1.0, Vector3f::zeros());
        let (data, radius) = build_data(&positions, tetrahedron_indices(0));
        let mut marker = OutsideMarker::new(radius, 0.0);
        marker.generate_hull(&data).unwrap();
        assert_eq!(marker.hull.len(), 4);
        // Every face looks away from the centroid
        for triangle in &marker.hull {
            assert!(!marker.is_visible(&data, triangle, &marker.centroid));
        }
    }

    #[test]
    fn test_enclosed_geometry_is_not_outer_wall() {
        // A small tetrahedron floating inside a large one
        let mut positions = tetrahedron_positions(10.0, Vector3f::zeros());
        positions.extend(tetrahedron_positions(1.0, Vector3f::new(2.0, 2.0, 2.0)));
        let mut indices = tetrahedron_indices(0);
        indices.extend(tetrahedron_indices(4));
        let (mut data, radius) = build_data(&positions, indices);

        // A permissive walk angle marks the whole connected outer component
        let mut marker = OutsideMarker::new(radius, -0.99);
        marker.mark_outside(&mut data).unwrap();
        for i in 0..4 {
            assert!(data.vertices[i].is_outer_wall, "outer vertex {i}");
        }
        for i in 4..8 {
            assert!(!data.vertices[i].is_outer_wall, "enclosed vertex {i}");
        }
    }

    #[test]
    fn test_flat_mesh_is_degenerate() {
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
        ];
        let (mut data, radius) = build_data(&positions, vec![0, 1, 2, 1, 3, 2]);
        let mut marker = OutsideMarker::new(radius, 0.0);
        assert!(marker.mark_outside(&mut data).is_err());
    }

    #[test]
    fn test_hull_mesh_has_unshared_corners() {
        let positions = tetrahedron_positions(1.0, Vector3f::zeros());
        let (data, radius) = build_data(&positions, tetrahedron_indices(0));
        let mut marker = OutsideMarker::new(radius, 0.0);
        let hull_mesh = marker.build_hull_mesh(&data).unwrap();
        let shared = hull_mesh.shared_vertex_data.as_ref().unwrap();
        assert_eq!(shared.vertex_count, 12);
        assert_eq!(hull_mesh.submeshes[0].indices.len(), 12);
    }
}
