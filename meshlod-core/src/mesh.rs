//! Host mesh representation: submeshes over shared or dedicated vertex streams

use crate::index::{IndexBuffer, LodIndexData};
use crate::vertex::{Point3f, VertexData};

/// One submesh: an index stream over either a dedicated vertex stream or the
/// mesh's shared one, plus the LOD index views baked for it.
#[derive(Debug, Clone)]
pub struct SubMesh {
    /// `None` means the submesh uses the mesh's shared vertex stream
    pub vertex_data: Option<VertexData>,
    pub indices: IndexBuffer,
    /// Baked LOD index views, one per non-skipped generated level
    pub lods: Vec<LodIndexData>,
}

impl SubMesh {
    pub fn new(vertex_data: Option<VertexData>, indices: IndexBuffer) -> Self {
        Self {
            vertex_data,
            indices,
            lods: Vec::new(),
        }
    }

    pub fn uses_shared_vertices(&self) -> bool {
        self.vertex_data.is_none()
    }
}

/// A triangle mesh composed of submeshes.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub shared_vertex_data: Option<VertexData>,
    pub submeshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_submesh(&mut self, submesh: SubMesh) -> usize {
        self.submeshes.push(submesh);
        self.submeshes.len() - 1
    }

    /// Resolve the vertex stream a submesh reads from.
    pub fn vertex_data(&self, submesh: usize) -> Option<&VertexData> {
        self.submeshes[submesh]
            .vertex_data
            .as_ref()
            .or(self.shared_vertex_data.as_ref())
    }

    fn for_each_position(&self, mut f: impl FnMut(Point3f)) {
        if let Some(shared) = &self.shared_vertex_data {
            for i in 0..shared.vertex_count {
                f(shared.position(i));
            }
        }
        for submesh in &self.submeshes {
            if let Some(data) = &submesh.vertex_data {
                for i in 0..data.vertex_count {
                    f(data.position(i));
                }
            }
        }
    }

    /// Radius of a bounding sphere centered on the bounding box center.
    ///
    /// Returns 0.0 for a mesh without vertex data.
    pub fn bounding_sphere_radius(&self) -> f32 {
        let mut min = Point3f::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Point3f::new(f32::MIN, f32::MIN, f32::MIN);
        let mut any = false;
        self.for_each_position(|p| {
            any = true;
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        });
        if !any {
            return 0.0;
        }
        let center = nalgebra::center(&min, &max);
        let mut radius: f32 = 0.0;
        self.for_each_position(|p| {
            radius = radius.max((p - center).norm());
        });
        radius
    }

    /// Drop all previously baked LOD index views.
    pub fn remove_lod_levels(&mut self) {
        for submesh in &mut self.submeshes {
            submesh.lods.clear();
        }
    }
}
