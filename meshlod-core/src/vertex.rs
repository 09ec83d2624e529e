//! Raw interleaved vertex streams and element descriptors

use nalgebra::{Point3, Vector3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// Required byte size of a position element (3 x f32). Other position
/// encodings are not supported.
pub const POSITION_ELEMENT_SIZE: usize = 12;

/// Byte-level descriptor of one element inside an interleaved vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    /// Byte offset of the element from the start of a vertex
    pub offset: usize,
    /// Byte size of the element
    pub size: usize,
}

/// An interleaved vertex stream with arbitrary stride.
///
/// Positions are mandatory and must be packed as 3 x f32 (12 bytes); normals
/// are optional and use the same encoding. The buffer layout is opaque to the
/// generator apart from the declared elements.
#[derive(Debug, Clone)]
pub struct VertexData {
    pub buffer: Vec<u8>,
    pub vertex_count: usize,
    /// Byte stride between consecutive vertices
    pub vertex_size: usize,
    pub position: VertexElement,
    pub normal: Option<VertexElement>,
}

impl VertexData {
    /// Pack a tightly strided position-only stream.
    pub fn from_positions(positions: &[Point3f]) -> Self {
        let mut buffer = Vec::with_capacity(positions.len() * POSITION_ELEMENT_SIZE);
        for p in positions {
            for c in [p.x, p.y, p.z] {
                buffer.extend_from_slice(&c.to_le_bytes());
            }
        }
        Self {
            buffer,
            vertex_count: positions.len(),
            vertex_size: POSITION_ELEMENT_SIZE,
            position: VertexElement {
                offset: 0,
                size: POSITION_ELEMENT_SIZE,
            },
            normal: None,
        }
    }

    /// Pack a tightly strided position + normal stream.
    ///
    /// # Panics
    /// Panics if the two slices differ in length.
    pub fn from_positions_and_normals(positions: &[Point3f], normals: &[Vector3f]) -> Self {
        assert_eq!(positions.len(), normals.len());
        let stride = 2 * POSITION_ELEMENT_SIZE;
        let mut buffer = Vec::with_capacity(positions.len() * stride);
        for (p, n) in positions.iter().zip(normals) {
            for c in [p.x, p.y, p.z, n.x, n.y, n.z] {
                buffer.extend_from_slice(&c.to_le_bytes());
            }
        }
        Self {
            buffer,
            vertex_count: positions.len(),
            vertex_size: stride,
            position: VertexElement {
                offset: 0,
                size: POSITION_ELEMENT_SIZE,
            },
            normal: Some(VertexElement {
                offset: POSITION_ELEMENT_SIZE,
                size: POSITION_ELEMENT_SIZE,
            }),
        }
    }

    fn read3(&self, index: usize, element: &VertexElement) -> [f32; 3] {
        let base = index * self.vertex_size + element.offset;
        bytemuck::pod_read_unaligned(&self.buffer[base..base + POSITION_ELEMENT_SIZE])
    }

    /// Read the position of vertex `index`.
    pub fn position(&self, index: usize) -> Point3f {
        let [x, y, z] = self.read3(index, &self.position);
        Point3f::new(x, y, z)
    }

    /// Read the normal of vertex `index`.
    ///
    /// # Panics
    /// Panics if the stream declares no normal element.
    pub fn normal(&self, index: usize) -> Vector3f {
        let element = self
            .normal
            .as_ref()
            .expect("vertex stream has no normal element");
        let [x, y, z] = self.read3(index, element);
        Vector3f::new(x, y, z)
    }

    pub fn has_normals(&self) -> bool {
        self.normal.is_some()
    }
}
