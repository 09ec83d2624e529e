//! Index streams and baked LOD index views

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Width of one index in an index stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexWidth {
    U16,
    U32,
}

/// A triangle index stream, either 16-bit or 32-bit.
///
/// Mixed widths across submeshes are supported within one generation run;
/// each submesh keeps the width of its source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    pub fn with_capacity(width: IndexWidth, capacity: usize) -> Self {
        match width {
            IndexWidth::U16 => IndexBuffer::U16(Vec::with_capacity(capacity)),
            IndexWidth::U32 => IndexBuffer::U32(Vec::with_capacity(capacity)),
        }
    }

    pub fn width(&self) -> IndexWidth {
        match self {
            IndexBuffer::U16(_) => IndexWidth::U16,
            IndexBuffer::U32(_) => IndexWidth::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> u32 {
        match self {
            IndexBuffer::U16(v) => u32::from(v[i]),
            IndexBuffer::U32(v) => v[i],
        }
    }

    /// Append one index, narrowing to the buffer's width.
    pub fn push(&mut self, index: u32) {
        match self {
            IndexBuffer::U16(v) => v.push(index as u16),
            IndexBuffer::U32(v) => v.push(index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// One baked LOD level's view into a physical index buffer.
///
/// In compression mode two adjacent levels alias the same `Arc`'d buffer
/// with different start/count windows; otherwise each level owns its buffer
/// outright and the window covers it fully.
#[derive(Debug, Clone)]
pub struct LodIndexData {
    pub index_start: usize,
    pub index_count: usize,
    pub buffer: Arc<IndexBuffer>,
}

impl LodIndexData {
    /// Iterate the indices visible through this view.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        (self.index_start..self.index_start + self.index_count).map(move |i| self.buffer.get(i))
    }

    /// Iterate the triangles visible through this view.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        (0..self.index_count / 3).map(move |t| {
            let base = self.index_start + t * 3;
            [
                self.buffer.get(base),
                self.buffer.get(base + 1),
                self.buffer.get(base + 2),
            ]
        })
    }
}
