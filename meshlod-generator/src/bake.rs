//! Baking surviving triangles into LOD index buffers.
//!
//! Plain baking emits one physical buffer per level and submesh. Merged
//! baking packs two adjacent levels into a single shared buffer: indices
//! exclusive to the previous level first, then the shared run, then the
//! indices exclusive to the current level. The two views overlap on the
//! shared run, which roughly halves index memory across a LOD chain.

use std::sync::Arc;

use meshlod_core::{IndexBuffer, LodIndexData, Mesh};

use crate::generator::ProgressiveMeshGenerator;

impl ProgressiveMeshGenerator {
    /// Bake each submesh's live triangles into a fresh buffer and append
    /// the level to the mesh.
    pub(crate) fn bake_lods(&mut self, mesh: &mut Mesh) {
        let mut buffers: Vec<IndexBuffer> = self
            .data
            .index_buffer_infos
            .iter()
            .map(|info| {
                let mut buffer =
                    IndexBuffer::with_capacity(info.width, info.index_count.max(3));
                if info.index_count == 0 {
                    // A degenerate triangle keeps the buffer non-empty;
                    // some render systems fault on zero-length index
                    // buffers.
                    for _ in 0..3 {
                        buffer.push(0);
                    }
                }
                buffer
            })
            .collect();

        for triangle in &self.data.triangles {
            if !triangle.removed {
                debug_assert!(self.data.index_buffer_infos[triangle.submesh].index_count != 0);
                for &slot in &triangle.vertex_ids {
                    buffers[triangle.submesh].push(slot);
                }
            }
        }

        for (submesh, buffer) in buffers.into_iter().enumerate() {
            let index_count = buffer.len();
            mesh.submeshes[submesh].lods.push(LodIndexData {
                index_start: 0,
                index_count,
                buffer: Arc::new(buffer),
            });
        }
    }

    /// One half of a merged bake.
    ///
    /// The first pass only snapshots the current triangle slots; the second
    /// pass, after further collapsing, lays both levels out into one shared
    /// buffer and appends the two views.
    pub(crate) fn bake_merged_lods(&mut self, mesh: &mut Mesh, first_buffer_pass: bool) {
        if first_buffer_pass {
            self.last_index_buffer_id = mesh.submeshes[0].lods.len();
            for info in &mut self.data.index_buffer_infos {
                info.prev_index_count = info.index_count;
                info.prev_only_index_count = 0;
            }
            for triangle in &mut self.data.triangles {
                triangle.vertex_changed = false;
                if !triangle.removed {
                    triangle.prev_lod = triangle.vertex_ids;
                }
            }
            return;
        }

        // Second pass: previous-only indices, then the shared run, then
        // current-only indices.
        let mut buffers: Vec<IndexBuffer> = self
            .data
            .index_buffer_infos
            .iter()
            .map(|info| {
                debug_assert!(info.prev_index_count >= info.index_count);
                debug_assert!(info.prev_index_count >= info.prev_only_index_count);
                let total = info.index_count + info.prev_only_index_count;
                let mut buffer = IndexBuffer::with_capacity(info.width, total.max(3));
                if total == 0 {
                    for _ in 0..3 {
                        buffer.push(0);
                    }
                }
                buffer
            })
            .collect();

        for triangle in &self.data.triangles {
            if triangle.vertex_changed {
                debug_assert!(
                    self.data.index_buffer_infos[triangle.submesh].prev_index_count != 0
                );
                for &slot in &triangle.prev_lod {
                    buffers[triangle.submesh].push(slot);
                }
            }
        }
        for triangle in &self.data.triangles {
            if !triangle.removed && !triangle.vertex_changed {
                debug_assert_eq!(triangle.prev_lod, triangle.vertex_ids);
                for &slot in &triangle.vertex_ids {
                    buffers[triangle.submesh].push(slot);
                }
            }
        }
        for triangle in &self.data.triangles {
            if !triangle.removed && triangle.vertex_changed {
                for &slot in &triangle.vertex_ids {
                    buffers[triangle.submesh].push(slot);
                }
            }
        }

        for (submesh, buffer) in buffers.into_iter().enumerate() {
            let info = &self.data.index_buffer_infos[submesh];
            let total = buffer.len();
            let shared = Arc::new(buffer);
            let prev_lod = LodIndexData {
                index_start: 0,
                index_count: info.prev_index_count.max(3),
                buffer: Arc::clone(&shared),
            };
            let mut cur_start = total - info.index_count;
            let mut cur_count = info.index_count;
            if cur_count == 0 {
                // Point the view at the degenerate triangle.
                cur_start -= 3;
                cur_count = 3;
            }
            let cur_lod = LodIndexData {
                index_start: cur_start,
                index_count: cur_count,
                buffer: shared,
            };
            let lods = &mut mesh.submeshes[submesh].lods;
            lods.insert(self.last_index_buffer_id, prev_lod);
            lods.push(cur_lod);
        }
    }
}
