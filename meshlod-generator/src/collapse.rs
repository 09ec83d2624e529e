//! Prioritized edge collapsing.
//!
//! All vertices sit in a priority queue keyed by their cheapest outgoing
//! collapse cost. Each LOD level pops and collapses vertices until its
//! reduction target is met, then bakes the surviving triangles.

use std::cmp::Ordering;

use itertools::Itertools;
use log::debug;
use meshlod_core::{LodConfig, LodLevel, Mesh, QualityMode, ReductionMethod};

use crate::generator::ProgressiveMeshGenerator;
use crate::topology::{TriangleId, VertexId, NEVER_COLLAPSE_COST, UNINITIALIZED_COLLAPSE_COST};

/// Queue priority wrapper ordering the cheapest collapse first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CollapseCost(pub f32);

impl Eq for CollapseCost {}

impl PartialOrd for CollapseCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CollapseCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the queue pops its maximum priority.
        other.0.total_cmp(&self.0)
    }
}

/// One collapsed index-buffer edge, used to rewire surviving triangles of
/// the same submesh onto compatible destination slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CollapsedEdge {
    pub src_slot: u32,
    pub dst_slot: u32,
    pub submesh: usize,
}

impl ProgressiveMeshGenerator {
    /// Seed the queue with every connected vertex.
    pub(crate) fn compute_costs(&mut self) {
        self.collapse_queue.clear();
        for i in 0..self.data.vertices.len() {
            let v = VertexId(i as u32);
            if !self.data.vertices[i].edges.is_empty() {
                self.init_vertex_collapse_cost(v);
            } else {
                debug!("vertex {i} is not referenced by any triangle, excluded from LOD calculations");
            }
        }
    }

    fn init_vertex_collapse_cost(&mut self, v: VertexId) {
        debug_assert!(!self.data.vertices[v.index()].edges.is_empty());
        let (cost, collapse_to) = self.compute_vertex_collapse_cost(v);
        self.data.vertices[v.index()].collapse_to = collapse_to;
        self.collapse_queue.push(v, CollapseCost(cost));
    }

    /// Recompute a vertex's queue entry after a nearby collapse. A vertex
    /// left without edges drops out of the queue entirely.
    fn update_vertex_collapse_cost(&mut self, v: VertexId) {
        let (cost, collapse_to) = self.compute_vertex_collapse_cost(v);
        let unchanged = self.data.vertices[v.index()].collapse_to == collapse_to
            && self
                .collapse_queue
                .get_priority(&v)
                .is_some_and(|c| c.0 == cost);
        if unchanged {
            return;
        }
        self.collapse_queue.remove(&v);
        if cost != UNINITIALIZED_COLLAPSE_COST {
            self.data.vertices[v.index()].collapse_to = collapse_to;
            self.collapse_queue.push(v, CollapseCost(cost));
        } else {
            self.data.vertices[v.index()].collapse_to = None;
        }
    }

    /// Translate a level's reduction request into a target unique vertex
    /// count, setting the cost ceiling as a side effect.
    pub(crate) fn calc_lod_vertex_count(&mut self, level: &LodLevel) -> usize {
        let unique_vertices = self.data.vertices.len();
        match level.reduction {
            ReductionMethod::Proportional(fraction) => {
                self.collapse_cost_limit = NEVER_COLLAPSE_COST;
                unique_vertices - (unique_vertices as f32 * fraction) as usize
            }
            ReductionMethod::Constant(reduction) => {
                self.collapse_cost_limit = NEVER_COLLAPSE_COST;
                unique_vertices.saturating_sub(reduction)
            }
            ReductionMethod::CollapseCost(ceiling) => {
                self.collapse_cost_limit = ceiling;
                0
            }
        }
    }

    /// Run all requested levels against the shared topology, collapsing
    /// cumulatively and baking index buffers for each retained level.
    pub(crate) fn compute_lods(&mut self, mesh: &mut Mesh, config: &mut LodConfig) {
        let mut vertex_count = self.data.vertices.len();
        let mut last_bake_vertex_count = vertex_count;
        let lod_count = config.levels.len();
        let mut first_buf_pass = true;
        for cur_lod in 0..lod_count {
            if config.levels[cur_lod].manual_mesh_name.is_some() {
                // The host swaps in a hand-authored mesh for this level.
                config.levels[cur_lod].out_skipped = false;
                config.levels[cur_lod].out_unique_vertex_count = 0;
                continue;
            }
            let needed_vertex_count = self.calc_lod_vertex_count(&config.levels[cur_lod]);
            while needed_vertex_count < vertex_count {
                match self.collapse_queue.peek() {
                    Some((&next, &cost)) if cost.0 < self.collapse_cost_limit => {
                        self.last_collapsed = Some(next);
                        self.collapse(next);
                        vertex_count -= 1;
                    }
                    _ => break,
                }
            }
            config.levels[cur_lod].out_unique_vertex_count = vertex_count;
            config.levels[cur_lod].out_skipped = last_bake_vertex_count == vertex_count;
            if !config.levels[cur_lod].out_skipped {
                last_bake_vertex_count = vertex_count;
                if self.use_compression && (lod_count - 1 != cur_lod || !first_buf_pass) {
                    self.bake_merged_lods(mesh, first_buf_pass);
                    first_buf_pass = !first_buf_pass;
                } else {
                    // Last level, or compression disabled
                    self.bake_lods(mesh);
                }
            }
        }

        if !first_buf_pass {
            // The compressed buffer pair was left half complete; this only
            // happens when the trailing levels were skipped.
            self.bake_lods(mesh);
        }
    }

    /// Find a recorded collapsed edge whose source slot can substitute for
    /// `src_slot` in `submesh`. Exact slot matches win over any-slot
    /// matches of the same submesh.
    fn find_dst_id(&self, src_slot: u32, submesh: usize) -> Option<usize> {
        self.tmp_collapsed_edges
            .iter()
            .position(|c| c.src_slot == src_slot && c.submesh == submesh)
            .or_else(|| {
                self.tmp_collapsed_edges
                    .iter()
                    .position(|c| c.submesh == submesh)
            })
    }

    fn has_src_id(&self, src_slot: u32, submesh: usize) -> bool {
        self.tmp_collapsed_edges
            .iter()
            .any(|c| c.src_slot == src_slot && c.submesh == submesh)
    }

    /// Merge `src_id` into its recorded collapse target.
    pub(crate) fn collapse(&mut self, src_id: VertexId) {
        let Some(dst_id) = self.data.vertices[src_id.index()].collapse_to else {
            debug_assert!(false, "collapsing a vertex with no target");
            return;
        };
        debug_assert!(!self.data.vertices[src_id.index()].edges.is_empty());
        debug_assert!(!self.data.vertices[src_id.index()].triangles.is_empty());

        // Triangles may come from different submeshes with different index
        // buffer slots for the same position, so the dying triangles' edges
        // are recorded first and used to pick compatible replacement slots.
        self.tmp_collapsed_edges.clear();
        // Neither loop below mutates src's own incidence sets, so one
        // snapshot serves both.
        let src_triangles: Vec<_> = self.data.vertices[src_id.index()].triangles.to_vec();
        for &t in &src_triangles {
            if !self.data.triangles[t.index()].has_vertex(dst_id) {
                continue;
            }
            // Dying triangle: record its collapsed edge, discount it from
            // upcoming levels and detach it.
            let submesh = self.data.triangles[t.index()].submesh;
            let src_slot = self.data.triangles[t.index()].vertex_id_of(src_id);
            if !self.has_src_id(src_slot, submesh) {
                self.tmp_collapsed_edges.push(CollapsedEdge {
                    src_slot,
                    dst_slot: self.data.triangles[t.index()].vertex_id_of(dst_id),
                    submesh,
                });
            }
            self.data.index_buffer_infos[submesh].index_count -= 3;
            self.data.triangles[t.index()].removed = true;
            self.data.remove_triangle_from_edges(t, Some(src_id));
            self.mark_triangle_changed(t);
        }
        debug_assert!(!self.tmp_collapsed_edges.is_empty());

        for &t in &src_triangles {
            if self.data.triangles[t.index()].has_vertex(dst_id) {
                continue;
            }
            let submesh = self.data.triangles[t.index()].submesh;
            let src_slot = self.data.triangles[t.index()].vertex_id_of(src_id);
            match self.find_dst_id(src_slot, submesh) {
                None => {
                    // No collapsed edge of this submesh to move along;
                    // destroy the triangle.
                    self.data.triangles[t.index()].removed = true;
                    self.data.index_buffer_infos[submesh].index_count -= 3;
                    self.data.remove_triangle_from_edges(t, Some(src_id));
                    self.mark_triangle_changed(t);
                }
                Some(id) => {
                    let dst_slot = self.tmp_collapsed_edges[id].dst_slot;
                    self.data.replace_vertex_id(t, src_slot, dst_slot, dst_id);
                    self.mark_triangle_changed(t);
                    if self.quality == QualityMode::Best {
                        self.data.update_triangle_normal(t);
                    }
                }
            }
        }

        if self.data.vertices[src_id.index()].seam {
            self.data.vertices[dst_id.index()].seam = true;
        }

        if self.quality == QualityMode::Best {
            // Costs two hops away can go stale through the curvature term;
            // recompute the whole two-ring.
            let updatable: Vec<VertexId> = self.data.vertices[src_id.index()]
                .edges
                .iter()
                .flat_map(|e| {
                    std::iter::once(e.dst).chain(
                        self.data.vertices[e.dst.index()]
                            .edges
                            .iter()
                            .map(|e2| e2.dst),
                    )
                })
                .unique()
                .collect();
            for v in updatable {
                self.update_vertex_collapse_cost(v);
            }
        } else {
            let neighbors: Vec<VertexId> = self.data.vertices[src_id.index()]
                .edges
                .iter()
                .map(|e| e.dst)
                .collect();
            for v in neighbors {
                self.update_vertex_collapse_cost(v);
            }
        }

        self.collapse_queue.remove(&src_id);
        self.data.vertices[src_id.index()].edges.clear();
        self.data.vertices[src_id.index()].triangles.clear();
    }

    /// Triangles touched since the last compression snapshot contribute
    /// their snapshot triple to the previous level's exclusive region.
    fn mark_triangle_changed(&mut self, t: TriangleId) {
        let triangle = &mut self.data.triangles[t.index()];
        if !triangle.vertex_changed {
            triangle.vertex_changed = true;
            self.data.index_buffer_infos[triangle.submesh].prev_only_index_count += 3;
        }
    }

    /// Consistency check over the surviving topology, used by tests.
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        use crate::topology::Edge;
        for (v, _) in self.collapse_queue.iter() {
            for &t in self.data.vertices[v.index()].triangles.iter() {
                let triangle = &self.data.triangles[t.index()];
                assert!(!triangle.removed);
                for i in 0..3 {
                    let vi = triangle.vertices[i];
                    assert!(self.collapse_queue.get_priority(&vi).is_some());
                    for n in 0..3 {
                        let vn = triangle.vertices[n];
                        if i != n {
                            let edge = self.data.vertices[vi.index()]
                                .edges
                                .iter()
                                .find(|e| e.dst == vn)
                                .expect("triangle corners must stay connected");
                            assert_ne!(edge.collapse_cost, UNINITIALIZED_COLLAPSE_COST);
                        } else {
                            assert!(!self.data.vertices[vi.index()].edges.has(&Edge::new(vn)));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlod_core::{IndexBuffer, Point3f, SubMesh, VertexData};

    fn prepared_generator(mesh: &Mesh) -> ProgressiveMeshGenerator {
        let mut generator = ProgressiveMeshGenerator::new();
        generator.data.build(mesh).unwrap();
        generator.data.clear_build_state();
        generator.compute_costs();
        generator
    }

    #[test]
    fn test_collapse_cost_ordering() {
        assert!(CollapseCost(0.5) > CollapseCost(1.0));
        assert!(CollapseCost(NEVER_COLLAPSE_COST) < CollapseCost(0.0));
        assert_eq!(CollapseCost(2.0).cmp(&CollapseCost(2.0)), Ordering::Equal);
    }

    #[test]
    fn test_queue_pops_cheapest_first() {
        let mut queue = priority_queue::PriorityQueue::new();
        queue.push(VertexId(0), CollapseCost(3.0));
        queue.push(VertexId(1), CollapseCost(0.25));
        queue.push(VertexId(2), CollapseCost(NEVER_COLLAPSE_COST));
        assert_eq!(queue.pop(), Some((VertexId(1), CollapseCost(0.25))));
        assert_eq!(queue.pop(), Some((VertexId(0), CollapseCost(3.0))));
    }

    #[test]
    fn test_seam_flag_propagates_to_merge_target() {
        // Slot 3 duplicates slot 0's position, so the merged vertex at the
        // origin is a seam. Collapsing it must taint its merge target.
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(-1.0, 0.0, 0.0),
        ];
        let mut mesh = Mesh::new();
        mesh.add_submesh(SubMesh::new(
            Some(VertexData::from_positions(&positions)),
            IndexBuffer::U16(vec![0, 1, 2, 3, 2, 4]),
        ));
        let mut generator = prepared_generator(&mesh);
        let src = VertexId(
            generator
                .data
                .vertices
                .iter()
                .position(|v| v.seam)
                .unwrap() as u32,
        );
        let dst = generator.data.vertices[src.index()].collapse_to.unwrap();
        assert!(!generator.data.vertices[dst.index()].seam);
        generator.collapse(src);
        assert!(generator.data.vertices[dst.index()].seam);
    }

    #[test]
    fn test_collapse_between_regular_vertices_adds_no_seam() {
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ];
        let mut mesh = Mesh::new();
        mesh.add_submesh(SubMesh::new(
            Some(VertexData::from_positions(&positions)),
            IndexBuffer::U16(vec![0, 1, 2, 0, 2, 3]),
        ));
        let mut generator = prepared_generator(&mesh);
        assert!(generator.data.vertices.iter().all(|v| !v.seam));
        let (src, _) = generator.collapse_queue.pop().unwrap();
        generator.collapse(src);
        assert!(generator.data.vertices.iter().all(|v| !v.seam));
    }
}
