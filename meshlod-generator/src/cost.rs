//! Collapse cost heuristics.
//!
//! The cost of a directed edge estimates the visual damage of merging its
//! source vertex into its destination. Curvature, border pulling, seam
//! ripping, vertex normal divergence and outer-wall membership each
//! contribute; profile overrides short-circuit the whole computation.

use meshlod_core::QualityMode;

use crate::generator::ProgressiveMeshGenerator;
use crate::topology::{Edge, VertexId, NEVER_COLLAPSE_COST, UNINITIALIZED_COLLAPSE_COST};

impl ProgressiveMeshGenerator {
    /// Cost of collapsing `src` onto the destination of `dst_edge`.
    ///
    /// Most of the generation time is spent here.
    pub(crate) fn compute_edge_collapse_cost(&self, src_id: VertexId, dst_edge: &Edge) -> f32 {
        let data = &self.data;
        let dst_id = dst_edge.dst;
        let src = &data.vertices[src_id.index()];
        let dst = &data.vertices[dst_id.index()];

        if self.quality != QualityMode::Fastest {
            // Reject collapses that rotate a surviving face normal by more
            // than 90 degrees. Happens when the collapse crosses a very
            // small remaining edge. Skipping this check is a large speedup,
            // hence the Fastest escape hatch.
            for &t in src.triangles.iter() {
                let triangle = &data.triangles[t.index()];
                // The dying faces (those including both src and dst) are
                // exempt.
                if !triangle.has_vertex(dst_id) {
                    let moved = |v: VertexId| {
                        if v == src_id {
                            dst.position
                        } else {
                            data.vertices[v.index()].position
                        }
                    };
                    let p0 = moved(triangle.vertices[0]);
                    let p1 = moved(triangle.vertices[1]);
                    let p2 = moved(triangle.vertices[2]);
                    let new_normal = (p1 - p0).cross(&(p2 - p1));
                    if new_normal.dot(&triangle.normal) < 0.0 {
                        return NEVER_COLLAPSE_COST;
                    }
                }
            }
        }

        let mut cost: f32;
        if data.is_border_vertex(src_id) {
            if dst_edge.ref_count > 1 {
                // src sits on a border but this edge is interior, so the
                // collapse pulls the border inwards. Flat high cost.
                cost = 1.0;
            } else {
                // Collapsing along the border. Curvature says nothing here;
                // measure instead how much the other border edges get bent.
                // A dot near -1 means the edges continue each other and the
                // border stays straight.
                cost = -1.0;
                let collapse_edge = (src.position - dst.position).normalize();
                for e in src.edges.iter() {
                    if e.dst != dst_id && e.ref_count == 1 {
                        let other = &data.vertices[e.dst.index()];
                        let other_border_edge = (src.position - other.position).normalize();
                        cost = cost.max(other_border_edge.dot(&collapse_edge));
                    }
                }
                cost = (1.002 + cost) * 0.5;
            }
        } else {
            // Interior vertex: curvature term. For each face around src take
            // the dying face closest to it in orientation; the face that has
            // no well-aligned dying neighbor dominates the cost.
            cost = 1.0;
            for &t in src.triangles.iter() {
                let normal = data.triangles[t.index()].normal;
                let mut min_curvature = -1.0f32;
                for &t2 in src.triangles.iter() {
                    let triangle2 = &data.triangles[t2.index()];
                    if triangle2.has_vertex(dst_id) {
                        // Dot of face normals is high when the angle
                        // difference is low.
                        min_curvature = min_curvature.max(normal.dot(&triangle2.normal));
                    }
                }
                cost = cost.min(min_curvature);
            }
            cost = (1.002 - cost) * 0.5;
        }

        // Texture seams and submesh boundaries rip open visibly when only
        // one side of the duplicated position moves.
        if src.seam {
            if !dst.seam {
                cost = cost.max(0.05);
                cost *= 64.0;
            } else {
                let harsh = if self.quality == QualityMode::Best {
                    // Sliding along a clean seam line is cheap, but only
                    // when src has exactly two seam neighbors and the seam
                    // does not shortcut past dst.
                    let mut seam_neighbors = 0;
                    let mut other_seam = None;
                    for e in src.edges.iter() {
                        if data.vertices[e.dst.index()].seam {
                            seam_neighbors += 1;
                            if e.dst != dst_id {
                                other_seam = Some(e.dst);
                            }
                        }
                    }
                    seam_neighbors != 2
                        || other_seam.is_some_and(|o| dst.edges.has(&Edge::new(o)))
                } else {
                    false
                };
                if harsh {
                    cost = cost.max(0.05);
                    cost *= 64.0;
                } else {
                    cost = cost.max(0.005);
                    cost *= 8.0;
                }
            }
        }

        let diff = src.normal.dot(&dst.normal) / 8.0;
        let dist = (src.position - dst.position).norm();
        cost *= dist;
        if data.use_vertex_normals {
            // Penalize shading changes around the collapse by the largest
            // normal divergence among the neighbors, weighted by how far
            // the neighborhood moves.
            let mut normal_cost = 0.0f32;
            for e in src.edges.iter() {
                let neighbor = &data.vertices[e.dst.index()];
                let before_dist = (neighbor.position - src.position).norm();
                let after_dist = (neighbor.position - dst.position).norm();
                let before_dot = neighbor.normal.dot(&src.normal);
                let after_dot = neighbor.normal.dot(&dst.normal);
                normal_cost = normal_cost.max(
                    diff.max((before_dot - after_dot).abs())
                        * (after_dist / 8.0).max(dist.max((before_dist - after_dist).abs())),
                );
            }
            cost = (normal_cost * 0.25).max(cost);
        }

        if src.is_outer_wall || dst.is_outer_wall {
            if self.outside_weight != 0.0 {
                if self.outside_weight != 1.0 {
                    cost *= 0.0078125f32.max(self.outside_weight * 8.0);
                } else {
                    return NEVER_COLLAPSE_COST;
                }
            }
        }

        debug_assert!(cost >= 0.0);
        cost
    }

    /// Refresh every outgoing edge cost of `v` and pick the cheapest target.
    ///
    /// Returns `UNINITIALIZED_COLLAPSE_COST` and no target for a vertex with
    /// no remaining edges.
    pub(crate) fn compute_vertex_collapse_cost(&mut self, v: VertexId) -> (f32, Option<VertexId>) {
        let mut collapse_cost = UNINITIALIZED_COLLAPSE_COST;
        let mut collapse_to = None;
        let has_profile = self.data.vertices[v.index()].has_profile;
        for i in 0..self.data.vertices[v.index()].edges.len() {
            let edge = self.data.vertices[v.index()].edges[i];
            let mut cost = UNINITIALIZED_COLLAPSE_COST;
            if has_profile {
                if let Some(overrides) = self.profile_lookup.get(&v) {
                    if let Some(&(_, forced)) = overrides.iter().find(|(d, _)| *d == edge.dst) {
                        cost = forced;
                    }
                }
            }
            if cost == UNINITIALIZED_COLLAPSE_COST {
                cost = self.compute_edge_collapse_cost(v, &edge);
            }
            self.data.vertices[v.index()].edges[i].collapse_cost = cost;
            if collapse_cost > cost {
                collapse_cost = cost;
                collapse_to = Some(edge.dst);
            }
        }
        (collapse_cost, collapse_to)
    }
}
