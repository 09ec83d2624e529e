//! The progressive mesh generator.
//!
//! Drives one generation run: builds the collapse topology from the host
//! mesh, seeds the cost queue, collapses vertices level by level and bakes
//! the surviving index buffers back onto the mesh.

use std::collections::HashMap;

use log::debug;
use priority_queue::PriorityQueue;

use meshlod_core::{
    Error, LodConfig, Mesh, Point3f, ProfiledEdge, QualityMode, ReductionMethod, Result,
};

use crate::collapse::{CollapseCost, CollapsedEdge};
use crate::outside_marker::OutsideMarker;
use crate::topology::{LodData, VertexId, NEVER_COLLAPSE_COST};

/// Reduces a mesh with iterative edge collapses and bakes the result as LOD
/// index buffers onto the mesh.
///
/// A single generator can be reused across meshes; all per-run state is
/// rebuilt by [`generate_lod_levels`](Self::generate_lod_levels).
pub struct ProgressiveMeshGenerator {
    pub(crate) data: LodData,
    pub(crate) collapse_queue: PriorityQueue<VertexId, CollapseCost>,
    pub(crate) profile_lookup: HashMap<VertexId, Vec<(VertexId, f32)>>,
    pub(crate) tmp_collapsed_edges: Vec<CollapsedEdge>,
    pub(crate) collapse_cost_limit: f32,
    pub(crate) outside_weight: f32,
    pub(crate) outside_walk_angle: f32,
    pub(crate) quality: QualityMode,
    pub(crate) use_compression: bool,
    bounding_sphere_radius: f32,
    pub(crate) last_index_buffer_id: usize,
    pub(crate) last_collapsed: Option<VertexId>,
}

impl Default for ProgressiveMeshGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressiveMeshGenerator {
    pub fn new() -> Self {
        Self {
            data: LodData::new(QualityMode::default(), true),
            collapse_queue: PriorityQueue::new(),
            profile_lookup: HashMap::new(),
            tmp_collapsed_edges: Vec::new(),
            collapse_cost_limit: NEVER_COLLAPSE_COST,
            outside_weight: 0.0,
            outside_walk_angle: 0.0,
            quality: QualityMode::default(),
            use_compression: false,
            bounding_sphere_radius: 0.0,
            last_index_buffer_id: 0,
            last_collapsed: None,
        }
    }

    /// Generate all configured LOD levels for `mesh`.
    ///
    /// Previously baked levels are dropped first. The config is written
    /// back to: each level's `out_*` fields record the achieved vertex
    /// count and whether the level was skipped, and
    /// `advanced.use_vertex_normals` reflects whether normals were actually
    /// available on every consumed vertex stream.
    pub fn generate_lod_levels(&mut self, mesh: &mut Mesh, config: &mut LodConfig) -> Result<()> {
        validate_config(config)?;

        self.outside_weight = config.advanced.outside_weight;
        self.outside_walk_angle = config.advanced.outside_walk_angle;
        self.quality = config.advanced.quality;
        self.use_compression = config.advanced.use_compression;
        self.bounding_sphere_radius = mesh.bounding_sphere_radius();
        self.data = LodData::new(self.quality, config.advanced.use_vertex_normals);
        self.collapse_queue.clear();
        self.profile_lookup.clear();
        self.tmp_collapsed_edges.clear();
        self.collapse_cost_limit = NEVER_COLLAPSE_COST;
        self.last_index_buffer_id = 0;
        self.last_collapsed = None;

        mesh.remove_lod_levels();
        self.data.build(mesh)?;
        self.inject_profile(&config.advanced.profile)?;
        self.data.clear_build_state();
        debug!(
            "built collapse topology: {} unique vertices, {} triangles",
            self.data.vertices.len(),
            self.data.triangles.len()
        );

        if self.outside_weight != 0.0 {
            let mut marker =
                OutsideMarker::new(self.bounding_sphere_radius, self.outside_walk_angle);
            marker.mark_outside(&mut self.data)?;
        }

        self.compute_costs();
        self.compute_lods(mesh, config);

        config.advanced.use_vertex_normals = self.data.use_vertex_normals;
        debug!(
            "generated {} LOD levels ({} skipped)",
            config.levels.len(),
            config.levels.iter().filter(|l| l.out_skipped).count()
        );
        Ok(())
    }

    /// Generate LOD levels from a configuration tuned automatically to the
    /// mesh's bounding sphere, returning the configuration with its
    /// written-back results.
    pub fn generate_autoconfigured_lod_levels(&mut self, mesh: &mut Mesh) -> Result<LodConfig> {
        let mut config = LodConfig::autoconfigure(mesh.bounding_sphere_radius());
        self.generate_lod_levels(mesh, &mut config)?;
        Ok(config)
    }

    /// Build the convex hull of `mesh` as a standalone mesh, for debugging
    /// outside marking.
    pub fn generate_convex_hull(mesh: &Mesh) -> Result<Mesh> {
        let mut data = LodData::new(QualityMode::Normal, false);
        data.build(mesh)?;
        data.clear_build_state();
        let mut marker = OutsideMarker::new(mesh.bounding_sphere_radius(), 0.0);
        marker.build_hull_mesh(&data)
    }

    /// Positions of the most recently collapsed edge of the last run, as
    /// (collapsed vertex, merge target). Useful for stepping through a
    /// reduction visually.
    pub fn last_collapsed_edge(&self) -> Option<(Point3f, Point3f)> {
        self.last_collapsed.and_then(|v| {
            let vertex = &self.data.vertices[v.index()];
            vertex
                .collapse_to
                .map(|dst| (vertex.position, self.data.vertices[dst.index()].position))
        })
    }

    /// Resolve profiled edges against the topology. The positions must
    /// match vertices of the mesh exactly.
    fn inject_profile(&mut self, profile: &[ProfiledEdge]) -> Result<()> {
        for edge in profile {
            let src = self.data.find_vertex(&edge.src).ok_or_else(|| {
                Error::InvalidData(format!(
                    "profiled edge source {:?} does not match any vertex",
                    edge.src
                ))
            })?;
            let dst = self.data.find_vertex(&edge.dst).ok_or_else(|| {
                Error::InvalidData(format!(
                    "profiled edge destination {:?} does not match any vertex",
                    edge.dst
                ))
            })?;
            self.data.vertices[src.index()].has_profile = true;
            self.profile_lookup
                .entry(src)
                .or_default()
                .push((dst, edge.cost));
        }
        Ok(())
    }
}

fn validate_config(config: &LodConfig) -> Result<()> {
    if config.levels.is_empty() {
        return Err(Error::InvalidData(
            "LOD configuration has no levels".to_string(),
        ));
    }
    if config.levels.len() > 0xffff {
        return Err(Error::InvalidData(format!(
            "too many LOD levels: {}",
            config.levels.len()
        )));
    }
    // Activation values must be monotone; both orderings are accepted since
    // distance-style values grow with reduction while pixel-count-style
    // values shrink.
    let sorted = |ordered: fn(&[f32; 2]) -> bool| {
        config
            .levels
            .iter()
            .map(|l| l.value)
            .collect::<Vec<_>>()
            .windows(2)
            .all(|w| ordered(&[w[0], w[1]]))
    };
    if !sorted(|w| w[0] <= w[1]) && !sorted(|w| w[0] >= w[1]) {
        return Err(Error::InvalidData(
            "LOD level values must be sorted".to_string(),
        ));
    }
    for level in &config.levels {
        if let ReductionMethod::Proportional(fraction) = level.reduction {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(Error::InvalidData(format!(
                    "proportional reduction {fraction} is not a fraction of the vertex count"
                )));
            }
        }
    }
    let walk_angle = config.advanced.outside_walk_angle;
    if !(-1.0..=1.0).contains(&walk_angle) {
        return Err(Error::InvalidData(format!(
            "outside walk angle {walk_angle} is not a dot product value"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlod_core::{
        IndexBuffer, LodLevel, ReductionMethod, SubMesh, VertexData,
    };
    use std::sync::Arc;

    fn make_quad() -> Mesh {
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
        mesh
    }

    fn make_plane_grid(n: usize) -> Mesh {
        let mut positions = Vec::with_capacity(n * n);
        for y in 0..n {
            for x in 0..n {
                positions.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let mut indices = Vec::new();
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let i = (y * n + x) as u32;
                let nn = n as u32;
                indices.extend_from_slice(&[i, i + 1, i + nn]);
                indices.extend_from_slice(&[i + 1, i + nn + 1, i + nn]);
            }
        }
        let mut mesh = Mesh::new();
        mesh.add_submesh(SubMesh::new(
            Some(VertexData::from_positions(&positions)),
            IndexBuffer::U32(indices),
        ));
        mesh
    }

    fn proportional_levels(fractions: &[f32]) -> LodConfig {
        LodConfig {
            levels: fractions
                .iter()
                .enumerate()
                .map(|(i, &f)| LodLevel::new((i + 1) as f32, ReductionMethod::Proportional(f)))
                .collect(),
            ..LodConfig::default()
        }
    }

    #[test]
    fn test_quad_constant_reduction() {
        let mut mesh = make_quad();
        let mut config = LodConfig {
            levels: vec![LodLevel::new(10.0, ReductionMethod::Constant(1))],
            ..LodConfig::default()
        };
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        assert!(!config.levels[0].out_skipped);
        assert_eq!(config.levels[0].out_unique_vertex_count, 3);
        let lod = &mesh.submeshes[0].lods[0];
        assert_eq!(lod.index_count, 3);
        generator.validate();
    }

    #[test]
    fn test_zero_reduction_is_skipped() {
        let mut mesh = make_quad();
        let mut config = LodConfig {
            levels: vec![LodLevel::new(10.0, ReductionMethod::Constant(0))],
            ..LodConfig::default()
        };
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        assert!(config.levels[0].out_skipped);
        assert_eq!(config.levels[0].out_unique_vertex_count, 4);
        assert!(mesh.submeshes[0].lods.is_empty());
    }

    #[test]
    fn test_grid_levels_are_monotone() {
        let mut mesh = make_plane_grid(6);
        let mut config = proportional_levels(&[0.25, 0.5, 0.75]);
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        let counts: Vec<usize> = config
            .levels
            .iter()
            .map(|l| l.out_unique_vertex_count)
            .collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]), "counts {counts:?}");
        assert!(counts[0] < 36);
        let baked = mesh.submeshes[0].lods.len();
        let retained = config.levels.iter().filter(|l| !l.out_skipped).count();
        assert_eq!(baked, retained);
        generator.validate();
    }

    #[test]
    fn test_collapse_cost_ceiling_stops_early() {
        let mut mesh = make_plane_grid(5);
        let mut config = LodConfig {
            levels: vec![LodLevel::new(
                10.0,
                // Everything is more expensive than a zero ceiling
                ReductionMethod::CollapseCost(0.0),
            )],
            ..LodConfig::default()
        };
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        assert!(config.levels[0].out_skipped);
        assert_eq!(config.levels[0].out_unique_vertex_count, 25);
    }

    #[test]
    fn test_manual_level_bypasses_generation() {
        let mut mesh = make_quad();
        let mut config = LodConfig {
            levels: vec![LodLevel::manual(5.0, "hand_authored")],
            ..LodConfig::default()
        };
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        assert!(!config.levels[0].out_skipped);
        assert_eq!(config.levels[0].out_unique_vertex_count, 0);
        assert!(mesh.submeshes[0].lods.is_empty());
    }

    #[test]
    fn test_compressed_levels_share_a_buffer() {
        let mut mesh = make_plane_grid(6);
        let mut config = proportional_levels(&[0.25, 0.5]);
        config.advanced.use_compression = true;
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        let lods = &mesh.submeshes[0].lods;
        assert_eq!(lods.len(), 2);
        assert!(Arc::ptr_eq(&lods[0].buffer, &lods[1].buffer));
        // The earlier level covers the buffer from the start, the later one
        // ends at its tail
        assert_eq!(lods[0].index_start, 0);
        assert_eq!(
            lods[1].index_start + lods[1].index_count,
            lods[1].buffer.len()
        );
        assert!(lods[0].index_count >= lods[1].index_count);
    }

    #[test]
    fn test_compression_matches_uncompressed_triangles() {
        let fractions = [0.2, 0.4, 0.6];
        let mut plain_mesh = make_plane_grid(5);
        let mut plain_config = proportional_levels(&fractions);
        let mut generator = ProgressiveMeshGenerator::new();
        generator
            .generate_lod_levels(&mut plain_mesh, &mut plain_config)
            .unwrap();

        let mut merged_mesh = make_plane_grid(5);
        let mut merged_config = proportional_levels(&fractions);
        merged_config.advanced.use_compression = true;
        generator
            .generate_lod_levels(&mut merged_mesh, &mut merged_config)
            .unwrap();

        let plain_lods = &plain_mesh.submeshes[0].lods;
        let merged_lods = &merged_mesh.submeshes[0].lods;
        assert_eq!(plain_lods.len(), merged_lods.len());
        for (plain, merged) in plain_lods.iter().zip(merged_lods) {
            let mut expected: Vec<[u32; 3]> = plain.triangles().collect();
            let mut actual: Vec<[u32; 3]> = merged.triangles().collect();
            expected.sort_unstable();
            actual.sort_unstable();
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn test_profile_override_must_match_a_vertex() {
        let mut mesh = make_quad();
        let mut config = proportional_levels(&[0.5]);
        config.advanced.profile.push(ProfiledEdge {
            src: Point3f::new(42.0, 42.0, 42.0),
            dst: Point3f::new(0.0, 0.0, 0.0),
            cost: 1.0,
        });
        let mut generator = ProgressiveMeshGenerator::new();
        assert!(generator.generate_lod_levels(&mut mesh, &mut config).is_err());
    }

    #[test]
    fn test_profile_override_forbids_collapse() {
        // Forbid collapsing every edge of the quad's cheapest vertex pair by
        // pricing all four vertices' edges at the never-collapse cost.
        let positions = [
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ];
        let mut mesh = make_quad();
        let mut config = proportional_levels(&[1.0]);
        for src in 0..4 {
            for dst in 0..4 {
                if src != dst {
                    config.advanced.profile.push(ProfiledEdge {
                        src: positions[src],
                        dst: positions[dst],
                        cost: NEVER_COLLAPSE_COST,
                    });
                }
            }
        }
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        assert_eq!(config.levels[0].out_unique_vertex_count, 4);
        assert!(config.levels[0].out_skipped);
    }

    #[test]
    fn test_out_of_range_fraction_rejected() {
        for fraction in [-0.1, 1.5] {
            let mut mesh = make_quad();
            let mut config = proportional_levels(&[fraction]);
            let mut generator = ProgressiveMeshGenerator::new();
            assert!(
                generator.generate_lod_levels(&mut mesh, &mut config).is_err(),
                "fraction {fraction} accepted"
            );
        }
    }

    #[test]
    fn test_empty_levels_rejected() {
        let mut mesh = make_quad();
        let mut config = LodConfig::default();
        let mut generator = ProgressiveMeshGenerator::new();
        assert!(generator.generate_lod_levels(&mut mesh, &mut config).is_err());
    }

    #[test]
    fn test_unsorted_values_rejected() {
        let mut mesh = make_quad();
        let mut config = LodConfig {
            levels: vec![
                LodLevel::new(1.0, ReductionMethod::Constant(1)),
                LodLevel::new(3.0, ReductionMethod::Constant(2)),
                LodLevel::new(2.0, ReductionMethod::Constant(3)),
            ],
            ..LodConfig::default()
        };
        let mut generator = ProgressiveMeshGenerator::new();
        assert!(generator.generate_lod_levels(&mut mesh, &mut config).is_err());
    }

    #[test]
    fn test_descending_values_accepted() {
        // Pixel-count style activation values shrink with distance
        let mut mesh = make_plane_grid(4);
        let mut config = LodConfig {
            levels: vec![
                LodLevel::new(1000.0, ReductionMethod::Proportional(0.25)),
                LodLevel::new(100.0, ReductionMethod::Proportional(0.5)),
            ],
            ..LodConfig::default()
        };
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
    }

    #[test]
    fn test_mesh_without_submeshes_rejected() {
        let mut mesh = Mesh::new();
        let mut config = proportional_levels(&[0.5]);
        let mut generator = ProgressiveMeshGenerator::new();
        assert!(generator.generate_lod_levels(&mut mesh, &mut config).is_err());
    }

    #[test]
    fn test_last_collapsed_edge_reported() {
        let mut mesh = make_quad();
        let mut config = LodConfig {
            levels: vec![LodLevel::new(10.0, ReductionMethod::Constant(1))],
            ..LodConfig::default()
        };
        let mut generator = ProgressiveMeshGenerator::new();
        assert!(generator.last_collapsed_edge().is_none());
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        let (src, dst) = generator.last_collapsed_edge().unwrap();
        assert_ne!(src, dst);
    }

    #[test]
    fn test_autoconfigured_run() {
        let mut mesh = make_plane_grid(5);
        let mut generator = ProgressiveMeshGenerator::new();
        let config = generator
            .generate_autoconfigured_lod_levels(&mut mesh)
            .unwrap();
        assert_eq!(config.levels.len(), 4);
        // Cost ceilings grow with distance, so achieved counts are monotone
        let counts: Vec<usize> = config
            .levels
            .iter()
            .map(|l| l.out_unique_vertex_count)
            .collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]), "counts {counts:?}");
    }

    #[test]
    fn test_convex_hull_of_grid() {
        // A flat grid has no volume, so hull generation must refuse it
        let mesh = make_plane_grid(4);
        assert!(ProgressiveMeshGenerator::generate_convex_hull(&mesh).is_err());
    }

    #[test]
    fn test_outside_weight_one_pins_outer_wall() {
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, 0.0, 1.0),
        ];
        let mut mesh = Mesh::new();
        mesh.add_submesh(SubMesh::new(
            Some(VertexData::from_positions(&positions)),
            IndexBuffer::U16(vec![0, 1, 2, 0, 1, 3, 0, 2, 3, 1, 2, 3]),
        ));
        let mut config = proportional_levels(&[1.0]);
        config.advanced.outside_weight = 1.0;
        config.advanced.outside_walk_angle = -0.99;
        let mut generator = ProgressiveMeshGenerator::new();
        generator.generate_lod_levels(&mut mesh, &mut config).unwrap();
        // Every vertex of a tetrahedron is on the outer wall, so nothing
        // may collapse
        assert_eq!(config.levels[0].out_unique_vertex_count, 4);
    }
}
