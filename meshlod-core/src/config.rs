//! LOD generation configuration records

use crate::vertex::Point3f;
use serde::{Deserialize, Serialize};

/// How a level's reduction magnitude is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReductionMethod {
    /// Remove the given fraction of the unique vertex count
    Proportional(f32),
    /// Remove a fixed number of unique vertices
    Constant(usize),
    /// Collapse until the cheapest remaining collapse exceeds this cost
    CollapseCost(f32),
}

/// One requested LOD level.
///
/// `value` is the caller's activation value (distance, pixel count, ...);
/// the list handed to the generator must be pre-sorted by it. The `out_*`
/// fields are written back by the generator for the caller to inspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LodLevel {
    pub value: f32,
    pub reduction: ReductionMethod,
    /// Names a hand-authored mesh that replaces this level entirely;
    /// such levels bypass generation
    pub manual_mesh_name: Option<String>,
    /// Achieved unique vertex count, written back after generation
    pub out_unique_vertex_count: usize,
    /// True when this level ended up identical to the previous retained
    /// level and no index buffers were baked for it
    pub out_skipped: bool,
}

impl LodLevel {
    pub fn new(value: f32, reduction: ReductionMethod) -> Self {
        Self {
            value,
            reduction,
            manual_mesh_name: None,
            out_unique_vertex_count: 0,
            out_skipped: false,
        }
    }

    pub fn manual(value: f32, mesh_name: impl Into<String>) -> Self {
        Self {
            value,
            // Ignored for manual levels
            reduction: ReductionMethod::Constant(0),
            manual_mesh_name: Some(mesh_name.into()),
            out_unique_vertex_count: 0,
            out_skipped: false,
        }
    }
}

/// A caller-supplied forced collapse cost for one directed edge, matched by
/// source and destination position. Overrides the computed cost entirely.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfiledEdge {
    pub src: Point3f,
    pub dst: Point3f,
    pub cost: f32,
}

/// Quality/performance trade-off of the generator.
///
/// Replaces the original compile-time variants with a runtime switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityMode {
    /// Skips the face-flip rejection test; fastest, worst output
    Fastest,
    #[default]
    Normal,
    /// Duplicate-triangle exclusion, refined seam handling, wider cost
    /// recomputation after each collapse
    Best,
}

/// Advanced generator options shared by all levels of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Bake adjacent levels into shared physical index buffers
    pub use_compression: bool,
    /// Penalize collapses that visibly bend shading; disabled automatically
    /// when a consumed vertex stream carries no normals, and the effective
    /// value is written back after generation
    pub use_vertex_normals: bool,
    /// Collapse cost multiplier for outer-wall vertices; 0.0 disables
    /// outside marking, exactly 1.0 forbids collapsing the outer wall
    pub outside_weight: f32,
    /// Dot-product threshold controlling how far the outside classification
    /// bleeds across near-coplanar faces
    pub outside_walk_angle: f32,
    pub profile: Vec<ProfiledEdge>,
    pub quality: QualityMode,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            use_compression: false,
            use_vertex_normals: true,
            outside_weight: 0.0,
            outside_walk_angle: 0.0,
            profile: Vec::new(),
            quality: QualityMode::default(),
        }
    }
}

/// Full configuration of one generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LodConfig {
    pub levels: Vec<LodLevel>,
    pub advanced: AdvancedConfig,
}

impl LodConfig {
    /// Four cost-ceiling levels tuned against the mesh's bounding sphere
    /// radius, matching the original autoconfiguration curve: activation
    /// values fall off as 1/i^4 while the cost ceiling grows as i^5, so the
    /// nearest level reduces gently and the farthest aggressively.
    pub fn autoconfigure(bounding_sphere_radius: f32) -> Self {
        let mut levels = Vec::with_capacity(4);
        for i in 2..6 {
            let i4 = (i * i * i * i) as f32;
            let i5 = i4 * i as f32;
            levels.push(LodLevel::new(
                3_388_608.0 / i4,
                ReductionMethod::CollapseCost(bounding_sphere_radius / 100_000.0 * i5),
            ));
        }
        Self {
            levels,
            advanced: AdvancedConfig::default(),
        }
    }
}
