//! Progressive mesh LOD generation
//!
//! This crate reduces triangle meshes with prioritized edge collapses and
//! bakes the result as per-level index buffers onto the mesh:
//! - Curvature, border, seam and vertex-normal aware collapse costs
//! - Per-edge cost overrides and convex-hull based outer wall weighting
//! - Optional compression of adjacent levels into shared index buffers
//!
//! The mesh, index and configuration types live in `meshlod_core`.

mod bake;
mod collapse;
mod cost;
mod generator;
mod outside_marker;
mod topology;
mod vector_set;

pub use generator::ProgressiveMeshGenerator;
