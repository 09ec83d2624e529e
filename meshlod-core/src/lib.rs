//! Core data structures for meshlod
//!
//! This crate provides the host-mesh representation consumed and produced by
//! the progressive mesh generator: raw interleaved vertex streams addressed
//! through element descriptors, 16/32-bit index streams, submeshes, and the
//! LOD level configuration records the generator fills in.

pub mod config;
pub mod error;
pub mod index;
pub mod mesh;
pub mod vertex;

pub use config::*;
pub use error::*;
pub use index::*;
pub use mesh::*;
pub use vertex::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
