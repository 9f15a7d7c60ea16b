//! # widebvh
//!
//! Wide bounding volume hierarchies for ray traversal kernels.
//!
//! Triangles from an indexed mesh are organized by a binned SAH builder with
//! spatial splits, then packed into one of three physical layouts: 8-wide or
//! 4-wide nodes with 4-wide triangle bundles for SIMD CPUs, and 2-wide nodes
//! with single triangles for GPUs. Results are cached on disk next to a stamp
//! naming the target and source they were built for.
//!
//! ## Modules
//!
//! - [`util`] - Bounding boxes, errors
//! - [`mesh`] - Indexed triangle meshes and build primitives
//! - [`target`] - Hardware targets and their layouts
//! - [`config`] - Builder and conversion settings
//! - [`bvh`] - Builder, layouts, adapter and validation
//! - [`cache`] - Record stream, stamp and mesh buffers
//! - [`convert`] - Mesh to cache pipeline
//!
//! ## Example
//!
//! ```ignore
//! use widebvh::prelude::*;
//!
//! let mesh = MeshSoup::load("scene.json")?.into_mesh()?;
//! let options = ConvertOptions::new("data", Target::detect(), "scene.json");
//! build_cache(&mesh, &options, &BuildConfig::default())?;
//! ```

pub mod util;
pub mod mesh;
pub mod target;
pub mod config;
pub mod bvh;
pub mod cache;
pub mod convert;

// Re-export commonly used types
pub use util::{BBox, Error, Result};
pub use target::{BvhWidth, Target};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bvh::{build_bvh, validate, BuildStats, BvhNTriM, Bvh2Tri1, Bvh4Tri4, Bvh8Tri4, ChildRef};
    pub use crate::cache::{must_build_bvh, BvhFile, BvhWriter};
    pub use crate::config::{BuildConfig, ConvertOptions};
    pub use crate::convert::{append_geometry, build_cache, inspect_cache, BuildOutcome};
    pub use crate::mesh::{prepare_triangles, MeshSoup, TriMesh, Triangle};
    pub use crate::target::{BvhWidth, Target};
    pub use crate::util::{BBox, Error, Result};
}
