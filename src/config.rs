//! Build configuration.
//!
//! Everything has a default; a JSON file may override any subset:
//!
//! ```json
//! { "bins": 32, "spatial_splits": false }
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::target::Target;
use crate::util::{Error, Result};

/// Tuning knobs of the SAH builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// SAH bins per axis, for both object and spatial splits.
    pub bins: usize,
    /// Allow splits that clip primitives at a plane.
    pub spatial_splits: bool,
    /// Spatial splits are only tried when the best object split's children
    /// overlap by more than `spatial_alpha` times the root area.
    pub spatial_alpha: f32,
    /// Extra references spatial splits may create, relative to the
    /// primitive count.
    pub split_budget: f32,
    /// Groups at this depth become leaves.
    pub max_depth: usize,
    /// Groups above this size are split at the median when SAH finds
    /// nothing better.
    pub max_leaf_size: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            bins: 16,
            spatial_splits: true,
            spatial_alpha: 1e-5,
            split_budget: 0.3,
            max_depth: 64,
            max_leaf_size: 16,
        }
    }
}

impl BuildConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the builder cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.bins < 2 {
            return Err(Error::Config(format!("bins must be at least 2, got {}", self.bins)));
        }
        if !(self.spatial_alpha >= 0.0) {
            return Err(Error::Config(format!(
                "spatial_alpha must be non-negative, got {}",
                self.spatial_alpha
            )));
        }
        if !(self.split_budget >= 0.0) {
            return Err(Error::Config(format!(
                "split_budget must be non-negative, got {}",
                self.split_budget
            )));
        }
        if self.max_depth == 0 {
            return Err(Error::Config("max_depth must be positive".into()));
        }
        if self.max_leaf_size == 0 {
            return Err(Error::Config("max_leaf_size must be positive".into()));
        }
        Ok(())
    }
}

/// Where and for what a conversion writes its cache.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory receiving `bvh.bin`, `bvh.stamp` and mesh buffers.
    pub output_dir: PathBuf,
    pub target: Target,
    /// Source identity recorded in the stamp (usually the mesh path).
    pub name: String,
    /// Rebuild even when the stamp matches.
    pub force: bool,
    /// Also write `vertices.bin`, `indices.bin`, ...
    pub mesh_buffers: bool,
    /// Pad 3-component mesh buffer elements to 16 bytes.
    pub padding: bool,
}

impl ConvertOptions {
    pub fn new(output_dir: impl Into<PathBuf>, target: Target, name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            target,
            name: name.into(),
            force: false,
            mesh_buffers: false,
            padding: target.is_gpu(),
        }
    }
}
