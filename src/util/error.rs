//! Error types for BVH construction and the build cache.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for widebvh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The mesh carries no triangles
    #[error("No mesh available: '{0}' has no triangles")]
    EmptyMesh(String),

    /// Index buffer or vertex data is malformed
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// A triangle references a vertex that does not exist
    #[error("Triangle {triangle} references vertex {index} (vertex count: {count})")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        count: usize,
    },

    /// Primitive ids would collide with the end-of-leaf tag bit
    #[error("Too many primitives: {count} (maximum: {max})")]
    TooManyPrimitives { count: usize, max: usize },

    /// A node grouping has an unsupported number of children
    #[error("Invalid node: {count} children for a {width}-wide node")]
    InvalidNode { count: usize, width: usize },

    /// A leaf grouping without any reference
    #[error("Leaf emitted without references")]
    EmptyLeaf,

    /// Parent node or child slot does not exist
    #[error("Child slot {slot} of node {parent} out of range (nodes: {count}, width: {width})")]
    ChildSlotOutOfRange {
        parent: usize,
        slot: usize,
        count: usize,
        width: usize,
    },

    /// Record sizes in a cache file do not match the requested layout
    #[error("Layout mismatch: file has {found_node}/{found_tri} byte records, {layout} expects {node}/{tri}")]
    LayoutMismatch {
        layout: &'static str,
        node: usize,
        tri: usize,
        found_node: usize,
        found_tri: usize,
    },

    /// Cache file ends in the middle of a record
    #[error("Unexpected end of BVH data at byte {0}")]
    Truncated(u64),

    /// Structure violates a layout invariant
    #[error("Invalid BVH structure: {0}")]
    InvalidStructure(String),

    /// Unknown target name or id
    #[error("Unknown target '{0}'")]
    UnknownTarget(String),

    /// Stamp file exists but cannot be parsed
    #[error("Invalid stamp file {path}: {reason}")]
    InvalidStamp { path: PathBuf, reason: String },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }
}

/// Result type alias for widebvh operations.
pub type Result<T> = std::result::Result<T, Error>;
