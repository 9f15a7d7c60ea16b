//! JSON triangle soup, the input format of the command line tool.
//!
//! ```json
//! { "vertices": [[0, 0, 0], [1, 0, 0], [0, 1, 0]], "indices": [0, 1, 2, 0] }
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::TriMesh;
use crate::util::{Result, Vec2, Vec3};

/// Serializable vertex/index arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshSoup {
    pub vertices: Vec<[f32; 3]>,
    /// 4-tuples `(v0, v1, v2, material)`.
    pub indices: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texcoords: Vec<[f32; 2]>,
}

impl MeshSoup {
    /// Load a soup from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Convert into a validated [`TriMesh`] with derived normals.
    pub fn into_mesh(self) -> Result<TriMesh> {
        let vertices: Vec<Vec3> = self.vertices.into_iter().map(Vec3::from).collect();
        let mut mesh = TriMesh::new(vertices, self.indices)?;
        if self.texcoords.len() == mesh.vertices.len() {
            mesh.texcoords = self.texcoords.into_iter().map(Vec2::from).collect();
        } else if !self.texcoords.is_empty() {
            tracing::warn!(
                texcoords = self.texcoords.len(),
                vertices = mesh.vertices.len(),
                "Ignoring texcoords that do not match the vertex count"
            );
        }
        Ok(mesh)
    }
}
