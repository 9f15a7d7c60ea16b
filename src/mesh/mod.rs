//! Indexed triangle meshes and their preprocessing into build primitives.
//!
//! Meshes arrive from external loaders as a vertex array plus an index array
//! grouped in 4-tuples `(v0, v1, v2, material)`. This module holds that
//! representation, the usual normal/area bookkeeping on it, and the
//! conversion into [`Triangle`] primitives consumed by the builder.

mod soup;
mod triangle;

pub use soup::MeshSoup;
pub use triangle::{prepare_triangles, Triangle, MAX_PRIMITIVES};

use crate::util::{Error, Result, Vec2, Vec3};

/// Number of `u32` entries per triangle in the index buffer.
pub const INDEX_STRIDE: usize = 4;

/// Triangle mesh with 4-tuple indices.
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    pub vertices: Vec<Vec3>,
    /// `(v0, v1, v2, material)` per triangle.
    pub indices: Vec<u32>,
    /// Per-vertex normals.
    pub normals: Vec<Vec3>,
    /// Per-triangle unit normals.
    pub face_normals: Vec<Vec3>,
    /// Per-triangle areas.
    pub face_area: Vec<f32>,
    pub texcoords: Vec<Vec2>,
}

impl TriMesh {
    /// Create a mesh from vertices and 4-tuple indices.
    ///
    /// Face normals, areas and vertex normals are derived; texcoords are zero.
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>) -> Result<Self> {
        let mut mesh = Self {
            texcoords: vec![Vec2::ZERO; vertices.len()],
            vertices,
            indices,
            ..Default::default()
        };
        mesh.validate()?;
        mesh.compute_normals();
        Ok(mesh)
    }

    /// Number of triangles.
    #[inline]
    pub fn num_tris(&self) -> usize {
        self.indices.len() / INDEX_STRIDE
    }

    /// Check the index buffer shape and that every index is in range.
    pub fn validate(&self) -> Result<()> {
        if self.indices.len() % INDEX_STRIDE != 0 {
            return Err(Error::InvalidMesh(format!(
                "index buffer length {} is not a multiple of {}",
                self.indices.len(),
                INDEX_STRIDE
            )));
        }
        for (t, tri) in self.indices.chunks_exact(INDEX_STRIDE).enumerate() {
            for &index in &tri[..3] {
                if index as usize >= self.vertices.len() {
                    return Err(Error::IndexOutOfRange {
                        triangle: t,
                        index,
                        count: self.vertices.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Recompute face normals, face areas and accumulated vertex normals.
    pub fn compute_normals(&mut self) {
        self.face_normals = vec![Vec3::ZERO; self.num_tris()];
        self.face_area = vec![0.0; self.num_tris()];
        self.normals = vec![Vec3::ZERO; self.vertices.len()];
        self.compute_face_normals(0);
        self.compute_vertex_normals(0);
        self.fix_normals();
    }

    /// Compute unit face normals and areas for triangles starting at index
    /// offset `first_index`.
    ///
    /// Zero-area triangles keep their (zero) cross product as normal.
    pub fn compute_face_normals(&mut self, first_index: usize) {
        let mut bad_area = false;
        for i in (first_index..self.indices.len()).step_by(INDEX_STRIDE) {
            let v0 = self.vertices[self.indices[i] as usize];
            let v1 = self.vertices[self.indices[i + 1] as usize];
            let v2 = self.vertices[self.indices[i + 2] as usize];
            let n = (v1 - v0).cross(v2 - v0);
            let len = n.length();
            let div = if len < 1e-8 {
                bad_area = true;
                1.0
            } else {
                len
            };
            self.face_normals[i / INDEX_STRIDE] = n / div;
            self.face_area[i / INDEX_STRIDE] = 0.5 * len;
        }

        if bad_area {
            tracing::warn!("Triangle mesh contains triangles with zero area");
        }
    }

    /// Accumulate face normals into the vertex normals of triangles starting
    /// at index offset `first_index`.
    pub fn compute_vertex_normals(&mut self, first_index: usize) {
        for i in (first_index..self.indices.len()).step_by(INDEX_STRIDE) {
            let n = self.face_normals[i / INDEX_STRIDE];
            for k in 0..3 {
                self.normals[self.indices[i + k] as usize] += n;
            }
        }
    }

    /// Re-normalize vertex normals, replacing invalid ones with +Y.
    pub fn fix_normals(&mut self) {
        let mut fixed = false;
        for n in &mut self.normals {
            let len2 = n.length_squared();
            if len2 <= f32::EPSILON || len2.is_nan() {
                fixed = true;
                *n = Vec3::Y;
            } else {
                *n *= len2.sqrt().recip();
            }
        }

        if fixed {
            tracing::warn!("Some normals were incorrect and thus had to be replaced with arbitrary values");
        }
    }

    /// Flip face and vertex normals.
    pub fn flip_normals(&mut self) {
        for n in self.face_normals.iter_mut().chain(self.normals.iter_mut()) {
            *n = -*n;
        }
    }

    /// Uniformly scale all vertices.
    pub fn scale(&mut self, scale: f32) {
        for v in &mut self.vertices {
            *v *= scale;
        }
        for a in &mut self.face_area {
            *a *= scale * scale;
        }
    }

    /// Append `src` to this mesh, offsetting its vertex indices.
    /// The material field is copied unchanged.
    pub fn merge(&mut self, src: &TriMesh) {
        if self.indices.is_empty() {
            *self = src.clone();
            return;
        }

        let vtx_offset = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&src.vertices);
        self.normals.extend_from_slice(&src.normals);
        self.texcoords.extend_from_slice(&src.texcoords);
        self.face_normals.extend_from_slice(&src.face_normals);
        self.face_area.extend_from_slice(&src.face_area);

        self.indices.reserve(src.indices.len());
        for tri in src.indices.chunks_exact(INDEX_STRIDE) {
            self.indices.extend_from_slice(&[
                tri[0] + vtx_offset,
                tri[1] + vtx_offset,
                tri[2] + vtx_offset,
                tri[3],
            ]);
        }
    }

    /// Assign material `m_idx` to every triangle.
    pub fn replace_material(&mut self, m_idx: u32) {
        for tri in self.indices.chunks_exact_mut(INDEX_STRIDE) {
            tri[3] = m_idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> TriMesh {
        TriMesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 7, 0, 2, 3, 7],
        )
        .unwrap()
    }

    #[test]
    fn test_face_normals_and_area() {
        let mesh = quad();
        assert_eq!(mesh.num_tris(), 2);
        for (n, a) in mesh.face_normals.iter().zip(&mesh.face_area) {
            assert!((*n - Vec3::Z).length() < 1e-6);
            assert!((a - 0.5).abs() < 1e-6);
        }
        for n in &mesh.normals {
            assert!((*n - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn test_degenerate_triangle_tolerated() {
        let mesh = TriMesh::new(vec![Vec3::ONE; 3], vec![0, 1, 2, 0]).unwrap();
        assert_eq!(mesh.face_normals[0], Vec3::ZERO);
        assert_eq!(mesh.face_area[0], 0.0);
        // Vertex normals fall back to +Y
        assert_eq!(mesh.normals[0], Vec3::Y);
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let err = TriMesh::new(vec![Vec3::ZERO; 3], vec![0, 1, 3, 0]).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { triangle: 0, index: 3, count: 3 }));

        let err = TriMesh::new(vec![Vec3::ZERO; 3], vec![0, 1, 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidMesh(_)));
    }

    #[test]
    fn test_merge_offsets_indices() {
        let mut a = quad();
        let b = quad();
        a.merge(&b);
        assert_eq!(a.vertices.len(), 8);
        assert_eq!(a.num_tris(), 4);
        assert_eq!(&a.indices[8..], &[4, 5, 6, 7, 4, 6, 7, 7]);
        assert_eq!(a.face_area.len(), 4);
    }

    #[test]
    fn test_replace_material_and_flip() {
        let mut mesh = quad();
        mesh.replace_material(3);
        assert!(mesh.indices.chunks(4).all(|t| t[3] == 3));

        mesh.flip_normals();
        assert!((mesh.face_normals[0] + Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_scale() {
        let mut mesh = quad();
        mesh.scale(2.0);
        assert_eq!(mesh.vertices[2], Vec3::new(2.0, 2.0, 0.0));
        assert!((mesh.face_area[0] - 2.0).abs() < 1e-6);
    }
}
