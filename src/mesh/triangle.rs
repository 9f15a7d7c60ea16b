//! Build primitives derived from an indexed mesh.

use rayon::prelude::*;

use super::{TriMesh, INDEX_STRIDE};
use crate::bvh::Primitive;
use crate::util::{BBox, Error, Result, Vec3};

/// Largest triangle count per mesh. Ids stay below it, which keeps the
/// end-of-leaf tag bit free and a tagged id distinct from the empty-lane
/// sentinel.
pub const MAX_PRIMITIVES: usize = 0x7FFF_FFFE;

/// Triangle reduced to a position, two edges and a face normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    /// `v1 - v0`
    pub e1: Vec3,
    /// `v2 - v0`
    pub e2: Vec3,
    /// `e1 x e2`, zero for degenerate triangles.
    pub n: Vec3,
    pub prim_id: u32,
    pub geom_id: u32,
}

impl Triangle {
    /// Build from three vertices.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, prim_id: u32, geom_id: u32) -> Self {
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        Self {
            v0,
            e1,
            e2,
            n: e1.cross(e2),
            prim_id,
            geom_id,
        }
    }

    #[inline]
    pub fn v1(&self) -> Vec3 {
        self.v0 + self.e1
    }

    #[inline]
    pub fn v2(&self) -> Vec3 {
        self.v0 + self.e2
    }

    #[inline]
    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1(), self.v2()]
    }

    /// Edges in the convention of the packed records: `(v0 - v1, v2 - v0)`.
    /// The packed normal is their cross product.
    #[inline]
    pub fn packed_edges(&self) -> (Vec3, Vec3, Vec3) {
        let e1 = -self.e1;
        (e1, self.e2, e1.cross(self.e2))
    }
}

impl Primitive for Triangle {
    fn bbox(&self) -> BBox {
        let mut b = BBox::from_point(self.v0);
        b.extend_point(self.v1());
        b.extend_point(self.v2());
        b
    }

    /// Clip the triangle against the plane `axis = pos` and return the bounds
    /// of the parts on either side.
    fn split(&self, axis: usize, pos: f32) -> (BBox, BBox) {
        let mut left = BBox::EMPTY;
        let mut right = BBox::EMPTY;
        let verts = self.vertices();

        let mut a = verts[2];
        for &b in &verts {
            let (pa, pb) = (a[axis], b[axis]);
            if pa <= pos {
                left.extend_point(a);
            }
            if pa >= pos {
                right.extend_point(a);
            }
            if (pa < pos && pos < pb) || (pb < pos && pos < pa) {
                let t = ((pos - pa) / (pb - pa)).clamp(0.0, 1.0);
                let mut p = a.lerp(b, t);
                p[axis] = pos;
                left.extend_point(p);
                right.extend_point(p);
            }
            a = b;
        }
        (left, right)
    }
}

/// Expand an indexed mesh into one [`Triangle`] per 4-tuple.
///
/// The geometry id is the material field of the tuple. Degenerate triangles
/// are kept. `name` only serves error reporting.
#[tracing::instrument(skip_all, fields(name = %name, tri_count = mesh.num_tris()))]
pub fn prepare_triangles(mesh: &TriMesh, name: &str) -> Result<Vec<Triangle>> {
    mesh.validate()?;

    let num_tris = mesh.num_tris();
    if num_tris == 0 {
        return Err(Error::EmptyMesh(name.to_string()));
    }
    check_primitive_count(num_tris)?;

    let tris = mesh
        .indices
        .par_chunks_exact(INDEX_STRIDE)
        .enumerate()
        .map(|(id, idx)| {
            let v = |k: usize| mesh.vertices[idx[k] as usize];
            Triangle::new(v(0), v(1), v(2), id as u32, idx[3])
        })
        .collect();
    Ok(tris)
}

fn check_primitive_count(count: usize) -> Result<()> {
    if count > MAX_PRIMITIVES {
        return Err(Error::TooManyPrimitives {
            count,
            max: MAX_PRIMITIVES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> Triangle {
        Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            0,
            0,
        )
    }

    #[test]
    fn test_edges_and_normal() {
        let t = tri();
        assert_eq!(t.e1, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(t.e2, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(t.n, Vec3::new(0.0, 0.0, 4.0));
        assert_eq!(t.v1(), Vec3::new(2.0, 0.0, 0.0));

        let (e1, e2, n) = t.packed_edges();
        assert_eq!(e1, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(e2, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(n, Vec3::new(0.0, 0.0, -4.0));
    }

    #[test]
    fn test_split_clips_exactly() {
        let t = tri();
        let (l, r) = t.split(0, 1.0);
        assert_eq!(l.min, Vec3::ZERO);
        assert_eq!(l.max, Vec3::new(1.0, 2.0, 0.0));
        // Right part is the small corner triangle near v1
        assert_eq!(r.min, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(r.max, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_degenerate_bbox_is_finite() {
        let t = Triangle::new(Vec3::ONE, Vec3::ONE, Vec3::ONE, 0, 0);
        let b = t.bbox();
        assert!(!b.is_empty());
        assert_eq!(b.area(), 0.0);
        assert!(b.min.is_finite() && b.max.is_finite());
        assert_eq!(t.n, Vec3::ZERO);
    }

    #[test]
    fn test_prepare_triangles() {
        let mesh = TriMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            vec![0, 1, 2, 5, 0, 2, 3, 9],
        )
        .unwrap();
        let tris = prepare_triangles(&mesh, "test").unwrap();
        assert_eq!(tris.len(), 2);
        assert_eq!(tris[1].prim_id, 1);
        assert_eq!(tris[1].geom_id, 9);
        assert_eq!(tris[1].e2, Vec3::Z);
    }

    #[test]
    fn test_primitive_count_limit() {
        check_primitive_count(0x7FFF_FFFE).unwrap();
        assert!(matches!(
            check_primitive_count(0x7FFF_FFFF),
            Err(Error::TooManyPrimitives { count: 0x7FFF_FFFF, .. })
        ));
        // Highest id with the tag set is still not an empty lane
        let last_id = (MAX_PRIMITIVES - 1) as u32;
        assert_ne!(last_id | 0x8000_0000, 0xFFFF_FFFF);
    }

    #[test]
    fn test_prepare_empty_mesh() {
        let mesh = TriMesh::default();
        let err = prepare_triangles(&mesh, "empty.obj").unwrap_err();
        assert!(matches!(err, Error::EmptyMesh(ref n) if n == "empty.obj"));
    }
}
