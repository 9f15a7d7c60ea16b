//! Physical node and triangle-bundle records.
//!
//! All records are `#[repr(C)]` and [`Pod`] so arrays of them can be written
//! to the cache file (and uploaded to devices) as raw bytes:
//!
//! | record  | bytes | layout                                                   |
//! |---------|-------|----------------------------------------------------------|
//! | `Node2` | 64    | `bounds[12]` flat per child, `child[2]`, 2 × pad         |
//! | `Node4` | 112   | `bounds[6][4]` SoA, `child[4]`                           |
//! | `Node8` | 224   | `bounds[6][8]` SoA, `child[8]`                           |
//! | `Tri1`  | 48    | `v0`, pad, `e1`, `geom_id`, `e2`, `prim_id`              |
//! | `Tri4`  | 224   | `v0/e1/e2/n[3][4]` SoA, `prim_id[4]`, `geom_id[4]`       |
//!
//! Bounds rows are ordered x-min, x-max, y-min, y-max, z-min, z-max.

use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;

use super::child::ChildRef;
use crate::mesh::Triangle;
use crate::target::BvhWidth;
use crate::util::{BBox, Vec3};

/// Prim id of a bundle lane holding no triangle.
pub const EMPTY_LANE: u32 = 0xFFFF_FFFF;

/// Tag bit on the prim id of a leaf's last triangle.
pub const END_OF_LEAF: u32 = 0x8000_0000;

/// Node record with `WIDTH` child slots.
pub trait WideNode: Pod + Debug {
    const WIDTH: usize;

    /// Bounds stored for child `lane`.
    fn bounds(&self, lane: usize) -> BBox;
    fn set_bounds(&mut self, lane: usize, bbox: &BBox);
    fn child(&self, lane: usize) -> ChildRef;
    fn set_child(&mut self, lane: usize, child: ChildRef);

    /// Iterate over the decoded child slots.
    fn children(&self) -> impl Iterator<Item = (usize, ChildRef)> + '_ {
        (0..Self::WIDTH).map(move |lane| (lane, self.child(lane)))
    }
}

/// Triangle bundle record with `WIDTH` lanes.
pub trait TriBundle: Pod + Debug {
    const WIDTH: usize;

    /// Store `tri` in `lane` using the packed edge convention.
    fn set_lane(&mut self, lane: usize, tri: &Triangle);
    fn prim_id(&self, lane: usize) -> u32;
    fn set_prim_id(&mut self, lane: usize, id: u32);
    fn geom_id(&self, lane: usize) -> u32;
    /// Vertex positions reconstructed from the packed lane.
    fn lane_vertices(&self, lane: usize) -> [Vec3; 3];

    /// True when `lane` holds a triangle.
    #[inline]
    fn is_occupied(&self, lane: usize) -> bool {
        self.prim_id(lane) != EMPTY_LANE
    }

    /// True when the bundle ends its leaf: a tagged occupied lane or an
    /// empty lane (only the last bundle of a leaf can be partial).
    fn ends_leaf(&self) -> bool {
        (0..Self::WIDTH).any(|lane| {
            let id = self.prim_id(lane);
            id == EMPTY_LANE || id & END_OF_LEAF != 0
        })
    }
}

/// A supported (node width, bundle width) pairing.
pub trait BvhNTriM {
    type Node: WideNode;
    type Tri: TriBundle;

    /// Human readable layout name.
    const NAME: &'static str;
    const WIDTH: BvhWidth;
    /// Smallest group the builder keeps splitting.
    const MIN_LEAF_SIZE: usize;
}

/// 8-wide nodes with 4-wide triangle bundles.
#[derive(Debug, Clone, Copy)]
pub struct Bvh8Tri4;

/// 4-wide nodes with 4-wide triangle bundles.
#[derive(Debug, Clone, Copy)]
pub struct Bvh4Tri4;

/// 2-wide nodes with single triangles.
#[derive(Debug, Clone, Copy)]
pub struct Bvh2Tri1;

impl BvhNTriM for Bvh8Tri4 {
    type Node = Node8;
    type Tri = Tri4;
    const NAME: &'static str = "BVH8/TRI4";
    const WIDTH: BvhWidth = BvhWidth::Bvh8Tri4;
    const MIN_LEAF_SIZE: usize = 4 / 2;
}

impl BvhNTriM for Bvh4Tri4 {
    type Node = Node4;
    type Tri = Tri4;
    const NAME: &'static str = "BVH4/TRI4";
    const WIDTH: BvhWidth = BvhWidth::Bvh4Tri4;
    const MIN_LEAF_SIZE: usize = 4 / 2;
}

impl BvhNTriM for Bvh2Tri1 {
    type Node = Node2;
    type Tri = Tri1;
    const NAME: &'static str = "BVH2/TRI1";
    const WIDTH: BvhWidth = BvhWidth::Bvh2Tri1;
    const MIN_LEAF_SIZE: usize = 2;
}

macro_rules! soa_node {
    ($(#[$meta:meta])* $name:ident, $n:literal) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
        pub struct $name {
            pub bounds: [[f32; $n]; 6],
            pub child: [i32; $n],
        }

        impl WideNode for $name {
            const WIDTH: usize = $n;

            #[inline]
            fn bounds(&self, lane: usize) -> BBox {
                let b = &self.bounds;
                BBox::new(
                    Vec3::new(b[0][lane], b[2][lane], b[4][lane]),
                    Vec3::new(b[1][lane], b[3][lane], b[5][lane]),
                )
            }

            #[inline]
            fn set_bounds(&mut self, lane: usize, bbox: &BBox) {
                for axis in 0..3 {
                    self.bounds[2 * axis][lane] = bbox.min[axis];
                    self.bounds[2 * axis + 1][lane] = bbox.max[axis];
                }
            }

            #[inline]
            fn child(&self, lane: usize) -> ChildRef {
                ChildRef::decode(self.child[lane])
            }

            #[inline]
            fn set_child(&mut self, lane: usize, child: ChildRef) {
                self.child[lane] = child.encode();
            }
        }
    };
}

soa_node!(
    /// 4-wide node, bounds in SoA order for SSE/NEON comparisons.
    Node4,
    4
);

soa_node!(
    /// 8-wide node, bounds in SoA order for AVX comparisons.
    Node8,
    8
);

/// 2-wide node with flat per-child bounds.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Node2 {
    pub bounds: [f32; 12],
    pub child: [i32; 2],
    pub pad: [i32; 2],
}

impl WideNode for Node2 {
    const WIDTH: usize = 2;

    #[inline]
    fn bounds(&self, lane: usize) -> BBox {
        let b = &self.bounds[lane * 6..lane * 6 + 6];
        BBox::new(Vec3::new(b[0], b[2], b[4]), Vec3::new(b[1], b[3], b[5]))
    }

    #[inline]
    fn set_bounds(&mut self, lane: usize, bbox: &BBox) {
        let b = &mut self.bounds[lane * 6..lane * 6 + 6];
        for axis in 0..3 {
            b[2 * axis] = bbox.min[axis];
            b[2 * axis + 1] = bbox.max[axis];
        }
    }

    #[inline]
    fn child(&self, lane: usize) -> ChildRef {
        ChildRef::decode(self.child[lane])
    }

    #[inline]
    fn set_child(&mut self, lane: usize, child: ChildRef) {
        self.child[lane] = child.encode();
    }
}

/// Single triangle record for GPU traversal. The normal is not stored.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Tri1 {
    pub v0: [f32; 3],
    pub pad: u32,
    pub e1: [f32; 3],
    pub geom_id: u32,
    pub e2: [f32; 3],
    pub prim_id: u32,
}

impl TriBundle for Tri1 {
    const WIDTH: usize = 1;

    fn set_lane(&mut self, _lane: usize, tri: &Triangle) {
        let (e1, e2, _) = tri.packed_edges();
        self.v0 = tri.v0.to_array();
        self.e1 = e1.to_array();
        self.e2 = e2.to_array();
        self.geom_id = tri.geom_id;
        self.prim_id = tri.prim_id;
    }

    #[inline]
    fn prim_id(&self, _lane: usize) -> u32 {
        self.prim_id
    }

    #[inline]
    fn set_prim_id(&mut self, _lane: usize, id: u32) {
        self.prim_id = id;
    }

    #[inline]
    fn geom_id(&self, _lane: usize) -> u32 {
        self.geom_id
    }

    fn lane_vertices(&self, _lane: usize) -> [Vec3; 3] {
        let v0 = Vec3::from(self.v0);
        [v0, v0 - Vec3::from(self.e1), v0 + Vec3::from(self.e2)]
    }
}

/// Four triangles in SoA order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Tri4 {
    pub v0: [[f32; 4]; 3],
    pub e1: [[f32; 4]; 3],
    pub e2: [[f32; 4]; 3],
    pub n: [[f32; 4]; 3],
    pub prim_id: [u32; 4],
    pub geom_id: [u32; 4],
}

impl Tri4 {
    #[inline]
    fn lane(rows: &[[f32; 4]; 3], lane: usize) -> Vec3 {
        Vec3::new(rows[0][lane], rows[1][lane], rows[2][lane])
    }
}

impl TriBundle for Tri4 {
    const WIDTH: usize = 4;

    fn set_lane(&mut self, lane: usize, tri: &Triangle) {
        let (e1, e2, n) = tri.packed_edges();
        for axis in 0..3 {
            self.v0[axis][lane] = tri.v0[axis];
            self.e1[axis][lane] = e1[axis];
            self.e2[axis][lane] = e2[axis];
            self.n[axis][lane] = n[axis];
        }
        self.prim_id[lane] = tri.prim_id;
        self.geom_id[lane] = tri.geom_id;
    }

    #[inline]
    fn prim_id(&self, lane: usize) -> u32 {
        self.prim_id[lane]
    }

    #[inline]
    fn set_prim_id(&mut self, lane: usize, id: u32) {
        self.prim_id[lane] = id;
    }

    #[inline]
    fn geom_id(&self, lane: usize) -> u32 {
        self.geom_id[lane]
    }

    fn lane_vertices(&self, lane: usize) -> [Vec3; 3] {
        let v0 = Self::lane(&self.v0, lane);
        [v0, v0 - Self::lane(&self.e1, lane), v0 + Self::lane(&self.e2, lane)]
    }
}
