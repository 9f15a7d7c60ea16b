//! Wide BVH construction.
//!
//! [`SplitBvhBuilder`] decides the tree shape, [`BvhAdapter`] writes it
//! into one of the physical layouts from [`layout`], and [`validate`]
//! walks a finished structure back.

mod adapter;
mod builder;
mod child;
pub mod layout;
mod validate;

pub use adapter::{build_bvh, BvhAdapter};
pub use builder::{AreaCost, BuildSink, BuildStats, CostModel, Primitive, SplitBvhBuilder};
pub use child::{ChildRef, ChildSlot};
pub use layout::{BvhNTriM, Bvh2Tri1, Bvh4Tri4, Bvh8Tri4, Node2, Node4, Node8, Tri1, Tri4, TriBundle, WideNode};
pub use validate::{validate, BvhSummary};
