//! Writes builder output into a physical layout.

use bytemuck::Zeroable;

use super::builder::{AreaCost, BuildSink, BuildStats, SplitBvhBuilder};
use super::child::{ChildRef, ChildSlot};
use super::layout::{BvhNTriM, TriBundle, WideNode, EMPTY_LANE, END_OF_LEAF};
use crate::config::BuildConfig;
use crate::mesh::{Triangle, MAX_PRIMITIVES};
use crate::util::{BBox, Error, Result};

/// [`BuildSink`] filling caller-owned node and bundle arrays for layout `L`.
///
/// Node indices and leaf offsets are positions in the borrowed arrays, so a
/// standalone structure should start from empty vectors.
pub struct BvhAdapter<'a, L: BvhNTriM> {
    nodes: &'a mut Vec<L::Node>,
    tris: &'a mut Vec<L::Tri>,
    prims: &'a [Triangle],
}

impl<'a, L: BvhNTriM> BvhAdapter<'a, L> {
    pub fn new(nodes: &'a mut Vec<L::Node>, tris: &'a mut Vec<L::Tri>, prims: &'a [Triangle]) -> Self {
        Self { nodes, tris, prims }
    }

    /// Run the builder over the borrowed triangles.
    pub fn build(mut self, config: &BuildConfig) -> Result<BuildStats> {
        let prims = self.prims;
        let mut builder = SplitBvhBuilder::<AreaCost>::new(<L::Node as WideNode>::WIDTH, config.clone());
        builder.build(prims, &mut self, L::MIN_LEAF_SIZE)
    }

    /// Point `slot` of an existing node at `child`.
    fn link(&mut self, slot: ChildSlot, child: ChildRef) -> Result<()> {
        let width = <L::Node as WideNode>::WIDTH;
        let count = self.nodes.len();
        let out_of_range = || Error::ChildSlotOutOfRange {
            parent: slot.parent,
            slot: slot.slot,
            count,
            width,
        };
        if slot.slot >= width {
            return Err(out_of_range());
        }
        let node = self.nodes.get_mut(slot.parent).ok_or_else(out_of_range)?;
        // Unused lanes carry empty bounds, live ones are linked exactly once
        if node.bounds(slot.slot).is_empty() {
            return Err(out_of_range());
        }
        if node.child(slot.slot) != ChildRef::Empty {
            return Err(Error::invalid(format!(
                "child slot {} of node {} linked twice",
                slot.slot, slot.parent
            )));
        }
        node.set_child(slot.slot, child);
        Ok(())
    }
}

impl<L: BvhNTriM> BuildSink for BvhAdapter<'_, L> {
    fn node(&mut self, parent: Option<ChildSlot>, _parent_bbox: &BBox, children: &[BBox]) -> Result<usize> {
        let width = <L::Node as WideNode>::WIDTH;
        let count = children.len();
        // A root holding a single leaf is the only node with one child
        let min_count = if parent.is_none() { 1 } else { 2 };
        if count < min_count || count > width {
            return Err(Error::InvalidNode { count, width });
        }

        let index = self.nodes.len();
        if index > i32::MAX as usize - 1 {
            return Err(Error::invalid(format!("node index {} exceeds the child encoding", index)));
        }
        if let Some(slot) = parent {
            self.link(slot, ChildRef::Node(index as u32))?;
        }

        let mut node = L::Node::zeroed();
        for lane in 0..width {
            match children.get(lane) {
                Some(bbox) => node.set_bounds(lane, bbox),
                None => {
                    node.set_bounds(lane, &BBox::EMPTY);
                    node.set_child(lane, ChildRef::Empty);
                }
            }
        }
        self.nodes.push(node);
        Ok(index)
    }

    fn leaf(&mut self, parent: ChildSlot, _leaf_bbox: &BBox, refs: &[u32]) -> Result<()> {
        if refs.is_empty() {
            return Err(Error::EmptyLeaf);
        }
        let offset = self.tris.len();
        if offset > i32::MAX as usize {
            return Err(Error::invalid(format!("bundle offset {} exceeds the child encoding", offset)));
        }
        self.link(parent, ChildRef::Leaf(offset as u32))?;

        let lanes = <L::Tri as TriBundle>::WIDTH;
        for chunk in refs.chunks(lanes) {
            let mut bundle = L::Tri::zeroed();
            for lane in 0..lanes {
                match chunk.get(lane) {
                    Some(&id) => {
                        let tri = self.prims.get(id as usize).ok_or_else(|| {
                            Error::invalid(format!("leaf references primitive {} of {}", id, self.prims.len()))
                        })?;
                        if id as usize >= MAX_PRIMITIVES {
                            return Err(Error::TooManyPrimitives {
                                count: self.prims.len(),
                                max: MAX_PRIMITIVES,
                            });
                        }
                        bundle.set_lane(lane, tri);
                        // Lanes store the reference, never the caller's id
                        bundle.set_prim_id(lane, id);
                    }
                    None => bundle.set_prim_id(lane, EMPTY_LANE),
                }
            }
            self.tris.push(bundle);
        }

        let last_lane = (refs.len() - 1) % lanes;
        if let Some(last) = self.tris.last_mut() {
            let id = last.prim_id(last_lane);
            last.set_prim_id(last_lane, id | END_OF_LEAF);
        }
        Ok(())
    }
}

/// Build layout `L` over `prims`, appending to `nodes` and `tris`.
#[tracing::instrument(skip_all, fields(layout = L::NAME, tri_count = prims.len()))]
pub fn build_bvh<L: BvhNTriM>(
    prims: &[Triangle],
    nodes: &mut Vec<L::Node>,
    tris: &mut Vec<L::Tri>,
    config: &BuildConfig,
) -> Result<BuildStats> {
    let stats = BvhAdapter::<L>::new(nodes, tris, prims).build(config)?;
    tracing::debug!(
        nodes = nodes.len(),
        bundles = tris.len(),
        node_bytes = std::mem::size_of::<L::Node>(),
        tri_bytes = std::mem::size_of::<L::Tri>(),
        "{} built",
        L::NAME
    );
    Ok(stats)
}
