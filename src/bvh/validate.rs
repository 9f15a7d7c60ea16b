//! Structural checks over a finished node/bundle pair.

use super::child::ChildRef;
use super::layout::{BvhNTriM, TriBundle, WideNode, EMPTY_LANE, END_OF_LEAF};
use crate::mesh::MAX_PRIMITIVES;
use crate::util::{BBox, Error, Result};

/// Shape of a validated structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BvhSummary {
    pub nodes: usize,
    pub leaves: usize,
    /// Occupied lanes over all leaves.
    pub references: usize,
    pub bundles: usize,
    /// Levels of nodes on the longest root-to-leaf path.
    pub depth: usize,
}

/// Walk the structure from node 0 and check every layout invariant.
///
/// Fails on the first violation: live children outside their parent slot,
/// unused slots that are not fully empty, dangling or shared child indices,
/// unreachable nodes, and leaves whose end-of-leaf tag is missing or not on
/// the last occupied lane. Leaf triangles must overlap their slot bounds;
/// with spatial splits a triangle may extend past a leaf.
pub fn validate<L: BvhNTriM>(nodes: &[L::Node], tris: &[L::Tri]) -> Result<BvhSummary> {
    if nodes.is_empty() {
        return Err(Error::invalid("no root node"));
    }

    let width = <L::Node as WideNode>::WIDTH;
    let mut summary = BvhSummary::default();
    let mut reached = vec![false; nodes.len()];
    reached[0] = true;

    // (node index, depth, bounds recorded in the parent slot)
    let mut stack: Vec<(usize, usize, Option<BBox>)> = vec![(0, 1, None)];
    while let Some((index, depth, slot_bounds)) = stack.pop() {
        let node = &nodes[index];
        summary.nodes += 1;
        summary.depth = summary.depth.max(depth);

        let mut live = 0;
        let mut unused_seen = false;
        for (lane, child) in node.children() {
            let bounds = node.bounds(lane);
            if child == ChildRef::Empty {
                if !(0..3).all(|axis| bounds.min[axis] > bounds.max[axis]) {
                    return Err(Error::invalid(format!(
                        "unused lane {} of node {} has non-empty bounds",
                        lane, index
                    )));
                }
                unused_seen = true;
                continue;
            }
            if unused_seen {
                return Err(Error::invalid(format!("node {} has a live lane after an unused one", index)));
            }
            live += 1;
            if let Some(parent) = slot_bounds {
                if !parent.contains(&bounds, tolerance(&parent)) {
                    return Err(Error::invalid(format!(
                        "lane {} of node {} exceeds its parent bounds",
                        lane, index
                    )));
                }
            }

            match child {
                ChildRef::Node(i) => {
                    let i = i as usize;
                    if i == 0 || i >= nodes.len() {
                        return Err(Error::invalid(format!(
                            "node {} references node {} (count {})",
                            index,
                            i,
                            nodes.len()
                        )));
                    }
                    if reached[i] {
                        return Err(Error::invalid(format!("node {} is referenced twice", i)));
                    }
                    reached[i] = true;
                    stack.push((i, depth + 1, Some(bounds)));
                }
                ChildRef::Leaf(offset) => {
                    let (refs, bundles) = check_leaf::<L::Tri>(tris, offset as usize, &bounds)?;
                    summary.leaves += 1;
                    summary.references += refs;
                    summary.bundles += bundles;
                }
                ChildRef::Empty => {}
            }
        }

        let min_live = if index == 0 { 1 } else { 2 };
        if live < min_live {
            return Err(Error::InvalidNode { count: live, width });
        }
    }

    if let Some(orphan) = reached.iter().position(|&r| !r) {
        return Err(Error::invalid(format!("node {} is not reachable from the root", orphan)));
    }
    Ok(summary)
}

/// Follow a leaf's bundles up to its end-of-leaf tag.
/// Returns (occupied lanes, bundles).
fn check_leaf<T: TriBundle>(tris: &[T], offset: usize, bounds: &BBox) -> Result<(usize, usize)> {
    let eps = tolerance(bounds);
    let mut refs = 0;
    let mut bundles = 0;
    let mut ended = false;

    for (i, bundle) in tris.iter().enumerate().skip(offset) {
        bundles += 1;
        for lane in 0..T::WIDTH {
            let id = bundle.prim_id(lane);
            if ended {
                if id != EMPTY_LANE {
                    return Err(Error::invalid(format!(
                        "bundle {} lane {} follows the end-of-leaf tag of the leaf at {}",
                        i, lane, offset
                    )));
                }
                continue;
            }
            if id == EMPTY_LANE {
                return Err(Error::invalid(format!(
                    "bundle {} lane {} is empty before the end-of-leaf tag",
                    i, lane
                )));
            }
            if (id & !END_OF_LEAF) as usize >= MAX_PRIMITIVES {
                return Err(Error::invalid(format!("bundle {} lane {} has prim id {:#x}", i, lane, id)));
            }

            let mut tri_bounds = BBox::EMPTY;
            for v in bundle.lane_vertices(lane) {
                if !v.is_finite() {
                    return Err(Error::invalid(format!("bundle {} lane {} has non-finite vertices", i, lane)));
                }
                tri_bounds.extend_point(v);
            }
            let overlap = tri_bounds.intersection(&BBox::new(bounds.min - eps, bounds.max + eps));
            if overlap.is_empty() {
                return Err(Error::invalid(format!(
                    "triangle {} in bundle {} lies outside its leaf bounds",
                    id & !END_OF_LEAF,
                    i
                )));
            }

            refs += 1;
            ended = id & END_OF_LEAF != 0;
        }
        if ended {
            return Ok((refs, bundles));
        }
    }

    Err(Error::invalid(format!(
        "leaf at bundle {} has no end-of-leaf tag (bundles: {})",
        offset,
        tris.len()
    )))
}

/// Slack for containment tests, relative to the box extent.
fn tolerance(b: &BBox) -> f32 {
    1e-5 * b.size().abs().max_element().max(1.0)
}
