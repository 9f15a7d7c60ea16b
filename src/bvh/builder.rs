//! Binned SAH builder with spatial splits.
//!
//! The builder decides the tree shape and reports it through a [`BuildSink`]:
//! one `node` call per internal grouping, parent before children, and one
//! `leaf` call per leaf grouping. It never stores nodes itself, so the same
//! builder drives every physical layout.
//!
//! Per group it evaluates a binned SAH object split over centroids on all
//! three axes. When the best object split leaves its children overlapping by
//! more than `spatial_alpha` of the root area, a binned spatial split is
//! evaluated too: references are clipped at bin planes (triangles exactly,
//! through [`Primitive::split`]) and may end up on both sides. Binary
//! decisions are then collapsed into `width`-wide nodes by repeatedly splitting
//! the largest splittable child.

use rayon::prelude::*;
use smallvec::SmallVec;
use std::marker::PhantomData;

use super::child::ChildSlot;
use crate::config::BuildConfig;
use crate::util::{BBox, Error, Result};

/// Anything the builder can bound and clip.
pub trait Primitive: Sync {
    fn bbox(&self) -> BBox;

    /// Bounds of the parts of the primitive on either side of the plane
    /// `axis = pos`. The default clips the bounding box.
    fn split(&self, axis: usize, pos: f32) -> (BBox, BBox) {
        let b = self.bbox();
        let mut left = b;
        let mut right = b;
        left.max[axis] = left.max[axis].min(pos);
        right.min[axis] = right.min[axis].max(pos);
        (left, right)
    }
}

impl Primitive for BBox {
    fn bbox(&self) -> BBox {
        *self
    }
}

/// SAH cost policy.
pub trait CostModel {
    /// Cost of intersecting `count` primitives in a box of area `area`.
    fn leaf_cost(count: usize, area: f32) -> f32;
    /// Cost of visiting a node of area `area`.
    fn traversal_cost(area: f32) -> f32;
}

/// Area-proportional cost used for every layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaCost;

impl CostModel for AreaCost {
    #[inline]
    fn leaf_cost(count: usize, area: f32) -> f32 {
        count as f32 * area
    }

    #[inline]
    fn traversal_cost(area: f32) -> f32 {
        area
    }
}

/// Receiver of the tree shape.
pub trait BuildSink {
    /// Emit an internal grouping of `children.len()` boxes below `parent`
    /// (`None` for the root). Returns the index of the new node.
    fn node(&mut self, parent: Option<ChildSlot>, parent_bbox: &BBox, children: &[BBox]) -> Result<usize>;

    /// Emit a leaf holding the primitive ids `refs` at `parent`.
    fn leaf(&mut self, parent: ChildSlot, leaf_bbox: &BBox, refs: &[u32]) -> Result<()>;
}

/// Counters gathered during a build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub primitives: usize,
    /// Primitive references stored in leaves (> primitives with spatial splits).
    pub references: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub object_splits: usize,
    pub spatial_splits: usize,
    pub median_splits: usize,
    pub max_depth: usize,
    pub max_leaf_size: usize,
}

/// Primitive id with the bounds of the part of it this group covers.
#[derive(Debug, Clone, Copy)]
struct Reference {
    prim: u32,
    bbox: BBox,
}

#[derive(Debug, Clone, Copy)]
enum Split {
    /// Centroids binned with `origin`/`scale`, left side is `bin < split_bin`.
    Object {
        axis: usize,
        origin: f32,
        scale: f32,
        split_bin: usize,
    },
    Spatial { axis: usize, pos: f32 },
    Median { axis: usize },
}

/// Best binary split candidate.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    split: Split,
    cost: f32,
    left: BBox,
    right: BBox,
}

struct Group {
    refs: Vec<Reference>,
    bbox: BBox,
    /// `None` makes this group a leaf.
    split: Option<Split>,
}

struct Task {
    group: Group,
    parent: Option<ChildSlot>,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    bounds: BBox,
    count: usize,
}

#[derive(Debug, Clone, Copy)]
struct SpatialBin {
    bounds: BBox,
    enter: usize,
    exit: usize,
}

/// Top-down SAH builder producing groupings of up to `width` children.
pub struct SplitBvhBuilder<C: CostModel> {
    width: usize,
    config: BuildConfig,
    stats: BuildStats,
    _cost: PhantomData<C>,
}

impl<C: CostModel> SplitBvhBuilder<C> {
    pub fn new(width: usize, config: BuildConfig) -> Self {
        Self {
            width,
            config,
            stats: BuildStats::default(),
            _cost: PhantomData,
        }
    }

    /// Counters of the last build.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Build over `prims`, reporting the tree to `sink`.
    ///
    /// Groups of at most `min_leaf_size` primitives become leaves. When the
    /// whole input is a single leaf, a root with one child is emitted.
    #[tracing::instrument(skip_all, fields(width = self.width, prim_count = prims.len()))]
    pub fn build<P: Primitive, S: BuildSink>(
        &mut self,
        prims: &[P],
        sink: &mut S,
        min_leaf_size: usize,
    ) -> Result<BuildStats> {
        if self.width < 2 {
            return Err(Error::Config(format!("node width must be at least 2, got {}", self.width)));
        }
        self.config.validate()?;
        if prims.is_empty() {
            return Err(Error::invalid("cannot build a BVH over zero primitives"));
        }

        let refs: Vec<Reference> = prims
            .par_iter()
            .enumerate()
            .map(|(i, p)| Reference {
                prim: i as u32,
                bbox: p.bbox(),
            })
            .collect();
        let bbox = refs.iter().fold(BBox::EMPTY, |b, r| b.union(&r.bbox));

        let mut ctx = Context {
            prims,
            width: self.width,
            config: &self.config,
            min_leaf_size,
            root_area: bbox.area(),
            budget: (self.config.split_budget * prims.len() as f32) as usize,
            stats: BuildStats {
                primitives: prims.len(),
                ..Default::default()
            },
            _cost: PhantomData::<C>,
        };

        let split = ctx.plan(&refs, &bbox, 0);
        let root = Group { refs, bbox, split };
        if root.split.is_none() {
            let index = sink.node(None, &bbox, &[bbox])?;
            ctx.stats.nodes += 1;
            ctx.emit_leaf(sink, ChildSlot::new(index, 0), &root, 1)?;
        } else {
            let mut stack = vec![Task {
                group: root,
                parent: None,
                depth: 0,
            }];
            while let Some(task) = stack.pop() {
                ctx.process(task, sink, &mut stack)?;
            }
        }

        tracing::debug!(
            nodes = ctx.stats.nodes,
            leaves = ctx.stats.leaves,
            references = ctx.stats.references,
            spatial_splits = ctx.stats.spatial_splits,
            max_depth = ctx.stats.max_depth,
            "BVH build finished"
        );
        self.stats = ctx.stats;
        Ok(self.stats.clone())
    }
}

struct Context<'a, P, C> {
    prims: &'a [P],
    width: usize,
    config: &'a BuildConfig,
    min_leaf_size: usize,
    root_area: f32,
    /// Remaining duplicate references spatial splits may create.
    budget: usize,
    stats: BuildStats,
    _cost: PhantomData<C>,
}

impl<P: Primitive, C: CostModel> Context<'_, P, C> {
    /// Collapse the task's binary splits into one node, emit it, then emit
    /// leaf children and queue internal ones.
    fn process<S: BuildSink>(
        &mut self,
        task: Task,
        sink: &mut S,
        stack: &mut Vec<Task>,
    ) -> Result<()> {
        let depth = task.depth + 1;
        let parent_bbox = task.group.bbox;
        let mut children: SmallVec<[Group; 8]> = SmallVec::new();
        children.push(task.group);

        while children.len() < self.width {
            let largest = children
                .iter()
                .enumerate()
                .filter(|(_, g)| g.split.is_some())
                .max_by(|(_, a), (_, b)| a.bbox.area().total_cmp(&b.bbox.area()))
                .map(|(i, _)| i);
            let Some(i) = largest else { break };

            let group = children.remove(i);
            let (left, right) = self.apply(group, depth);
            children.insert(i, right);
            children.insert(i, left);
        }

        let bboxes: SmallVec<[BBox; 8]> = children.iter().map(|g| g.bbox).collect();
        let index = sink.node(task.parent, &parent_bbox, &bboxes)?;
        self.stats.nodes += 1;

        let mut pending: SmallVec<[Task; 8]> = SmallVec::new();
        for (slot, group) in children.into_iter().enumerate() {
            let slot = ChildSlot::new(index, slot);
            if group.split.is_some() {
                pending.push(Task {
                    group,
                    parent: Some(slot),
                    depth,
                });
            } else {
                self.emit_leaf(sink, slot, &group, depth)?;
            }
        }
        // First child is built first
        stack.extend(pending.into_iter().rev());
        Ok(())
    }

    fn emit_leaf<S: BuildSink>(&mut self, sink: &mut S, slot: ChildSlot, group: &Group, depth: usize) -> Result<()> {
        let ids: SmallVec<[u32; 16]> = group.refs.iter().map(|r| r.prim).collect();
        sink.leaf(slot, &group.bbox, &ids)?;
        self.stats.leaves += 1;
        self.stats.references += ids.len();
        self.stats.max_depth = self.stats.max_depth.max(depth);
        self.stats.max_leaf_size = self.stats.max_leaf_size.max(ids.len());
        Ok(())
    }

    /// Decide whether a group is split, and how.
    fn plan(&mut self, refs: &[Reference], bbox: &BBox, depth: usize) -> Option<Split> {
        let count = refs.len();
        if count <= self.min_leaf_size.max(1) || depth >= self.config.max_depth {
            return None;
        }

        let area = bbox.area();
        let leaf_cost = C::leaf_cost(count, area);

        let mut best = self.find_object_split(refs, area);
        if self.config.spatial_splits && self.budget > 0 {
            let overlap = best
                .map(|c| c.left.intersection(&c.right).area())
                .unwrap_or(f32::INFINITY);
            if overlap > self.config.spatial_alpha * self.root_area {
                if let Some(spatial) = self.find_spatial_split(refs, bbox, area) {
                    if best.map_or(true, |b| spatial.cost < b.cost) {
                        best = Some(spatial);
                    }
                }
            }
        }

        match best {
            Some(c) if c.cost < leaf_cost => Some(c.split),
            _ if count > self.config.max_leaf_size => {
                let mut centroids = BBox::EMPTY;
                for r in refs {
                    centroids.extend_point(r.bbox.center());
                }
                Some(Split::Median {
                    axis: centroids.largest_axis(),
                })
            }
            _ => None,
        }
    }

    #[inline]
    fn split_cost(area: f32, left_count: usize, left_area: f32, right_count: usize, right_area: f32) -> f32 {
        C::traversal_cost(area) + C::leaf_cost(left_count, left_area) + C::leaf_cost(right_count, right_area)
    }

    /// Binned SAH over reference centroids.
    fn find_object_split(&self, refs: &[Reference], area: f32) -> Option<Candidate> {
        let num_bins = self.config.bins;
        let mut centroids = BBox::EMPTY;
        for r in refs {
            centroids.extend_point(r.bbox.center());
        }

        let mut best: Option<Candidate> = None;
        let mut bins = vec![
            Bin {
                bounds: BBox::EMPTY,
                count: 0
            };
            num_bins
        ];
        let mut left_bounds = vec![BBox::EMPTY; num_bins];
        let mut left_count = vec![0usize; num_bins];

        for axis in 0..3 {
            let origin = centroids.min[axis];
            let extent = centroids.max[axis] - origin;
            if !(extent > 0.0) {
                continue;
            }
            let scale = num_bins as f32 / extent;

            bins.fill(Bin {
                bounds: BBox::EMPTY,
                count: 0,
            });
            for r in refs {
                let b = bin_index(r.bbox.center()[axis], origin, scale, num_bins);
                bins[b].bounds.extend(&r.bbox);
                bins[b].count += 1;
            }

            // Sweep from left: left_*[i] covers bins[..i]
            let mut sweep = BBox::EMPTY;
            let mut sweep_count = 0;
            for i in 1..num_bins {
                sweep.extend(&bins[i - 1].bounds);
                sweep_count += bins[i - 1].count;
                left_bounds[i] = sweep;
                left_count[i] = sweep_count;
            }

            // Sweep from right and evaluate
            sweep = BBox::EMPTY;
            sweep_count = 0;
            for i in (1..num_bins).rev() {
                sweep.extend(&bins[i].bounds);
                sweep_count += bins[i].count;
                if left_count[i] == 0 || sweep_count == 0 {
                    continue;
                }
                let cost = Self::split_cost(area, left_count[i], left_bounds[i].area(), sweep_count, sweep.area());
                if best.map_or(true, |b| cost < b.cost) {
                    best = Some(Candidate {
                        split: Split::Object {
                            axis,
                            origin,
                            scale,
                            split_bin: i,
                        },
                        cost,
                        left: left_bounds[i],
                        right: sweep,
                    });
                }
            }
        }
        best
    }

    /// Binned SAH over planes cutting the group's bounds, with references
    /// clipped into every bin they span.
    fn find_spatial_split(&self, refs: &[Reference], bbox: &BBox, area: f32) -> Option<Candidate> {
        let num_bins = self.config.bins;
        let count = refs.len();
        let mut best: Option<Candidate> = None;
        let mut bins = vec![
            SpatialBin {
                bounds: BBox::EMPTY,
                enter: 0,
                exit: 0
            };
            num_bins
        ];
        let mut left_bounds = vec![BBox::EMPTY; num_bins];
        let mut left_count = vec![0usize; num_bins];

        for axis in 0..3 {
            let origin = bbox.min[axis];
            let extent = bbox.max[axis] - origin;
            if !(extent > 0.0) {
                continue;
            }
            let scale = num_bins as f32 / extent;
            let plane = |b: usize| origin + extent * b as f32 / num_bins as f32;

            bins.fill(SpatialBin {
                bounds: BBox::EMPTY,
                enter: 0,
                exit: 0,
            });
            for r in refs {
                let first = bin_index(r.bbox.min[axis], origin, scale, num_bins);
                let last = bin_index(r.bbox.max[axis], origin, scale, num_bins).max(first);

                let mut rest = *r;
                for b in first..last {
                    let (left, right) = self.split_reference(&rest, axis, plane(b + 1));
                    bins[b].bounds.extend(&left.bbox);
                    rest = right;
                }
                bins[last].bounds.extend(&rest.bbox);
                bins[first].enter += 1;
                bins[last].exit += 1;
            }

            let mut sweep = BBox::EMPTY;
            let mut sweep_count = 0;
            for i in 1..num_bins {
                sweep.extend(&bins[i - 1].bounds);
                sweep_count += bins[i - 1].enter;
                left_bounds[i] = sweep;
                left_count[i] = sweep_count;
            }

            sweep = BBox::EMPTY;
            sweep_count = 0;
            for i in (1..num_bins).rev() {
                sweep.extend(&bins[i].bounds);
                sweep_count += bins[i].exit;
                let (lc, rc) = (left_count[i], sweep_count);
                // Both sides must exist and at least one must shrink
                if lc == 0 || rc == 0 || (lc >= count && rc >= count) {
                    continue;
                }
                let cost = Self::split_cost(area, lc, left_bounds[i].area(), rc, sweep.area());
                if best.map_or(true, |b| cost < b.cost) {
                    best = Some(Candidate {
                        split: Split::Spatial { axis, pos: plane(i) },
                        cost,
                        left: left_bounds[i],
                        right: sweep,
                    });
                }
            }
        }
        best
    }

    /// Clip a reference at `axis = pos`, keeping both parts inside its bounds.
    fn split_reference(&self, r: &Reference, axis: usize, pos: f32) -> (Reference, Reference) {
        let (mut left, mut right) = self.prims[r.prim as usize].split(axis, pos);
        left = left.intersection(&r.bbox);
        right = right.intersection(&r.bbox);
        left.max[axis] = left.max[axis].min(pos);
        right.min[axis] = right.min[axis].max(pos);
        (
            Reference { prim: r.prim, bbox: left },
            Reference { prim: r.prim, bbox: right },
        )
    }

    /// Partition a group according to its split and plan both halves.
    fn apply(&mut self, group: Group, depth: usize) -> (Group, Group) {
        let Group { refs, split, .. } = group;
        let (left, right) = match split {
            Some(Split::Object {
                axis,
                origin,
                scale,
                split_bin,
            }) => {
                let num_bins = self.config.bins;
                let mut refs = refs;
                let mid = partition(&mut refs, |r| {
                    bin_index(r.bbox.center()[axis], origin, scale, num_bins) < split_bin
                });
                let right = refs.split_off(mid);
                self.stats.object_splits += 1;
                (refs, right)
            }
            Some(Split::Spatial { axis, pos }) => match self.spatial_partition(refs, axis, pos) {
                Ok(halves) => {
                    self.stats.spatial_splits += 1;
                    halves
                }
                Err(refs) => self.median_partition(refs, axis),
            },
            Some(Split::Median { axis }) => self.median_partition(refs, axis),
            None => unreachable!("only groups with a split are expanded"),
        };

        (self.make_group(left, depth), self.make_group(right, depth))
    }

    fn make_group(&mut self, refs: Vec<Reference>, depth: usize) -> Group {
        let bbox = refs.iter().fold(BBox::EMPTY, |b, r| b.union(&r.bbox));
        let split = self.plan(&refs, &bbox, depth);
        Group { refs, bbox, split }
    }

    fn median_partition(&mut self, mut refs: Vec<Reference>, axis: usize) -> (Vec<Reference>, Vec<Reference>) {
        let mid = refs.len() / 2;
        refs.select_nth_unstable_by(mid, |a, b| a.bbox.center()[axis].total_cmp(&b.bbox.center()[axis]));
        let right = refs.split_off(mid);
        self.stats.median_splits += 1;
        (refs, right)
    }

    /// Distribute references around the plane, duplicating straddlers when
    /// that is cheaper than moving them whole to one side. Gives the
    /// references back when one side would end up empty.
    fn spatial_partition(
        &mut self,
        refs: Vec<Reference>,
        axis: usize,
        pos: f32,
    ) -> std::result::Result<(Vec<Reference>, Vec<Reference>), Vec<Reference>> {
        let mut left = Vec::with_capacity(refs.len());
        let mut right = Vec::with_capacity(refs.len());
        let mut straddling = Vec::new();
        let (mut lb, mut rb) = (BBox::EMPTY, BBox::EMPTY);

        for r in &refs {
            if r.bbox.max[axis] <= pos {
                lb.extend(&r.bbox);
                left.push(*r);
            } else if r.bbox.min[axis] >= pos {
                rb.extend(&r.bbox);
                right.push(*r);
            } else {
                straddling.push(*r);
            }
        }

        for r in straddling {
            let (lr, rr) = self.split_reference(&r, axis, pos);
            if lr.bbox.is_empty() {
                rb.extend(&r.bbox);
                right.push(r);
                continue;
            }
            if rr.bbox.is_empty() {
                lb.extend(&r.bbox);
                left.push(r);
                continue;
            }

            let (nl, nr) = (left.len(), right.len());
            let to_left = C::leaf_cost(nl + 1, lb.union(&r.bbox).area()) + C::leaf_cost(nr, rb.area());
            let to_right = C::leaf_cost(nl, lb.area()) + C::leaf_cost(nr + 1, rb.union(&r.bbox).area());
            let duplicate = if self.budget > 0 {
                C::leaf_cost(nl + 1, lb.union(&lr.bbox).area()) + C::leaf_cost(nr + 1, rb.union(&rr.bbox).area())
            } else {
                f32::INFINITY
            };

            if duplicate < to_left && duplicate < to_right {
                lb.extend(&lr.bbox);
                rb.extend(&rr.bbox);
                left.push(lr);
                right.push(rr);
                self.budget -= 1;
            } else if to_left <= to_right {
                lb.extend(&r.bbox);
                left.push(r);
            } else {
                rb.extend(&r.bbox);
                right.push(r);
            }
        }

        if left.is_empty() || right.is_empty() {
            return Err(refs);
        }
        Ok((left, right))
    }
}

#[inline]
fn bin_index(x: f32, origin: f32, scale: f32, num_bins: usize) -> usize {
    let b = ((x - origin) * scale) as isize;
    b.clamp(0, num_bins as isize - 1) as usize
}

/// Partition slice in-place. Returns count of elements where predicate is true.
fn partition<T, F>(slice: &mut [T], pred: F) -> usize
where
    F: Fn(&T) -> bool,
{
    let mut left = 0;
    let mut right = slice.len();
    while left < right {
        if pred(&slice[left]) {
            left += 1;
        } else {
            right -= 1;
            slice.swap(left, right);
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Vec3;

    /// Records callbacks as plain data.
    #[derive(Default)]
    struct Recorder {
        /// (parent, parent_bbox, children)
        nodes: Vec<(Option<ChildSlot>, BBox, Vec<BBox>)>,
        /// (parent, leaf_bbox, refs)
        leaves: Vec<(ChildSlot, BBox, Vec<u32>)>,
    }

    impl BuildSink for Recorder {
        fn node(&mut self, parent: Option<ChildSlot>, parent_bbox: &BBox, children: &[BBox]) -> Result<usize> {
            if let Some(p) = parent {
                assert!(p.parent < self.nodes.len(), "parent emitted before child");
            }
            self.nodes.push((parent, *parent_bbox, children.to_vec()));
            Ok(self.nodes.len() - 1)
        }

        fn leaf(&mut self, parent: ChildSlot, leaf_bbox: &BBox, refs: &[u32]) -> Result<()> {
            assert!(parent.parent < self.nodes.len());
            self.leaves.push((parent, *leaf_bbox, refs.to_vec()));
            Ok(())
        }
    }

    fn boxes_along_x(n: usize) -> Vec<BBox> {
        (0..n)
            .map(|i| {
                let x = i as f32 * 2.0;
                BBox::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
            })
            .collect()
    }

    fn build(width: usize, prims: &[BBox], min_leaf: usize, config: BuildConfig) -> (Recorder, BuildStats) {
        let mut sink = Recorder::default();
        let mut builder = SplitBvhBuilder::<AreaCost>::new(width, config);
        let stats = builder.build(prims, &mut sink, min_leaf).unwrap();
        (sink, stats)
    }

    #[test]
    fn test_single_primitive_is_root_leaf() {
        let (sink, stats) = build(4, &boxes_along_x(1), 2, BuildConfig::default());
        assert_eq!(sink.nodes.len(), 1);
        assert_eq!(sink.nodes[0].0, None);
        assert_eq!(sink.nodes[0].2.len(), 1);
        assert_eq!(sink.leaves.len(), 1);
        assert_eq!(sink.leaves[0].0, ChildSlot::new(0, 0));
        assert_eq!(sink.leaves[0].2, vec![0]);
        assert_eq!(stats.nodes, 1);
    }

    #[test]
    fn test_children_counts_within_width() {
        let prims = boxes_along_x(200);
        let (sink, _) = build(4, &prims, 2, BuildConfig::default());
        for (i, (parent, _, children)) in sink.nodes.iter().enumerate() {
            if i > 0 {
                assert!(parent.is_some());
            }
            assert!(children.len() >= 2 && children.len() <= 4, "node {} has {}", i, children.len());
        }
    }

    #[test]
    fn test_every_primitive_in_exactly_one_leaf_without_spatial_splits() {
        let prims = boxes_along_x(100);
        let config = BuildConfig {
            spatial_splits: false,
            ..Default::default()
        };
        let (sink, stats) = build(8, &prims, 2, config);
        let mut ids: Vec<u32> = sink.leaves.iter().flat_map(|l| l.2.iter().copied()).collect();
        ids.sort();
        assert_eq!(ids, (0..100).collect::<Vec<_>>());
        assert_eq!(stats.references, 100);
        assert_eq!(stats.spatial_splits, 0);
    }

    #[test]
    fn test_child_boxes_within_parent() {
        let prims = boxes_along_x(64);
        let (sink, _) = build(2, &prims, 2, BuildConfig::default());
        for (_, parent_bbox, children) in &sink.nodes {
            for c in children {
                assert!(parent_bbox.contains(c, 1e-5));
            }
        }
        for (slot, leaf_bbox, refs) in &sink.leaves {
            let recorded = sink.nodes[slot.parent].2[slot.slot];
            assert_eq!(recorded, *leaf_bbox);
            for &r in refs {
                assert!(leaf_bbox.contains(&prims[r as usize], 1e-5));
            }
        }
    }

    #[test]
    fn test_min_leaf_size_respected() {
        let prims = boxes_along_x(3);
        let (sink, _) = build(4, &prims, 4, BuildConfig::default());
        assert_eq!(sink.nodes.len(), 1);
        assert_eq!(sink.leaves.len(), 1);
        assert_eq!(sink.leaves[0].2.len(), 3);
    }

    #[test]
    fn test_identical_primitives_use_median_fallback() {
        let prims = vec![BBox::new(Vec3::ZERO, Vec3::ONE); 40];
        let config = BuildConfig {
            max_leaf_size: 8,
            ..Default::default()
        };
        let (sink, stats) = build(4, &prims, 2, config);
        assert!(stats.median_splits > 0);
        assert!(sink.leaves.iter().all(|l| l.2.len() <= 8));
        let total: usize = sink.leaves.iter().map(|l| l.2.len()).sum();
        assert_eq!(total, 40);
    }

    #[test]
    fn test_spatial_split_on_long_overlapping_boxes() {
        // Long thin boxes spanning the scene overlap under any object split
        let mut prims: Vec<BBox> = (0..16)
            .map(|i| {
                let y = i as f32;
                BBox::new(Vec3::new(0.0, y, 0.0), Vec3::new(100.0, y + 0.5, 0.5))
            })
            .collect();
        prims.extend((0..16).map(|i| {
            let x = i as f32 * 6.0;
            BBox::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 0.5, 16.0, 0.5))
        }));

        let (sink, stats) = build(4, &prims, 2, BuildConfig::default());
        // Duplicates are bounded by the budget
        let budget = (BuildConfig::default().split_budget * prims.len() as f32) as usize;
        assert!(stats.references <= prims.len() + budget);

        // Every primitive is referenced at least once, and leaf boxes stay
        // inside the primitive's bounds union
        let mut seen = vec![false; prims.len()];
        for (_, _, refs) in &sink.leaves {
            for &r in refs {
                seen[r as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_empty_input_rejected() {
        let mut sink = Recorder::default();
        let mut builder = SplitBvhBuilder::<AreaCost>::new(4, BuildConfig::default());
        let prims: Vec<BBox> = Vec::new();
        assert!(builder.build(&prims, &mut sink, 2).is_err());
    }

    #[test]
    fn test_partition() {
        let mut v = vec![5, 1, 4, 2, 3];
        let mid = partition(&mut v, |&x| x < 3);
        assert_eq!(mid, 2);
        assert!(v[..mid].iter().all(|&x| x < 3));
        assert!(v[mid..].iter().all(|&x| x >= 3));
    }
}
