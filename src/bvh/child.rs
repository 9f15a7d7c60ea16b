//! Child slot references and their packed `i32` encoding.

/// Content of a node's child slot.
///
/// Packed form (what traversal kernels read):
/// - `Node(i)` is `i + 1`, so `0` stays free for `Empty` (the root is never a child);
/// - `Leaf(off)` is `!off`, always negative;
/// - `Empty` is `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRef {
    Empty,
    /// Index into the node array.
    Node(u32),
    /// Offset of the leaf's first bundle in the triangle array.
    Leaf(u32),
}

impl ChildRef {
    /// Packed representation.
    #[inline]
    pub const fn encode(self) -> i32 {
        match self {
            ChildRef::Empty => 0,
            ChildRef::Node(i) => (i + 1) as i32,
            ChildRef::Leaf(off) => !(off as i32),
        }
    }

    /// Decode a packed slot.
    #[inline]
    pub const fn decode(raw: i32) -> Self {
        if raw == 0 {
            ChildRef::Empty
        } else if raw > 0 {
            ChildRef::Node((raw - 1) as u32)
        } else {
            ChildRef::Leaf(!raw as u32)
        }
    }

    #[inline]
    pub const fn is_leaf(self) -> bool {
        matches!(self, ChildRef::Leaf(_))
    }
}

/// Position of a child inside its parent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    pub parent: usize,
    pub slot: usize,
}

impl ChildSlot {
    #[inline]
    pub const fn new(parent: usize, slot: usize) -> Self {
        Self { parent, slot }
    }
}
