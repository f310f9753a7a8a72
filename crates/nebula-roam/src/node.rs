//! Binary triangle tree nodes and the right-isoceles triangle shapes they cover.

use glam::IVec2;

/// Handle to a triangle node.
///
/// The two base triangles of a patch live inside the patch itself and use the
/// reserved ids [`NodeId::BASE_LEFT`] and [`NodeId::BASE_RIGHT`]. Every other
/// node lives in a [`crate::NodePool`] and is addressed by its slot index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Base triangle covering the top-left half of a patch.
    pub const BASE_LEFT: NodeId = NodeId(0);
    /// Base triangle covering the bottom-right half of a patch.
    pub const BASE_RIGHT: NodeId = NodeId(1);

    const ROOT_COUNT: u32 = 2;

    /// Id of the node stored in pool slot `index`.
    pub(crate) fn pooled(index: usize) -> Self {
        Self(index as u32 + Self::ROOT_COUNT)
    }

    /// Where the node is stored.
    pub(crate) fn slot(self) -> Slot {
        match self.0.checked_sub(Self::ROOT_COUNT) {
            None => Slot::Root(self.0 as usize),
            Some(index) => Slot::Pool(index as usize),
        }
    }
}

/// Storage location of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    /// One of the two base triangles owned by the patch.
    Root(usize),
    /// A slot in the node pool.
    Pool(usize),
}

/// One triangle of the ROAM binary tree.
///
/// Children are always allocated in pairs, so a node is either a leaf (no
/// children) or a branch (both children). Neighbor links are non-owning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriNode {
    pub left_child: Option<NodeId>,
    pub right_child: Option<NodeId>,
    /// Neighbor across the hypotenuse.
    pub base_neighbor: Option<NodeId>,
    /// Neighbor across the apex-left leg.
    pub left_neighbor: Option<NodeId>,
    /// Neighbor across the apex-right leg.
    pub right_neighbor: Option<NodeId>,
}

impl TriNode {
    pub fn is_leaf(&self) -> bool {
        self.left_child.is_none() && self.right_child.is_none()
    }

    pub fn is_branch(&self) -> bool {
        self.left_child.is_some() && self.right_child.is_some()
    }

    /// Both children, if this node has been split.
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        self.left_child.zip(self.right_child)
    }
}

/// Corner positions of a triangle in patch-local grid units.
///
/// ```text
///       A
///      /|\
///     / | \
///    /  |  \
///   L---M---R
/// ```
///
/// `L`-`R` is the hypotenuse and `M` its midpoint, where the triangle is split.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriShape {
    pub left: IVec2,
    pub right: IVec2,
    pub apex: IVec2,
}

impl TriShape {
    /// Shape of [`NodeId::BASE_LEFT`] for a patch of `size` cells.
    pub fn base_left(size: i32) -> Self {
        Self {
            left: IVec2::new(0, size),
            right: IVec2::new(size, 0),
            apex: IVec2::new(0, 0),
        }
    }

    /// Shape of [`NodeId::BASE_RIGHT`] for a patch of `size` cells.
    pub fn base_right(size: i32) -> Self {
        Self {
            left: IVec2::new(size, 0),
            right: IVec2::new(0, size),
            apex: IVec2::new(size, size),
        }
    }

    /// Hypotenuse midpoint.
    pub fn center(&self) -> IVec2 {
        (self.left + self.right) >> 1
    }

    /// Absolute hypotenuse extent along x and z.
    pub fn span(&self) -> IVec2 {
        (self.left - self.right).abs()
    }

    /// Larger of the two hypotenuse extents.
    pub fn size(&self) -> i32 {
        self.span().max_element()
    }

    /// A triangle whose hypotenuse spans at most one cell on both axes
    /// cannot be split further on the grid.
    pub fn is_indivisible(&self) -> bool {
        let span = self.span();
        span.x <= 1 && span.y <= 1
    }

    /// Shapes of the left and right child produced by splitting at [`Self::center`].
    pub fn children(&self) -> (TriShape, TriShape) {
        let center = self.center();
        (
            TriShape {
                left: self.apex,
                right: self.left,
                apex: center,
            },
            TriShape {
                left: self.right,
                right: self.apex,
                apex: center,
            },
        )
    }
}
