//! Split logic for a patch's pair of binary triangle trees.

use tracing::warn;

use crate::node::{NodeId, Slot, TriNode};
use crate::pool::NodePool;

/// Resolve `id` against a patch's base triangles and the pool holding the
/// rest of its nodes.
pub(crate) fn node_ref<'a>(roots: &'a [TriNode; 2], pool: &'a NodePool, id: NodeId) -> &'a TriNode {
    match id.slot() {
        Slot::Root(slot) => &roots[slot],
        Slot::Pool(slot) => pool.node(slot),
    }
}

/// Mutable view over one patch's trees during tessellation.
pub(crate) struct TriTree<'a> {
    roots: &'a mut [TriNode; 2],
    pool: &'a mut NodePool,
}

/// Which of a neighbor's links pointed back at the node being split.
#[derive(Clone, Copy)]
enum Link {
    Base,
    Left,
    Right,
}

impl<'a> TriTree<'a> {
    pub(crate) fn new(roots: &'a mut [TriNode; 2], pool: &'a mut NodePool) -> Self {
        Self { roots, pool }
    }

    pub(crate) fn node(&self, id: NodeId) -> &TriNode {
        node_ref(&*self.roots, &*self.pool, id)
    }

    fn node_mut(&mut self, id: NodeId) -> &mut TriNode {
        match id.slot() {
            Slot::Root(slot) => &mut self.roots[slot],
            Slot::Pool(slot) => self.pool.node_mut(slot),
        }
    }

    /// Split `tri` into two children, first splitting whatever is needed so
    /// the shared hypotenuse with its base neighbor stays crack free.
    ///
    /// Returns `false` if the pool ran out of nodes; `tri` then stays a leaf.
    pub(crate) fn split(&mut self, tri: NodeId) -> bool {
        if self.node(tri).is_branch() {
            return true;
        }

        // Not in a proper diamond yet: the base neighbor is coarser and must
        // be split first.
        if let Some(base) = self.node(tri).base_neighbor
            && self.node(base).base_neighbor != Some(tri)
        {
            self.split(base);
        }

        let Some((left, right)) = self.pool.allocate_pair() else {
            return false;
        };

        let parent = {
            let node = self.node_mut(tri);
            node.left_child = Some(left);
            node.right_child = Some(right);
            *node
        };

        {
            let child = self.node_mut(left);
            child.base_neighbor = parent.left_neighbor;
            child.left_neighbor = Some(right);
        }
        {
            let child = self.node_mut(right);
            child.base_neighbor = parent.right_neighbor;
            child.right_neighbor = Some(left);
        }

        if let Some(neighbor) = parent.left_neighbor {
            self.relink(
                neighbor,
                tri,
                left,
                [Link::Base, Link::Left, Link::Right],
                "left",
            );
        }
        if let Some(neighbor) = parent.right_neighbor {
            self.relink(
                neighbor,
                tri,
                right,
                [Link::Base, Link::Right, Link::Left],
                "right",
            );
        }

        match parent.base_neighbor {
            Some(base) => {
                if let Some((base_left, base_right)) = self.node(base).children() {
                    self.node_mut(base_left).right_neighbor = Some(right);
                    self.node_mut(base_right).left_neighbor = Some(left);
                    self.node_mut(left).right_neighbor = Some(base_right);
                    self.node_mut(right).left_neighbor = Some(base_left);
                } else {
                    // Our diamond partner is still whole; split it to match.
                    self.split(base);
                }
            }
            None => {
                // Patch edge.
                self.node_mut(left).right_neighbor = None;
                self.node_mut(right).left_neighbor = None;
            }
        }

        true
    }

    /// Point whichever link of `neighbor` referenced `old` at `new` instead,
    /// trying the links in `order`.
    fn relink(&mut self, neighbor: NodeId, old: NodeId, new: NodeId, order: [Link; 3], side: &str) {
        let node = self.node_mut(neighbor);
        for link in order {
            let slot = match link {
                Link::Base => &mut node.base_neighbor,
                Link::Left => &mut node.left_neighbor,
                Link::Right => &mut node.right_neighbor,
            };
            if *slot == Some(old) {
                *slot = Some(new);
                return;
            }
        }

        warn!(?neighbor, ?old, side, "illegal neighbor link while splitting");
        debug_assert!(false, "{side} neighbor {neighbor:?} does not link back to {old:?}");
    }
}
