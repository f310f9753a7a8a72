//! Fixed-capacity arenas for triangle tree nodes.
//!
//! A [`NodePool`] hands out child pairs with a bump cursor and is rewound in
//! bulk once per frame. A [`NodePoolSet`] keeps one pool per worker so the
//! tessellation hot path never touches a lock, and grows the whole set when
//! the previous frame ran out of nodes.

use std::collections::TryReserveError;

use tracing::{debug, error, warn};

use crate::error::RoamError;
use crate::node::{NodeId, TriNode};
use crate::visibility::CameraKind;

/// Default total node count split over all workers of one render pass.
pub const NEW_POOL_SIZE: usize = 1 << 17;

/// Render passes that keep their own trees and pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderPass {
    Main,
    Shadow,
}

impl RenderPass {
    pub const ALL: [RenderPass; 2] = [RenderPass::Main, RenderPass::Shadow];

    /// Camera whose visibility stamps select the patches of this pass.
    pub fn camera_kind(self) -> CameraKind {
        match self {
            RenderPass::Main => CameraKind::Player,
            RenderPass::Shadow => CameraKind::Shadow,
        }
    }
}

/// Bump allocator for [`TriNode`]s.
#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<TriNode>,
    next_free: usize,
}

impl NodePool {
    /// Create a pool holding `capacity` nodes, rounded up to an even count
    /// since children are always handed out in pairs.
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let capacity = capacity + (capacity & 1);
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(capacity)?;
        nodes.resize(capacity, TriNode::default());
        Ok(Self {
            nodes,
            next_free: 0,
        })
    }

    /// Claim the next two slots, or `None` once the pool is exhausted.
    pub fn allocate_pair(&mut self) -> Option<(NodeId, NodeId)> {
        if self.out_of_nodes() {
            return None;
        }
        let left = NodeId::pooled(self.next_free);
        let right = NodeId::pooled(self.next_free + 1);
        self.next_free += 2;
        Some((left, right))
    }

    /// Clear the slots used since the last reset and rewind the cursor.
    pub fn reset(&mut self) {
        self.nodes[..self.next_free].fill(TriNode::default());
        self.next_free = 0;
    }

    pub fn out_of_nodes(&self) -> bool {
        self.next_free >= self.nodes.len()
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes handed out since the last reset.
    pub fn used(&self) -> usize {
        self.next_free
    }

    pub(crate) fn node(&self, slot: usize) -> &TriNode {
        &self.nodes[slot]
    }

    pub(crate) fn node_mut(&mut self, slot: usize) -> &mut TriNode {
        &mut self.nodes[slot]
    }
}

/// Capacity of each worker's pool when `total` nodes are spread over
/// `workers` threads: an even share, but never less than a third of the
/// total so a single busy worker does not starve.
pub fn per_worker_capacity(total: usize, workers: usize) -> usize {
    let share = (total / workers.max(1)).max(total / 3);
    share + (share & 1)
}

/// Size requested by the single retry after a failed pool allocation.
pub fn reduced_pool_size(size: usize) -> usize {
    size - (size >> 2)
}

/// Pool allocation strategy: `(workers, total_nodes)` to one pool per worker.
type AllocatePools = fn(usize, usize) -> Result<Vec<NodePool>, TryReserveError>;

/// One [`NodePool`] per worker thread for a single render pass.
#[derive(Debug)]
pub struct NodePoolSet {
    pools: Vec<NodePool>,
    workers: usize,
    current_size: usize,
    max_size: usize,
}

impl NodePoolSet {
    /// Create `workers` pools sharing `desired_size` nodes. The set may later
    /// grow up to `max_size` total nodes.
    pub fn new(workers: usize, desired_size: usize, max_size: usize) -> Result<Self, RoamError> {
        let workers = workers.max(1);
        let mut set = Self {
            pools: Vec::with_capacity(workers),
            workers,
            current_size: 0,
            max_size: max_size.max(desired_size),
        };
        set.init_pools(desired_size, Self::allocate)?;
        Ok(set)
    }

    fn init_pools(&mut self, desired_size: usize, allocate: AllocatePools) -> Result<(), RoamError> {
        let workers = self.workers;
        match allocate(workers, desired_size) {
            Ok(pools) => {
                self.pools = pools;
                self.current_size = desired_size;
                Ok(())
            }
            Err(source) => {
                let reduced = reduced_pool_size(desired_size);
                warn!(
                    workers,
                    requested = desired_size,
                    reduced,
                    "node pool allocation failed ({source}), retrying with a smaller pool"
                );
                self.max_size = reduced;
                match allocate(workers, reduced) {
                    Ok(pools) => {
                        self.pools = pools;
                        self.current_size = reduced;
                        Ok(())
                    }
                    Err(source) => {
                        error!(workers, requested = reduced, "node pool allocation failed");
                        Err(RoamError::PoolAllocation {
                            requested: reduced,
                            source,
                        })
                    }
                }
            }
        }
    }

    fn allocate(workers: usize, total: usize) -> Result<Vec<NodePool>, TryReserveError> {
        let capacity = per_worker_capacity(total, workers);
        let pools = (0..workers)
            .map(|_| NodePool::with_capacity(capacity))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(workers, total, per_worker = capacity, "initialized node pools");
        Ok(pools)
    }

    /// Reset every pool. When any of them ran dry during the last cycle, the
    /// set is reallocated at twice its size (capped at the ceiling) so the
    /// next frame can tessellate further.
    ///
    /// Returns `true` if the pools were grown. A failed growth leaves the set
    /// without pools.
    pub fn reset_all(&mut self) -> Result<bool, RoamError> {
        self.reset_all_with(Self::allocate)
    }

    fn reset_all_with(&mut self, allocate: AllocatePools) -> Result<bool, RoamError> {
        let mut out_of_nodes = false;
        for pool in &mut self.pools {
            out_of_nodes |= pool.out_of_nodes();
            pool.reset();
        }

        if !out_of_nodes {
            return Ok(false);
        }
        if !self.can_grow() {
            warn!(
                size = self.current_size,
                "node pools exhausted at their size ceiling"
            );
            return Ok(false);
        }

        let grown = self.current_size.max(1).saturating_mul(2).min(self.max_size);
        // Release the exhausted pools before asking for larger ones.
        self.pools = Vec::new();
        self.init_pools(grown, allocate)?;
        Ok(true)
    }

    /// Whether a later [`Self::reset_all`] may still enlarge the pools.
    pub fn can_grow(&self) -> bool {
        self.current_size < self.max_size
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn pool(&self, worker: usize) -> &NodePool {
        &self.pools[worker]
    }

    pub fn pool_mut(&mut self, worker: usize) -> &mut NodePool {
        &mut self.pools[worker]
    }

    pub fn pools_mut(&mut self) -> &mut [NodePool] {
        &mut self.pools
    }

    /// Total nodes requested for the set (before per-worker rounding).
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Sum of all per-worker capacities.
    pub fn total_capacity(&self) -> usize {
        self.pools.iter().map(NodePool::capacity).sum()
    }

    pub fn any_out_of_nodes(&self) -> bool {
        self.pools.iter().any(NodePool::out_of_nodes)
    }
}
