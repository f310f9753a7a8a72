//! Error types for terrain mesh construction.

use std::collections::TryReserveError;

/// Errors that abort building or growing the terrain mesh.
///
/// Running out of pool nodes during a frame is not an error; it only limits
/// how far a patch is subdivided.
#[derive(Debug, thiserror::Error)]
pub enum RoamError {
    /// Node pools could not be allocated, even after retrying at reduced size.
    #[error("failed to allocate {requested} triangle nodes: {source}")]
    PoolAllocation {
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    /// Patch size must be a power of two of at least 4 cells.
    #[error("invalid patch size {0}: must be a power of two >= 4")]
    InvalidPatchSize(u32),

    /// Variance tables must hold the root and may not reach below the
    /// levels the variance recursion fills in.
    #[error("invalid variance depth {depth}: must be within 1..={max}")]
    InvalidVarianceDepth { depth: u32, max: u32 },

    /// Each render pass needs at least one node pair to tessellate.
    #[error("invalid node pool size {0}: must be at least 2")]
    InvalidPoolSize(usize),

    /// The view radius scales every LOD distance and must be positive.
    #[error("invalid view radius {0}: must be positive and finite")]
    InvalidViewRadius(f32),

    /// The height map must be tiled exactly by whole patches.
    #[error("height map {width}x{height} is not a non-zero multiple of patch size {patch_size}")]
    MapNotPatchAligned {
        width: u32,
        height: u32,
        patch_size: u32,
    },
}
