//! ROAM terrain level of detail: binary triangle trees per square patch,
//! split by camera-weighted height variance and drawn with border skirts.

mod error;
mod frustum;
mod height;
mod mesh;
mod node;
mod patch;
mod pool;
mod render;
mod settings;
mod tree;
mod variance;
mod visibility;

pub use error::RoamError;
pub use frustum::{Frustum, FrustumGridQuery};
pub use height::{HeightMap, HeightSource, Rect};
pub use mesh::{RoamMesh, TessellationStats};
pub use node::{NodeId, TriNode, TriShape};
pub use patch::{LodParams, Patch, SKIRT_DEPTH};
pub use pool::{NEW_POOL_SIZE, NodePool, NodePoolSet, RenderPass, per_worker_capacity, reduced_pool_size};
pub use render::{BorderVertex, PatchRenderer, RecordingRenderer, RenderCall};
pub use settings::RoamSettings;
pub use variance::{VarianceTable, midpoint_variance};
pub use visibility::{Camera, CameraKind, GridVisibility, TileCoord, TileGrid, VisibilityStamps};
