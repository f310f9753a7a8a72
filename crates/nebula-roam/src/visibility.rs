//! Per-camera visibility stamps for patches.
//!
//! Once per frame a grid query visits every tile inside a camera's frustum
//! and stamps it with the current frame number; later checks compare the
//! stamp against the frame counter without recomputing anything.

use glam::{Mat4, Vec3};

/// Grid coordinate of a patch, in patches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: u32,
    pub z: u32,
}

impl TileCoord {
    pub fn new(x: u32, z: u32) -> Self {
        Self { x, z }
    }

    /// Checkerboard color of the tile: tiles sharing an edge never have the
    /// same parity.
    pub fn parity(&self) -> u32 {
        (self.x + self.z) & 1
    }
}

/// Kinds of cameras that keep separate visibility stamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraKind {
    Player,
    Shadow,
    Reflection,
}

impl CameraKind {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Camera state needed for visibility and LOD decisions.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub kind: CameraKind,
    pub position: Vec3,
    pub view_projection: Mat4,
}

impl Camera {
    pub fn new(kind: CameraKind, position: Vec3, view_projection: Mat4) -> Self {
        Self {
            kind,
            position,
            view_projection,
        }
    }
}

/// Dimensions of the patch grid as seen by a visibility query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGrid {
    pub patches_x: u32,
    pub patches_z: u32,
    /// Cells per patch edge.
    pub patch_size: u32,
    /// World units per cell.
    pub square_size: f32,
}

impl TileGrid {
    /// World-space edge length of one patch.
    pub fn patch_world_size(&self) -> f32 {
        self.patch_size as f32 * self.square_size
    }

    pub fn patch_count(&self) -> usize {
        (self.patches_x * self.patches_z) as usize
    }

    /// Row-major index of `tile`.
    pub fn index(&self, tile: TileCoord) -> usize {
        (tile.z * self.patches_x + tile.x) as usize
    }
}

/// Spatial query that reports the tiles a camera can see.
pub trait GridVisibility {
    /// Call `visit(x, z)` once for every tile whose bounds, spanning the
    /// vertical range `min_height..=max_height`, intersect the camera frustum.
    fn visit_visible_tiles(
        &self,
        camera: &Camera,
        grid: &TileGrid,
        min_height: f32,
        max_height: f32,
        visit: &mut dyn FnMut(u32, u32),
    );
}

/// Last frame a patch was seen by each camera kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibilityStamps {
    frames: [Option<u64>; CameraKind::COUNT],
}

impl VisibilityStamps {
    pub fn stamp(&mut self, kind: CameraKind, frame: u64) {
        self.frames[kind.index()] = Some(frame);
    }

    /// Whether the patch was stamped for `kind` during `frame` or later.
    pub fn is_visible(&self, kind: CameraKind, frame: u64) -> bool {
        self.frames[kind.index()].is_some_and(|last| last >= frame)
    }

    pub fn last_visible_frame(&self, kind: CameraKind) -> Option<u64> {
        self.frames[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_stamped_is_invisible() {
        let stamps = VisibilityStamps::default();
        assert!(!stamps.is_visible(CameraKind::Player, 0));
    }

    #[test]
    fn test_stamp_is_per_camera_kind() {
        let mut stamps = VisibilityStamps::default();
        stamps.stamp(CameraKind::Shadow, 10);
        assert!(stamps.is_visible(CameraKind::Shadow, 10));
        assert!(!stamps.is_visible(CameraKind::Player, 10));
        assert_eq!(stamps.last_visible_frame(CameraKind::Shadow), Some(10));
    }

    #[test]
    fn test_old_stamp_expires_next_frame() {
        let mut stamps = VisibilityStamps::default();
        stamps.stamp(CameraKind::Player, 4);
        assert!(stamps.is_visible(CameraKind::Player, 4));
        assert!(!stamps.is_visible(CameraKind::Player, 5));
    }

    #[test]
    fn test_edge_neighbors_have_opposite_parity() {
        let tile = TileCoord::new(3, 6);
        assert_ne!(tile.parity(), TileCoord::new(4, 6).parity());
        assert_ne!(tile.parity(), TileCoord::new(3, 5).parity());
        assert_eq!(tile.parity(), TileCoord::new(4, 7).parity());
    }

    #[test]
    fn test_grid_index_is_row_major() {
        let grid = TileGrid {
            patches_x: 4,
            patches_z: 3,
            patch_size: 16,
            square_size: 8.0,
        };
        assert_eq!(grid.index(TileCoord::new(1, 2)), 9);
        assert_eq!(grid.patch_count(), 12);
        assert_eq!(grid.patch_world_size(), 128.0);
    }
}
