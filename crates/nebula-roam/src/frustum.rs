//! Frustum-based grid query: which patches does a camera see?
//!
//! Planes are extracted from the view-projection matrix (Gribb-Hartmann,
//! `0..1` clip depth as produced by `glam`'s `*_rh` projections) and each
//! patch's box is tested with its positive vertex.

use glam::{Mat4, Vec3, Vec4};

use crate::visibility::{Camera, GridVisibility, TileGrid};

/// Six inward-facing planes: left, right, bottom, top, near, far.
#[derive(Clone, Debug)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let [r0, r1, r2, r3] = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];
        let mut planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Conservative box test: may accept a box just outside a frustum corner,
    /// never rejects one that is inside.
    pub fn intersects_box(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), max, min);
            normal.dot(p) + plane.w >= 0.0
        })
    }
}

/// Visits patches by testing every tile's bounding box against the camera
/// frustum.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrustumGridQuery;

impl GridVisibility for FrustumGridQuery {
    fn visit_visible_tiles(
        &self,
        camera: &Camera,
        grid: &TileGrid,
        min_height: f32,
        max_height: f32,
        visit: &mut dyn FnMut(u32, u32),
    ) {
        let frustum = Frustum::from_view_projection(&camera.view_projection);
        let size = grid.patch_world_size();

        for z in 0..grid.patches_z {
            for x in 0..grid.patches_x {
                let min = Vec3::new(x as f32 * size, min_height, z as f32 * size);
                let max = Vec3::new((x + 1) as f32 * size, max_height, (z + 1) as f32 * size);
                if frustum.intersects_box(min, max) {
                    visit(x, z);
                }
            }
        }
    }
}
