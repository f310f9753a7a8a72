//! Whole-map terrain mesh: owns every patch and the node pools, decides when
//! to retessellate, and fans tessellation out over worker threads.
//!
//! Each render pass keeps its own copy of the patch grid so the main and
//! shadow cameras can refine the terrain independently. Within a pass, the
//! visible patches are processed in two checkerboard phases so patches that
//! share an edge are never tessellated at the same time.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, bounded};
use glam::Vec3;
use tracing::{debug, warn};

use crate::error::RoamError;
use crate::height::{HeightMap, Rect};
use crate::patch::{LodParams, Patch};
use crate::pool::{NodePool, NodePoolSet, RenderPass};
use crate::render::PatchRenderer;
use crate::settings::RoamSettings;
use crate::visibility::{Camera, CameraKind, GridVisibility, TileCoord, TileGrid};

/// Vertical padding added to the map's height range for visibility queries.
const VISIBILITY_HEIGHT_PADDING: f32 = 100.0;

/// Outcome of one [`RoamMesh::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TessellationStats {
    /// Whether the pass was retessellated this frame.
    pub retessellated: bool,
    pub visible_patches: usize,
    /// Triangles across all visible patches.
    pub triangles: usize,
    /// Skirt vertices across all visible patches.
    pub border_vertices: usize,
    /// Some worker's pool ran dry; detail was capped this frame.
    pub out_of_nodes: bool,
    /// Patches whose tessellation was cut short by the pool.
    pub under_tessellated: usize,
    /// Pools were reallocated larger before this pass.
    pub pools_grown: bool,
    /// Total node capacity of the pass's pools.
    pub pool_capacity: usize,
}

/// Patches and pools of one render pass.
#[derive(Debug)]
struct PassState {
    patches: Vec<Patch>,
    pools: NodePoolSet,
    last_camera: Option<Vec3>,
    last_view_radius: f32,
    last_visible: Vec<usize>,
    /// Retessellate on the next update regardless of camera movement.
    force: bool,
}

impl PassState {
    fn new(settings: &RoamSettings, grid: &TileGrid, map: &HeightMap) -> Result<Self, RoamError> {
        let mut patches = Vec::with_capacity(grid.patch_count());
        for z in 0..grid.patches_z {
            for x in 0..grid.patches_x {
                patches.push(Patch::new(
                    TileCoord::new(x, z),
                    settings.patch_size,
                    settings.variance_depth,
                    settings.square_size,
                    map,
                ));
            }
        }

        let pools = NodePoolSet::new(
            settings.worker_count(),
            settings.initial_pool_size,
            settings.max_pool_size,
        )?;

        Ok(Self {
            patches,
            pools,
            last_camera: None,
            last_view_radius: settings.view_radius,
            last_visible: Vec::new(),
            force: true,
        })
    }

    fn visible_patches(&self, kind: CameraKind, frame: u64) -> Vec<usize> {
        self.patches
            .iter()
            .enumerate()
            .filter(|(_, patch)| patch.is_visible(kind, frame))
            .map(|(index, _)| index)
            .collect()
    }
}

/// ROAM terrain mesh over a whole height map.
#[derive(Debug)]
pub struct RoamMesh {
    settings: RoamSettings,
    grid: TileGrid,
    min_height: f32,
    max_height: f32,
    mean_height: f32,
    main: PassState,
    shadow: Option<PassState>,
}

impl RoamMesh {
    /// Build patches for every tile of `map` and allocate the node pools.
    pub fn new(settings: RoamSettings, map: &HeightMap) -> Result<Self, RoamError> {
        settings.validate()?;

        let size = settings.patch_size;
        if map.width() == 0
            || map.height() == 0
            || map.width() % size != 0
            || map.height() % size != 0
        {
            return Err(RoamError::MapNotPatchAligned {
                width: map.width(),
                height: map.height(),
                patch_size: size,
            });
        }

        let grid = TileGrid {
            patches_x: map.width() / size,
            patches_z: map.height() / size,
            patch_size: size,
            square_size: settings.square_size,
        };

        let main = PassState::new(&settings, &grid, map)?;
        let shadow = if settings.shadow_pass {
            Some(PassState::new(&settings, &grid, map)?)
        } else {
            None
        };

        debug!(
            patches_x = grid.patches_x,
            patches_z = grid.patches_z,
            patch_size = size,
            workers = main.pools.worker_count(),
            "built terrain mesh"
        );

        Ok(Self {
            settings,
            grid,
            min_height: map.min_height(),
            max_height: map.max_height(),
            mean_height: map.mean_height(),
            main,
            shadow,
        })
    }

    pub fn settings(&self) -> &RoamSettings {
        &self.settings
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    fn pass_state(&self, pass: RenderPass) -> Option<&PassState> {
        match pass {
            RenderPass::Main => Some(&self.main),
            RenderPass::Shadow => self.shadow.as_ref(),
        }
    }

    fn pass_state_mut(&mut self, pass: RenderPass) -> Option<&mut PassState> {
        match pass {
            RenderPass::Main => Some(&mut self.main),
            RenderPass::Shadow => self.shadow.as_mut(),
        }
    }

    /// Patches of `pass` in row-major order; empty if the pass is disabled.
    pub fn patches(&self, pass: RenderPass) -> &[Patch] {
        self.pass_state(pass)
            .map_or(&[], |state| state.patches.as_slice())
    }

    pub fn patch(&self, pass: RenderPass, tile: TileCoord) -> Option<&Patch> {
        if tile.x >= self.grid.patches_x || tile.z >= self.grid.patches_z {
            return None;
        }
        self.patches(pass).get(self.grid.index(tile))
    }

    pub fn pools(&self, pass: RenderPass) -> Option<&NodePoolSet> {
        self.pass_state(pass).map(|state| &state.pools)
    }

    /// Change the LOD falloff; the next update retessellates.
    pub fn set_view_radius(&mut self, view_radius: f32) {
        self.settings.view_radius = view_radius;
    }

    /// Stamp every patch `camera` can see during `frame`.
    pub fn update_visibility(
        &mut self,
        pass: RenderPass,
        camera: &Camera,
        query: &dyn GridVisibility,
        frame: u64,
    ) {
        let grid = self.grid;
        let min_height = self.min_height - VISIBILITY_HEIGHT_PADDING;
        let max_height = self.max_height + VISIBILITY_HEIGHT_PADDING;
        let Some(state) = self.pass_state_mut(pass) else {
            return;
        };

        let patches = &mut state.patches;
        query.visit_visible_tiles(camera, &grid, min_height, max_height, &mut |x, z| {
            debug_assert!(x < grid.patches_x && z < grid.patches_z);
            if x < grid.patches_x && z < grid.patches_z {
                patches[grid.index(TileCoord::new(x, z))].stamp_visible(camera.kind, frame);
            }
        });
    }

    /// Retessellate the patches of `pass` visible during `frame` if the camera
    /// moved far enough, the visible set or view radius changed, heights were
    /// edited, or the previous pass ran out of nodes.
    pub fn update(
        &mut self,
        pass: RenderPass,
        camera_position: Vec3,
        frame: u64,
    ) -> Result<TessellationStats, RoamError> {
        let kind = pass.camera_kind();
        let lod = LodParams {
            camera_position,
            view_radius: self.settings.view_radius,
            mean_height: self.mean_height,
        };
        let retessellate_distance = self.settings.retessellate_distance;
        let Some(state) = self.pass_state_mut(pass) else {
            return Ok(TessellationStats::default());
        };

        let visible = state.visible_patches(kind, frame);
        let moved = state
            .last_camera
            .is_none_or(|last| last.distance(camera_position) > retessellate_distance);
        let needed = moved
            || state.force
            || state.last_view_radius != lod.view_radius
            || visible != state.last_visible;

        let mut stats = TessellationStats {
            visible_patches: visible.len(),
            ..Default::default()
        };

        if needed {
            for patch in &mut state.patches {
                patch.reset();
            }
            stats.pools_grown = state.pools.reset_all()?;
            stats.under_tessellated = tessellate_visible(state, &lod, kind, frame);
            stats.retessellated = true;
            stats.out_of_nodes = state.pools.any_out_of_nodes();

            state.last_camera = Some(camera_position);
            state.last_view_radius = lod.view_radius;
            // Only worth another pass if the pools can still grow.
            state.force = stats.out_of_nodes && state.pools.can_grow();
        }

        for &index in &visible {
            let patch = &state.patches[index];
            stats.triangles += patch.triangle_count();
            stats.border_vertices += patch.border_vertices().len();
        }
        stats.pool_capacity = state.pools.total_capacity();
        state.last_visible = visible;

        if stats.out_of_nodes {
            warn!(
                ?pass,
                under_tessellated = stats.under_tessellated,
                capacity = stats.pool_capacity,
                "terrain node pools exhausted"
            );
        }
        if stats.retessellated {
            debug!(
                ?pass,
                frame,
                visible = stats.visible_patches,
                triangles = stats.triangles,
                "retessellated terrain"
            );
        }

        Ok(stats)
    }

    /// Pull edited heights inside the global corner rectangle `rect` from
    /// `map` into every overlapping patch of every pass.
    pub fn unsynced_height_map_update(&mut self, map: &HeightMap, rect: Rect) {
        let Some(rect) = rect.intersection(&map.bounds()) else {
            return;
        };
        self.min_height = map.min_height();
        self.max_height = map.max_height();
        self.mean_height = map.mean_height();

        for state in std::iter::once(&mut self.main).chain(self.shadow.as_mut()) {
            for patch in &mut state.patches {
                let bounds = patch.global_bounds();
                if let Some(overlap) = bounds.intersection(&rect) {
                    patch.update_height_map(map, overlap.relative_to(bounds.x1, bounds.z1));
                    state.force = true;
                }
            }
        }
    }

    /// Upload and draw every patch of `pass` visible during `frame`.
    ///
    /// Returns the number of patches drawn.
    pub fn draw(&mut self, pass: RenderPass, frame: u64, renderer: &mut dyn PatchRenderer) -> usize {
        let kind = pass.camera_kind();
        let Some(state) = self.pass_state_mut(pass) else {
            return 0;
        };

        let mut drawn = 0;
        for patch in state
            .patches
            .iter_mut()
            .filter(|patch| patch.is_visible(kind, frame))
        {
            patch.upload(renderer);
            patch.draw(renderer);
            patch.draw_border(renderer);
            drawn += 1;
        }
        drawn
    }
}

/// Tessellate every visible patch of `state`, one checkerboard color at a
/// time, with one worker per node pool.
///
/// Returns the number of patches cut short by their worker's pool.
fn tessellate_visible(state: &mut PassState, lod: &LodParams, kind: CameraKind, frame: u64) -> usize {
    let under_tessellated = AtomicUsize::new(0);

    for parity in [0, 1] {
        let batch: Vec<&mut Patch> = state
            .patches
            .iter_mut()
            .filter(|patch| patch.tile().parity() == parity && patch.is_visible(kind, frame))
            .collect();
        if batch.is_empty() {
            continue;
        }

        let (sender, receiver) = bounded(batch.len());
        for patch in batch {
            // The channel holds the whole batch and the receiver is alive.
            let _ = sender.send(patch);
        }
        drop(sender);

        match state.pools.pools_mut() {
            [pool] => drain_patches(&receiver, pool, lod, &under_tessellated),
            pools => std::thread::scope(|scope| {
                for pool in pools.iter_mut() {
                    let receiver = receiver.clone();
                    let under_tessellated = &under_tessellated;
                    std::thread::Builder::new()
                        .name("roam-tessellate".into())
                        .spawn_scoped(scope, move || {
                            drain_patches(&receiver, pool, lod, under_tessellated)
                        })
                        .expect("Failed to spawn tessellation worker thread");
                }
            }),
        }
    }

    under_tessellated.into_inner()
}

/// Worker loop: tessellate patches from `receiver` until it is drained.
fn drain_patches(
    receiver: &Receiver<&mut Patch>,
    pool: &mut NodePool,
    lod: &LodParams,
    under_tessellated: &AtomicUsize,
) {
    while let Ok(patch) = receiver.recv() {
        if patch.is_dirty() {
            patch.compute_variance();
        }
        if !patch.tessellate(pool, lod) {
            under_tessellated.fetch_add(1, Ordering::Relaxed);
        }
        patch.generate_indices(pool);
        patch.generate_border_vertices(pool);
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;
    use crate::render::{RecordingRenderer, RenderCall};

    const MAP: u32 = 64;

    /// Reports every tile of the grid.
    struct AllTiles;

    impl GridVisibility for AllTiles {
        fn visit_visible_tiles(
            &self,
            _camera: &Camera,
            grid: &TileGrid,
            _min_height: f32,
            _max_height: f32,
            visit: &mut dyn FnMut(u32, u32),
        ) {
            for z in 0..grid.patches_z {
                for x in 0..grid.patches_x {
                    visit(x, z);
                }
            }
        }
    }

    /// Reports a single tile.
    struct OneTile(TileCoord);

    impl GridVisibility for OneTile {
        fn visit_visible_tiles(
            &self,
            _camera: &Camera,
            _grid: &TileGrid,
            _min_height: f32,
            _max_height: f32,
            visit: &mut dyn FnMut(u32, u32),
        ) {
            visit(self.0.x, self.0.z);
        }
    }

    fn bumpy(x: u32, z: u32) -> f32 {
        ((x * 7919 + z * 104_729) % 97) as f32 * 0.5 + 1.0
    }

    fn settings(workers: usize) -> RoamSettings {
        RoamSettings {
            patch_size: 16,
            variance_depth: 6,
            initial_pool_size: 1 << 16,
            max_pool_size: 1 << 18,
            worker_threads: workers,
            shadow_pass: false,
            ..Default::default()
        }
    }

    fn map() -> HeightMap {
        HeightMap::from_fn(MAP, MAP, bumpy)
    }

    fn camera(kind: CameraKind, position: Vec3) -> Camera {
        Camera::new(kind, position, Mat4::IDENTITY)
    }

    fn center() -> Vec3 {
        Vec3::new(256.0, 50.0, 256.0)
    }

    fn frame(mesh: &mut RoamMesh, position: Vec3, frame: u64) -> TessellationStats {
        let cam = camera(CameraKind::Player, position);
        mesh.update_visibility(RenderPass::Main, &cam, &AllTiles, frame);
        mesh.update(RenderPass::Main, position, frame).unwrap()
    }

    #[test]
    fn test_rejects_misaligned_map() {
        let result = RoamMesh::new(settings(1), &HeightMap::flat(60, 64, 0.0));
        assert!(matches!(
            result,
            Err(RoamError::MapNotPatchAligned {
                width: 60,
                height: 64,
                patch_size: 16
            })
        ));
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let bad = RoamSettings {
            patch_size: 12,
            ..settings(1)
        };
        assert!(matches!(
            RoamMesh::new(bad, &map()),
            Err(RoamError::InvalidPatchSize(12))
        ));
    }

    #[test]
    fn test_builds_row_major_grid() {
        let mesh = RoamMesh::new(settings(1), &map()).unwrap();
        assert_eq!(mesh.grid().patches_x, 4);
        assert_eq!(mesh.grid().patches_z, 4);

        let patches = mesh.patches(RenderPass::Main);
        assert_eq!(patches.len(), 16);
        assert_eq!(patches[5].tile(), TileCoord::new(1, 1));
        assert_eq!(patches[7].tile(), TileCoord::new(3, 1));
        assert!(mesh.patch(RenderPass::Main, TileCoord::new(4, 0)).is_none());
    }

    #[test]
    fn test_retessellates_only_when_needed() {
        let mut mesh = RoamMesh::new(settings(1), &map()).unwrap();

        let first = frame(&mut mesh, center(), 1);
        assert!(first.retessellated);
        assert_eq!(first.visible_patches, 16);
        assert!(first.triangles > 32);
        assert!(!first.out_of_nodes);

        let second = frame(&mut mesh, center() + Vec3::new(10.0, 0.0, 0.0), 2);
        assert!(!second.retessellated);
        assert_eq!(second.triangles, first.triangles);

        let moved = frame(&mut mesh, center() + Vec3::new(100.0, 0.0, 0.0), 3);
        assert!(moved.retessellated);
    }

    #[test]
    fn test_view_radius_change_retessellates() {
        let mut mesh = RoamMesh::new(settings(1), &map()).unwrap();
        frame(&mut mesh, center(), 1);

        mesh.set_view_radius(100.0);
        let stats = frame(&mut mesh, center(), 2);
        assert!(stats.retessellated);
        assert_eq!(mesh.settings().view_radius, 100.0);
    }

    #[test]
    fn test_visible_set_change_retessellates() {
        let mut mesh = RoamMesh::new(settings(1), &map()).unwrap();
        let cam = camera(CameraKind::Player, center());

        mesh.update_visibility(RenderPass::Main, &cam, &OneTile(TileCoord::new(0, 0)), 1);
        let first = mesh.update(RenderPass::Main, center(), 1).unwrap();
        assert_eq!(first.visible_patches, 1);

        let second = frame(&mut mesh, center(), 2);
        assert!(second.retessellated);
        assert_eq!(second.visible_patches, 16);
    }

    #[test]
    fn test_invisible_patches_are_left_alone() {
        let mut mesh = RoamMesh::new(settings(1), &map()).unwrap();
        let cam = camera(CameraKind::Player, center());
        let tile = TileCoord::new(2, 1);

        mesh.update_visibility(RenderPass::Main, &cam, &OneTile(tile), 1);
        let stats = mesh.update(RenderPass::Main, center(), 1).unwrap();

        for patch in mesh.patches(RenderPass::Main) {
            if patch.tile() == tile {
                assert!(patch.triangle_count() >= 2);
                assert_eq!(stats.triangles, patch.triangle_count());
            } else {
                assert_eq!(patch.triangle_count(), 0);
                assert!(patch.border_vertices().is_empty());
            }
        }
    }

    #[test]
    fn test_worker_count_does_not_change_the_mesh() {
        let map = map();
        let mut single = RoamMesh::new(settings(1), &map).unwrap();
        let mut parallel = RoamMesh::new(settings(3), &map).unwrap();
        assert_eq!(parallel.pools(RenderPass::Main).unwrap().worker_count(), 3);

        let a = frame(&mut single, center(), 1);
        let b = frame(&mut parallel, center(), 1);
        assert_eq!(a.triangles, b.triangles);
        assert_eq!(a.border_vertices, b.border_vertices);

        let pairs = single
            .patches(RenderPass::Main)
            .iter()
            .zip(parallel.patches(RenderPass::Main));
        for (left, right) in pairs {
            assert_eq!(left.indices(), right.indices(), "{:?}", left.tile());
            assert_eq!(left.border_vertices(), right.border_vertices());
        }
    }

    #[test]
    fn test_height_update_forces_retessellation() {
        let mut edited = map();
        let mut mesh = RoamMesh::new(settings(1), &edited).unwrap();
        frame(&mut mesh, center(), 1);

        for z in 20..=24 {
            for x in 20..=24 {
                edited.set(x, z, 300.0);
            }
        }
        mesh.unsynced_height_map_update(&edited, Rect::new(20, 20, 24, 24));

        let tile = TileCoord::new(1, 1);
        assert!(mesh.patch(RenderPass::Main, tile).unwrap().is_dirty());
        assert!(!mesh.patch(RenderPass::Main, TileCoord::new(3, 3)).unwrap().is_dirty());

        let stats = frame(&mut mesh, center(), 2);
        assert!(stats.retessellated);
        let patch = mesh.patch(RenderPass::Main, tile).unwrap();
        assert!(!patch.is_dirty());
    }

    #[test]
    fn test_height_update_outside_map_is_ignored() {
        let map = map();
        let mut mesh = RoamMesh::new(settings(1), &map).unwrap();
        frame(&mut mesh, center(), 1);

        mesh.unsynced_height_map_update(&map, Rect::new(100, 100, 120, 120));
        assert!(!frame(&mut mesh, center(), 2).retessellated);
    }

    #[test]
    fn test_exhausted_pools_grow_and_retry() {
        let tiny = RoamSettings {
            initial_pool_size: 64,
            ..settings(1)
        };
        let mut mesh = RoamMesh::new(tiny, &map()).unwrap();

        let first = frame(&mut mesh, center(), 1);
        assert!(first.out_of_nodes);
        assert!(first.under_tessellated > 0);
        assert!(!first.pools_grown);

        let second = frame(&mut mesh, center(), 2);
        assert!(second.retessellated);
        assert!(second.pools_grown);
        assert!(second.pool_capacity > first.pool_capacity);
    }

    /// Pools already at their ceiling cannot do better, so the exhausted
    /// result is kept until something else changes.
    #[test]
    fn test_exhausted_pools_at_ceiling_do_not_force_retessellation() {
        let capped = RoamSettings {
            initial_pool_size: 64,
            max_pool_size: 64,
            ..settings(1)
        };
        let mut mesh = RoamMesh::new(capped, &map()).unwrap();

        let first = frame(&mut mesh, center(), 1);
        assert!(first.out_of_nodes);

        let second = frame(&mut mesh, center(), 2);
        assert!(!second.retessellated);
        assert!(!second.pools_grown);
        assert_eq!(second.triangles, first.triangles);
        assert_eq!(second.pool_capacity, 64);
    }

    #[test]
    fn test_rejects_empty_pool() {
        let empty = RoamSettings {
            initial_pool_size: 0,
            ..settings(1)
        };
        assert!(matches!(
            RoamMesh::new(empty, &map()),
            Err(RoamError::InvalidPoolSize(0))
        ));
    }

    #[test]
    fn test_draw_uploads_before_drawing() {
        let mut mesh = RoamMesh::new(settings(2), &map()).unwrap();
        frame(&mut mesh, center(), 1);

        let mut renderer = RecordingRenderer::new();
        assert_eq!(mesh.draw(RenderPass::Main, 1, &mut renderer), 16);

        for tile in (0..4).flat_map(|z| (0..4).map(move |x| TileCoord::new(x, z))) {
            let calls: Vec<&RenderCall> =
                renderer.calls().iter().filter(|call| call.tile() == tile).collect();
            let first_draw = calls.iter().position(|call| call.is_draw()).unwrap();
            assert!(first_draw >= 1, "{tile:?} drawn before upload");
            assert!(calls[first_draw..].iter().all(|call| call.is_draw()));
        }

        // Nothing changed, so the second draw only issues draw calls.
        renderer.clear_calls();
        mesh.draw(RenderPass::Main, 1, &mut renderer);
        assert!(renderer.calls().iter().all(RenderCall::is_draw));

        // Stale frame: nothing visible.
        renderer.clear_calls();
        assert_eq!(mesh.draw(RenderPass::Main, 2, &mut renderer), 0);
        assert!(renderer.calls().is_empty());
    }

    #[test]
    fn test_shadow_pass_keeps_its_own_trees() {
        let with_shadow = RoamSettings {
            shadow_pass: true,
            ..settings(1)
        };
        let mut mesh = RoamMesh::new(with_shadow, &map()).unwrap();
        frame(&mut mesh, center(), 1);

        let far = Vec3::new(-2000.0, 50.0, -2000.0);
        let sun = camera(CameraKind::Shadow, far);
        mesh.update_visibility(RenderPass::Shadow, &sun, &AllTiles, 1);
        let shadow = mesh.update(RenderPass::Shadow, far, 1).unwrap();
        let main = mesh.update(RenderPass::Main, center(), 1).unwrap();

        assert!(shadow.retessellated);
        assert!(shadow.triangles < main.triangles);
        assert_eq!(mesh.patches(RenderPass::Shadow).len(), 16);
    }

    #[test]
    fn test_disabled_shadow_pass_is_a_no_op() {
        let mut mesh = RoamMesh::new(settings(1), &map()).unwrap();
        let sun = camera(CameraKind::Shadow, center());

        mesh.update_visibility(RenderPass::Shadow, &sun, &AllTiles, 1);
        let stats = mesh.update(RenderPass::Shadow, center(), 1).unwrap();
        assert_eq!(stats, TessellationStats::default());
        assert!(mesh.patches(RenderPass::Shadow).is_empty());
        assert!(mesh.pools(RenderPass::Shadow).is_none());

        let mut renderer = RecordingRenderer::new();
        assert_eq!(mesh.draw(RenderPass::Shadow, 1, &mut renderer), 0);
    }
}
