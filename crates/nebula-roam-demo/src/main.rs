//! Headless ROAM terrain demo: generates an fBm height field, flies a camera
//! in a circle above it and tessellates the terrain every frame.

mod heightfield;

use clap::Parser;
use glam::{Mat4, Vec3};
use nebula_config::{CliArgs, Config};
use nebula_roam::{
    Camera, CameraKind, FrustumGridQuery, RecordingRenderer, RenderPass, RoamError, RoamMesh,
    RoamSettings, TessellationStats,
};
use tracing::{error, info};

use heightfield::{HeightFieldParams, HeightFieldSampler, carve_crater};

/// Camera altitude above the map's mean height.
const CAMERA_ALTITUDE: f32 = 150.0;

/// Direction the sun shines from, for the shadow camera.
const SUN_DIRECTION: Vec3 = Vec3::new(0.4, 1.0, 0.3);

fn player_camera(position: Vec3, target: Vec3) -> Camera {
    let proj = Mat4::perspective_rh(70f32.to_radians(), 16.0 / 9.0, 1.0, 20_000.0);
    let view = Mat4::look_at_rh(position, target, Vec3::Y);
    Camera::new(CameraKind::Player, position, proj * view)
}

/// Orthographic camera covering the whole map from the sun's direction.
fn shadow_camera(map_center: Vec3, map_extent: f32) -> Camera {
    let position = map_center + SUN_DIRECTION.normalize() * map_extent * 2.0;
    let half = map_extent;
    let proj = Mat4::orthographic_rh(-half, half, -half, half, 1.0, map_extent * 4.0);
    let view = Mat4::look_at_rh(position, map_center, Vec3::Y);
    Camera::new(CameraKind::Shadow, position, proj * view)
}

fn log_stats(pass: RenderPass, frame: u64, stats: &TessellationStats) {
    if stats.retessellated {
        info!(
            ?pass,
            frame,
            visible = stats.visible_patches,
            triangles = stats.triangles,
            border_vertices = stats.border_vertices,
            out_of_nodes = stats.out_of_nodes,
            "Terrain retessellated"
        );
    }
}

fn run(config: &Config) -> Result<(), RoamError> {
    let settings = RoamSettings::from(&config.terrain);
    let demo = &config.demo;

    let width = demo.map_patches_x * settings.patch_size;
    let height = demo.map_patches_z * settings.patch_size;
    let sampler = HeightFieldSampler::new(HeightFieldParams {
        seed: demo.seed,
        ..Default::default()
    });
    let mut map = sampler.build(width, height);
    info!(
        width,
        height,
        min = map.min_height(),
        max = map.max_height(),
        "Generated height field"
    );

    let mut mesh = RoamMesh::new(settings.clone(), &map)?;
    let mut renderer = RecordingRenderer::new();

    let world_x = width as f32 * settings.square_size;
    let world_z = height as f32 * settings.square_size;
    let map_center = Vec3::new(world_x * 0.5, map.mean_height(), world_z * 0.5);
    let orbit_radius = world_x.min(world_z) * 0.35;
    let sun = shadow_camera(map_center, world_x.max(world_z));

    let mut totals = TessellationStats::default();
    let mut retessellations = 0u64;

    for frame in 1..=demo.frames {
        let angle = frame as f32 * demo.camera_speed / orbit_radius.max(1.0);
        let offset = Vec3::new(angle.cos(), 0.0, angle.sin()) * orbit_radius;
        let position = map_center + offset + Vec3::Y * CAMERA_ALTITUDE;
        let ahead = Vec3::new(-angle.sin(), 0.0, angle.cos()) * orbit_radius;
        let camera = player_camera(position, map_center + offset + ahead);

        // Halfway through, dig a crater under the camera.
        if frame == demo.frames / 2 {
            let cx = (position.x / settings.square_size) as u32;
            let cz = (position.z / settings.square_size) as u32;
            let rect = carve_crater(&mut map, cx, cz, settings.patch_size / 2, 60.0);
            mesh.unsynced_height_map_update(&map, rect);
            info!(cx, cz, "Carved crater");
        }

        mesh.update_visibility(RenderPass::Main, &camera, &FrustumGridQuery, frame);
        let stats = mesh.update(RenderPass::Main, position, frame)?;
        log_stats(RenderPass::Main, frame, &stats);
        mesh.draw(RenderPass::Main, frame, &mut renderer);

        if settings.shadow_pass {
            mesh.update_visibility(RenderPass::Shadow, &sun, &FrustumGridQuery, frame);
            let shadow = mesh.update(RenderPass::Shadow, sun.position, frame)?;
            log_stats(RenderPass::Shadow, frame, &shadow);
            mesh.draw(RenderPass::Shadow, frame, &mut renderer);
        }

        if stats.retessellated {
            retessellations += 1;
        }
        totals.triangles = totals.triangles.max(stats.triangles);
        totals.out_of_nodes |= stats.out_of_nodes;

        if config.debug.show_pool_stats
            && let Some(pools) = mesh.pools(RenderPass::Main)
        {
            let used: usize = (0..pools.worker_count())
                .map(|worker| pools.pool(worker).used())
                .sum();
            info!(
                frame,
                used,
                capacity = pools.total_capacity(),
                workers = pools.worker_count(),
                "Node pool usage"
            );
        }
        renderer.clear_calls();
    }

    info!(
        frames = demo.frames,
        retessellations,
        peak_triangles = totals.triangles,
        ran_out_of_nodes = totals.out_of_nodes,
        uploaded_bytes = renderer.uploaded_bytes(),
        "Demo finished"
    );
    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .expect("Failed to resolve config directory")
            .join("nebula-roam")
    });

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    nebula_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&config) {
        error!("Terrain demo failed: {e}");
        std::process::exit(1);
    }
}
