use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::Vec3;
use nebula_roam::*;

const MAP_SIZE: u32 = 512;

fn rolling_hills(x: u32, z: u32) -> f32 {
    let (fx, fz) = (x as f32 * 0.05, z as f32 * 0.07);
    fx.sin() * 40.0 + fz.cos() * 25.0 + (fx * 3.1 + fz * 1.7).sin() * 6.0
}

fn settings(workers: usize) -> RoamSettings {
    RoamSettings {
        worker_threads: workers,
        shadow_pass: false,
        ..Default::default()
    }
}

fn bench_patch_variance(c: &mut Criterion) {
    let mut patch = Patch::new(TileCoord::new(0, 0), 128, 12, 8.0, &rolling_hills);
    c.bench_function("patch_compute_variance", |bencher| {
        bencher.iter(|| {
            patch.compute_variance();
            black_box(patch.variance(NodeId::BASE_LEFT).get(1))
        })
    });
}

fn bench_patch_tessellate(c: &mut Criterion) {
    let mut patch = Patch::new(TileCoord::new(0, 0), 128, 12, 8.0, &rolling_hills);
    let mut pool = NodePool::with_capacity(NEW_POOL_SIZE).unwrap();
    let lod = LodParams {
        camera_position: patch.center(60.0),
        view_radius: 300.0,
        mean_height: 0.0,
    };
    c.bench_function("patch_tessellate", |bencher| {
        bencher.iter(|| {
            patch.reset();
            pool.reset();
            patch.tessellate(&mut pool, &lod);
            patch.generate_indices(&pool);
            patch.generate_border_vertices(&pool);
            black_box(patch.triangle_count())
        })
    });
}

fn bench_mesh_update(c: &mut Criterion) {
    let map = HeightMap::from_fn(MAP_SIZE, MAP_SIZE, rolling_hills);
    let position = Vec3::new(2048.0, 120.0, 2048.0);

    for workers in [1, 4] {
        let mut mesh = RoamMesh::new(settings(workers), &map).unwrap();
        let mut frame = 0;
        c.bench_function(&format!("mesh_update_{workers}_workers"), |bencher| {
            bencher.iter(|| {
                frame += 1;
                // Moving the view radius forces a full retessellation.
                mesh.set_view_radius(300.0 + (frame % 2) as f32);
                let camera = Camera::new(CameraKind::Player, position, glam::Mat4::IDENTITY);
                mesh.update_visibility(RenderPass::Main, &camera, &AllTiles, frame);
                black_box(mesh.update(RenderPass::Main, position, frame).unwrap())
            })
        });
    }
}

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

criterion_group!(
    benches,
    bench_patch_variance,
    bench_patch_tessellate,
    bench_mesh_update
);
criterion_main!(benches);
