// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use palimpsest::{Config, DrawTriangles, Images};
use palimpsest_atlas::{AtlasConfig, AtlasDraw, BackendPool, ImageId};
use palimpsest_driver::{QUAD_INDICES, Region, quad_vertices};
use palimpsest_driver_soft::SoftDriver;

fn quad(width: u32, height: u32) -> [f32; 4 * palimpsest_driver::VERTEX_FLOATS] {
    let full = Region::new(0.0, 0.0, width as f32, height as f32);
    quad_vertices(full, full, [1.0; 4])
}

fn populated_pool(count: u32, edge: u32) -> (BackendPool, SoftDriver, Vec<ImageId>) {
    let mut driver = SoftDriver::default();
    let mut pool = BackendPool::new(AtlasConfig::default(), 4096);
    let pixels = vec![0x80; (edge * edge * 4) as usize];
    let rect = palimpsest_driver::PixelRect::full(edge, edge);
    let ids = (0..count)
        .map(|_| {
            let id = pool.new_image(edge, edge).expect("fits");
            pool.replace_pixels(&mut driver, id, rect, &pixels)
                .expect("upload");
            id
        })
        .collect();
    (pool, driver, ids)
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("palimpsest_atlas");
    group.sample_size(20);

    for &count in &[64_u32, 512] {
        group.bench_function(format!("place(n={count},edge=16)"), |b| {
            b.iter(|| {
                let (pool, _, _) = populated_pool(count, 16);
                black_box(pool.backend_count());
            });
        });

        // Draw into every image, then read them for enough frames that all
        // of them return to shared backends.
        group.bench_function(format!("isolate_and_promote(n={count},edge=16)"), |b| {
            b.iter_batched(
                || populated_pool(count, 16),
                |(mut pool, mut driver, ids)| {
                    let vertices = quad(16, 16);
                    let scratch = pool.new_image(16, 16).expect("fits");
                    for &id in &ids {
                        let draw = AtlasDraw::new(&vertices, &QUAD_INDICES);
                        pool.draw_triangles(&mut driver, id, &draw).expect("draw");
                    }
                    for _ in 0..=20 {
                        pool.reconcile(&mut driver).expect("reconcile");
                        for &id in &ids {
                            let mut draw = AtlasDraw::new(&vertices, &QUAD_INDICES);
                            draw.sources[0] = Some(id);
                            pool.draw_triangles(&mut driver, scratch, &draw)
                                .expect("draw");
                        }
                    }
                    pool.reconcile(&mut driver).expect("reconcile");
                    black_box(pool.backend_count());
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("palimpsest");
    group.sample_size(20);

    for &len in &[16_usize, 128] {
        group.bench_function(format!("restore_chain(len={len},edge=32)"), |b| {
            b.iter_batched(
                || {
                    let images = Images::new(SoftDriver::default(), Config::default());
                    let vertices = quad(32, 32);
                    let first = images.new_image(32, 32).expect("fits");
                    images
                        .replace_pixels(first, &vec![0xff; 32 * 32 * 4], None)
                        .expect("upload");
                    let mut prev = first;
                    for _ in 1..len {
                        let next = images.new_image(32, 32).expect("fits");
                        let mut draw = DrawTriangles::new(&vertices, &QUAD_INDICES);
                        draw.sources[0] = Some(prev);
                        images.draw_triangles(next, &draw).expect("draw");
                        prev = next;
                    }
                    images.with_driver(SoftDriver::lose_context);
                    images
                },
                |images| {
                    black_box(images.restore_if_needed().expect("restore"));
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pool, bench_restore);
criterion_main!(benches);
