// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use palimpsest_packing::{Rect, RegionAllocator};

#[derive(Clone)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        // Numerical Recipes LCG parameters.
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 32) as u32
    }

    fn gen_range(&mut self, lo: u32, hi_inclusive: u32) -> u32 {
        lo + self.next_u32() % (hi_inclusive - lo + 1)
    }
}

fn sizes(count: usize, max_edge: u32, seed: u64) -> Vec<(u32, u32)> {
    let mut rng = Lcg::new(seed);
    (0..count)
        .map(|_| (rng.gen_range(1, max_edge), rng.gen_range(1, max_edge)))
        .collect()
}

fn fill(allocator: &mut RegionAllocator, sizes: &[(u32, u32)]) -> Vec<Rect> {
    sizes
        .iter()
        .filter_map(|&(w, h)| allocator.allocate(w, h).ok())
        .collect()
}

fn bench_packing(c: &mut Criterion) {
    let mut group = c.benchmark_group("palimpsest_packing");
    group.sample_size(50);

    for &(page, max_edge) in &[(1024_u32, 16_u32), (1024, 64), (4096, 64)] {
        let requests = sizes(2_000, max_edge, 0xA71A_0000_0000_0001);

        group.bench_function(format!("fill(page={page},edge<={max_edge})"), |b| {
            b.iter_batched(
                || RegionAllocator::new(page, page, 1),
                |mut allocator| {
                    let placed = fill(&mut allocator, &requests);
                    black_box(placed.len());
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_function(format!("churn(page={page},edge<={max_edge})"), |b| {
            b.iter_batched(
                || {
                    let mut allocator = RegionAllocator::new(page, page, 1);
                    let placed = fill(&mut allocator, &requests);
                    (allocator, placed)
                },
                |(mut allocator, placed)| {
                    // Free every other rectangle, then pack the same requests again.
                    for rect in placed.iter().step_by(2) {
                        allocator.free(*rect);
                    }
                    let again = fill(&mut allocator, &requests);
                    black_box(again.len());
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("extend(256->4096)", |b| {
        let requests = sizes(64, 32, 0xA71A_0000_0000_0002);
        b.iter_batched(
            || {
                let mut allocator = RegionAllocator::new(256, 256, 1);
                fill(&mut allocator, &requests);
                allocator
            },
            |mut allocator| {
                let mut size = 256;
                while size < 4096 {
                    size *= 2;
                    allocator.extend(size, size);
                    fill(&mut allocator, &requests);
                }
                black_box(allocator.len());
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_packing);
criterion_main!(benches);
