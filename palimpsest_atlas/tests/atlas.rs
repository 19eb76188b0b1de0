// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Placement scenarios driven through the soft driver.

use palimpsest_atlas::{AtlasConfig, AtlasDraw, AtlasError, BackendPool, ImageId, PromotionBackoff};
use palimpsest_driver::{Compose, PixelRect, QUAD_INDICES, Region, quad_vertices};
use palimpsest_driver_soft::{Event, SoftDriver};

const BASE: u32 = 10;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn setup() -> (SoftDriver, BackendPool) {
    init_tracing();
    let config = AtlasConfig::default()
        .with_min_size(64)
        .with_max_size(256)
        .with_base_count_to_put_on_atlas(BASE);
    (SoftDriver::default(), BackendPool::new(config, 4096))
}

/// Pixels whose every channel is `x + y`.
fn gradient(width: u32, height: u32) -> Vec<u8> {
    let mut pix = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pix.extend([(x + y) as u8; 4]);
        }
    }
    pix
}

/// Pixels whose every channel is the row-major texel index.
fn counting(width: u32, height: u32) -> Vec<u8> {
    (0..width * height).flat_map(|i| [i as u8; 4]).collect()
}

fn write(pool: &mut BackendPool, driver: &mut SoftDriver, id: ImageId, pixels: &[u8]) {
    let rect = pool.image(id).unwrap().bounds();
    pool.replace_pixels(driver, id, rect, pixels).unwrap();
}

fn read(pool: &mut BackendPool, driver: &mut SoftDriver, id: ImageId) -> Vec<u8> {
    let rect = pool.image(id).unwrap().bounds();
    pool.read_pixels(driver, id, rect).unwrap()
}

/// Copies `src` (`size × size`) onto `dst` at `(x, y)`.
fn copy(pool: &mut BackendPool, driver: &mut SoftDriver, dst: ImageId, src: ImageId, size: f32, at: (f32, f32)) {
    let vertices = quad_vertices(
        Region::new(at.0, at.1, size, size),
        Region::new(0.0, 0.0, size, size),
        [1.0; 4],
    );
    let mut draw = AtlasDraw::new(&vertices, &QUAD_INDICES);
    draw.sources[0] = Some(src);
    draw.composite = Compose::Copy;
    pool.draw_triangles(driver, dst, &draw).unwrap();
}

#[test]
fn drawing_isolates_the_destination_and_keeps_its_pixels() {
    let (mut driver, mut pool) = setup();
    const SIZE: u32 = 32;

    // Fill the first page so later images land away from the origin.
    let wide = pool.new_image(129, 10).unwrap();
    write(&mut pool, &mut driver, wide, &vec![0; 129 * 10 * 4]);
    let tall = pool.new_image(10, 129).unwrap();
    write(&mut pool, &mut driver, tall, &vec![0; 10 * 129 * 4]);

    let img3 = pool.new_image(SIZE / 2, SIZE / 2).unwrap();
    write(&mut pool, &mut driver, img3, &vec![0; (SIZE * SIZE) as usize]);
    let img4 = pool.new_image(SIZE, SIZE).unwrap();
    let img5 = pool.new_image(SIZE / 2, SIZE / 2).unwrap();
    write(&mut pool, &mut driver, img4, &gradient(SIZE, SIZE));
    assert!(pool.is_on_atlas(img4), "img4 starts shared");

    copy(&mut pool, &mut driver, img4, img3, 16.0, (8.0, 8.0));
    assert!(!pool.is_on_atlas(img4), "drawn-into image is isolated");

    copy(&mut pool, &mut driver, img3, img5, 16.0, (0.0, 0.0));
    assert!(!pool.is_on_atlas(img3), "img3 is isolated too");

    let pix = read(&mut pool, &mut driver, img4);
    for y in 0..SIZE {
        for x in 0..SIZE {
            let i = ((y * SIZE + x) * 4) as usize;
            let inside = (8..24).contains(&x) && (8..24).contains(&y);
            let want = if inside { [0; 4] } else { [(x + y) as u8; 4] };
            assert_eq!(pix[i..i + 4], want, "texel ({x}, {y})");
        }
    }

    // A further draw from an isolated source still works.
    copy(&mut pool, &mut driver, img4, img3, 16.0, (0.0, 0.0));
}

#[test]
fn reads_promote_with_backoff_but_writes_reset() {
    let (mut driver, mut pool) = setup();
    const SIZE: u32 = 16;
    let zeros = vec![0; (SIZE * SIZE * 4) as usize];

    let img0 = pool.new_image(SIZE, SIZE).unwrap();
    write(&mut pool, &mut driver, img0, &zeros);
    let img1 = pool.new_image(SIZE, SIZE).unwrap();
    write(&mut pool, &mut driver, img1, &zeros);
    assert!(pool.is_on_atlas(img1), "img1 starts shared");
    let img2 = pool.new_image(SIZE, SIZE).unwrap();
    write(&mut pool, &mut driver, img2, &gradient(SIZE, SIZE));
    let img3 = pool.new_image(SIZE, SIZE).unwrap();
    pool.set_volatile(&mut driver, img3, true).unwrap();
    assert!(!pool.is_on_atlas(img3), "volatile images are never shared");

    copy(&mut pool, &mut driver, img1, img2, 16.0, (0.0, 0.0));
    assert!(!pool.is_on_atlas(img1), "render target is isolated");
    assert_eq!(pool.image(img1).unwrap().isolation_count(), 1);

    // One isolation doubles the read-only cycles needed.
    for _ in 0..BASE * 2 {
        pool.reconcile(&mut driver).unwrap();
        copy(&mut pool, &mut driver, img0, img1, 16.0, (0.0, 0.0));
        assert!(!pool.is_on_atlas(img1), "not yet promoted");
    }
    pool.reconcile(&mut driver).unwrap();
    assert!(pool.is_on_atlas(img1), "promoted after enough read-only cycles");
    assert_eq!(read(&mut pool, &mut driver, img1), gradient(SIZE, SIZE));

    copy(&mut pool, &mut driver, img1, img2, 16.0, (0.0, 0.0));
    assert_eq!(pool.image(img1).unwrap().isolation_count(), 2);

    // Writes every cycle keep it isolated no matter how long.
    for _ in 0..BASE * 4 {
        pool.reconcile(&mut driver).unwrap();
        write(&mut pool, &mut driver, img1, &zeros);
        copy(&mut pool, &mut driver, img0, img1, 16.0, (0.0, 0.0));
        assert!(!pool.is_on_atlas(img1), "written this cycle");
    }
    pool.reconcile(&mut driver).unwrap();
    assert!(!pool.is_on_atlas(img1), "last cycle wrote too");

    for _ in 0..BASE * 2 {
        pool.reconcile(&mut driver).unwrap();
        copy(&mut pool, &mut driver, img0, img3, 16.0, (0.0, 0.0));
        assert!(!pool.is_on_atlas(img3), "volatile source stays isolated");
    }
}

#[test]
fn unused_cycles_do_not_count_toward_promotion() {
    let (mut driver, mut pool) = setup();
    let src = pool.new_image(16, 16).unwrap();
    let src2 = pool.new_image(16, 16).unwrap();
    let dst = pool.new_image(16, 16).unwrap();

    copy(&mut pool, &mut driver, src2, src, 16.0, (0.0, 0.0));
    assert!(!pool.is_on_atlas(src2), "render target is isolated");
    assert_eq!(
        pool.image(src2).unwrap().isolation_count(),
        0,
        "never shared, so never moved off the atlas"
    );

    for _ in 0..BASE {
        pool.reconcile(&mut driver).unwrap();
        assert!(!pool.is_on_atlas(src2), "idle cycles do not count");
    }
    for _ in 0..BASE {
        pool.reconcile(&mut driver).unwrap();
        copy(&mut pool, &mut driver, dst, src2, 16.0, (0.0, 0.0));
        assert!(!pool.is_on_atlas(src2), "still counting");
    }
    pool.reconcile(&mut driver).unwrap();
    assert!(pool.is_on_atlas(src2), "promoted after BASE source cycles");
}

#[test]
fn constant_backoff_ignores_isolation_history() {
    init_tracing();
    let config = AtlasConfig::default()
        .with_min_size(64)
        .with_max_size(256)
        .with_base_count_to_put_on_atlas(2)
        .with_promotion_backoff(PromotionBackoff::Constant);
    let mut driver = SoftDriver::default();
    let mut pool = BackendPool::new(config, 4096);
    let a = pool.new_image(8, 8).unwrap();
    let b = pool.new_image(8, 8).unwrap();
    let c = pool.new_image(8, 8).unwrap();
    write(&mut pool, &mut driver, a, &vec![3; 256]);

    for round in 1..=3 {
        copy(&mut pool, &mut driver, a, b, 8.0, (0.0, 0.0));
        assert_eq!(pool.image(a).unwrap().isolation_count(), round);
        for _ in 0..3 {
            pool.reconcile(&mut driver).unwrap();
            copy(&mut pool, &mut driver, c, a, 8.0, (0.0, 0.0));
        }
        pool.reconcile(&mut driver).unwrap();
        assert!(pool.is_on_atlas(a), "round {round} promotes after two read cycles");
    }
}

#[test]
fn extending_a_backend_preserves_existing_images() {
    let (mut driver, mut pool) = setup();
    let img0 = pool.new_image(40, 40).unwrap();
    write(&mut pool, &mut driver, img0, &counting(40, 40));
    let img1 = pool.new_image(65, 40).unwrap();
    write(&mut pool, &mut driver, img1, &counting(65, 40));

    assert_eq!(pool.backend_count(), 1, "page grew instead of adding one");
    assert_eq!(pool.backend_of(img0), pool.backend_of(img1));
    assert_eq!(read(&mut pool, &mut driver, img0), counting(40, 40));
    assert_eq!(read(&mut pool, &mut driver, img1), counting(65, 40));
}

#[test]
fn write_after_draw_replaces_drawn_pixels() {
    let (mut driver, mut pool) = setup();
    const SIZE: u32 = 64;
    let src = pool.new_image(SIZE, SIZE).unwrap();
    let dst = pool.new_image(SIZE, SIZE).unwrap();
    let pix = counting(SIZE, SIZE);
    write(&mut pool, &mut driver, src, &pix);

    copy(&mut pool, &mut driver, dst, src, 64.0, (0.0, 0.0));
    write(&mut pool, &mut driver, dst, &pix);
    assert_eq!(read(&mut pool, &mut driver, dst), pix);
}

#[test]
fn small_and_long_images_round_trip() {
    let (mut driver, mut pool) = setup();
    for (w, h) in [(4, 8), (1, 200), (200, 1)] {
        let src = pool.new_image(w, h).unwrap();
        let dst = pool.new_image(w, h).unwrap();
        write(&mut pool, &mut driver, src, &counting(w, h));

        let (fw, fh) = (w as f32, h as f32);
        let vertices = quad_vertices(
            Region::new(0.0, 0.0, fw, fh),
            Region::new(0.0, 0.0, fw, fh),
            [1.0; 4],
        );
        let mut draw = AtlasDraw::new(&vertices, &QUAD_INDICES);
        draw.sources[0] = Some(src);
        pool.draw_triangles(&mut driver, dst, &draw).unwrap();
        assert_eq!(read(&mut pool, &mut driver, dst), counting(w, h), "{w}x{h}");
    }
}

#[test]
fn disposing_a_source_mid_count_is_safe() {
    let (mut driver, mut pool) = setup();
    let src = pool.new_image(16, 16).unwrap();
    let src2 = pool.new_image(16, 16).unwrap();
    let dst = pool.new_image(16, 16).unwrap();

    copy(&mut pool, &mut driver, src, src2, 16.0, (0.0, 0.0));
    for _ in 0..BASE / 2 {
        pool.reconcile(&mut driver).unwrap();
        copy(&mut pool, &mut driver, dst, src, 16.0, (0.0, 0.0));
        assert!(!pool.is_on_atlas(src), "not yet promoted");
    }
    assert!(pool.mark_disposed(src), "first dispose");
    assert_eq!(pool.flush_deferred(&mut driver), 1);
    pool.reconcile(&mut driver).unwrap();
    assert!(pool.image(src).is_none(), "released");
}

#[test]
fn largest_shareable_image_is_placed() {
    let (mut driver, mut pool) = setup();
    let s = pool.max_size() - 2 * pool.config().padding;
    let img = pool.new_image(s, s).unwrap();
    write(&mut pool, &mut driver, img, &vec![0; (s * s * 4) as usize]);
    assert!(pool.is_on_atlas(img), "fits exactly with padding");
}

#[test]
fn oversized_images_report_no_space() {
    let (_, mut pool) = setup();
    assert_eq!(
        pool.new_image(300, 4),
        Err(AtlasError::NoSpace {
            width: 300,
            height: 4,
            max_size: 256
        })
    );
}

#[test]
fn images_larger_than_a_shared_slot_are_isolated() {
    let (mut driver, mut pool) = setup();
    let img = pool.new_image(256, 32).unwrap();
    write(&mut pool, &mut driver, img, &vec![1; 256 * 32 * 4]);
    assert!(!pool.is_on_atlas(img), "no room for padding");

    // Read-only cycles never promote it.
    let dst = pool.new_image(16, 16).unwrap();
    for _ in 0..BASE * 3 {
        pool.reconcile(&mut driver).unwrap();
        copy(&mut pool, &mut driver, dst, img, 16.0, (0.0, 0.0));
    }
    pool.reconcile(&mut driver).unwrap();
    assert!(!pool.is_on_atlas(img), "still isolated");
}

#[test]
fn isolating_before_first_write_allocates_directly() {
    let (mut driver, mut pool) = setup();
    let img = pool.new_image(16, 16).unwrap();
    pool.ensure_isolated(&mut driver, img).unwrap();
    assert!(!pool.is_on_atlas(img), "isolated");
    assert_eq!(pool.image(img).unwrap().isolation_count(), 0);
    assert_eq!(pool.backend_count(), 1);
    assert_eq!(read(&mut pool, &mut driver, img), vec![0; 16 * 16 * 4]);
}

#[test]
fn distinct_sources_use_their_own_offsets() {
    let (mut driver, mut pool) = setup();
    let a = pool.new_image(4, 4).unwrap();
    let b = pool.new_image(4, 4).unwrap();
    write(&mut pool, &mut driver, a, &vec![10; 64]);
    write(&mut pool, &mut driver, b, &vec![20; 64]);
    let pa = pool.image(a).unwrap().placement().unwrap();
    let pb = pool.image(b).unwrap().placement().unwrap();
    assert_eq!(pa.backend, pb.backend, "both shared");
    assert_ne!(pa.rect, pb.rect);

    let dst = pool.new_image(4, 4).unwrap();
    let full = Region::new(0.0, 0.0, 4.0, 4.0);
    let vertices = quad_vertices(full, full, [1.0; 4]);
    let mut draw = AtlasDraw::new(&vertices, &QUAD_INDICES);
    draw.sources = [Some(a), Some(b), None, None];
    draw.composite = Compose::Copy;
    pool.draw_triangles(&mut driver, dst, &draw).unwrap();
    assert_eq!(read(&mut pool, &mut driver, dst), vec![10; 64]);
    assert_eq!(pool.image(b).unwrap().used_as_source_count(), 1);
}

#[test]
fn pixel_rect_bounds_are_enforced_on_reads() {
    let (mut driver, mut pool) = setup();
    let img = pool.new_image(4, 4).unwrap();
    let rect = PixelRect::new(3, 0, 2, 1);
    assert_eq!(
        pool.read_pixels(&mut driver, img, rect),
        Err(AtlasError::OutOfBounds { image: img, rect })
    );
}

#[test]
fn every_draw_targets_a_single_occupant_texture() {
    let (mut driver, mut pool) = setup();
    let config = pool.config().clone().with_base_count_to_put_on_atlas(1);
    pool = BackendPool::new(config, 4096);
    let ids: Vec<ImageId> = (0..6).map(|_| pool.new_image(8, 8).unwrap()).collect();
    for (i, &id) in ids.iter().enumerate() {
        write(&mut pool, &mut driver, id, &vec![i as u8; 256]);
    }

    let mut state = 0x5EED_u32;
    for _ in 0..40 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let dst = ids[(state >> 16) as usize % ids.len()];
        let src = ids[((state >> 8) as usize + 1) % ids.len()];
        if dst == src {
            pool.reconcile(&mut driver).unwrap();
            continue;
        }
        copy(&mut pool, &mut driver, dst, src, 4.0, (2.0, 2.0));

        let Some(Event::Draw { destination, .. }) = driver.events().last().cloned() else {
            panic!("a draw was issued last");
        };
        let host = pool
            .backends()
            .find(|b| b.texture == destination)
            .expect("destination texture belongs to a backend");
        assert_eq!(host.occupants, [dst], "only the destination lives there");
        assert!(host.isolated, "destination is isolated");
    }
}
