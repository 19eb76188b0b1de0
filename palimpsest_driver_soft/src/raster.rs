// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Triangle rasterization, sampling and compositing.

use kurbo::Point;
use palimpsest_driver::{
    AddressMode, Compose, DrawCall, DriverError, Filter, MAX_SOURCES, PixelRect, Region,
    VERTEX_FLOATS,
};

use crate::program::Program;

/// Premultiplied RGBA8 texture storage.
#[derive(Clone, Debug)]
pub(crate) struct Texture {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) data: Vec<u8>,
}

impl Texture {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; PixelRect::full(width, height).byte_len()],
        }
    }

    fn texel(&self, x: i64, y: i64) -> [u8; 4] {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return [0; 4];
        }
        let i = to_index(y, self.width, x);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub(crate) fn read(&self, rect: PixelRect) -> Vec<u8> {
        let mut out = Vec::with_capacity(rect.byte_len());
        let row = rect.width as usize * 4;
        for y in rect.y..rect.y + rect.height {
            let start = (y as usize * self.width as usize + rect.x as usize) * 4;
            out.extend_from_slice(&self.data[start..start + row]);
        }
        out
    }

    pub(crate) fn write(&mut self, rect: PixelRect, pixels: &[u8]) {
        let row = rect.width as usize * 4;
        for (dy, src) in pixels.chunks_exact(row.max(1)).enumerate() {
            let y = rect.y as usize + dy;
            let start = (y * self.width as usize + rect.x as usize) * 4;
            self.data[start..start + row].copy_from_slice(src);
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "callers bounds-check coordinates against the texture size"
)]
fn to_index(y: i64, width: u32, x: i64) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "value is clamped to [0, 255] before casting"
)]
fn unit_to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn u8_to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "sample positions are bounded by texture sizes"
)]
fn floor_i64(v: f32) -> i64 {
    v.floor() as i64
}

/// Integer bounds of a sampling region.
#[derive(Copy, Clone, Debug)]
struct TexelRegion {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

impl TexelRegion {
    fn from_region(r: Region) -> Self {
        let x = floor_i64(r.x);
        let y = floor_i64(r.y);
        Self {
            x,
            y,
            width: (floor_i64((r.x + r.width).ceil()) - x).max(1),
            height: (floor_i64((r.y + r.height).ceil()) - y).max(1),
        }
    }

    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    fn wrap(&self, x: i64, y: i64) -> (i64, i64) {
        (
            self.x + (x - self.x).rem_euclid(self.width),
            self.y + (y - self.y).rem_euclid(self.height),
        )
    }
}

struct Sampler<'a> {
    texture: &'a Texture,
    filter: Filter,
    address: AddressMode,
    region: TexelRegion,
}

impl Sampler<'_> {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let (x, y) = match self.address {
            AddressMode::Unsafe => (x, y),
            AddressMode::ClampToZero => {
                if !self.region.contains(x, y) {
                    return [0.0; 4];
                }
                (x, y)
            }
            AddressMode::Repeat => self.region.wrap(x, y),
        };
        self.texture.texel(x, y).map(u8_to_unit)
    }

    fn sample(&self, x: f32, y: f32) -> [f32; 4] {
        match self.filter {
            Filter::Nearest => self.texel(floor_i64(x), floor_i64(y)),
            Filter::Linear => {
                let fx = x - 0.5;
                let fy = y - 0.5;
                let x0 = floor_i64(fx);
                let y0 = floor_i64(fy);
                let tx = fx - fx.floor();
                let ty = fy - fy.floor();
                let c00 = self.texel(x0, y0);
                let c10 = self.texel(x0 + 1, y0);
                let c01 = self.texel(x0, y0 + 1);
                let c11 = self.texel(x0 + 1, y0 + 1);
                let mut out = [0.0; 4];
                for (i, o) in out.iter_mut().enumerate() {
                    let top = c00[i] + (c10[i] - c00[i]) * tx;
                    let bottom = c01[i] + (c11[i] - c01[i]) * tx;
                    *o = top + (bottom - top) * ty;
                }
                out
            }
        }
    }
}

/// Porter-Duff on premultiplied RGBA8: `out = src·Fa + dst·Fb`.
pub(crate) fn composite(op: Compose, src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = u16::from(src[3]);
    let da = u16::from(dst[3]);
    let (fa, fb) = match op {
        Compose::Clear => (0, 0),
        Compose::Copy => (255, 0),
        Compose::Dest => (0, 255),
        Compose::SrcOver => (255, 255 - sa),
        Compose::DestOver => (255 - da, 255),
        Compose::SrcIn => (da, 0),
        Compose::DestIn => (0, sa),
        Compose::SrcOut => (255 - da, 0),
        Compose::DestOut => (0, 255 - sa),
        Compose::SrcAtop => (da, 255 - sa),
        Compose::DestAtop => (255 - da, sa),
        Compose::Xor => (255 - da, 255 - sa),
        Compose::Plus => (255, 255),
        #[allow(
            unreachable_patterns,
            reason = "peniko may add compose modes; fall back to source-over"
        )]
        _ => (255, 255 - sa),
    };
    let mut out = [0_u8; 4];
    for i in 0..4 {
        out[i] = mul_div255(u16::from(src[i]), fa).saturating_add(mul_div255(u16::from(dst[i]), fb));
    }
    out
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "product of two values <= 255 divided by 255 fits in u8"
)]
fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn edge(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn vertex(vertices: &[f32], index: u16) -> Result<&[f32], DriverError> {
    let start = usize::from(index) * VERTEX_FLOATS;
    vertices
        .get(start..start + VERTEX_FLOATS)
        .ok_or(DriverError::InvalidDraw("vertex index out of range"))
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "barycentric weights are in [0, 1]"
)]
fn weight(w: f64, area: f64) -> f32 {
    (w / area) as f32
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "bounds are clamped to the destination texture first"
)]
fn span(lo: f64, hi: f64, limit: u32) -> core::ops::Range<u32> {
    let limit = f64::from(limit);
    let lo = lo.floor().clamp(0.0, limit) as u32;
    let hi = hi.ceil().clamp(0.0, limit) as u32;
    lo..hi
}

/// Rasterizes `call` into `dst`.
///
/// Each destination texel is shaded at most once per call: texels whose
/// centers lie on an edge shared by two triangles belong to the first.
pub(crate) fn draw(
    dst: &mut Texture,
    call: &DrawCall<'_>,
    sources: [Option<&Texture>; MAX_SOURCES],
    program: Option<&Program>,
) -> Result<(), DriverError> {
    if call.vertices.len() % VERTEX_FLOATS != 0 {
        return Err(DriverError::InvalidDraw("vertex buffer is not a whole number of vertices"));
    }
    if call.indices.len() % 3 != 0 {
        return Err(DriverError::InvalidDraw("index buffer is not a triangle list"));
    }

    let samplers: [Option<Sampler<'_>>; MAX_SOURCES] = core::array::from_fn(|i| {
        sources[i].map(|texture| {
            let region = if i == 0 {
                call.src_region
            } else {
                let [ox, oy] = call.source_offsets[i - 1];
                call.src_region.translate(ox, oy)
            };
            Sampler {
                texture,
                filter: call.filter,
                address: call.address,
                region: TexelRegion::from_region(region),
            }
        })
    });

    let dst_bounds = kurbo::Rect::new(
        f64::from(call.dst_region.x),
        f64::from(call.dst_region.y),
        f64::from(call.dst_region.x + call.dst_region.width),
        f64::from(call.dst_region.y + call.dst_region.height),
    );
    let mut covered = vec![false; dst.width as usize * dst.height as usize];

    for tri in call.indices.chunks_exact(3) {
        let v = [
            vertex(call.vertices, tri[0])?,
            vertex(call.vertices, tri[1])?,
            vertex(call.vertices, tri[2])?,
        ];
        let p = v.map(|v| Point::new(f64::from(v[0]), f64::from(v[1])));
        let mut area = edge(p[0], p[1], p[2]);
        if area == 0.0 {
            continue;
        }
        let sign = area.signum();
        area *= sign;

        let bbox = kurbo::Rect::from_points(p[0], p[1])
            .union_pt(p[2])
            .intersect(dst_bounds);
        if bbox.is_zero_area() {
            continue;
        }

        for y in span(bbox.y0, bbox.y1, dst.height) {
            for x in span(bbox.x0, bbox.x1, dst.width) {
                let c = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                let w0 = edge(p[1], p[2], c) * sign;
                let w1 = edge(p[2], p[0], c) * sign;
                let w2 = edge(p[0], p[1], c) * sign;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                if !dst_bounds.contains(c) {
                    continue;
                }
                let slot = y as usize * dst.width as usize + x as usize;
                if covered[slot] {
                    continue;
                }
                covered[slot] = true;

                let b = [weight(w0, area), weight(w1, area), weight(w2, area)];
                let lerp = |k: usize| b[0] * v[0][k] + b[1] * v[1][k] + b[2] * v[2][k];
                let (sx, sy) = (lerp(2), lerp(3));
                let scale = [lerp(4), lerp(5), lerp(6), lerp(7)];

                let sample = |slot: usize| -> [f32; 4] {
                    let Some(sampler) = &samplers[slot] else {
                        return [0.0; 4];
                    };
                    let (ox, oy) = if slot == 0 {
                        (0.0, 0.0)
                    } else {
                        let [ox, oy] = call.source_offsets[slot - 1];
                        (ox, oy)
                    };
                    sampler.sample(sx + ox, sy + oy)
                };

                let shaded = match program {
                    Some(program) => program.shade(call.uniforms, sample),
                    None => builtin_shade(call, samplers[0].is_some(), sample),
                };
                let mut src = [0_u8; 4];
                for i in 0..4 {
                    src[i] = unit_to_u8(shaded[i] * scale[i]);
                }

                let idx = slot * 4;
                let current = [
                    dst.data[idx],
                    dst.data[idx + 1],
                    dst.data[idx + 2],
                    dst.data[idx + 3],
                ];
                dst.data[idx..idx + 4].copy_from_slice(&composite(call.composite, src, current));
            }
        }
    }
    Ok(())
}

fn builtin_shade(
    call: &DrawCall<'_>,
    has_source: bool,
    sample: impl Fn(usize) -> [f32; 4],
) -> [f32; 4] {
    if !has_source {
        return [1.0; 4];
    }
    let color = sample(0);
    if call.color_matrix.is_identity() {
        return color;
    }
    let a = color[3];
    let straight = if a > 0.0 {
        [color[0] / a, color[1] / a, color[2] / a, a]
    } else {
        [0.0; 4]
    };
    let m = call.color_matrix.apply(straight).map(|c| c.clamp(0.0, 1.0));
    [m[0] * m[3], m[1] * m[3], m[2] * m[3], m[3]]
}
