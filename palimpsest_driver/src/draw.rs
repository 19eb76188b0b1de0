// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use peniko::Compose;

use crate::{ProgramId, TextureId};

/// Maximum number of source textures a single draw may sample.
pub const MAX_SOURCES: usize = 4;

/// Floats per vertex: `[dst_x, dst_y, src_x, src_y, r, g, b, a]`.
pub const VERTEX_FLOATS: usize = 8;

/// Indices for the four vertices produced by [`quad_vertices`].
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 1, 2, 3];

/// An integer rectangle in texels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

impl PixelRect {
    /// Creates a rectangle from its origin and size.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle covering a whole `width × height` surface.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Number of bytes of RGBA8 data covering this rectangle.
    pub const fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Returns `true` if the rectangle lies within a `width × height` surface.
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }

    /// Returns `true` if the rectangle covers the whole `width × height` surface.
    pub const fn covers(&self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == width && self.height == height
    }

    /// Shifts the rectangle by a texel offset.
    pub const fn translate(&self, dx: u32, dy: u32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// A floating-point rectangle in texels, used to bound shading and sampling.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Region {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Region {
    /// Creates a region from its origin and size.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Shifts the region by an offset.
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Returns `true` if `(x, y)` lies inside the half-open region.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

impl From<PixelRect> for Region {
    fn from(rect: PixelRect) -> Self {
        Self::new(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
        )
    }
}

/// Texture sampling filter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Nearest texel.
    #[default]
    Nearest,
    /// Bilinear interpolation between the four nearest texels.
    Linear,
}

/// How samples outside the source region are resolved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// No region enforcement; samples may read neighbouring texels.
    #[default]
    Unsafe,
    /// Samples outside the source region are transparent.
    ClampToZero,
    /// Sample positions wrap around within the source region.
    Repeat,
}

/// An affine color transform applied to straight-alpha RGBA.
///
/// `out[i] = Σ body[i * 4 + j] · in[j] + translation[i]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColorMatrix {
    /// Row-major 4×4 matrix.
    pub body: [f32; 16],
    /// Per-channel offset.
    pub translation: [f32; 4],
}

impl ColorMatrix {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        body: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
        translation: [0.0; 4],
    };

    /// A per-channel scale.
    pub const fn scale(r: f32, g: f32, b: f32, a: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.body[0] = r;
        m.body[5] = g;
        m.body[10] = b;
        m.body[15] = a;
        m
    }

    /// Returns `true` if this is exactly the identity.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Applies the transform to a straight-alpha color.
    pub fn apply(&self, color: [f32; 4]) -> [f32; 4] {
        let mut out = self.translation;
        for (i, o) in out.iter_mut().enumerate() {
            for (j, c) in color.iter().enumerate() {
                *o += self.body[i * 4 + j] * c;
            }
        }
        out
    }
}

impl Default for ColorMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One physical draw: a triangle list rendered into `destination`.
#[derive(Clone, Debug)]
pub struct DrawCall<'a> {
    /// Texture rendered into.
    pub destination: TextureId,
    /// Sampled textures; slot 0 drives the vertex source coordinates.
    pub sources: [Option<TextureId>; MAX_SOURCES],
    /// Offset added to slot 0's source coordinate to sample slots `1..`.
    pub source_offsets: [[f32; 2]; MAX_SOURCES - 1],
    /// Interleaved vertices, [`VERTEX_FLOATS`] floats each.
    pub vertices: &'a [f32],
    /// Triangle-list indices into `vertices`.
    pub indices: &'a [u16],
    /// Color transform for the built-in shading; ignored by programs.
    pub color_matrix: ColorMatrix,
    /// Porter-Duff operator combining the shaded color with the destination.
    pub composite: Compose,
    /// Sampling filter.
    pub filter: Filter,
    /// Sampling behaviour outside `src_region`.
    pub address: AddressMode,
    /// Destination texels outside this region are left untouched.
    pub dst_region: Region,
    /// Region of source slot 0 that `address` is relative to.
    pub src_region: Region,
    /// Custom program, or `None` for the built-in textured shading.
    pub program: Option<ProgramId>,
    /// Program uniforms.
    pub uniforms: &'a [f32],
}

/// Builds the four vertices of an axis-aligned quad.
///
/// The result pairs with [`QUAD_INDICES`].
pub fn quad_vertices(dst: Region, src: Region, color: [f32; 4]) -> [f32; 4 * VERTEX_FLOATS] {
    let [r, g, b, a] = color;
    let (dx0, dy0, dx1, dy1) = (dst.x, dst.y, dst.x + dst.width, dst.y + dst.height);
    let (sx0, sy0, sx1, sy1) = (src.x, src.y, src.x + src.width, src.y + src.height);
    [
        dx0, dy0, sx0, sy0, r, g, b, a, //
        dx1, dy0, sx1, sy0, r, g, b, a, //
        dx0, dy1, sx0, sy1, r, g, b, a, //
        dx1, dy1, sx1, sy1, r, g, b, a,
    ]
}
