// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Palimpsest Driver: the graphics-driver seam of the Palimpsest image manager.
//!
//! This crate defines the small, plain-old-data vocabulary that the atlas and
//! restoration layers speak to a GPU with, and the [`GraphicsDriver`] trait
//! a concrete backend implements.
//!
//! # Position in the stack
//!
//! - **Image manager** (`palimpsest`): logical images, history recording,
//!   context-loss recovery.
//! - **Atlas** (`palimpsest_atlas`): packs logical images into physical
//!   textures and translates logical draws into physical ones.
//! - **Driver (this crate)**: physical textures ([`TextureId`]), shader
//!   programs ([`ProgramId`]) and one draw primitive, [`DrawCall`].
//!
//! # Conventions
//!
//! - Pixels are tightly packed, row-major, premultiplied RGBA8.
//! - Newly created textures are fully transparent.
//! - All coordinates in a [`DrawCall`] are in texels of the *physical*
//!   texture they refer to; the driver performs any normalization its API
//!   requires.
//! - Vertices are [`VERTEX_FLOATS`] floats each:
//!   `[dst_x, dst_y, src_x, src_y, r, g, b, a]`, where the color is a
//!   component-wise scale applied to the premultiplied shaded color.
//! - After [`GraphicsDriver::is_context_lost`] reports `true`, every texture
//!   and program handle is invalid until [`GraphicsDriver::reset_context`]
//!   succeeds; old handles stay invalid afterwards.

mod draw;
mod error;

pub use draw::{
    AddressMode, ColorMatrix, DrawCall, Filter, MAX_SOURCES, PixelRect, QUAD_INDICES, Region,
    VERTEX_FLOATS, quad_vertices,
};
pub use error::DriverError;
pub use peniko::Compose;

/// Identifier for a physical texture owned by a [`GraphicsDriver`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Identifier for a compiled shader program owned by a [`GraphicsDriver`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// A graphics device, as seen by the image manager.
///
/// Implementations own every texture and program they hand out. Handles
/// remain valid until disposed or until the context is lost.
pub trait GraphicsDriver {
    /// Largest texture edge the device supports.
    fn max_texture_size(&self) -> u32;

    /// Creates a transparent `width × height` texture.
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, DriverError>;

    /// Releases a texture. Unknown handles are ignored.
    fn dispose_texture(&mut self, texture: TextureId);

    /// Overwrites `rect` of `texture` with `pixels` (`4 × rect.area()` bytes).
    fn upload_pixels(
        &mut self,
        texture: TextureId,
        rect: PixelRect,
        pixels: &[u8],
    ) -> Result<(), DriverError>;

    /// Reads back `rect` of `texture`.
    fn read_pixels(&mut self, texture: TextureId, rect: PixelRect) -> Result<Vec<u8>, DriverError>;

    /// Compiles a shader program from source.
    fn create_program(&mut self, source: &str) -> Result<ProgramId, DriverError>;

    /// Releases a program. Unknown handles are ignored.
    fn dispose_program(&mut self, program: ProgramId);

    /// Rasterizes `call.indices` as a triangle list into `call.destination`.
    fn draw_triangles(&mut self, call: &DrawCall<'_>) -> Result<(), DriverError>;

    /// Returns `true` once the device has invalidated all resources.
    fn is_context_lost(&self) -> bool;

    /// Re-establishes a usable context after loss.
    fn reset_context(&mut self) -> Result<(), DriverError>;
}

impl<D: GraphicsDriver + ?Sized> GraphicsDriver for Box<D> {
    fn max_texture_size(&self) -> u32 {
        (**self).max_texture_size()
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, DriverError> {
        (**self).create_texture(width, height)
    }

    fn dispose_texture(&mut self, texture: TextureId) {
        (**self).dispose_texture(texture);
    }

    fn upload_pixels(
        &mut self,
        texture: TextureId,
        rect: PixelRect,
        pixels: &[u8],
    ) -> Result<(), DriverError> {
        (**self).upload_pixels(texture, rect, pixels)
    }

    fn read_pixels(&mut self, texture: TextureId, rect: PixelRect) -> Result<Vec<u8>, DriverError> {
        (**self).read_pixels(texture, rect)
    }

    fn create_program(&mut self, source: &str) -> Result<ProgramId, DriverError> {
        (**self).create_program(source)
    }

    fn dispose_program(&mut self, program: ProgramId) {
        (**self).dispose_program(program);
    }

    fn draw_triangles(&mut self, call: &DrawCall<'_>) -> Result<(), DriverError> {
        (**self).draw_triangles(call)
    }

    fn is_context_lost(&self) -> bool {
        (**self).is_context_lost()
    }

    fn reset_context(&mut self) -> Result<(), DriverError> {
        (**self).reset_context()
    }
}
