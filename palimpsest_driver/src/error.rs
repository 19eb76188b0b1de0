// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{PixelRect, ProgramId, TextureId};

/// Errors reported by a [`GraphicsDriver`](crate::GraphicsDriver).
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// The device context is lost; every handle is invalid.
    #[error("graphics context lost")]
    ContextLost,
    /// The texture handle is unknown or disposed.
    #[error("invalid texture {0:?}")]
    InvalidTexture(TextureId),
    /// The program handle is unknown or disposed.
    #[error("invalid program {0:?}")]
    InvalidProgram(ProgramId),
    /// Shader compilation failed.
    #[error("shader compile error: {0}")]
    Compile(String),
    /// A rectangle or pixel buffer does not match the texture.
    #[error("rect {rect:?} out of bounds for texture {texture:?}")]
    OutOfBounds {
        /// Texture addressed.
        texture: TextureId,
        /// Offending rectangle.
        rect: PixelRect,
    },
    /// The draw call is malformed.
    #[error("invalid draw: {0}")]
    InvalidDraw(&'static str),
    /// Device-specific failure.
    #[error("device error: {0}")]
    Device(String),
}
