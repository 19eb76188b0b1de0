// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use palimpsest_driver::{DriverError, PixelRect};

use crate::ImageId;

/// Errors reported by the [`BackendPool`](crate::BackendPool).
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum AtlasError {
    /// The image cannot fit in any backend, even at the maximum size.
    #[error("no space for a {width}x{height} image (max backend size {max_size})")]
    NoSpace {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Largest backend edge.
        max_size: u32,
    },
    /// Zero-sized images are not supported.
    #[error("invalid image size {width}x{height}")]
    InvalidSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The handle was never issued or its image has been flushed.
    #[error("unknown image {0:?}")]
    UnknownImage(ImageId),
    /// The image was marked disposed.
    #[error("image {0:?} is disposed")]
    Disposed(ImageId),
    /// A rectangle extends past the image.
    #[error("rect {rect:?} is outside image {image:?}")]
    OutOfBounds {
        /// Image addressed.
        image: ImageId,
        /// Offending rectangle.
        rect: PixelRect,
    },
    /// A pixel buffer does not match its rectangle.
    #[error("expected {expected} bytes of pixels, got {actual}")]
    PixelLength {
        /// Bytes required by the rectangle.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// An image was used as a source of a draw into itself.
    #[error("image {0:?} cannot be drawn into itself")]
    SourceIsDestination(ImageId),
    /// The driver rejected a call.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
