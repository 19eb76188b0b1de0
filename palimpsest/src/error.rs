// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use palimpsest_atlas::{AtlasError, ImageId};
use palimpsest_driver::{DriverError, PixelRect};

use crate::ShaderId;

/// Errors reported by [`Images`](crate::Images).
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
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
    /// A rectangle extends past the image.
    #[error("rect {rect:?} is outside image {image:?}")]
    OutOfBounds {
        /// Image addressed.
        image: ImageId,
        /// Offending rectangle.
        rect: PixelRect,
    },
    /// Zero-sized images are not supported.
    #[error("invalid image size {width}x{height}")]
    InvalidSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// A pixel buffer does not match its rectangle.
    #[error("expected {expected} bytes of pixels, got {actual}")]
    InvalidPixelLength {
        /// Bytes required by the rectangle.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// The handle was never issued.
    #[error("unknown image {0:?}")]
    UnknownImage(ImageId),
    /// The image was marked disposed.
    #[error("image {0:?} is disposed")]
    Disposed(ImageId),
    /// The handle was never issued.
    #[error("unknown shader {0:?}")]
    UnknownShader(ShaderId),
    /// The shader was disposed.
    #[error("shader {0:?} is disposed")]
    ShaderDisposed(ShaderId),
    /// An image was used as a source of a draw into itself.
    #[error("image {0:?} cannot be drawn into itself")]
    SourceIsDestination(ImageId),
    /// Replaying an image's history hit a disposed image or shader.
    #[error("history of image {0:?} references a disposed image or shader")]
    DanglingDependency(ImageId),
    /// Recorded state could not be restored consistently.
    #[error("broken restore invariant: {0}")]
    BrokenInvariant(&'static str),
    /// The driver rejected a call.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result type used throughout this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl From<AtlasError> for Error {
    fn from(err: AtlasError) -> Self {
        match err {
            AtlasError::NoSpace {
                width,
                height,
                max_size,
            } => Self::NoSpace {
                width,
                height,
                max_size,
            },
            AtlasError::InvalidSize { width, height } => Self::InvalidSize { width, height },
            AtlasError::UnknownImage(id) => Self::UnknownImage(id),
            AtlasError::Disposed(id) => Self::Disposed(id),
            AtlasError::OutOfBounds { image, rect } => Self::OutOfBounds { image, rect },
            AtlasError::PixelLength { expected, actual } => {
                Self::InvalidPixelLength { expected, actual }
            }
            AtlasError::SourceIsDestination(id) => Self::SourceIsDestination(id),
            AtlasError::Driver(err) => Self::Driver(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use palimpsest_atlas::{AtlasError, ImageId};
    use palimpsest_driver::DriverError;

    #[test]
    fn atlas_errors_map_to_their_counterparts() {
        assert_eq!(
            Error::from(AtlasError::PixelLength {
                expected: 4,
                actual: 3
            }),
            Error::InvalidPixelLength {
                expected: 4,
                actual: 3
            }
        );
        assert_eq!(
            Error::from(AtlasError::Driver(DriverError::ContextLost)),
            Error::Driver(DriverError::ContextLost)
        );
        assert_eq!(
            Error::from(AtlasError::Disposed(ImageId(2))),
            Error::Disposed(ImageId(2))
        );
    }
}
