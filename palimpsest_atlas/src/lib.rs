// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Palimpsest Atlas: packs logical images into shared GPU textures.
//!
//! A [`BackendPool`] owns every physical texture ("backend") and decides where
//! each logical image lives:
//!
//! - **Shared** backends pack many small images, each surrounded by padding,
//!   so that drawing from many images needs few texture binds.
//! - **Isolated** backends host exactly one image. An image is isolated when
//!   it is volatile, too large to share, or about to be drawn into: writing
//!   into a packed region could disturb its neighbours.
//!
//! Placement follows usage. Every draw into an image isolates it first
//! ([`BackendPool::ensure_isolated`]). Once per frame,
//! [`BackendPool::reconcile`] moves isolated images that have only been read
//! for long enough back onto a shared backend. The required number of
//! read-only cycles grows each time an image is re-isolated
//! ([`PromotionBackoff`]), so images whose usage alternates between target
//! and source settle instead of bouncing.
//!
//! Images are allocated lazily on first write or draw. Disposal is deferred:
//! [`BackendPool::mark_disposed`] queues the image and
//! [`BackendPool::flush_deferred`] releases the regions, destroying backends
//! that become empty, in one batch.
//!
//! Draws are issued in logical image coordinates ([`AtlasDraw`]) and
//! translated to physical texture coordinates before they reach the
//! [`GraphicsDriver`](palimpsest_driver::GraphicsDriver).
//!
//! ```rust
//! use palimpsest_atlas::{AtlasConfig, BackendPool};
//! use palimpsest_driver::PixelRect;
//! use palimpsest_driver_soft::SoftDriver;
//!
//! let mut driver = SoftDriver::default();
//! let config = AtlasConfig::default().with_min_size(64).with_max_size(256);
//! let mut pool = BackendPool::new(config, 4096);
//!
//! let a = pool.new_image(16, 16).unwrap();
//! pool.replace_pixels(&mut driver, a, PixelRect::full(16, 16), &[255; 16 * 16 * 4])
//!     .unwrap();
//! assert!(pool.is_on_atlas(a));
//!
//! pool.ensure_isolated(&mut driver, a).unwrap();
//! assert!(!pool.is_on_atlas(a));
//! ```

mod backend;
mod config;
mod error;
mod image;
mod pool;

pub use backend::BackendInfo;
pub use config::{AtlasConfig, PromotionBackoff};
pub use error::AtlasError;
pub use image::{AtlasImage, Placement};
pub use pool::{AtlasDraw, BackendPool};

/// Identifier for a logical image.
///
/// Handles are issued in increasing order and never reused.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u32);

/// Identifier for a backend within a [`BackendPool`].
///
/// Handles are issued in creation order and never reused.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(pub u32);
