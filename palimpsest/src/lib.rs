// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Palimpsest: GPU images that survive their context.
//!
//! [`Images`] manages logical images on top of a [`GraphicsDriver`]:
//!
//! - **Atlasing.** Small images are packed into shared textures and moved
//!   between shared and dedicated textures as their usage changes (see
//!   [`palimpsest_atlas`]).
//! - **Recovery.** Every pixel-affecting call is recorded per image as a base
//!   snapshot plus an ordered log of writes and draws. When the driver loses
//!   its context, [`Images::restore_if_needed`] recreates every texture and
//!   replays the recorded history in dependency order.
//!
//! History is kept honest by invalidation: when an image changes, every image
//! whose history reads from it is marked *stale*. Stale images are captured
//! from the GPU into a fresh base snapshot by
//! [`Images::resolve_stale_images`], which [`Images::end_frame`] runs while
//! the context is still alive.
//!
//! All methods take `&self`; state lives behind a single mutex.
//!
//! ```rust
//! use palimpsest::{Config, DrawTriangles, Images};
//! use palimpsest_driver::{Compose, QUAD_INDICES, Region, quad_vertices};
//! use palimpsest_driver_soft::SoftDriver;
//!
//! let images = Images::new(SoftDriver::default(), Config::default());
//! let src = images.new_image(2, 2).unwrap();
//! let dst = images.new_image(2, 2).unwrap();
//! images.replace_pixels(src, &[255; 16], None).unwrap();
//!
//! let full = Region::new(0.0, 0.0, 2.0, 2.0);
//! let vertices = quad_vertices(full, full, [1.0; 4]);
//! let mut draw = DrawTriangles::new(&vertices, &QUAD_INDICES);
//! draw.sources[0] = Some(src);
//! draw.composite = Compose::Copy;
//! images.draw_triangles(dst, &draw).unwrap();
//!
//! // Simulate device loss; the next read rebuilds everything.
//! images.with_driver(|driver| driver.lose_context());
//! assert_eq!(images.pixels(dst, None).unwrap(), vec![255; 16]);
//! ```
//!
//! [`GraphicsDriver`]: palimpsest_driver::GraphicsDriver

mod config;
mod error;
mod graph;
mod image;
mod images;
mod log;
mod restore;
mod shader;

pub use config::Config;
pub use error::{Error, Result};
pub use images::{DrawTriangles, Images};
pub use palimpsest_atlas::{AtlasConfig, ImageId, PromotionBackoff};

/// Identifier for a shader registered with [`Images::new_shader`].
///
/// Handles are issued in increasing order and never reused.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);
