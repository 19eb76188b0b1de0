// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Palimpsest Packing: a padded region allocator for atlas pages.
//!
//! A [`RegionAllocator`] manages the free space of one rectangular page
//! (typically a GPU texture) and hands out non-overlapping sub-rectangles.
//! Every reservation is surrounded by `padding` texels that no other
//! reservation may touch, so that linear sampling at the edge of one region
//! never bleeds into its neighbours.
//!
//! The allocator is a guillotine packer:
//!
//! - **Allocation** picks the free rectangle with the smallest area that fits
//!   the padded request (ties: smaller leftover short side, then insertion
//!   order), and splits the remainder along the shorter leftover axis.
//! - **Freeing** returns the padded rectangle to the free list and merges free
//!   rectangles that share a full edge until no merge applies.
//! - **Extension** grows the page to the right and bottom without moving any
//!   existing reservation.
//!
//! Placement is deterministic: the same sequence of calls always produces the
//! same layout. There is no compaction.
//!
//! ```rust
//! use palimpsest_packing::{Rect, RegionAllocator};
//!
//! let mut page = RegionAllocator::new(64, 64, 1);
//! let a = page.allocate(10, 10).unwrap();
//! assert_eq!(a, Rect::new(1, 1, 10, 10));
//!
//! let b = page.allocate(10, 10).unwrap();
//! assert!(!a.outset(1).intersects(&b.outset(1)));
//!
//! assert!(page.free(a));
//! assert!(page.free(b));
//! assert!(page.is_empty());
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod allocator;
mod rect;

pub use allocator::{NoSpace, RegionAllocator};
pub use rect::Rect;
