// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use palimpsest_driver::PixelRect;

use crate::BackendId;

/// Where an image's pixels currently live.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Hosting backend.
    pub backend: BackendId,
    /// Image rectangle within the backend texture.
    pub rect: PixelRect,
}

/// Bookkeeping for one logical image.
///
/// Placement is lazy: an image gets a backend on its first write or on its
/// first draw, as destination or source.
#[derive(Clone, Debug)]
pub struct AtlasImage {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) placement: Option<Placement>,
    pub(crate) volatile: bool,
    pub(crate) disposed: bool,
    pub(crate) used_as_source_count: u32,
    pub(crate) used_as_destination_count: u32,
    pub(crate) idle_count: u32,
    pub(crate) isolation_count: u32,
    /// Placement to request on the next allocation after backends were forgotten.
    pub(crate) prefer_isolated: bool,
}

impl AtlasImage {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            placement: None,
            volatile: false,
            disposed: false,
            used_as_source_count: 0,
            used_as_destination_count: 0,
            idle_count: 0,
            isolation_count: 0,
            prefer_isolated: false,
        }
    }

    /// Logical width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Logical height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The whole image as a rectangle.
    pub fn bounds(&self) -> PixelRect {
        PixelRect::full(self.width, self.height)
    }

    /// Current placement, if the image has been allocated.
    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    /// Whether the image is excluded from shared placement and history.
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// Whether the image awaits its deferred free.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Draws that sampled this image since the last reconciliation.
    pub fn used_as_source_count(&self) -> u32 {
        self.used_as_source_count
    }

    /// Writes into this image since the last reconciliation.
    pub fn used_as_destination_count(&self) -> u32 {
        self.used_as_destination_count
    }

    /// Reconciliation cycles in which the image was only read.
    pub fn idle_count(&self) -> u32 {
        self.idle_count
    }

    /// Times the image moved from a shared backend to an isolated one.
    pub fn isolation_count(&self) -> u32 {
        self.isolation_count
    }
}
