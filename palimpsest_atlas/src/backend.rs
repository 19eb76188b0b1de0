// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use hashbrown::HashMap;
use palimpsest_driver::{PixelRect, TextureId};
use palimpsest_packing::{Rect, RegionAllocator};

use crate::{BackendId, ImageId};

/// One physical texture and the images packed into it.
#[derive(Debug)]
pub(crate) struct Backend {
    pub(crate) id: BackendId,
    pub(crate) texture: TextureId,
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// `None` for isolated backends, which host exactly one image at the origin.
    pub(crate) allocator: Option<RegionAllocator>,
    pub(crate) occupants: HashMap<ImageId, PixelRect>,
}

/// Snapshot of a backend for inspection and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendInfo {
    /// Backend handle.
    pub id: BackendId,
    /// Physical texture.
    pub texture: TextureId,
    /// Texture width.
    pub width: u32,
    /// Texture height.
    pub height: u32,
    /// Whether the backend is dedicated to a single image.
    pub isolated: bool,
    /// Images hosted, sorted by handle.
    pub occupants: Vec<ImageId>,
}

impl Backend {
    pub(crate) fn shared(
        id: BackendId,
        texture: TextureId,
        width: u32,
        height: u32,
        padding: u32,
    ) -> Self {
        Self {
            id,
            texture,
            width,
            height,
            allocator: Some(RegionAllocator::new(width, height, padding)),
            occupants: HashMap::new(),
        }
    }

    pub(crate) fn isolated(
        id: BackendId,
        texture: TextureId,
        width: u32,
        height: u32,
        image: ImageId,
        rect: PixelRect,
    ) -> Self {
        let mut occupants = HashMap::new();
        occupants.insert(image, rect);
        Self {
            id,
            texture,
            width,
            height,
            allocator: None,
            occupants,
        }
    }

    pub(crate) fn is_isolated(&self) -> bool {
        self.allocator.is_none()
    }

    pub(crate) fn info(&self) -> BackendInfo {
        let mut occupants: Vec<ImageId> = self.occupants.keys().copied().collect();
        occupants.sort_unstable();
        BackendInfo {
            id: self.id,
            texture: self.texture,
            width: self.width,
            height: self.height,
            isolated: self.is_isolated(),
            occupants,
        }
    }

    /// Releases `image`'s region. Returns `true` when the backend is now empty.
    pub(crate) fn release(&mut self, image: ImageId) -> bool {
        if let Some(rect) = self.occupants.remove(&image) {
            if let Some(allocator) = &mut self.allocator {
                allocator.free(to_packing(rect));
            }
        }
        self.occupants.is_empty()
    }
}

pub(crate) fn to_packing(rect: PixelRect) -> Rect {
    Rect::new(rect.x, rect.y, rect.width, rect.height)
}

pub(crate) fn from_packing(rect: Rect) -> PixelRect {
    PixelRect::new(rect.x, rect.y, rect.width, rect.height)
}
