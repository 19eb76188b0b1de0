// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use palimpsest_driver::PixelRect;

use crate::log::LogEntry;

/// History of one logical image.
///
/// `base` followed by `log`, replayed in order, reproduces the image unless
/// it is stale, volatile or evicted.
#[derive(Clone, Debug)]
pub(crate) struct RestorableImage {
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// Full-size snapshot; `None` is fully transparent.
    pub(crate) base: Option<Vec<u8>>,
    pub(crate) log: Vec<LogEntry>,
    pub(crate) stale: bool,
    pub(crate) volatile: bool,
    pub(crate) evicted: bool,
    /// Stale because something its history read was disposed.
    pub(crate) orphaned: bool,
    pub(crate) disposed: bool,
}

impl RestorableImage {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            base: None,
            log: Vec::new(),
            stale: false,
            volatile: false,
            evicted: false,
            orphaned: false,
            disposed: false,
        }
    }

    pub(crate) fn bounds(&self) -> PixelRect {
        PixelRect::full(self.width, self.height)
    }

    /// Whether replaying history reproduces the current pixels.
    pub(crate) fn is_restorable(&self) -> bool {
        !(self.stale || self.volatile || self.evicted)
    }

    /// Forgets all recorded history.
    pub(crate) fn clear_history(&mut self) {
        self.base = None;
        self.log.clear();
    }

    pub(crate) fn make_stale(&mut self) {
        self.clear_history();
        self.stale = true;
    }

    /// Adopts `pixels` (the whole image) as the new base snapshot.
    pub(crate) fn set_base(&mut self, pixels: Vec<u8>) {
        self.base = Some(pixels);
        self.log.clear();
        self.stale = false;
        self.evicted = false;
        self.orphaned = false;
    }

    /// Writes `pixels` into `rect` of the base snapshot.
    pub(crate) fn patch_base(&mut self, rect: PixelRect, pixels: &[u8]) {
        let width = self.width as usize;
        let len = self.bounds().byte_len();
        let base = self.base.get_or_insert_with(|| vec![0; len]);
        copy_rect(pixels, rect.width as usize, base, width, rect);
    }
}

/// Copies `rect`-sized rows from `src` (stride `src_width`) into `rect` of
/// `dst` (stride `dst_width`).
fn copy_rect(src: &[u8], src_width: usize, dst: &mut [u8], dst_width: usize, rect: PixelRect) {
    let row = rect.width as usize * 4;
    for y in 0..rect.height as usize {
        let from = y * src_width * 4;
        let to = ((rect.y as usize + y) * dst_width + rect.x as usize) * 4;
        dst[to..to + row].copy_from_slice(&src[from..from + row]);
    }
}

/// Extracts `rect` from a full `width`-wide image.
pub(crate) fn crop(full: &[u8], width: u32, rect: PixelRect) -> Vec<u8> {
    let row = rect.width as usize * 4;
    let mut out = Vec::with_capacity(rect.byte_len());
    for y in rect.y..rect.y + rect.height {
        let from = (y as usize * width as usize + rect.x as usize) * 4;
        out.extend_from_slice(&full[from..from + row]);
    }
    out
}
