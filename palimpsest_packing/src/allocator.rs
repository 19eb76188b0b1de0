// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::Rect;

/// Returned when a request does not fit in any free rectangle of the page.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct NoSpace {
    /// Requested width, without padding.
    pub width: u32,
    /// Requested height, without padding.
    pub height: u32,
}

impl fmt::Debug for NoSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoSpace {{ width: {}, height: {} }}", self.width, self.height)
    }
}

impl fmt::Display for NoSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no free region large enough for {}x{}",
            self.width, self.height
        )
    }
}

impl core::error::Error for NoSpace {}

/// Guillotine allocator for one padded atlas page.
///
/// Rectangles returned by [`allocate`](Self::allocate) are *image* rectangles:
/// the allocator internally reserves `padding` extra texels on every side.
#[derive(Clone, Debug)]
pub struct RegionAllocator {
    width: u32,
    height: u32,
    padding: u32,
    free: Vec<Rect>,
    allocated: Vec<Rect>,
}

impl RegionAllocator {
    /// Creates an empty page of the given size.
    pub fn new(width: u32, height: u32, padding: u32) -> Self {
        Self {
            width,
            height,
            padding,
            free: vec![Rect::new(0, 0, width, height)],
            allocated: Vec::new(),
        }
    }

    /// Page size as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Padding reserved around each allocation.
    pub fn padding(&self) -> u32 {
        self.padding
    }

    /// Returns `true` if nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    /// Live image rectangles, in allocation order.
    pub fn allocated(&self) -> impl Iterator<Item = Rect> + '_ {
        self.allocated.iter().copied()
    }

    /// Current free rectangles (padded space), in insertion order.
    pub fn free_rects(&self) -> &[Rect] {
        &self.free
    }

    /// Returns `true` if a `width × height` image could ever fit on a page of
    /// `page_width × page_height` with this allocator's padding.
    pub fn fits_page(&self, width: u32, height: u32, page_width: u32, page_height: u32) -> bool {
        padded(width, self.padding) <= page_width && padded(height, self.padding) <= page_height
    }

    /// Reserves a `width × height` image rectangle.
    ///
    /// Zero-sized requests are treated as one texel.
    pub fn allocate(&mut self, width: u32, height: u32) -> Result<Rect, NoSpace> {
        let pw = padded(width.max(1), self.padding);
        let ph = padded(height.max(1), self.padding);

        let mut best: Option<(usize, (u64, u32))> = None;
        for (index, free) in self.free.iter().enumerate() {
            if free.width < pw || free.height < ph {
                continue;
            }
            let leftover_short = (free.width - pw).min(free.height - ph);
            let score = (free.area(), leftover_short);
            // Strict comparison keeps the earliest rectangle on ties.
            if best.is_none_or(|(_, b)| score < b) {
                best = Some((index, score));
            }
        }
        let Some((index, _)) = best else {
            return Err(NoSpace { width, height });
        };

        let chosen = self.free.remove(index);
        let leftover_w = chosen.width - pw;
        let leftover_h = chosen.height - ph;
        let (right, bottom) = if leftover_w < leftover_h {
            (
                Rect::new(chosen.x + pw, chosen.y, leftover_w, ph),
                Rect::new(chosen.x, chosen.y + ph, chosen.width, leftover_h),
            )
        } else {
            (
                Rect::new(chosen.x + pw, chosen.y, leftover_w, chosen.height),
                Rect::new(chosen.x, chosen.y + ph, pw, leftover_h),
            )
        };
        for rest in [right, bottom] {
            if !rest.is_empty() {
                self.free.push(rest);
            }
        }

        let image = Rect::new(
            chosen.x + self.padding,
            chosen.y + self.padding,
            width.max(1),
            height.max(1),
        );
        self.allocated.push(image);
        Ok(image)
    }

    /// Releases a rectangle previously returned by [`allocate`](Self::allocate).
    ///
    /// Returns `false` if `image` is not a live allocation.
    pub fn free(&mut self, image: Rect) -> bool {
        let Some(index) = self.allocated.iter().position(|r| *r == image) else {
            return false;
        };
        self.allocated.remove(index);
        if self.allocated.is_empty() {
            self.free.clear();
            self.free.push(Rect::new(0, 0, self.width, self.height));
            return true;
        }
        self.free.push(image.outset(self.padding));
        self.coalesce();
        true
    }

    /// Returns `true` if the page may grow to `width × height`.
    pub fn can_extend_to(&self, width: u32, height: u32) -> bool {
        width >= self.width && height >= self.height
    }

    /// Grows the page to `width × height`, keeping every live allocation.
    ///
    /// Shrinking requests are ignored.
    pub fn extend(&mut self, width: u32, height: u32) {
        if !self.can_extend_to(width, height) || (width, height) == (self.width, self.height) {
            return;
        }
        let right = Rect::new(self.width, 0, width - self.width, self.height);
        let bottom = Rect::new(0, self.height, width, height - self.height);
        self.width = width;
        self.height = height;
        for strip in [right, bottom] {
            if !strip.is_empty() {
                self.free.push(strip);
            }
        }
        self.coalesce();
    }

    fn coalesce(&mut self) {
        'restart: loop {
            for i in 0..self.free.len() {
                for j in (i + 1)..self.free.len() {
                    if let Some(merged) = self.free[i].merge(&self.free[j]) {
                        self.free[i] = merged;
                        self.free.remove(j);
                        continue 'restart;
                    }
                }
            }
            break;
        }
    }
}

fn padded(size: u32, padding: u32) -> u32 {
    size.saturating_add(padding.saturating_mul(2))
}
