// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// An axis-aligned rectangle in integer texel coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle from its origin and size.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Area in texels.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if the rectangle covers no texels.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns `true` if both rectangles share at least one texel.
    pub const fn intersects(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Returns `true` if `other` lies entirely inside `self`.
    pub const fn contains(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grows the rectangle by `amount` on every side.
    ///
    /// The origin saturates at zero.
    pub const fn outset(&self, amount: u32) -> Self {
        Self {
            x: self.x.saturating_sub(amount),
            y: self.y.saturating_sub(amount),
            width: self.width + 2 * amount,
            height: self.height + 2 * amount,
        }
    }

    /// Shrinks the rectangle by `amount` on every side.
    pub const fn inset(&self, amount: u32) -> Self {
        Self {
            x: self.x + amount,
            y: self.y + amount,
            width: self.width.saturating_sub(2 * amount),
            height: self.height.saturating_sub(2 * amount),
        }
    }

    /// Merges two rectangles that share a full edge.
    ///
    /// Returns `None` when the union is not itself a rectangle.
    pub(crate) fn merge(&self, other: &Self) -> Option<Self> {
        if self.x == other.x && self.width == other.width {
            if self.bottom() == other.y {
                return Some(Self::new(self.x, self.y, self.width, self.height + other.height));
            }
            if other.bottom() == self.y {
                return Some(Self::new(self.x, other.y, self.width, self.height + other.height));
            }
        }
        if self.y == other.y && self.height == other.height {
            if self.right() == other.x {
                return Some(Self::new(self.x, self.y, self.width + other.width, self.height));
            }
            if other.right() == self.x {
                return Some(Self::new(other.x, self.y, self.width + other.width, self.height));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::Rect;

    #[test]
    fn intersects_is_exclusive_at_edges() {
        let a = Rect::new(0, 0, 4, 4);
        assert!(!a.intersects(&Rect::new(4, 0, 4, 4)), "touching edges do not overlap");
        assert!(a.intersects(&Rect::new(3, 3, 4, 4)), "corner overlap");
        assert!(!a.intersects(&Rect::new(1, 1, 0, 2)), "empty never intersects");
    }

    #[test]
    fn merge_requires_a_full_shared_edge() {
        let a = Rect::new(0, 0, 4, 4);
        assert_eq!(a.merge(&Rect::new(4, 0, 2, 4)), Some(Rect::new(0, 0, 6, 4)));
        assert_eq!(a.merge(&Rect::new(0, 4, 4, 1)), Some(Rect::new(0, 0, 4, 5)));
        assert_eq!(Rect::new(0, 4, 4, 1).merge(&a), Some(Rect::new(0, 0, 4, 5)));
        assert_eq!(a.merge(&Rect::new(4, 0, 2, 3)), None);
    }

    #[test]
    fn inset_undoes_outset_away_from_origin() {
        let r = Rect::new(5, 6, 7, 8);
        assert_eq!(r.outset(2).inset(2), r);
    }
}
