// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// How the promotion delay grows each time an image is re-isolated.
///
/// Every policy is non-decreasing in the isolation count, so an image that
/// keeps bouncing between shared and isolated placement never gets promoted
/// sooner than it was the previous time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PromotionBackoff {
    /// The delay never grows.
    Constant,
    /// The delay grows by one base period per re-isolation.
    Linear,
    /// The delay doubles per re-isolation.
    #[default]
    Exponential,
}

impl PromotionBackoff {
    /// Multiplier applied to the base promotion delay after `isolations`
    /// moves from shared to isolated placement.
    pub fn factor(self, isolations: u32) -> u64 {
        match self {
            Self::Constant => 1,
            Self::Linear => u64::from(isolations) + 1,
            Self::Exponential => 1_u64 << isolations.min(31),
        }
    }
}

/// Backend pool configuration, fixed when the pool is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtlasConfig {
    /// Unused texels kept around every region of a shared backend.
    pub padding: u32,
    /// Smallest backend edge; new backends start here and double.
    pub min_size: u32,
    /// Largest backend edge, or `None` for the driver maximum.
    ///
    /// Values above the driver maximum are clamped.
    pub max_size: Option<u32>,
    /// Source-use cycles an isolated image must accumulate before its first
    /// promotion back to a shared backend.
    pub base_count_to_put_on_atlas: u32,
    /// Growth of the promotion delay per re-isolation.
    pub promotion_backoff: PromotionBackoff,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            padding: 1,
            min_size: 1024,
            max_size: None,
            base_count_to_put_on_atlas: 10,
            promotion_backoff: PromotionBackoff::default(),
        }
    }
}

impl AtlasConfig {
    /// Sets the padding.
    #[must_use]
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the minimum backend size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u32) -> Self {
        self.min_size = min_size;
        self
    }

    /// Sets the maximum backend size.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Sets the base promotion delay.
    #[must_use]
    pub fn with_base_count_to_put_on_atlas(mut self, count: u32) -> Self {
        self.base_count_to_put_on_atlas = count;
        self
    }

    /// Sets the promotion backoff policy.
    #[must_use]
    pub fn with_promotion_backoff(mut self, backoff: PromotionBackoff) -> Self {
        self.promotion_backoff = backoff;
        self
    }

    /// Source-use cycles required before promoting an image that has been
    /// re-isolated `isolations` times.
    pub fn promotion_threshold(&self, isolations: u32) -> u64 {
        u64::from(self.base_count_to_put_on_atlas)
            .saturating_mul(self.promotion_backoff.factor(isolations))
    }
}
