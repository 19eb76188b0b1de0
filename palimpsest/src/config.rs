// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use palimpsest_atlas::AtlasConfig;

/// Configuration for [`Images`](crate::Images), fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Backend pool settings.
    pub atlas: AtlasConfig,
    /// Longest history an image may record before it is marked stale.
    ///
    /// Stale images are captured into a new base snapshot at the next
    /// resolve, which bounds replay cost after a context loss.
    pub max_log_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            atlas: AtlasConfig::default(),
            max_log_len: 1024,
        }
    }
}

impl Config {
    /// Replaces the backend pool settings.
    #[must_use]
    pub fn with_atlas(mut self, atlas: AtlasConfig) -> Self {
        self.atlas = atlas;
        self
    }

    /// Sets [`max_log_len`](Self::max_log_len).
    #[must_use]
    pub fn with_max_log_len(mut self, max_log_len: usize) -> Self {
        self.max_log_len = max_log_len;
        self
    }
}
