//! Cache configuration.
//!
//! TTLs per data family and the debounce window for event-driven refreshes.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAP_DATA_TTL_SECS: u64 = 5 * 60;
const DEFAULT_CHECKPOINTS_TTL_SECS: u64 = 10 * 60;
const DEFAULT_BLOG_LIST_TTL_SECS: u64 = 5 * 60;
const DEFAULT_BLOG_POST_TTL_SECS: u64 = 30 * 60;
const DEFAULT_BLOG_STATS_TTL_SECS: u64 = 60 * 60;
const DEFAULT_ADMIN_USERS_TTL_SECS: u64 = 2 * 60;
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Cache configuration, usually built from the `[cache]` settings section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for a user's map data.
    pub map_data_ttl_seconds: u64,
    /// TTL for a trip's checkpoints.
    pub checkpoints_ttl_seconds: u64,
    /// TTL for a page of blog listings.
    pub blog_list_ttl_seconds: u64,
    /// TTL for a single blog post.
    pub blog_post_ttl_seconds: u64,
    /// TTL for blog statistics.
    pub blog_stats_ttl_seconds: u64,
    /// TTL for the admin user list.
    pub admin_users_ttl_seconds: u64,
    /// Quiet period before a burst of invalidation events triggers a refresh.
    pub debounce_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            map_data_ttl_seconds: DEFAULT_MAP_DATA_TTL_SECS,
            checkpoints_ttl_seconds: DEFAULT_CHECKPOINTS_TTL_SECS,
            blog_list_ttl_seconds: DEFAULT_BLOG_LIST_TTL_SECS,
            blog_post_ttl_seconds: DEFAULT_BLOG_POST_TTL_SECS,
            blog_stats_ttl_seconds: DEFAULT_BLOG_STATS_TTL_SECS,
            admin_users_ttl_seconds: DEFAULT_ADMIN_USERS_TTL_SECS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            map_data_ttl_seconds: settings.map_data_ttl.as_secs(),
            checkpoints_ttl_seconds: settings.checkpoints_ttl.as_secs(),
            blog_list_ttl_seconds: settings.blog_list_ttl.as_secs(),
            blog_post_ttl_seconds: settings.blog_post_ttl.as_secs(),
            blog_stats_ttl_seconds: settings.blog_stats_ttl.as_secs(),
            admin_users_ttl_seconds: settings.admin_users_ttl.as_secs(),
            debounce_ms: settings.debounce.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    pub fn map_data_ttl(&self) -> Duration {
        non_zero_secs(self.map_data_ttl_seconds)
    }

    pub fn checkpoints_ttl(&self) -> Duration {
        non_zero_secs(self.checkpoints_ttl_seconds)
    }

    pub fn blog_list_ttl(&self) -> Duration {
        non_zero_secs(self.blog_list_ttl_seconds)
    }

    pub fn blog_post_ttl(&self) -> Duration {
        non_zero_secs(self.blog_post_ttl_seconds)
    }

    pub fn blog_stats_ttl(&self) -> Duration {
        non_zero_secs(self.blog_stats_ttl_seconds)
    }

    pub fn admin_users_ttl(&self) -> Duration {
        non_zero_secs(self.admin_users_ttl_seconds)
    }

    /// Debounce window, clamped to at least one millisecond.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }
}

/// A zero TTL would make every entry expire on insert; clamp to one second.
fn non_zero_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
