//! Shared cache state.
//!
//! One [`CacheContext`] is built at startup and cloned into every fetcher;
//! tests build their own. Clones share the same stores and event bus.

use std::sync::Arc;

use crate::domain::entities::{AdminUser, BlogPage, BlogPost, BlogStats, CheckpointSet, MapData};

use super::config::CacheConfig;
use super::events::CacheEventManager;
use super::store::KeyedCache;

#[derive(Clone)]
pub struct CacheContext {
    pub config: CacheConfig,
    pub events: Arc<CacheEventManager>,
    pub map_data: Arc<KeyedCache<Arc<MapData>>>,
    pub checkpoints: Arc<KeyedCache<Arc<CheckpointSet>>>,
    pub blog_lists: Arc<KeyedCache<Arc<BlogPage>>>,
    pub blog_posts: Arc<KeyedCache<Arc<BlogPost>>>,
    pub blog_stats: Arc<KeyedCache<Arc<BlogStats>>>,
    pub admin_users: Arc<KeyedCache<Arc<Vec<AdminUser>>>>,
}

impl CacheContext {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            events: Arc::new(CacheEventManager::new()),
            map_data: Arc::new(KeyedCache::new("map_data")),
            checkpoints: Arc::new(KeyedCache::new("checkpoints")),
            blog_lists: Arc::new(KeyedCache::new("blog_lists")),
            blog_posts: Arc::new(KeyedCache::new("blog_posts")),
            blog_stats: Arc::new(KeyedCache::new("blog_stats")),
            admin_users: Arc::new(KeyedCache::new("admin_users")),
        }
    }

    /// Empty every store. Subscriptions are left in place.
    pub fn clear_all(&self) {
        self.map_data.clear();
        self.checkpoints.clear();
        self.blog_lists.clear();
        self.blog_posts.clear();
        self.blog_stats.clear();
        self.admin_users.clear();
    }
}

impl Default for CacheContext {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn clones_share_stores() {
        let context = CacheContext::default();
        let clone = context.clone();

        clone
            .map_data
            .set("map-data-u1", Arc::new(MapData::default()), Duration::from_secs(60));
        assert!(context.map_data.get("map-data-u1").is_some());

        context.clear_all();
        assert!(clone.map_data.is_empty());
    }
}
