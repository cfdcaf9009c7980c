//! tripkit cache system
//!
//! In-process caching for the trip planner client:
//!
//! - **Keyed store**: string keys, per-entry TTL, lazy expiry on read
//! - **Event bus**: closed set of invalidation events, synchronous delivery
//! - **Debouncer**: collapses event bursts into one refresh
//!
//! ## Configuration
//!
//! TTLs and the debounce window come from the `[cache]` section:
//!
//! ```toml
//! [cache]
//! map_data_ttl_seconds = 300
//! checkpoints_ttl_seconds = 600
//! debounce_ms = 100
//! # ... see config.rs for all options
//! ```

mod config;
mod context;
mod debounce;
mod events;
pub mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use context::CacheContext;
pub use debounce::Debouncer;
pub use events::{
    CacheEvent, CacheEventManager, Epoch, EventKind, PublishReport, Subscription, UnknownEventKind,
};
pub use store::{CacheEntry, CacheError, CacheOptions, KeyedCache};

pub(crate) use lock::mutex_lock;
