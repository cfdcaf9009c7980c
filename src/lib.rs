//! tripkit: the client-side caching layer of the trip planner.
//!
//! - [`cache`]: TTL keyed cache, invalidation event bus, debounced refresh
//! - [`domain`]: normalised records and the tolerant coordinate parser
//! - [`application`]: cache-backed fetchers for map data, checkpoints, blogs
//! - [`map`]: reuse of long-lived map renderer instances
//! - [`infra`]: REST backend adapters and telemetry

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod map;
