//! Cache-backed fetchers and the refresh loop that keeps them current.

pub mod admin;
pub mod blogs;
pub mod checkpoints;
pub mod error;
pub mod map_data;
pub mod repos;
pub mod watcher;
