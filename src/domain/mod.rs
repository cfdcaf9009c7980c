//! Domain layer types and invariants.

pub mod coordinates;
pub mod entities;
pub mod error;
pub mod merge;
pub mod types;
