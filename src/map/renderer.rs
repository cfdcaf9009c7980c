//! Seams to the rendering engine.
//!
//! Engine handles are shared and internally synchronised, so every method
//! takes `&self`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::options::{ContainerId, MapOptions, MapView};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("renderer error: {message}")]
pub struct RendererError {
    pub message: String,
}

impl RendererError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Navigation,
    Scale,
    Geolocate,
}

/// A live map instance.
#[async_trait]
pub trait MapRenderer: Send + Sync {
    fn is_destroyed(&self) -> bool;

    fn container(&self) -> ContainerId;

    /// Move the canvas into another container.
    fn set_container(&self, container: &ContainerId);

    fn view(&self) -> MapView;

    fn jump_to(&self, view: MapView);

    /// Swap the style. Sources and layers added earlier are lost.
    fn set_style(&self, style: &str);

    /// Resolves once the current style has loaded.
    async fn style_loaded(&self) -> Result<(), RendererError>;

    fn has_control(&self, control: Control) -> bool;

    fn add_control(&self, control: Control);

    fn has_source(&self, id: &str) -> bool;

    fn add_source(&self, id: &str, source: Value) -> Result<(), RendererError>;

    fn has_layer(&self, id: &str) -> bool;

    /// `layer` carries its own `id`.
    fn add_layer(&self, layer: Value) -> Result<(), RendererError>;

    fn destroy(&self);
}

pub trait RendererFactory: Send + Sync {
    fn create(&self, options: &MapOptions) -> Result<Arc<dyn MapRenderer>, RendererError>;
}

/// A marker placed on a cached instance.
pub trait Marker: Send + Sync {
    fn id(&self) -> &str;

    fn remove(&self);
}
