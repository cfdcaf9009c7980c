//! Rendering engine instance cache.

pub mod baseline;
mod instance_cache;
mod options;
mod renderer;
#[cfg(test)]
pub(crate) mod testing;

pub use instance_cache::{MapError, MapInstanceCache};
pub use options::{
    ANGLE_TOLERANCE, CENTER_TOLERANCE, ContainerId, DeviceClass, MapConfigKey, MapOptions,
    MapView, ZOOM_TOLERANCE,
};
pub use renderer::{Control, MapRenderer, Marker, RendererError, RendererFactory};
