//! Controls, sources and layers every map instance carries.
//!
//! Each add is guarded by an existence check on its fixed id, so running
//! [`install`] again after a partial or repeated initialisation is harmless.

use serde_json::{Value, json};
use tracing::debug;

use super::renderer::{Control, MapRenderer, RendererError};

pub const TRIPS_SOURCE: &str = "tripkit-trips";
pub const FAVORITES_SOURCE: &str = "tripkit-favorites";
pub const ROUTE_SOURCE: &str = "tripkit-route";
pub const TERRAIN_SOURCE: &str = "tripkit-terrain-dem";

pub const TRIPS_LAYER: &str = "tripkit-trip-points";
pub const FAVORITES_LAYER: &str = "tripkit-favorite-points";
pub const ROUTE_LAYER: &str = "tripkit-route-line";

const CONTROLS: [Control; 2] = [Control::Navigation, Control::Scale];

fn empty_collection() -> Value {
    json!({
        "type": "geojson",
        "data": { "type": "FeatureCollection", "features": [] }
    })
}

fn sources(terrain: bool) -> Vec<(&'static str, Value)> {
    let mut sources = vec![
        (TRIPS_SOURCE, empty_collection()),
        (FAVORITES_SOURCE, empty_collection()),
        (ROUTE_SOURCE, empty_collection()),
    ];
    if terrain {
        sources.push((
            TERRAIN_SOURCE,
            json!({ "type": "raster-dem", "tileSize": 512, "maxzoom": 14 }),
        ));
    }
    sources
}

fn layers() -> Vec<(&'static str, Value)> {
    vec![
        (
            ROUTE_LAYER,
            json!({
                "id": ROUTE_LAYER,
                "type": "line",
                "source": ROUTE_SOURCE,
                "paint": { "line-width": 4 }
            }),
        ),
        (
            TRIPS_LAYER,
            json!({
                "id": TRIPS_LAYER,
                "type": "circle",
                "source": TRIPS_SOURCE,
                "paint": { "circle-radius": 6 }
            }),
        ),
        (
            FAVORITES_LAYER,
            json!({
                "id": FAVORITES_LAYER,
                "type": "symbol",
                "source": FAVORITES_SOURCE
            }),
        ),
    ]
}

/// Add whatever part of the baseline is missing. Returns how many items were added.
pub fn install(renderer: &dyn MapRenderer, terrain: bool) -> Result<usize, RendererError> {
    let mut added = 0;

    for control in CONTROLS {
        if !renderer.has_control(control) {
            renderer.add_control(control);
            added += 1;
        }
    }

    for (id, source) in sources(terrain) {
        if !renderer.has_source(id) {
            renderer.add_source(id, source)?;
            added += 1;
        }
    }

    for (id, layer) in layers() {
        if !renderer.has_layer(id) {
            renderer.add_layer(layer)?;
            added += 1;
        }
    }

    debug!(added, terrain, "Map baseline installed");
    Ok(added)
}
