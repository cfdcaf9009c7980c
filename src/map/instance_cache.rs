//! Reuse of rendering engine instances across re-renders.
//!
//! Instances are keyed by `{style, terrain, device}`. Camera changes are
//! applied to the cached instance; only a new key constructs a new engine.
//! Destruction goes through [`MapInstanceCache::clear_cache`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use metrics::counter;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::mutex_lock;

use super::baseline;
use super::options::{MapConfigKey, MapOptions};
use super::renderer::{MapRenderer, Marker, RendererError, RendererFactory};

const SOURCE: &str = "map::instance_cache";
const METRIC_REUSE: &str = "tripkit_map_instance_reuse_total";
const METRIC_CREATE: &str = "tripkit_map_instance_create_total";

#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    Renderer(#[from] RendererError),
    #[error("no cached map instance for `{0}`")]
    NotCached(MapConfigKey),
}

struct MapEntry {
    instance: Arc<dyn MapRenderer>,
    style: String,
    terrain: bool,
    initialized: Arc<AtomicBool>,
    markers: Vec<Box<dyn Marker>>,
    init_task: Option<JoinHandle<()>>,
}

impl MapEntry {
    /// Markers first, then the instance.
    fn destroy(mut self) {
        for marker in self.markers.drain(..) {
            marker.remove();
        }
        if let Some(task) = self.init_task.take() {
            task.abort();
        }
        if !self.instance.is_destroyed() {
            self.instance.destroy();
        }
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<MapConfigKey, MapEntry>,
    last_requested: Option<MapConfigKey>,
}

pub struct MapInstanceCache {
    factory: Arc<dyn RendererFactory>,
    runtime: Handle,
    state: Mutex<State>,
}

impl MapInstanceCache {
    /// Initialisation tasks are spawned on `runtime`.
    pub fn new(factory: Arc<dyn RendererFactory>, runtime: Handle) -> Self {
        Self {
            factory,
            runtime,
            state: Mutex::new(State::default()),
        }
    }

    /// Return the live instance for `options`, constructing one if needed.
    ///
    /// A reused instance is moved into `options.container` when it lives
    /// elsewhere and jumps to `options.view` when the camera differs beyond
    /// tolerance. A new instance is returned before its baseline finishes
    /// installing.
    pub fn get_or_create_map(
        &self,
        options: &MapOptions,
    ) -> Result<Arc<dyn MapRenderer>, MapError> {
        let key = options.key();
        let mut state = mutex_lock(&self.state, SOURCE, "get_or_create_map");

        let mut stale = None;
        if let Some(entry) = state.entries.get(&key) {
            if entry.instance.is_destroyed() {
                warn!(map_key = %key, "Cached map instance was destroyed; rebuilding");
                stale = state.entries.remove(&key);
            } else {
                let instance = Arc::clone(&entry.instance);
                state.last_requested = Some(key.clone());
                drop(state);
                return Ok(self.reuse(&key, instance, options));
            }
        }
        drop(state);

        if let Some(stale) = stale {
            stale.destroy();
        }

        // Renderer construction runs without the state lock held.
        let instance = self.factory.create(options)?;

        let mut state = mutex_lock(&self.state, SOURCE, "get_or_create_map");
        if let Some(entry) = state.entries.get(&key)
            && !entry.instance.is_destroyed()
        {
            let existing = Arc::clone(&entry.instance);
            state.last_requested = Some(key.clone());
            drop(state);
            debug!(map_key = %key, "Concurrent request cached this map first");
            instance.destroy();
            return Ok(self.reuse(&key, existing, options));
        }

        counter!(METRIC_CREATE).increment(1);
        info!(map_key = %key, "Map instance created");

        let initialized = Arc::new(AtomicBool::new(false));
        let init_task = self.spawn_initialize(
            key.clone(),
            Arc::clone(&instance),
            options.terrain,
            Arc::clone(&initialized),
        );
        let displaced = state.entries.insert(
            key.clone(),
            MapEntry {
                instance: Arc::clone(&instance),
                style: options.style.clone(),
                terrain: options.terrain,
                initialized,
                markers: Vec::new(),
                init_task: Some(init_task),
            },
        );
        state.last_requested = Some(key);
        drop(state);

        if let Some(displaced) = displaced {
            displaced.destroy();
        }
        Ok(instance)
    }

    fn reuse(
        &self,
        key: &MapConfigKey,
        instance: Arc<dyn MapRenderer>,
        options: &MapOptions,
    ) -> Arc<dyn MapRenderer> {
        if instance.container() != options.container {
            debug!(map_key = %key, container = %options.container, "Reparenting map");
            instance.set_container(&options.container);
        }
        if instance.view().differs_from(&options.view) {
            instance.jump_to(options.view);
        }
        counter!(METRIC_REUSE).increment(1);
        instance
    }

    /// Switch the most recently requested instance to `new_style`.
    ///
    /// Returns `false` when there is no such instance or the style is
    /// unchanged. Otherwise the style is reloaded, the entry moves to its new
    /// key and the baseline is installed again once the style loads.
    pub fn update_map_style(&self, new_style: &str) -> bool {
        let mut state = mutex_lock(&self.state, SOURCE, "update_map_style");
        let Some(old_key) = state.last_requested.clone() else {
            return false;
        };
        let Some(mut entry) = state.entries.remove(&old_key) else {
            return false;
        };

        if entry.style == new_style || entry.instance.is_destroyed() {
            state.entries.insert(old_key, entry);
            return false;
        }

        if let Some(task) = entry.init_task.take() {
            task.abort();
        }
        entry.instance.set_style(new_style);
        entry.initialized.store(false, Ordering::SeqCst);
        entry.style = new_style.to_string();

        let new_key = MapConfigKey {
            style: new_style.to_string(),
            ..old_key.clone()
        };
        entry.init_task = Some(self.spawn_initialize(
            new_key.clone(),
            Arc::clone(&entry.instance),
            entry.terrain,
            Arc::clone(&entry.initialized),
        ));

        let displaced = state.entries.insert(new_key.clone(), entry);
        info!(from = %old_key, to = %new_key, "Map style updated");
        state.last_requested = Some(new_key.clone());
        drop(state);

        if let Some(displaced) = displaced {
            debug!(map_key = %new_key, "Style change displaced another cached map");
            displaced.destroy();
        }
        true
    }

    /// Destroy one instance, or every instance when `key` is `None`.
    /// Returns how many were destroyed.
    pub fn clear_cache(&self, key: Option<&MapConfigKey>) -> usize {
        let mut state = mutex_lock(&self.state, SOURCE, "clear_cache");
        let removed: Vec<MapEntry> = match key {
            Some(key) => state.entries.remove(key).into_iter().collect(),
            None => state.entries.drain().map(|(_, entry)| entry).collect(),
        };
        if key.is_none() || state.last_requested.as_ref() == key {
            state.last_requested = None;
        }
        drop(state);

        let count = removed.len();
        for entry in removed {
            entry.destroy();
        }
        debug!(destroyed = count, "Map instances cleared");
        count
    }

    /// Attach `marker` to the instance under `key`; it is removed before the
    /// instance is destroyed.
    pub fn add_marker(&self, key: &MapConfigKey, marker: Box<dyn Marker>) -> Result<(), MapError> {
        let mut state = mutex_lock(&self.state, SOURCE, "add_marker");
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| MapError::NotCached(key.clone()))?;
        entry.markers.push(marker);
        Ok(())
    }

    /// Whether the baseline is installed on the instance under `key`.
    pub fn is_initialized(&self, key: &MapConfigKey) -> Option<bool> {
        mutex_lock(&self.state, SOURCE, "is_initialized")
            .entries
            .get(key)
            .map(|entry| entry.initialized.load(Ordering::SeqCst))
    }

    pub fn last_requested(&self) -> Option<MapConfigKey> {
        mutex_lock(&self.state, SOURCE, "last_requested")
            .last_requested
            .clone()
    }

    pub fn keys(&self) -> Vec<MapConfigKey> {
        mutex_lock(&self.state, SOURCE, "keys")
            .entries
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_initialize(
        &self,
        key: MapConfigKey,
        instance: Arc<dyn MapRenderer>,
        terrain: bool,
        initialized: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        self.runtime.spawn(async move {
            if let Err(err) = instance.style_loaded().await {
                warn!(map_key = %key, error = %err, "Map style failed to load");
                return;
            }
            match baseline::install(instance.as_ref(), terrain) {
                Ok(added) => {
                    initialized.store(true, Ordering::SeqCst);
                    debug!(map_key = %key, added, "Map instance initialised");
                }
                Err(err) => warn!(map_key = %key, error = %err, "Map initialisation failed"),
            }
        })
    }
}

impl Drop for MapInstanceCache {
    fn drop(&mut self) {
        self.clear_cache(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coordinates::LngLat;
    use crate::map::baseline::{TERRAIN_SOURCE, TRIPS_LAYER};
    use crate::map::options::{ContainerId, DeviceClass, MapView};
    use crate::map::testing::{FakeFactory, FakeMarker};
    use std::sync::{OnceLock, Weak};

    /// Factory that inspects the cache while constructing an instance.
    #[derive(Default)]
    struct ReentrantFactory {
        inner: FakeFactory,
        cache: OnceLock<Weak<MapInstanceCache>>,
        seen: Mutex<Vec<usize>>,
    }

    impl RendererFactory for ReentrantFactory {
        fn create(&self, options: &MapOptions) -> Result<Arc<dyn MapRenderer>, RendererError> {
            if let Some(cache) = self.cache.get().and_then(Weak::upgrade) {
                self.seen.lock().unwrap().push(cache.len());
            }
            self.inner.create(options)
        }
    }

    fn options(style: &str, container: &str, lng: f64, zoom: f64) -> MapOptions {
        MapOptions {
            container: ContainerId::new(container),
            style: style.to_string(),
            view: MapView::new(LngLat::new(lng, 45.0).unwrap(), zoom),
            terrain: false,
            device: DeviceClass::Desktop,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn same_key_reuses_instance_and_updates_view() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());

        let first = cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.0))
            .unwrap();
        let second = cache
            .get_or_create_map(&options("streets", "b", 3.0, 8.0))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created(), 1);
        assert_eq!(second.container(), ContainerId::new("b"));
        assert_eq!(second.view().zoom, 8.0);
        assert_eq!(second.view().center.lng, 3.0);
    }

    #[tokio::test]
    async fn view_within_tolerance_is_left_alone() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());

        cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.0))
            .unwrap();
        cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.05))
            .unwrap();
        assert_eq!(factory.renderer(0).jumps(), 0);
    }

    #[tokio::test]
    async fn destroyed_instance_is_rebuilt() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());

        let first = cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.0))
            .unwrap();
        first.destroy();
        let second = cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.0))
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn initialisation_installs_baseline_once() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());
        let mut opts = options("outdoors", "a", 2.0, 5.0);
        opts.terrain = true;

        cache.get_or_create_map(&opts).unwrap();
        settle().await;

        assert_eq!(cache.is_initialized(&opts.key()), Some(true));
        let renderer = factory.renderer(0);
        assert!(renderer.has_layer(TRIPS_LAYER));
        assert!(renderer.has_source(TERRAIN_SOURCE));
        assert_eq!(baseline::install(renderer.as_ref(), true).unwrap(), 0);
    }

    #[tokio::test]
    async fn style_update_rekeys_and_reinitialises() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());
        let opts = options("streets", "a", 2.0, 5.0);

        cache.get_or_create_map(&opts).unwrap();
        settle().await;
        assert!(!cache.update_map_style("streets"));

        assert!(cache.update_map_style("satellite"));
        let new_key = MapConfigKey {
            style: "satellite".into(),
            ..opts.key()
        };
        assert_eq!(cache.is_initialized(&opts.key()), None);
        assert_eq!(cache.is_initialized(&new_key), Some(false));
        assert_eq!(cache.last_requested(), Some(new_key.clone()));

        settle().await;
        assert_eq!(cache.is_initialized(&new_key), Some(true));
        let renderer = factory.renderer(0);
        assert_eq!(renderer.style(), "satellite");
        assert!(renderer.has_layer(TRIPS_LAYER));

        let mut satellite = opts.clone();
        satellite.style = "satellite".into();
        cache.get_or_create_map(&satellite).unwrap();
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn update_without_instances_is_a_noop() {
        let cache = MapInstanceCache::new(Arc::new(FakeFactory::default()), Handle::current());
        assert!(!cache.update_map_style("satellite"));
    }

    #[tokio::test]
    async fn clear_removes_markers_before_destroying() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());
        let streets = options("streets", "a", 2.0, 5.0);
        let dark = options("dark", "b", 2.0, 5.0);

        cache.get_or_create_map(&streets).unwrap();
        cache.get_or_create_map(&dark).unwrap();
        let removed = Arc::new(AtomicBool::new(false));
        cache
            .add_marker(
                &streets.key(),
                Box::new(FakeMarker::new("m1", factory.log(), Arc::clone(&removed))),
            )
            .unwrap();

        assert_eq!(cache.clear_cache(Some(&streets.key())), 1);
        assert!(removed.load(Ordering::SeqCst));
        assert_eq!(factory.log_entries(), vec!["marker:m1", "destroy:streets"]);
        assert_eq!(cache.keys(), vec![dark.key()]);

        assert_eq!(cache.clear_cache(None), 1);
        assert!(cache.is_empty());
        assert!(factory.renderer(1).is_destroyed());
        assert_eq!(cache.last_requested(), None);
    }

    #[tokio::test]
    async fn marker_needs_cached_instance() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());
        let key = options("streets", "a", 2.0, 5.0).key();
        let err = cache
            .add_marker(
                &key,
                Box::new(FakeMarker::new("m1", factory.log(), Arc::default())),
            )
            .unwrap_err();
        assert!(matches!(err, MapError::NotCached(_)));
    }

    #[tokio::test]
    async fn factory_may_read_the_cache_while_creating() {
        let factory = Arc::new(ReentrantFactory::default());
        let cache = Arc::new(MapInstanceCache::new(factory.clone(), Handle::current()));
        factory.cache.set(Arc::downgrade(&cache)).unwrap();

        let first = cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.0))
            .unwrap();
        first.destroy();
        cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.0))
            .unwrap();
        cache
            .get_or_create_map(&options("dark", "a", 2.0, 5.0))
            .unwrap();

        assert_eq!(*factory.seen.lock().unwrap(), vec![0, 0, 1]);
        assert_eq!(factory.inner.created(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn style_change_onto_cached_key_destroys_the_displaced_map() {
        let factory = Arc::new(FakeFactory::default());
        let cache = MapInstanceCache::new(factory.clone(), Handle::current());

        cache
            .get_or_create_map(&options("satellite", "a", 2.0, 5.0))
            .unwrap();
        cache
            .get_or_create_map(&options("streets", "a", 2.0, 5.0))
            .unwrap();
        assert!(cache.update_map_style("satellite"));

        assert_eq!(cache.len(), 1);
        assert!(factory.renderer(0).is_destroyed());
        assert!(!factory.renderer(1).is_destroyed());
        assert_eq!(factory.log_entries(), vec!["destroy:satellite"]);
    }
}
