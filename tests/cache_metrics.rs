use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::DebuggingRecorder;
use tokio::runtime::Handle;
use tripkit::application::error::FetchError;
use tripkit::application::watcher::{Refresh, RefreshMode, Watcher};
use tripkit::cache::{CacheEvent, CacheEventManager, CacheOptions, EventKind, KeyedCache};
use tripkit::domain::coordinates::LngLat;
use tripkit::map::{
    ContainerId, Control, DeviceClass, MapInstanceCache, MapOptions, MapRenderer, MapView,
    RendererError, RendererFactory,
};

struct Noop;

#[async_trait]
impl Refresh for Noop {
    type Output = u32;

    fn name(&self) -> &'static str {
        "noop"
    }

    fn kinds(&self) -> &'static [EventKind] {
        &[EventKind::FavoriteAdded]
    }

    fn mode_for(&self, _event: &CacheEvent) -> Option<RefreshMode> {
        Some(RefreshMode::Incremental)
    }

    async fn load(&self) -> Result<Arc<u32>, FetchError> {
        Ok(Arc::new(0))
    }

    async fn refresh(&self, _mode: RefreshMode) -> Result<Arc<u32>, FetchError> {
        Ok(Arc::new(1))
    }
}

struct StillRenderer {
    container: Mutex<ContainerId>,
    view: Mutex<MapView>,
}

#[async_trait]
impl MapRenderer for StillRenderer {
    fn is_destroyed(&self) -> bool {
        false
    }

    fn container(&self) -> ContainerId {
        self.container.lock().unwrap().clone()
    }

    fn set_container(&self, container: &ContainerId) {
        *self.container.lock().unwrap() = container.clone();
    }

    fn view(&self) -> MapView {
        *self.view.lock().unwrap()
    }

    fn jump_to(&self, view: MapView) {
        *self.view.lock().unwrap() = view;
    }

    fn set_style(&self, _style: &str) {}

    async fn style_loaded(&self) -> Result<(), RendererError> {
        Ok(())
    }

    fn has_control(&self, _control: Control) -> bool {
        true
    }

    fn add_control(&self, _control: Control) {}

    fn has_source(&self, _id: &str) -> bool {
        true
    }

    fn add_source(&self, _id: &str, _source: serde_json::Value) -> Result<(), RendererError> {
        Ok(())
    }

    fn has_layer(&self, _id: &str) -> bool {
        true
    }

    fn add_layer(&self, _layer: serde_json::Value) -> Result<(), RendererError> {
        Ok(())
    }

    fn destroy(&self) {}
}

struct StillFactory;

impl RendererFactory for StillFactory {
    fn create(&self, options: &MapOptions) -> Result<Arc<dyn MapRenderer>, RendererError> {
        Ok(Arc::new(StillRenderer {
            container: Mutex::new(options.container.clone()),
            view: Mutex::new(options.view),
        }))
    }
}

#[tokio::test(start_paused = true)]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Keyed store hit/miss/expiry/producer paths
    let cache: KeyedCache<u32> = KeyedCache::new("metrics");
    let ttl = CacheOptions::ttl(Duration::from_secs(1));
    cache
        .get_or_set("k", || async { Ok::<_, FetchError>(1) }, ttl)
        .await
        .unwrap();
    cache
        .get_or_set("k", || async { Ok::<_, FetchError>(2) }, ttl)
        .await
        .unwrap();
    let failed = cache
        .get_or_set(
            "other",
            || async { Err::<u32, _>(FetchError::invalid_request("boom")) },
            ttl,
        )
        .await;
    assert!(failed.is_err());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(cache.get("k").is_none());

    // Event bus, subscriber panic and watcher refresh
    let events = CacheEventManager::new();
    let _panicky = events.subscribe(EventKind::TripCreated, |_| panic!("subscriber failure"));
    events.publish(EventKind::TripCreated);

    let _watcher = Watcher::start(&events, Noop, Duration::from_millis(100));
    events.publish(EventKind::FavoriteAdded);
    tokio::time::sleep(Duration::from_millis(150)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    // Map instance creation and reuse
    let maps = MapInstanceCache::new(Arc::new(StillFactory), Handle::current());
    let options = MapOptions {
        container: ContainerId::new("map"),
        style: "streets".to_string(),
        view: MapView::new(LngLat::new(-8.61, 41.15).unwrap(), 6.0),
        terrain: false,
        device: DeviceClass::Desktop,
    };
    let first = maps.get_or_create_map(&options).unwrap();
    let second = maps.get_or_create_map(&options).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "tripkit_cache_hit_total",
        "tripkit_cache_miss_total",
        "tripkit_cache_expired_total",
        "tripkit_cache_producer_error_total",
        "tripkit_cache_producer_ms",
        "tripkit_cache_event_published_total",
        "tripkit_cache_subscriber_panic_total",
        "tripkit_refresh_total",
        "tripkit_map_instance_create_total",
        "tripkit_map_instance_reuse_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
