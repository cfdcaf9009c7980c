use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "tripkit_cache_hit_total",
            Unit::Count,
            "Total number of keyed cache hits."
        );
        describe_counter!(
            "tripkit_cache_miss_total",
            Unit::Count,
            "Total number of keyed cache misses, forced refreshes included."
        );
        describe_counter!(
            "tripkit_cache_expired_total",
            Unit::Count,
            "Total number of expired entries purged on read."
        );
        describe_counter!(
            "tripkit_cache_producer_error_total",
            Unit::Count,
            "Total number of failed cache producers."
        );
        describe_histogram!(
            "tripkit_cache_producer_ms",
            Unit::Milliseconds,
            "Cache producer latency in milliseconds."
        );
        describe_counter!(
            "tripkit_cache_event_published_total",
            Unit::Count,
            "Total number of published cache events."
        );
        describe_counter!(
            "tripkit_cache_subscriber_panic_total",
            Unit::Count,
            "Total number of cache event subscribers that panicked."
        );
        describe_counter!(
            "tripkit_refresh_total",
            Unit::Count,
            "Total number of debounced event-driven refreshes."
        );
        describe_counter!(
            "tripkit_map_instance_reuse_total",
            Unit::Count,
            "Total number of map instances served from the instance cache."
        );
        describe_counter!(
            "tripkit_map_instance_create_total",
            Unit::Count,
            "Total number of map instances constructed."
        );
    });
}
