//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tripkit";
const ENV_PREFIX: &str = "TRIPKIT";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 15;
const DEFAULT_DIRECTIONS_URL: &str = "https://api.mapbox.com";

mod cli;

pub use cli::{BlogsArgs, CheckpointsArgs, CliArgs, Command, MapDataArgs, Overrides, WatchArgs};

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub backend: BackendSettings,
    pub directions: DirectionsSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL of the REST backend; commands needing data fail without it.
    pub url: Option<Url>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectionsSettings {
    pub base_url: Url,
    /// Routing is skipped when no token is configured.
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub map_data_ttl: Duration,
    pub checkpoints_ttl: Duration,
    pub blog_list_ttl: Duration,
    pub blog_post_ttl: Duration,
    pub blog_stats_ttl: Duration,
    pub admin_users_ttl: Duration,
    pub debounce: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    backend: RawBackendSettings,
    directions: RawDirectionsSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.url = Some(url.clone());
        }
        if let Some(key) = overrides.backend_api_key.as_ref() {
            self.backend.api_key = Some(key.clone());
        }
        if let Some(ttl) = overrides.map_data_ttl_seconds {
            self.cache.map_data_ttl_seconds = Some(ttl);
        }
        if let Some(window) = overrides.debounce_ms {
            self.cache.debounce_ms = Some(window);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            backend,
            directions,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            backend: build_backend_settings(backend)?,
            directions: build_directions_settings(directions)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let url = non_empty(backend.url)
        .map(|value| parse_url(&value, "backend.url"))
        .transpose()?;
    let api_key = non_empty(backend.api_key);

    let timeout_secs = backend
        .timeout_seconds
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);
    let timeout = non_zero_duration(timeout_secs, "backend.timeout_seconds", Duration::from_secs)?;

    Ok(BackendSettings {
        url,
        api_key,
        timeout,
    })
}

fn build_directions_settings(
    directions: RawDirectionsSettings,
) -> Result<DirectionsSettings, LoadError> {
    let base_url = non_empty(directions.base_url).unwrap_or_else(|| DEFAULT_DIRECTIONS_URL.into());
    let base_url = parse_url(&base_url, "directions.base_url")?;

    Ok(DirectionsSettings {
        base_url,
        access_token: non_empty(directions.access_token),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();
    let secs = |value: Option<u64>, default: u64, key: &'static str| {
        non_zero_duration(value.unwrap_or(default), key, Duration::from_secs)
    };

    Ok(CacheSettings {
        map_data_ttl: secs(
            cache.map_data_ttl_seconds,
            defaults.map_data_ttl_seconds,
            "cache.map_data_ttl_seconds",
        )?,
        checkpoints_ttl: secs(
            cache.checkpoints_ttl_seconds,
            defaults.checkpoints_ttl_seconds,
            "cache.checkpoints_ttl_seconds",
        )?,
        blog_list_ttl: secs(
            cache.blog_list_ttl_seconds,
            defaults.blog_list_ttl_seconds,
            "cache.blog_list_ttl_seconds",
        )?,
        blog_post_ttl: secs(
            cache.blog_post_ttl_seconds,
            defaults.blog_post_ttl_seconds,
            "cache.blog_post_ttl_seconds",
        )?,
        blog_stats_ttl: secs(
            cache.blog_stats_ttl_seconds,
            defaults.blog_stats_ttl_seconds,
            "cache.blog_stats_ttl_seconds",
        )?,
        admin_users_ttl: secs(
            cache.admin_users_ttl_seconds,
            defaults.admin_users_ttl_seconds,
            "cache.admin_users_ttl_seconds",
        )?,
        debounce: non_zero_duration(
            cache.debounce_ms.unwrap_or(defaults.debounce_ms),
            "cache.debounce_ms",
            Duration::from_millis,
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    url: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDirectionsSettings {
    base_url: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    map_data_ttl_seconds: Option<u64>,
    checkpoints_ttl_seconds: Option<u64>,
    blog_list_ttl_seconds: Option<u64>,
    blog_post_ttl_seconds: Option<u64>,
    blog_stats_ttl_seconds: Option<u64>,
    admin_users_ttl_seconds: Option<u64>,
    debounce_ms: Option<u64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "url must use http or https"));
    }
    Ok(url)
}

fn non_zero_duration(
    value: u64,
    key: &'static str,
    unit: fn(u64) -> Duration,
) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(unit(value))
}
