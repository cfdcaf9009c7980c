//! Command-line surface of the tripkit binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::domain::types::{TravelMode, TripType};

const DEFAULT_BLOG_LANG: &str = "en";

/// Command-line arguments for the tripkit binary.
#[derive(Debug, Parser)]
#[command(name = "tripkit", version, about = "Cached trip planner data client")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TRIPKIT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print a user's trips and favourite places.
    #[command(name = "map-data")]
    MapData(MapDataArgs),
    /// Print the checkpoints of a trip.
    Checkpoints(CheckpointsArgs),
    /// Print a blog listing page, a single post, or statistics.
    Blogs(BlogsArgs),
    /// Keep a user's map data fresh and log every refresh.
    Watch(WatchArgs),
}

#[derive(Debug, Args, Clone)]
pub struct MapDataArgs {
    #[arg(long = "user-id", value_name = "ID")]
    pub user_id: String,

    /// Bypass the cache.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Args, Clone)]
pub struct CheckpointsArgs {
    #[arg(long = "trip-id", value_name = "ID")]
    pub trip_id: String,

    /// road, flight or cruise.
    #[arg(long = "trip-type", value_name = "TYPE")]
    pub trip_type: TripType,

    /// Routing profile for road trips (driving, cycling, walking).
    #[arg(long = "travel-mode", value_name = "MODE")]
    pub travel_mode: Option<TravelMode>,

    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Args, Clone)]
pub struct BlogsArgs {
    #[arg(long, default_value = DEFAULT_BLOG_LANG, value_name = "LANG")]
    pub lang: String,

    #[arg(long, default_value_t = 1, value_name = "PAGE")]
    pub page: u32,

    #[arg(long, default_value_t = 10, value_name = "COUNT")]
    pub limit: u32,

    /// Print this post instead of a listing.
    #[arg(long, value_name = "SLUG", conflicts_with = "stats")]
    pub slug: Option<String>,

    /// Print statistics for `--lang` instead of a listing.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub stats: bool,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    #[arg(long = "user-id", value_name = "ID")]
    pub user_id: String,

    /// Stop after this many seconds; runs until interrupted when absent.
    #[arg(long, value_name = "SECONDS")]
    pub seconds: Option<u64>,

    /// Publish a map data invalidation at this cadence.
    #[arg(long = "interval-seconds", default_value_t = 30, value_name = "SECONDS")]
    pub interval_seconds: u64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the backend base URL.
    #[arg(long = "backend-url", value_name = "URL", global = true)]
    pub backend_url: Option<String>,

    /// Override the backend API key.
    #[arg(long = "backend-api-key", value_name = "KEY", global = true)]
    pub backend_api_key: Option<String>,

    /// Override the map data TTL.
    #[arg(long = "cache-map-data-ttl-seconds", value_name = "SECONDS", global = true)]
    pub map_data_ttl_seconds: Option<u64>,

    /// Override the debounce window for event-driven refreshes.
    #[arg(long = "cache-debounce-ms", value_name = "MILLIS", global = true)]
    pub debounce_ms: Option<u64>,
}
