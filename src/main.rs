use std::{process, sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use tripkit::{
    application::{
        blogs::BlogService,
        checkpoints::{CheckpointQuery, CheckpointService},
        error::AppError,
        map_data::{MapDataRefresher, MapDataService},
        watcher::{WatchState, Watcher},
    },
    cache::{CacheConfig, CacheContext, EventKind},
    config::{self, BlogsArgs, CheckpointsArgs, Command, MapDataArgs, Settings, WatchArgs},
    domain::entities::MapData,
    infra::{directions::DirectionsClient, rest::RestBackend, telemetry},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    let context = CacheContext::new(CacheConfig::from(&settings.cache));
    let backend = Arc::new(RestBackend::new(&settings.backend)?);

    match cli_args.command {
        Command::MapData(args) => run_map_data(context, backend, args).await,
        Command::Checkpoints(args) => run_checkpoints(context, backend, &settings, args).await,
        Command::Blogs(args) => run_blogs(context, backend, args).await,
        Command::Watch(args) => run_watch(context, backend, args).await,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_map_data(
    context: CacheContext,
    backend: Arc<RestBackend>,
    args: MapDataArgs,
) -> Result<(), AppError> {
    let service = MapDataService::new(context, backend);
    let data = service.fetch(&args.user_id, args.force).await?;
    info!(
        user_id = %args.user_id,
        trips = data.trips.len(),
        favorites = data.favorites.len(),
        positioned = data.positioned_count(),
        "Map data loaded"
    );
    print_json(data.as_ref())
}

async fn run_checkpoints(
    context: CacheContext,
    backend: Arc<RestBackend>,
    settings: &Settings,
    args: CheckpointsArgs,
) -> Result<(), AppError> {
    let mut service = CheckpointService::new(context, backend);
    if let Some(directions) =
        DirectionsClient::from_settings(&settings.directions, DirectionsClient::http_client()?)
    {
        service = service.with_directions(Arc::new(directions));
    }

    let mut query = CheckpointQuery::new(args.trip_id, args.trip_type);
    if let Some(mode) = args.travel_mode {
        query = query.with_travel_mode(mode);
    }

    let set = service.fetch(&query, args.force).await?;
    info!(
        cache_key = %query.cache_key(),
        checkpoints = set.checkpoints.len(),
        routed = set.route.is_some(),
        "Checkpoints loaded"
    );
    print_json(set.as_ref())
}

async fn run_blogs(
    context: CacheContext,
    backend: Arc<RestBackend>,
    args: BlogsArgs,
) -> Result<(), AppError> {
    let service = BlogService::new(context, backend);

    if let Some(slug) = args.slug.as_deref() {
        return print_json(service.post(slug, false).await?.as_ref());
    }
    if args.stats {
        return print_json(service.stats(&args.lang, false).await?.as_ref());
    }
    let page = service
        .list(&args.lang, args.page, args.limit, false)
        .await?;
    print_json(page.as_ref())
}

async fn run_watch(
    context: CacheContext,
    backend: Arc<RestBackend>,
    args: WatchArgs,
) -> Result<(), AppError> {
    if args.interval_seconds == 0 {
        return Err(AppError::unexpected("--interval-seconds must be positive"));
    }

    let events = Arc::clone(&context.events);
    let window = context.config.debounce_window();
    let service = MapDataService::new(context, backend);
    let watcher = Watcher::start(
        &events,
        MapDataRefresher::new(service, args.user_id.clone()),
        window,
    );

    let initial = watcher.load().await?;
    print_json(initial.as_ref())?;

    let mut updates = watcher.subscribe();
    updates.mark_unchanged();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_seconds));
    ticker.tick().await;
    let deadline = async {
        match args.seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    info!(user_id = %args.user_id, "Watching map data");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                events.publish(EventKind::MapDataInvalidated);
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                report_refresh(&state)?;
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    watcher.shutdown();
    Ok(())
}

fn report_refresh(state: &WatchState<MapData>) -> Result<(), AppError> {
    match (&state.last_error, &state.value) {
        (Some(err), _) => {
            warn!(refreshes = state.refreshes, error = %err, "Refresh failed; keeping previous data");
            Ok(())
        }
        (None, Some(data)) => {
            info!(
                refreshes = state.refreshes,
                trips = data.trips.len(),
                favorites = data.favorites.len(),
                "Map data refreshed"
            );
            print_json(data.as_ref())
        }
        (None, None) => Ok(()),
    }
}
