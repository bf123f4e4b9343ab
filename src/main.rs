use anyhow::Context;
use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use medialink::{
    config::{AppConfig, ConfigManager},
    feed::{fetch::HttpFeedFetcher, FeedCache, FeedProvider},
    logging::{init_logging_with_options, log_configuration_status},
    maintenance::{self, FeedRefresher},
    media::{index, manager, MediaDao, MediaIndex, MediaManager, MimeTypeManager},
    state::AppState,
    web,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The network port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// The friendly name advertised to clients
    #[arg(short, long)]
    name: Option<String>,

    /// Log level filter, e.g. `info` or `medialink=debug`
    #[arg(long)]
    log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Finds the local IP address of the machine.
fn get_local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

async fn create_config_manager(config_path: &Path, args: &Args) -> anyhow::Result<ConfigManager> {
    let initial = AppConfig::load_or_create(config_path)?;
    let manager = if initial.parameters.watch_config_file {
        ConfigManager::new_with_watching(config_path).await?
    } else {
        ConfigManager::new(config_path)?
    };

    if args.port.is_some() || args.name.is_some() {
        let mut config = manager.get_config().await;
        if let Some(port) = args.port {
            config.server.port = port;
        }
        if let Some(name) = &args.name {
            config.server.name = name.clone();
        }
        manager
            .update_config(config)
            .await
            .context("Failed to apply command line overrides")?;
    }

    Ok(manager)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging_with_options(args.log_level.as_deref(), args.debug)?;

    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let config = Arc::new(
        create_config_manager(&config_path, &args)
            .await
            .with_context(|| format!("Failed to load configuration {}", config_path.display()))?,
    );
    let app_config = config.get_config().await;
    let parameters = app_config.parameters.clone();

    let host = match get_local_ip() {
        Some(ip) => ip,
        None => {
            warn!("Could not determine local IP address, advertising 127.0.0.1");
            IpAddr::from([127, 0, 0, 1])
        }
    };
    let base_url = format!("http://{}:{}", host, app_config.server.port);

    info!("Starting media server...");

    let media_index = Arc::new(MediaIndex::new());
    index::spawn_config_listener(media_index.clone(), config.subscribe_to_changes());

    let mime_types = Arc::new(MimeTypeManager::new());
    let feed_cache = Arc::new(FeedCache::with_limits(
        Duration::from_secs(parameters.podcast_cache_expire_hours * 3600),
        parameters.podcast_cache_max_elements as u64,
    ));
    let dao = MediaDao::new(
        media_index.clone(),
        config.clone(),
        mime_types.clone(),
        feed_cache.clone() as Arc<dyn FeedProvider>,
    );
    let media_manager = Arc::new(MediaManager::new(dao, mime_types, config.clone(), base_url.clone()));

    let (media_events, media_event_receiver) = broadcast::channel(16);
    manager::spawn_event_listener(media_manager.clone(), media_event_receiver);

    maintenance::spawn_index_cleaner(media_manager.clone(), parameters.media_index_clean_delay_minutes);
    maintenance::spawn_media_scanner(media_manager.clone(), parameters.media_scan_all_delay_minutes);
    maintenance::spawn_feed_cache_cleaner(feed_cache.clone(), parameters.feed_cache_clean_delay_minutes);

    let fetcher = Arc::new(HttpFeedFetcher::new().context("Failed to create HTTP client")?);
    let refresher = Arc::new(FeedRefresher::new(config.clone(), feed_cache, media_index, fetcher));
    refresher.run(config.subscribe_to_changes());

    log_configuration_status(config.get_config_path(), &app_config);

    let app_state = AppState {
        config: config.clone(),
        media_manager,
        media_events,
    };
    let app = web::create_router(app_state);

    let interface: IpAddr = app_config
        .server
        .interface
        .parse()
        .with_context(|| format!("Invalid interface address {}", app_config.server.interface))?;
    let addr = SocketAddr::new(interface, app_config.server.port);
    info!("Server UUID: {}", app_config.server.uuid);
    info!("Listening on http://{} (advertised as {})", addr, base_url);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("HTTP server failed")?;

    Ok(())
}
