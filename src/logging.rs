use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::media::RootNode;

/// Initialize logging. `RUST_LOG` wins over `log_level`, which defaults to info (debug with
/// `debug`).
pub fn init_logging_with_options(log_level: Option<&str>, debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or(default_level)))
        .map_err(|e| anyhow!("Invalid log level: {}", e))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging initialized with level: {}", log_level.unwrap_or(default_level));
    Ok(())
}

/// Log the configuration the server starts with
pub fn log_configuration_status(config_path: &Path, config: &AppConfig) {
    info!("=== Configuration Status ===");
    info!("Configuration file: {}", config_path.display());
    info!("Server: {} on {}:{}", config.server.name, config.server.interface, config.server.port);

    let mut folder_count = 0;
    for root in RootNode::folder_roots() {
        let folders = config.media.folders(*root);
        folder_count += folders.len();
        if folders.is_empty() {
            continue;
        }

        info!("{} ({}):", config.root_label(*root), folders.len());
        for folder in folders {
            let status = if !root.is_local_path() {
                "feed"
            } else if Path::new(&folder.path).is_dir() {
                "accessible"
            } else {
                "inaccessible"
            };
            info!("  - {} -> {} [{}]", folder.label, folder.path, status);
        }
    }

    if folder_count == 0 {
        warn!("No media folder configured - add folders to {}", config_path.display());
    }

    if config.radio.enabled {
        info!(
            "Internet radio enabled: {} genres from {}",
            config.radio.genres.len(),
            config.radio.directory_url
        );
    }
}
