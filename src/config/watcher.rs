use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};

use super::{send_change_notifications, validation::ConfigValidator, AppConfig, ConfigEvent};

const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

/// Drops events following a successful reload too closely
#[derive(Default)]
struct ReloadGate {
    last_reload: Option<Instant>,
}

impl ReloadGate {
    fn is_open(&self, now: Instant) -> bool {
        self.last_reload
            .map_or(true, |last| now.duration_since(last) >= DEBOUNCE_DURATION)
    }

    fn reloaded(&mut self, now: Instant) {
        self.last_reload = Some(now);
    }
}

/// Load, validate and apply the configuration file. Returns false when it matches the
/// configuration in memory.
async fn apply_config_file(
    config_path: &Path,
    config: &RwLock<AppConfig>,
    sender: &broadcast::Sender<ConfigEvent>,
) -> Result<bool> {
    let new_config = AppConfig::load_from_file(config_path)?;
    ConfigValidator::validate(&new_config)?;

    let old_config = {
        let mut config_guard = config.write().await;
        if *config_guard == new_config {
            // Our own save_to_file
            return Ok(false);
        }
        std::mem::replace(&mut *config_guard, new_config.clone())
    };

    send_change_notifications(sender, &old_config, &new_config);
    Ok(true)
}

/// Watch the configuration file and publish folder events when it is edited by hand.
///
/// The returned watcher must be kept alive for as long as events are wanted.
pub fn watch_config_file(
    config_path: PathBuf,
    config: Arc<RwLock<AppConfig>>,
    sender: broadcast::Sender<ConfigEvent>,
) -> Result<RecommendedWatcher> {
    let (tx, mut rx) = mpsc::channel(100);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.try_send(event);
        }
    })?;

    // Editors often replace the file, so watch the parent directory
    if let Some(parent) = config_path.parent() {
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }

    tokio::spawn(async move {
        let mut gate = ReloadGate::default();

        while let Some(event) = rx.recv().await {
            if !event.paths.iter().any(|path| path == &config_path) {
                continue;
            }

            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                continue;
            }

            let now = Instant::now();
            if !gate.is_open(now) {
                continue;
            }

            match apply_config_file(&config_path, &config, &sender).await {
                Ok(changed) => {
                    gate.reloaded(now);
                    if changed {
                        info!("Configuration reloaded from {}", config_path.display());
                    }
                }
                // A partially written file is retried on the next event
                Err(e) => warn!("Failed to reload configuration, ignoring changes: {:#}", e),
            }
        }
    });

    Ok(watcher)
}
