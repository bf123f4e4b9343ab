//! Scheduled background services: index sweep, media scan, feed refresh and feed cache cleanup.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigEvent, ConfigManager, FolderConfig};
use crate::feed::fetch::FeedFetcher;
use crate::feed::{icecast, rss, FeedCache, FeedProvider};
use crate::media::dao::radio_genre_id;
use crate::media::{MediaIndex, MediaManager, RootNode};

const MAX_DOWNLOAD_RETRY: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value * 60)
}

/// Run `task` every `period`, the first run one period after start
fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    info!("Scheduling {} every {:?}", name, period);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("Running {}", name);
            task().await;
        }
    })
}

/// Periodic media index sweep. A delay of 0 disables it.
pub fn spawn_index_cleaner(manager: Arc<MediaManager>, delay_minutes: u64) -> Option<JoinHandle<()>> {
    (delay_minutes > 0).then(|| {
        spawn_periodic("media index cleaner", minutes(delay_minutes), move || {
            let manager = manager.clone();
            async move {
                manager.clean_up_cache().await;
            }
        })
    })
}

/// Periodic walk of the whole content tree. A delay of 0 disables it.
pub fn spawn_media_scanner(manager: Arc<MediaManager>, delay_minutes: u64) -> Option<JoinHandle<()>> {
    (delay_minutes > 0).then(|| {
        spawn_periodic("media scanner", minutes(delay_minutes), move || {
            let manager = manager.clone();
            async move {
                let scanned = manager.scan_all().await;
                info!("Media scan complete: {} nodes", scanned);
            }
        })
    })
}

/// Periodic run of the podcast snapshot expirations. A delay of 0 disables it.
pub fn spawn_feed_cache_cleaner(cache: Arc<FeedCache>, delay_minutes: u64) -> Option<JoinHandle<()>> {
    (delay_minutes > 0).then(|| {
        spawn_periodic("feed cache cleaner", minutes(delay_minutes), move || {
            let cache = cache.clone();
            async move {
                cache.clean_up().await;
            }
        })
    })
}

/// Keeps the feed snapshots up to date with the configured podcasts and radio directory
pub struct FeedRefresher {
    config: Arc<ConfigManager>,
    cache: Arc<FeedCache>,
    index: Arc<MediaIndex>,
    fetcher: Arc<dyn FeedFetcher>,
}

impl FeedRefresher {
    pub fn new(
        config: Arc<ConfigManager>,
        cache: Arc<FeedCache>,
        index: Arc<MediaIndex>,
        fetcher: Arc<dyn FeedFetcher>,
    ) -> Self {
        Self {
            config,
            cache,
            index,
            fetcher,
        }
    }

    /// Fetch one podcast. Returns whether its entries changed; on change the entries indexed
    /// below the podcast are dropped so they are re-derived on the next listing.
    pub async fn refresh_podcast(&self, folder: &FolderConfig) -> Result<bool> {
        let document = self
            .fetcher
            .fetch(&folder.path)
            .await
            .with_context(|| format!("Failed to download podcast {}", folder.path))?;
        let entries = rss::parse_podcast(&document)
            .with_context(|| format!("Failed to parse podcast {}", folder.path))?;

        let changed = self.cache.store_podcast(&folder.path, entries).await;
        if changed {
            self.index.remove_children(&folder.id).await;
        }
        Ok(changed)
    }

    /// Refresh every configured podcast; returns how many were fetched successfully
    pub async fn refresh_podcasts(&self) -> usize {
        let mut refreshed = 0;
        for folder in self.config.folders(RootNode::Podcast).await {
            match self.refresh_podcast(&folder).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!("{:#}", e),
            }
        }
        refreshed
    }

    /// Reload the radio directory, or clear it when radio is disabled.
    /// Returns whether the station list changed.
    pub async fn refresh_radio_directory(&self) -> Result<bool> {
        let radio = self.config.radio().await;
        if !radio.enabled {
            if self.cache.is_radio_loaded().await {
                self.cache.clear_radio_directory().await;
                self.forget_radio_genres(&radio.genres).await;
                return Ok(true);
            }
            return Ok(false);
        }

        let mut attempt = 0;
        let document = loop {
            attempt += 1;
            match self.fetcher.fetch(&radio.directory_url).await {
                Ok(document) => break document,
                Err(e) if attempt < MAX_DOWNLOAD_RETRY => {
                    warn!("Radio directory download failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to download radio directory {}", radio.directory_url)
                    })
                }
            }
        };

        let stations = icecast::parse_directory(&document).context("Failed to parse radio directory")?;
        if stations.is_empty() {
            warn!("Radio directory {} lists no station", radio.directory_url);
            return Ok(false);
        }

        let changed = self.cache.load_radio_directory(stations).await;
        if changed {
            self.forget_radio_genres(&radio.genres).await;
        }
        Ok(changed)
    }

    async fn forget_radio_genres(&self, genres: &[String]) {
        for genre in genres {
            self.index.remove_children(&radio_genre_id(genre)).await;
        }
    }

    async fn handle_config_event(&self, event: &ConfigEvent) {
        match event {
            ConfigEvent::FolderAdded {
                root: RootNode::Podcast,
                folder,
            }
            | ConfigEvent::FolderUpdated {
                root: RootNode::Podcast,
                folder,
                ..
            } => {
                if let Err(e) = self.refresh_podcast(folder).await {
                    warn!("{:#}", e);
                }
            }
            ConfigEvent::FolderRemoved {
                root: RootNode::Podcast,
                folder,
            } => {
                self.cache.remove_podcast(&folder.path).await;
            }
            ConfigEvent::SettingsChanged => {
                let radio = self.config.radio().await;
                if radio.enabled == self.cache.is_radio_loaded().await {
                    return;
                }
                if let Err(e) = self.refresh_radio_directory().await {
                    warn!("{:#}", e);
                }
            }
            _ => {}
        }
    }

    /// Initial refresh, then periodic refreshes and reactions to configuration events
    pub fn run(self: Arc<Self>, mut events: broadcast::Receiver<ConfigEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let parameters = self.config.parameters().await;
            let radio = self.config.radio().await;

            let mut podcast_ticker = interval(minutes(parameters.feed_refresh_delay_minutes.max(1)));
            podcast_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut radio_ticker = interval(Duration::from_secs(radio.refresh_delay_hours.max(1) * 3600));
            radio_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = podcast_ticker.tick() => {
                        let refreshed = self.refresh_podcasts().await;
                        debug!("{} podcasts refreshed", refreshed);
                    }
                    _ = radio_ticker.tick() => {
                        if let Err(e) = self.refresh_radio_directory().await {
                            warn!("{:#}", e);
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) => self.handle_config_event(&event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Feed refresher missed {} configuration events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}
