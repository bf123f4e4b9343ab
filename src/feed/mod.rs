//! Podcast and internet radio snapshots.
//!
//! Feeds are fetched on a schedule by the maintenance refresher and stored in a [`FeedCache`].
//! Browse requests only ever read the cached snapshot through [`FeedProvider`].

pub mod fetch;
pub mod icecast;
pub mod rss;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub use icecast::RadioStation;

/// Playable entry published by a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub duration: Option<String>,
    pub icon_url: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// Container whose entries a provider can list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedKey {
    /// Podcast feed URL
    Podcast(String),
    /// Internet radio genre name
    RadioGenre(String),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Malformed feed document: {0}")]
    Xml(#[from] xml::reader::Error),

    #[error("Unexpected feed document: {0}")]
    Format(String),

    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Read side of the feed snapshots, consumed by the media resolver
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Entries of a container, empty when nothing has been fetched yet
    async fn list_entries(&self, key: &FeedKey) -> Vec<RawEntry>;

    /// Whether a non-empty radio directory is loaded
    async fn is_radio_loaded(&self) -> bool;
}

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 3600);
const DEFAULT_MAX_ELEMENTS: u64 = 50;

/// In-memory snapshots of podcast feeds and of the radio directory.
/// Podcast snapshots expire after a fixed time and are bounded in number.
pub struct FeedCache {
    podcasts: Cache<String, Vec<RawEntry>>,
    radio: RwLock<Vec<RadioStation>>,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_AGE, DEFAULT_MAX_ELEMENTS)
    }
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots live `max_age` after being stored; at most `max_elements` are kept
    pub fn with_limits(max_age: Duration, max_elements: u64) -> Self {
        Self {
            podcasts: Cache::builder()
                .max_capacity(max_elements)
                .time_to_live(max_age)
                .build(),
            radio: RwLock::new(Vec::new()),
        }
    }

    /// Store the entries of a podcast. Returns true when they differ from the previous snapshot.
    pub async fn store_podcast(&self, url: &str, entries: Vec<RawEntry>) -> bool {
        let changed = self
            .podcasts
            .get(url)
            .await
            .map_or(true, |previous| previous != entries);

        debug!("Podcast {} has {} entries (changed: {})", url, entries.len(), changed);
        self.podcasts.insert(url.to_string(), entries).await;
        changed
    }

    pub async fn remove_podcast(&self, url: &str) -> bool {
        self.podcasts.remove(url).await.is_some()
    }

    pub async fn has_podcast(&self, url: &str) -> bool {
        self.podcasts.contains_key(url)
    }

    pub async fn podcast_count(&self) -> u64 {
        self.podcasts.run_pending_tasks().await;
        self.podcasts.entry_count()
    }

    /// Apply pending expirations and evictions. Returns the number of snapshots kept.
    pub async fn clean_up(&self) -> u64 {
        self.podcasts.run_pending_tasks().await;
        let kept = self.podcasts.entry_count();
        info!("Feed cache cleaned: {} podcast snapshots kept", kept);
        kept
    }

    /// Replace the radio directory. Returns true when the station list changed.
    pub async fn load_radio_directory(&self, stations: Vec<RadioStation>) -> bool {
        let mut radio = self.radio.write().await;
        let changed = *radio != stations;
        info!("Radio directory contains {} stations", stations.len());
        *radio = stations;
        changed
    }

    pub async fn clear_radio_directory(&self) {
        self.radio.write().await.clear();
    }

    pub async fn radio_station_count(&self) -> usize {
        self.radio.read().await.len()
    }
}

#[async_trait]
impl FeedProvider for FeedCache {
    async fn list_entries(&self, key: &FeedKey) -> Vec<RawEntry> {
        match key {
            FeedKey::Podcast(url) => self.podcasts.get(url).await.unwrap_or_default(),
            FeedKey::RadioGenre(genre) => {
                let genre = genre.to_lowercase();
                self.radio
                    .read()
                    .await
                    .iter()
                    .filter(|station| station.genre.to_lowercase().contains(&genre))
                    .map(RadioStation::to_entry)
                    .collect()
            }
        }
    }

    async fn is_radio_loaded(&self) -> bool {
        !self.radio.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RawEntry {
        RawEntry {
            name: name.to_string(),
            url: format!("http://example.com/{}.mp3", name),
            mime_type: Some("audio/mpeg".to_string()),
            duration: None,
            icon_url: None,
            published: None,
        }
    }

    fn station(name: &str, genre: &str) -> RadioStation {
        RadioStation {
            name: name.to_string(),
            url: format!("http://radio.example.com/{}", name),
            mime_type: Some("audio/mpeg".to_string()),
            genre: genre.to_string(),
        }
    }

    #[tokio::test]
    async fn test_store_podcast_reports_changes() {
        let cache = FeedCache::new();
        let key = FeedKey::Podcast("http://example.com/feed".to_string());
        assert!(cache.list_entries(&key).await.is_empty());

        assert!(cache.store_podcast("http://example.com/feed", vec![entry("a")]).await);
        assert!(!cache.store_podcast("http://example.com/feed", vec![entry("a")]).await);
        assert!(cache.store_podcast("http://example.com/feed", vec![entry("a"), entry("b")]).await);

        assert_eq!(cache.list_entries(&key).await.len(), 2);
    }

    #[tokio::test]
    async fn test_clean_up_bounds_snapshots() {
        let cache = FeedCache::with_limits(Duration::from_secs(3600), 3);
        for i in 0..5 {
            cache.store_podcast(&format!("http://example.com/{}", i), vec![entry("a")]).await;
        }

        assert!(cache.clean_up().await <= 3);
        assert!(cache.podcast_count().await <= 3);
    }

    #[tokio::test]
    async fn test_snapshots_expire() {
        let cache = FeedCache::with_limits(Duration::from_millis(50), 10);
        let key = FeedKey::Podcast("http://example.com/feed".to_string());
        cache.store_podcast("http://example.com/feed", vec![entry("a")]).await;
        assert!(cache.has_podcast("http://example.com/feed").await);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.list_entries(&key).await.is_empty());
        assert_eq!(cache.clean_up().await, 0);

        // An expired snapshot counts as a change when stored again
        assert!(cache.store_podcast("http://example.com/feed", vec![entry("a")]).await);
    }

    #[tokio::test]
    async fn test_remove_podcast() {
        let cache = FeedCache::new();
        cache.store_podcast("http://example.com/feed", vec![entry("a")]).await;
        assert!(cache.remove_podcast("http://example.com/feed").await);
        assert!(!cache.remove_podcast("http://example.com/feed").await);
        assert!(!cache.has_podcast("http://example.com/feed").await);
    }

    #[tokio::test]
    async fn test_radio_genre_listing() {
        let cache = FeedCache::new();
        assert!(!cache.is_radio_loaded().await);

        cache
            .load_radio_directory(vec![
                station("one", "Rock Pop"),
                station("two", "jazz"),
                station("three", "classic rock"),
            ])
            .await;
        assert!(cache.is_radio_loaded().await);

        let rock = cache.list_entries(&FeedKey::RadioGenre("rock".to_string())).await;
        let names: Vec<&str> = rock.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["one", "three"]);

        cache.clear_radio_directory().await;
        assert!(!cache.is_radio_loaded().await);
        assert!(cache.list_entries(&FeedKey::RadioGenre("rock".to_string())).await.is_empty());
    }
}
