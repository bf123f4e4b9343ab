use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

pub mod validation;
pub mod watcher;

use crate::media::root::RootNode;
use validation::ConfigValidator;

const CONFIG_DIR_NAME: &str = "medialink";
const CONFIG_FILE_NAME: &str = "config.toml";

fn default_true() -> bool {
    true
}

/// Main application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub parameters: ParametersConfig,
    /// Display name overrides for the virtual root nodes, keyed by root id
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Server configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub interface: String,
    pub name: String,
    pub uuid: String,
}

/// Configured root folders, one ordered list per media category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default)]
    pub video: Vec<FolderConfig>,
    #[serde(default)]
    pub audio: Vec<FolderConfig>,
    #[serde(default)]
    pub picture: Vec<FolderConfig>,
    #[serde(default)]
    pub podcast: Vec<FolderConfig>,
}

/// A user-defined root folder. `path` is a filesystem path, or a feed URL for podcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfig {
    pub id: String,
    pub label: String,
    pub path: String,
}

/// Internet radio directory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    pub enabled: bool,
    pub genres: Vec<String>,
    pub directory_url: String,
    pub refresh_delay_hours: u64,
}

/// Scalar parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersConfig {
    #[serde(default)]
    pub prepend_podcast_entry_number: bool,
    pub media_index_clean_delay_minutes: u64,
    pub media_scan_all_delay_minutes: u64,
    pub feed_refresh_delay_minutes: u64,
    pub feed_cache_clean_delay_minutes: u64,
    pub podcast_cache_expire_hours: u64,
    pub podcast_cache_max_elements: usize,
    #[serde(default = "default_true")]
    pub watch_config_file: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            genres: [
                "alternative", "blues", "classical", "country", "electronic", "jazz", "metal",
                "news", "pop", "rock", "talk",
            ]
            .iter()
            .map(|genre| genre.to_string())
            .collect(),
            directory_url: "http://dir.xiph.org/yp.xml".to_string(),
            refresh_delay_hours: 24,
        }
    }
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            prepend_podcast_entry_number: false,
            media_index_clean_delay_minutes: 15,
            media_scan_all_delay_minutes: 0,
            feed_refresh_delay_minutes: 60,
            feed_cache_clean_delay_minutes: 60,
            podcast_cache_expire_hours: 24,
            podcast_cache_max_elements: 50,
            watch_config_file: true,
        }
    }
}

impl MediaConfig {
    /// Folders configured for a category root; empty for the virtual roots without folders
    pub fn folders(&self, root: RootNode) -> &[FolderConfig] {
        match root {
            RootNode::Video => &self.video,
            RootNode::Audio => &self.audio,
            RootNode::Picture => &self.picture,
            RootNode::Podcast => &self.podcast,
            RootNode::Root | RootNode::Radio | RootNode::None => &[],
        }
    }

    fn folders_mut(&mut self, root: RootNode) -> Option<&mut Vec<FolderConfig>> {
        match root {
            RootNode::Video => Some(&mut self.video),
            RootNode::Audio => Some(&mut self.audio),
            RootNode::Picture => Some(&mut self.picture),
            RootNode::Podcast => Some(&mut self.podcast),
            RootNode::Root | RootNode::Radio | RootNode::None => None,
        }
    }

    /// Find a folder by id across all categories
    pub fn find_folder(&self, id: &str) -> Option<(RootNode, &FolderConfig)> {
        RootNode::folder_roots().iter().find_map(|root| {
            self.folders(*root)
                .iter()
                .find(|folder| folder.id == id)
                .map(|folder| (*root, folder))
        })
    }
}

impl AppConfig {
    /// Default location of the configuration file
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration from file or create with defaults
    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let default_config = Self::default();
            default_config.save_to_file(config_path).with_context(|| {
                format!("Failed to create default configuration file at: {}", config_path.display())
            })?;

            tracing::info!("Created default configuration file at: {}", config_path.display());
            Ok(default_config)
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let content = std::fs::read_to_string(config_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", config_path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.as_ref().display()))?;

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let mut content = String::from("# MediaLink Server Configuration\n\n");
        content.push_str(
            &toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?,
        );

        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Display name of a virtual root, honouring `[labels]` overrides
    pub fn root_label(&self, root: RootNode) -> String {
        self.labels
            .get(root.id())
            .cloned()
            .unwrap_or_else(|| root.default_label().to_string())
    }

    fn server_name() -> String {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "Unknown".to_string());
        format!("MediaLink ({})", hostname)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                interface: "0.0.0.0".to_string(),
                name: Self::server_name(),
                uuid: Uuid::new_v4().to_string(),
            },
            media: MediaConfig::default(),
            radio: RadioConfig::default(),
            parameters: ParametersConfig::default(),
            labels: BTreeMap::new(),
        }
    }
}

/// Configuration change event, delivered to the media index and the feed refresher
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    FolderAdded {
        root: RootNode,
        folder: FolderConfig,
    },
    FolderUpdated {
        root: RootNode,
        old_id: String,
        folder: FolderConfig,
    },
    FolderRemoved {
        root: RootNode,
        folder: FolderConfig,
    },
    /// Anything outside the folder lists changed
    SettingsChanged,
}

/// Compute the events that turn `old` into `new`. Folders are matched by id.
pub fn diff_configs(old: &AppConfig, new: &AppConfig) -> Vec<ConfigEvent> {
    let mut events = Vec::new();

    for root in RootNode::folder_roots() {
        let old_folders = old.media.folders(*root);
        let new_folders = new.media.folders(*root);

        for folder in old_folders {
            if !new_folders.iter().any(|f| f.id == folder.id) {
                events.push(ConfigEvent::FolderRemoved {
                    root: *root,
                    folder: folder.clone(),
                });
            }
        }

        for folder in new_folders {
            match old_folders.iter().find(|f| f.id == folder.id) {
                None => events.push(ConfigEvent::FolderAdded {
                    root: *root,
                    folder: folder.clone(),
                }),
                Some(previous) if previous != folder => events.push(ConfigEvent::FolderUpdated {
                    root: *root,
                    old_id: previous.id.clone(),
                    folder: folder.clone(),
                }),
                Some(_) => {}
            }
        }
    }

    if old.server != new.server
        || old.radio != new.radio
        || old.parameters != new.parameters
        || old.labels != new.labels
    {
        events.push(ConfigEvent::SettingsChanged);
    }

    events
}

/// Configuration manager for handling runtime configuration operations
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
    change_sender: broadcast::Sender<ConfigEvent>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = AppConfig::load_or_create(&config_path)?;
        Ok(Self::from_parts(config, config_path, None))
    }

    /// Create a configuration manager around an explicit configuration, persisting it first
    pub fn with_config<P: AsRef<Path>>(config_path: P, config: AppConfig) -> Result<Self> {
        ConfigValidator::validate(&config)?;
        let config_path = config_path.as_ref().to_path_buf();
        config.save_to_file(&config_path)?;
        Ok(Self::from_parts(config, config_path, None))
    }

    /// Create a new configuration manager with file watching enabled
    pub async fn new_with_watching<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = AppConfig::load_or_create(&config_path)?;
        let mut manager = Self::from_parts(config, config_path, None);

        let watcher = watcher::watch_config_file(
            manager.config_path.clone(),
            manager.config.clone(),
            manager.change_sender.clone(),
        )?;
        manager._watcher = Some(watcher);

        Ok(manager)
    }

    fn from_parts(
        config: AppConfig,
        config_path: PathBuf,
        watcher: Option<notify::RecommendedWatcher>,
    ) -> Self {
        let (change_sender, _) = broadcast::channel(100);
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            change_sender,
            _watcher: watcher,
        }
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Ordered folder list of a category
    pub async fn folders(&self, root: RootNode) -> Vec<FolderConfig> {
        self.config.read().await.media.folders(root).to_vec()
    }

    /// Scalar parameters snapshot
    pub async fn parameters(&self) -> ParametersConfig {
        self.config.read().await.parameters.clone()
    }

    /// Radio settings snapshot
    pub async fn radio(&self) -> RadioConfig {
        self.config.read().await.radio.clone()
    }

    /// Display name of a virtual root
    pub async fn root_label(&self, root: RootNode) -> String {
        self.config.read().await.root_label(root)
    }

    /// Add a folder to a category and notify subscribers
    pub async fn add_folder(&self, root: RootNode, label: &str, path: &str) -> Result<FolderConfig> {
        let folder = FolderConfig {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            path: path.to_string(),
        };

        let added = folder.clone();
        self.mutate(move |config| {
            let folders = config
                .media
                .folders_mut(root)
                .ok_or_else(|| anyhow!("{:?} does not hold configured folders", root))?;
            if folders.iter().any(|f| f.path == added.path) {
                anyhow::bail!("Folder already configured: {}", added.path);
            }
            folders.push(added);
            Ok(())
        })
        .await?;

        Ok(folder)
    }

    /// Change label and path of a configured folder, keeping its id
    pub async fn update_folder(
        &self,
        root: RootNode,
        id: &str,
        label: &str,
        path: &str,
    ) -> Result<FolderConfig> {
        let updated = FolderConfig {
            id: id.to_string(),
            label: label.to_string(),
            path: path.to_string(),
        };

        let replacement = updated.clone();
        self.mutate(move |config| {
            let folder = config
                .media
                .folders_mut(root)
                .and_then(|folders| folders.iter_mut().find(|f| f.id == replacement.id))
                .ok_or_else(|| anyhow!("Unknown folder: {}", replacement.id))?;
            *folder = replacement;
            Ok(())
        })
        .await?;

        Ok(updated)
    }

    /// Remove a configured folder
    pub async fn remove_folder(&self, root: RootNode, id: &str) -> Result<FolderConfig> {
        let current = self.config.read().await.clone();
        let removed = current
            .media
            .folders(root)
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown folder: {}", id))?;

        let id = id.to_string();
        self.mutate(move |config| {
            if let Some(folders) = config.media.folders_mut(root) {
                folders.retain(|f| f.id != id);
            }
            Ok(())
        })
        .await?;

        Ok(removed)
    }

    /// Update the configuration and save to file
    pub async fn update_config(&self, new_config: AppConfig) -> Result<()> {
        ConfigValidator::validate(&new_config)?;
        new_config.save_to_file(&self.config_path)?;

        let old_config = {
            let mut config_guard = self.config.write().await;
            std::mem::replace(&mut *config_guard, new_config.clone())
        };

        self.send_change_notifications(&old_config, &new_config);
        Ok(())
    }

    /// Reload configuration from file
    pub async fn reload(&self) -> Result<()> {
        let new_config = AppConfig::load_from_file(&self.config_path)?;

        let old_config = {
            let mut config_guard = self.config.write().await;
            std::mem::replace(&mut *config_guard, new_config.clone())
        };

        self.send_change_notifications(&old_config, &new_config);
        Ok(())
    }

    /// Get the configuration file path
    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    /// Subscribe to configuration change events
    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<ConfigEvent> {
        self.change_sender.subscribe()
    }

    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig) -> Result<()>,
    {
        let mut config_guard = self.config.write().await;
        let mut new_config = config_guard.clone();
        change(&mut new_config)?;

        ConfigValidator::validate(&new_config)?;
        new_config.save_to_file(&self.config_path)?;

        let old_config = std::mem::replace(&mut *config_guard, new_config.clone());
        drop(config_guard);

        self.send_change_notifications(&old_config, &new_config);
        Ok(())
    }

    fn send_change_notifications(&self, old_config: &AppConfig, new_config: &AppConfig) {
        send_change_notifications(&self.change_sender, old_config, new_config);
    }
}

pub(crate) fn send_change_notifications(
    sender: &broadcast::Sender<ConfigEvent>,
    old_config: &AppConfig,
    new_config: &AppConfig,
) {
    for event in diff_configs(old_config, new_config) {
        tracing::debug!("Configuration event: {:?}", event);
        // No receivers is fine
        let _ = sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn folder(id: &str, path: &str) -> FolderConfig {
        FolderConfig {
            id: id.to_string(),
            label: id.to_uppercase(),
            path: path.to_string(),
        }
    }

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.name.is_empty());
        assert!(config.media.video.is_empty());
        assert!(!config.radio.enabled);
        assert_eq!(config.parameters.media_index_clean_delay_minutes, 15);
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_config_file_operations() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.media.video.push(folder("cfg-1", "/media/videos"));
        config.media.podcast.push(folder("cfg-2", "https://example.com/feed.xml"));
        config.labels.insert("1_VIDEOS".to_string(), "Films".to_string());
        config.save_to_file(&config_path)?;

        let loaded = AppConfig::load_from_file(&config_path)?;
        assert_eq!(loaded, config);
        assert_eq!(loaded.root_label(RootNode::Video), "Films");
        assert_eq!(loaded.root_label(RootNode::Audio), RootNode::Audio.default_label());
        Ok(())
    }

    #[test]
    fn test_load_or_create_writes_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let created = AppConfig::load_or_create(&config_path)?;
        assert!(config_path.exists());

        let loaded = AppConfig::load_or_create(&config_path)?;
        assert_eq!(created, loaded);
        Ok(())
    }

    #[test]
    fn test_diff_configs_by_folder_id() {
        let mut old = AppConfig::default();
        old.media.video.push(folder("a", "/a"));
        old.media.video.push(folder("b", "/b"));
        old.media.audio.push(folder("c", "/c"));

        let mut new = old.clone();
        new.media.video.retain(|f| f.id != "a");
        new.media.video[0].path = "/b2".to_string();
        new.media.picture.push(folder("d", "/d"));

        let events = diff_configs(&old, &new);
        assert_eq!(events.len(), 3);
        assert!(events.contains(&ConfigEvent::FolderRemoved {
            root: RootNode::Video,
            folder: folder("a", "/a"),
        }));
        assert!(events.contains(&ConfigEvent::FolderUpdated {
            root: RootNode::Video,
            old_id: "b".to_string(),
            folder: folder("b", "/b2"),
        }));
        assert!(events.contains(&ConfigEvent::FolderAdded {
            root: RootNode::Picture,
            folder: folder("d", "/d"),
        }));
    }

    #[test]
    fn test_diff_configs_settings_changed() {
        let old = AppConfig::default();
        let mut new = old.clone();
        new.parameters.prepend_podcast_entry_number = true;

        assert_eq!(diff_configs(&old, &new), vec![ConfigEvent::SettingsChanged]);
        assert!(diff_configs(&old, &old).is_empty());
    }

    #[tokio::test]
    async fn test_config_manager_folder_mutations() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        let manager = ConfigManager::new(&config_path)?;
        let mut events = manager.subscribe_to_changes();

        let added = manager.add_folder(RootNode::Video, "Movies", "/media/movies").await?;
        assert_eq!(
            events.recv().await?,
            ConfigEvent::FolderAdded {
                root: RootNode::Video,
                folder: added.clone(),
            }
        );
        assert_eq!(manager.folders(RootNode::Video).await, vec![added.clone()]);

        let updated = manager
            .update_folder(RootNode::Video, &added.id, "Films", "/media/films")
            .await?;
        assert_eq!(
            events.recv().await?,
            ConfigEvent::FolderUpdated {
                root: RootNode::Video,
                old_id: added.id.clone(),
                folder: updated.clone(),
            }
        );

        let removed = manager.remove_folder(RootNode::Video, &added.id).await?;
        assert_eq!(removed, updated);
        assert_eq!(
            events.recv().await?,
            ConfigEvent::FolderRemoved {
                root: RootNode::Video,
                folder: updated,
            }
        );
        assert!(manager.folders(RootNode::Video).await.is_empty());

        // Persisted
        let reloaded = AppConfig::load_from_file(&config_path)?;
        assert!(reloaded.media.video.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_config_manager_rejects_invalid_mutations() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let manager = ConfigManager::new(temp_dir.path().join("config.toml"))?;

        assert!(manager.add_folder(RootNode::Radio, "x", "/x").await.is_err());
        assert!(manager.add_folder(RootNode::Podcast, "feed", "/not/a/url").await.is_err());
        assert!(manager.remove_folder(RootNode::Audio, "missing").await.is_err());
        assert!(manager.get_config().await.media.podcast.is_empty());

        manager.add_folder(RootNode::Audio, "Music", "/music").await?;
        assert!(manager.add_folder(RootNode::Audio, "Again", "/music").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_config_manager_reload_emits_diff() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        let manager = ConfigManager::new(&config_path)?;
        let mut events = manager.subscribe_to_changes();

        let mut edited = manager.get_config().await;
        edited.media.audio.push(folder("music", "/music"));
        edited.save_to_file(&config_path)?;

        manager.reload().await?;
        assert_eq!(
            events.recv().await?,
            ConfigEvent::FolderAdded {
                root: RootNode::Audio,
                folder: folder("music", "/music"),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_config_manager_reload_rejects_invalid_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        let manager = ConfigManager::new(&config_path)?;
        let before = manager.get_config().await;

        let content = std::fs::read_to_string(&config_path)?;
        std::fs::write(&config_path, content.replace(&format!("port = {}", before.server.port), "port = 0"))?;

        assert!(manager.reload().await.is_err());
        assert_eq!(manager.get_config().await, before);
        Ok(())
    }
}
