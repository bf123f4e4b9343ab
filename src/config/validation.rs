use anyhow::{anyhow, Context, Result};
use std::{collections::HashSet, net::IpAddr, path::Path};

use super::{AppConfig, FolderConfig};
use crate::media::root::RootNode;

/// Configuration validator for ensuring configuration integrity
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Self::validate_server_config(config)?;
        Self::validate_media_config(config)?;
        Self::validate_radio_config(config)?;
        Self::validate_labels(config)?;
        Ok(())
    }

    /// Validate server configuration
    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        if config.server.interface != "0.0.0.0" && config.server.interface != "::" {
            config
                .server
                .interface
                .parse::<IpAddr>()
                .with_context(|| format!("Invalid server interface address: {}", config.server.interface))?;
        }

        if config.server.name.trim().is_empty() {
            return Err(anyhow!("Server name cannot be empty"));
        }

        // Basic UUID shape check
        if config.server.uuid.len() != 36 || config.server.uuid.chars().filter(|&c| c == '-').count() != 4 {
            return Err(anyhow!("Invalid UUID format: {}", config.server.uuid));
        }

        Ok(())
    }

    /// Validate configured folders of every category
    fn validate_media_config(config: &AppConfig) -> Result<()> {
        let mut seen_ids = HashSet::new();

        for root in RootNode::folder_roots() {
            for folder in config.media.folders(*root) {
                Self::validate_folder(*root, folder)?;

                // Folder ids become media index keys, they must be unique across categories
                if !seen_ids.insert(folder.id.as_str()) {
                    return Err(anyhow!("Duplicate folder id: {}", folder.id));
                }
                if RootNode::is_virtual_id(&folder.id) {
                    return Err(anyhow!("Folder id collides with a root node id: {}", folder.id));
                }
            }
        }

        Ok(())
    }

    fn validate_folder(root: RootNode, folder: &FolderConfig) -> Result<()> {
        if folder.id.trim().is_empty() {
            return Err(anyhow!("Folder id cannot be empty ({})", folder.path));
        }
        if folder.label.trim().is_empty() {
            return Err(anyhow!("Folder label cannot be empty: {}", folder.id));
        }
        if folder.path.trim().is_empty() {
            return Err(anyhow!("Folder path cannot be empty: {}", folder.id));
        }

        if root.is_local_path() {
            if folder.path.contains('\0') {
                return Err(anyhow!("Folder path contains null bytes: {}", folder.id));
            }
            if !Path::new(&folder.path).is_absolute() {
                tracing::warn!(
                    "Folder {} uses a relative path ({}); it resolves against the working directory",
                    folder.id,
                    folder.path
                );
            }
        } else if !(folder.path.starts_with("http://") || folder.path.starts_with("https://")) {
            return Err(anyhow!("Podcast folder {} must be an http(s) URL: {}", folder.id, folder.path));
        }

        Ok(())
    }

    /// Validate internet radio settings
    fn validate_radio_config(config: &AppConfig) -> Result<()> {
        if !config.radio.enabled {
            return Ok(());
        }

        if config.radio.genres.iter().all(|genre| genre.trim().is_empty()) {
            return Err(anyhow!("Radio is enabled but no genre is configured"));
        }

        if !(config.radio.directory_url.starts_with("http://")
            || config.radio.directory_url.starts_with("https://"))
        {
            return Err(anyhow!("Invalid radio directory URL: {}", config.radio.directory_url));
        }

        if config.radio.refresh_delay_hours == 0 {
            return Err(anyhow!("Radio refresh delay must be greater than 0 hours"));
        }

        Ok(())
    }

    fn validate_labels(config: &AppConfig) -> Result<()> {
        for (id, label) in &config.labels {
            if RootNode::from_id(id) == RootNode::None {
                return Err(anyhow!("Label override for unknown root node: {}", id));
            }
            if label.trim().is_empty() {
                return Err(anyhow!("Label override for {} cannot be empty", id));
            }
        }
        Ok(())
    }
}
