use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::index::{IndexElement, MediaIndex, MediaType};
use super::mime::{MimeType, MimeTypeManager};
use super::node::{ContentNode, FolderNode, Node, RawUrlKind, RawUrlNode};
use super::root::RootNode;
use crate::config::ConfigManager;
use crate::feed::{FeedKey, FeedProvider, RawEntry};

const RADIO_GENRE_ID_PREFIX: &str = "radio_genre_";

/// Index id of a radio genre container
pub fn radio_genre_id(genre: &str) -> String {
    format!("{}{}", RADIO_GENRE_ID_PREFIX, genre.trim().replace(' ', "_"))
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn modified(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Resolves index ids into nodes by inspecting the filesystem and the feed snapshots.
/// Children are registered in the media index the first time they are listed.
pub struct MediaDao {
    index: Arc<MediaIndex>,
    config: Arc<ConfigManager>,
    mime_types: Arc<MimeTypeManager>,
    feeds: Arc<dyn FeedProvider>,
}

impl MediaDao {
    pub fn new(
        index: Arc<MediaIndex>,
        config: Arc<ConfigManager>,
        mime_types: Arc<MimeTypeManager>,
        feeds: Arc<dyn FeedProvider>,
    ) -> Self {
        Self {
            index,
            config,
            mime_types,
            feeds,
        }
    }

    pub fn index(&self) -> &Arc<MediaIndex> {
        &self.index
    }

    pub async fn get_node(&self, id: &str) -> Option<Node> {
        let Some(element) = self.index.get(id).await else {
            debug!("[get_node] {} not found in media index", id);
            return None;
        };

        match element.media_type {
            MediaType::Podcast => Some(Node::folder(
                id,
                &element.parent_id,
                element.name.as_deref().unwrap_or(&element.path),
            )),
            MediaType::Radio => Some(Node::folder(
                id,
                &element.parent_id,
                &capitalize(element.name.as_deref().unwrap_or(&element.path)),
            )),
            _ if !element.local_path => Some(self.raw_url_node(id, &element).await),
            media_type => self.file_node(id, &element, media_type).await,
        }
    }

    pub async fn get_child_nodes(&self, parent_id: &str) -> Vec<Node> {
        let Some(element) = self.index.get(parent_id).await else {
            debug!("[get_child_nodes] {} not found in media index", parent_id);
            return Vec::new();
        };

        match element.media_type {
            MediaType::Podcast => self.podcast_entries(parent_id, &element.path).await,
            MediaType::Radio => self.radio_entries(parent_id, &element.path).await,
            MediaType::RawUrl => Vec::new(),
            _ if !element.local_path => Vec::new(),
            media_type => self.folder_children(parent_id, &element.path, media_type).await,
        }
    }

    /// Children of a category root, seeding the index with locked elements keyed by
    /// configuration ids
    pub async fn get_root_node_children(&self, root: RootNode) -> Vec<Node> {
        match root {
            RootNode::Radio => self.radio_genres().await,
            RootNode::Root | RootNode::None => Vec::new(),
            _ => {
                let mut nodes = Vec::new();
                for folder in self.config.folders(root).await {
                    self.index
                        .put(&folder.id, IndexElement::configured(root, &folder))
                        .await;

                    // Missing folders stay visible; listing them yields nothing
                    let modified = if root.is_local_path() {
                        tokio::fs::metadata(&folder.path)
                            .await
                            .ok()
                            .and_then(|metadata| modified(&metadata))
                    } else {
                        None
                    };

                    nodes.push(Node::Folder(FolderNode {
                        id: folder.id.clone(),
                        parent_id: root.id().to_string(),
                        name: folder.label.clone(),
                        modified,
                        icon_url: None,
                    }));
                }
                nodes
            }
        }
    }

    /// Staleness sweep of the media index
    pub async fn clean_up_cache(&self) -> usize {
        self.index.clean().await
    }

    async fn file_node(&self, id: &str, element: &IndexElement, media_type: MediaType) -> Option<Node> {
        let path = Path::new(&element.path);
        let name = file_name(path);
        if !element.locked && is_hidden(&name) {
            return None;
        }

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if element.locked => {
                // Configured folders stay browsable while their path is missing
                debug!("[get_node] configured folder {} is not readable: {}", element.path, e);
                return Some(Node::Folder(FolderNode {
                    id: id.to_string(),
                    parent_id: element.parent_id.clone(),
                    name: element.name.clone().unwrap_or(name),
                    modified: None,
                    icon_url: None,
                }));
            }
            Err(e) => {
                debug!("[get_node] {} is not readable: {}", element.path, e);
                return None;
            }
        };

        if metadata.is_dir() {
            let name = element.name.clone().unwrap_or(name);
            Some(Node::Folder(FolderNode {
                id: id.to_string(),
                parent_id: element.parent_id.clone(),
                name,
                modified: modified(&metadata),
                icon_url: None,
            }))
        } else if metadata.is_file() {
            let mime_type = self.mime_types.get_mime_type(&name)?;
            self.content_node(id, &element.parent_id, path, name, &metadata, media_type, mime_type)
        } else {
            None
        }
    }

    async fn raw_url_node(&self, id: &str, element: &IndexElement) -> Node {
        let kind = match self.index.get(&element.parent_id).await.map(|parent| parent.media_type) {
            Some(MediaType::Podcast) => RawUrlKind::PodcastEntry,
            Some(MediaType::Radio) => RawUrlKind::RadioStation,
            _ => RawUrlKind::Unknown,
        };

        Node::RawUrl(RawUrlNode {
            id: id.to_string(),
            parent_id: element.parent_id.clone(),
            name: element.name.clone().unwrap_or_else(|| element.path.clone()),
            kind,
            mime_type: element.mime_type.as_deref().map(MimeType::parse),
            url: element.path.clone(),
            duration: None,
            icon_url: None,
            modified: None,
        })
    }

    /// Content node for a file, or `None` when its mime type belongs to another category
    #[allow(clippy::too_many_arguments)]
    fn content_node(
        &self,
        id: &str,
        parent_id: &str,
        path: &Path,
        name: String,
        metadata: &Metadata,
        media_type: MediaType,
        mime_type: MimeType,
    ) -> Option<Node> {
        if mime_type.media_type() != media_type && !mime_type.is_subtitle() {
            return None;
        }

        Some(Node::Content(ContentNode {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            name,
            mime_type,
            size: metadata.len(),
            path: path.to_string_lossy().to_string(),
            modified: modified(metadata),
        }))
    }

    async fn folder_children(&self, parent_id: &str, path: &str, media_type: MediaType) -> Vec<Node> {
        let mut nodes = Vec::new();

        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                debug!("{} is not a listable folder: {}", path, e);
                return nodes;
            }
            Err(e) => {
                warn!("Failed to list folder {}: {}", path, e);
                return nodes;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read entry of {}: {}", path, e);
                    break;
                }
            };

            let child_path = entry.path();
            let name = file_name(&child_path);
            if is_hidden(&name) {
                continue;
            }

            // Follows symlinks; unreadable entries are skipped
            let Ok(metadata) = tokio::fs::metadata(&child_path).await else {
                continue;
            };
            let child_path_str = child_path.to_string_lossy().to_string();

            if metadata.is_dir() {
                let id = self
                    .index
                    .add(IndexElement::discovered(parent_id, media_type, None, child_path_str, None, true))
                    .await;
                nodes.push(Node::Folder(FolderNode {
                    id,
                    parent_id: parent_id.to_string(),
                    name,
                    modified: modified(&metadata),
                    icon_url: None,
                }));
            } else if metadata.is_file() {
                let Some(mime_type) = self.mime_types.get_mime_type(&name) else {
                    continue;
                };
                if mime_type.media_type() != media_type && !mime_type.is_subtitle() {
                    continue;
                }

                let id = self
                    .index
                    .add(IndexElement::discovered(
                        parent_id,
                        media_type,
                        Some(mime_type.as_str().to_string()),
                        child_path_str,
                        None,
                        true,
                    ))
                    .await;
                if let Some(node) =
                    self.content_node(&id, parent_id, &child_path, name, &metadata, media_type, mime_type)
                {
                    nodes.push(node);
                }
            }
        }

        nodes
    }

    fn entry_mime_type(&self, entry: &RawEntry) -> Option<MimeType> {
        entry
            .mime_type
            .as_deref()
            .filter(|mime| !mime.is_empty())
            .map(MimeType::parse)
            .or_else(|| {
                let path = entry.url.split(['?', '#']).next().unwrap_or(&entry.url);
                self.mime_types.get_mime_type(path)
            })
    }

    async fn podcast_entries(&self, parent_id: &str, url: &str) -> Vec<Node> {
        let entries: Vec<(RawEntry, MimeType)> = self
            .feeds
            .list_entries(&FeedKey::Podcast(url.to_string()))
            .await
            .into_iter()
            .filter_map(|entry| {
                let mime_type = self.entry_mime_type(&entry)?;
                mime_type.is_media().then_some((entry, mime_type))
            })
            .collect();

        let prepend_number = self.config.parameters().await.prepend_podcast_entry_number;
        let total = entries.len();
        let mut nodes = Vec::with_capacity(total);

        for (position, (entry, mime_type)) in entries.into_iter().enumerate() {
            let id = self
                .index
                .add(IndexElement::discovered(
                    parent_id,
                    MediaType::RawUrl,
                    Some(mime_type.as_str().to_string()),
                    entry.url.clone(),
                    Some(entry.name.clone()),
                    false,
                ))
                .await;

            let name = match (prepend_number, total > 99) {
                (false, _) => entry.name,
                (true, false) => format!("{:02} - {}", position + 1, entry.name),
                (true, true) => format!("{:03} - {}", position + 1, entry.name),
            };

            nodes.push(Node::RawUrl(RawUrlNode {
                id,
                parent_id: parent_id.to_string(),
                name,
                kind: RawUrlKind::PodcastEntry,
                mime_type: Some(mime_type),
                url: entry.url,
                duration: entry.duration,
                icon_url: entry.icon_url,
                modified: entry.published,
            }));
        }

        nodes
    }

    async fn radio_entries(&self, parent_id: &str, genre: &str) -> Vec<Node> {
        let mut nodes = Vec::new();
        for entry in self.feeds.list_entries(&FeedKey::RadioGenre(genre.to_string())).await {
            let mime_type = entry.mime_type.as_deref().filter(|mime| !mime.is_empty()).map(MimeType::parse);
            let id = self
                .index
                .add(IndexElement::discovered(
                    parent_id,
                    MediaType::RawUrl,
                    mime_type.as_ref().map(|mime| mime.as_str().to_string()),
                    entry.url.clone(),
                    Some(entry.name.clone()),
                    false,
                ))
                .await;

            nodes.push(Node::RawUrl(RawUrlNode {
                id,
                parent_id: parent_id.to_string(),
                name: entry.name,
                kind: RawUrlKind::RadioStation,
                mime_type,
                url: entry.url,
                duration: None,
                icon_url: entry.icon_url,
                modified: None,
            }));
        }
        nodes
    }

    async fn radio_genres(&self) -> Vec<Node> {
        let radio = self.config.radio().await;
        if !radio.enabled || !self.feeds.is_radio_loaded().await {
            return Vec::new();
        }

        let mut nodes = Vec::new();
        for genre in radio.genres.iter().map(|genre| genre.trim()).filter(|genre| !genre.is_empty()) {
            let id = radio_genre_id(genre);
            self.index
                .put(
                    &id,
                    IndexElement {
                        parent_id: RootNode::Radio.id().to_string(),
                        media_type: MediaType::Radio,
                        mime_type: None,
                        path: genre.to_string(),
                        name: Some(genre.to_string()),
                        local_path: false,
                        locked: true,
                    },
                )
                .await;
            nodes.push(Node::folder(&id, RootNode::Radio.id(), &capitalize(genre)));
        }
        nodes
    }
}
