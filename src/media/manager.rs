use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dao::MediaDao;
use super::mime::MimeTypeManager;
use super::node::Node;
use super::root::RootNode;
use crate::config::ConfigManager;

/// Folder nesting bound of the scan walk, guards against symlink loops
const MAX_SCAN_DEPTH: usize = 64;

/// Children lookup of a node, filtered by what the client can play
#[derive(Debug, Clone, Default)]
pub struct MediaSearchRequest {
    pub parent_id: String,
    /// Mime types accepted by the client; empty means no filtering
    pub available_mime_types: Vec<String>,
}

impl MediaSearchRequest {
    pub fn new(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            available_mime_types: Vec::new(),
        }
    }

    pub fn with_mime_types(mut self, available_mime_types: Vec<String>) -> Self {
        self.available_mime_types = available_mime_types;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEventKind {
    ScanNode,
    ScanAll,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEvent {
    pub kind: MediaEventKind,
    pub parameter: Option<String>,
}

impl MediaEvent {
    pub fn scan_node(id: impl Into<String>) -> Self {
        Self {
            kind: MediaEventKind::ScanNode,
            parameter: Some(id.into()),
        }
    }

    pub fn scan_all() -> Self {
        Self {
            kind: MediaEventKind::ScanAll,
            parameter: None,
        }
    }
}

/// Entry point of the protocol front ends into the content tree
pub struct MediaManager {
    dao: MediaDao,
    mime_types: Arc<MimeTypeManager>,
    config: Arc<ConfigManager>,
    base_url: String,
}

impl MediaManager {
    /// `base_url` is the advertised server address, e.g. `http://192.168.1.10:8080`
    pub fn new(
        dao: MediaDao,
        mime_types: Arc<MimeTypeManager>,
        config: Arc<ConfigManager>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            dao,
            mime_types,
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dao(&self) -> &MediaDao {
        &self.dao
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_node(&self, id: &str) -> Option<Node> {
        if id.is_empty() {
            return None;
        }

        match RootNode::from_id(id) {
            RootNode::None => self.dao.get_node(id).await,
            root => Some(Node::folder(
                root.id(),
                root.parent_id(),
                &self.config.root_label(root).await,
            )),
        }
    }

    pub fn get_node_url(&self, node: &Node) -> String {
        format!("{}/content?id={}", self.base_url, node.id())
    }

    pub async fn search_child_nodes(&self, request: &MediaSearchRequest) -> Vec<Node> {
        let root = RootNode::from_id(&request.parent_id);

        let mut nodes = match root {
            RootNode::Root => {
                let mut nodes = Vec::new();
                for sub_root in RootNode::sub_roots() {
                    // Empty categories are hidden
                    if !self.dao.get_root_node_children(*sub_root).await.is_empty() {
                        nodes.push(Node::folder(
                            sub_root.id(),
                            RootNode::Root.id(),
                            &self.config.root_label(*sub_root).await,
                        ));
                    }
                }
                nodes
            }
            _ if root.is_sub_root() => self.dao.get_root_node_children(root).await,
            _ => self.dao.get_child_nodes(&request.parent_id).await,
        };

        nodes.retain(|node| {
            node.mime_type().map_or(true, |mime_type| {
                self.mime_types
                    .is_mime_type_compliant(Some(mime_type), &request.available_mime_types)
            })
        });

        // Category roots keep their fixed order
        if root != RootNode::Root {
            nodes.sort_by(Node::display_cmp);
        }
        nodes
    }

    pub async fn clean_up_cache(&self) -> usize {
        self.dao.clean_up_cache().await
    }

    pub async fn handle_media_event(&self, event: &MediaEvent) {
        match (&event.kind, event.parameter.as_deref()) {
            (MediaEventKind::ScanNode, Some(id)) => {
                let scanned = self.scan_node(id).await;
                debug!("Scanned {} nodes below {}", scanned, id);
            }
            (MediaEventKind::ScanAll, _) => {
                let scanned = self.scan_all().await;
                info!("Media scan complete: {} nodes", scanned);
            }
            _ => error!("Unknown media event {:?}", event),
        }
    }

    /// Walk the subtree of a folder node so every descendant gets indexed.
    /// Returns the number of visited descendants.
    pub async fn scan_node(&self, id: &str) -> usize {
        match self.get_node(id).await {
            Some(node) if node.is_folder() => {}
            _ => return 0,
        }

        let mut visited = 0;
        let mut stack = vec![(id.to_string(), 0usize)];

        while let Some((current, depth)) = stack.pop() {
            for child in self.search_child_nodes(&MediaSearchRequest::new(current.clone())).await {
                visited += 1;
                if !child.is_folder() {
                    continue;
                }
                if depth + 1 < MAX_SCAN_DEPTH {
                    stack.push((child.id().to_string(), depth + 1));
                } else {
                    warn!("Scan depth limit reached below {}", current);
                }
            }
        }

        visited
    }

    pub async fn scan_all(&self) -> usize {
        self.scan_node(RootNode::Root.id()).await
    }
}

/// Handle media events until the channel closes
pub fn spawn_event_listener(
    manager: Arc<MediaManager>,
    mut receiver: broadcast::Receiver<MediaEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => manager.handle_media_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Media manager missed {} media events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, FolderConfig};
    use crate::feed::FeedCache;
    use crate::media::index::MediaIndex;
    use std::path::Path;
    use tempfile::TempDir;

    async fn manager_with(configure: impl FnOnce(&mut AppConfig, &Path)) -> (TempDir, Arc<ConfigManager>, MediaManager) {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();

        let mut config = AppConfig::default();
        configure(&mut config, &media);
        let config = Arc::new(ConfigManager::with_config(dir.path().join("config.toml"), config).unwrap());

        let mime_types = Arc::new(MimeTypeManager::new());
        let dao = MediaDao::new(
            Arc::new(MediaIndex::new()),
            config.clone(),
            mime_types.clone(),
            Arc::new(FeedCache::new()),
        );
        let manager = MediaManager::new(dao, mime_types, config.clone(), "http://10.0.0.2:8080/");
        (dir, config, manager)
    }

    fn video_folder(config: &mut AppConfig, media: &Path) {
        config.media.video.push(FolderConfig {
            id: "cfg-1".to_string(),
            label: "Movies".to_string(),
            path: media.to_string_lossy().to_string(),
        });
    }

    #[tokio::test]
    async fn test_virtual_roots_are_synthesized() {
        let (_dir, _config, manager) = manager_with(|config, _| {
            config.labels.insert("1_VIDEOS".to_string(), "Films".to_string());
        })
        .await;

        let root = manager.get_node("0").await.unwrap();
        assert_eq!(root.parent_id(), "-1");
        assert_eq!(root.name(), "Root");

        let videos = manager.get_node("1_VIDEOS").await.unwrap();
        assert_eq!(videos.name(), "Films");
        assert_eq!(videos.parent_id(), "0");

        assert!(manager.get_node("").await.is_none());
        assert!(manager.get_node("unknown").await.is_none());
        assert!(manager.dao().index().is_empty().await);
    }

    #[tokio::test]
    async fn test_node_url() {
        let (_dir, _config, manager) = manager_with(|_, _| {}).await;
        let node = Node::folder("abc", "0", "x");
        assert_eq!(manager.get_node_url(&node), "http://10.0.0.2:8080/content?id=abc");
    }

    #[tokio::test]
    async fn test_root_hides_empty_categories() {
        let (_dir, config, manager) = manager_with(|_, _| {}).await;
        assert!(manager.search_child_nodes(&MediaSearchRequest::new("0")).await.is_empty());

        config.add_folder(RootNode::Audio, "Music", "/music").await.unwrap();
        let nodes = manager.search_child_nodes(&MediaSearchRequest::new("0")).await;
        let ids: Vec<&str> = nodes.iter().map(Node::id).collect();
        assert_eq!(ids, vec!["3_AUDIOS"]);
    }

    #[tokio::test]
    async fn test_mime_filter_keeps_folders() {
        let (dir, _config, manager) = manager_with(video_folder).await;
        let media = dir.path().join("media");
        std::fs::write(media.join("a.mp4"), b"a").unwrap();
        std::fs::write(media.join("b.avi"), b"b").unwrap();
        std::fs::create_dir(media.join("zz")).unwrap();

        manager.search_child_nodes(&MediaSearchRequest::new("1_VIDEOS")).await;

        let all = manager.search_child_nodes(&MediaSearchRequest::new("cfg-1")).await;
        let names: Vec<&str> = all.iter().map(Node::name).collect();
        assert_eq!(names, vec!["zz", "a.mp4", "b.avi"]);

        let request = MediaSearchRequest::new("cfg-1").with_mime_types(vec!["video/mp4".to_string()]);
        let filtered = manager.search_child_nodes(&request).await;
        let names: Vec<&str> = filtered.iter().map(Node::name).collect();
        assert_eq!(names, vec!["zz", "a.mp4"]);

        // Folders survive even when nothing is playable
        let request = MediaSearchRequest::new("cfg-1").with_mime_types(vec!["audio/mpeg".to_string()]);
        let filtered = manager.search_child_nodes(&request).await;
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].is_folder());
    }

    #[tokio::test]
    async fn test_scan_indexes_whole_tree() {
        let (dir, _config, manager) = manager_with(video_folder).await;
        let media = dir.path().join("media");
        std::fs::create_dir_all(media.join("a/b/c")).unwrap();
        std::fs::write(media.join("a/b/c/deep.mp4"), b"x").unwrap();
        std::fs::write(media.join("top.mp4"), b"x").unwrap();

        manager.handle_media_event(&MediaEvent::scan_all()).await;

        // cfg-1, top.mp4, a, a/b, a/b/c, deep.mp4
        assert_eq!(manager.dao().index().len().await, 6);
    }

    #[tokio::test]
    async fn test_scan_node_ignores_unknown_and_leaf_nodes() {
        let (dir, _config, manager) = manager_with(video_folder).await;
        std::fs::write(dir.path().join("media/top.mp4"), b"x").unwrap();

        assert_eq!(manager.scan_node("missing").await, 0);
        manager
            .handle_media_event(&MediaEvent {
                kind: MediaEventKind::Unknown("reindex".to_string()),
                parameter: None,
            })
            .await;
        assert!(manager.dao().index().is_empty().await);

        assert_eq!(manager.scan_node("1_VIDEOS").await, 2);
        let file = manager
            .search_child_nodes(&MediaSearchRequest::new("cfg-1"))
            .await
            .remove(0);
        assert_eq!(manager.scan_node(file.id()).await, 0);
    }
}
