use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::id::new_id;
use super::root::RootNode;
use crate::config::{ConfigEvent, FolderConfig};

/// Category of an index element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Video,
    Audio,
    Picture,
    Podcast,
    /// Internet radio genre container
    Radio,
    /// Remote playable entry: podcast episode or radio station
    RawUrl,
    Unknown,
}

/// Record stored in the media index.
///
/// Equality covers every field: two equal elements always resolve to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexElement {
    pub parent_id: String,
    pub media_type: MediaType,
    pub mime_type: Option<String>,
    /// Absolute filesystem path, or URL when `local_path` is false
    pub path: String,
    pub name: Option<String>,
    pub local_path: bool,
    /// Locked elements belong to the configuration and survive `clean()`
    pub locked: bool,
}

impl IndexElement {
    /// Unlocked element discovered while listing a folder or a feed
    pub fn discovered(
        parent_id: &str,
        media_type: MediaType,
        mime_type: Option<String>,
        path: String,
        name: Option<String>,
        local_path: bool,
    ) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            media_type,
            mime_type,
            path,
            name,
            local_path,
            locked: false,
        }
    }

    /// Locked element seeded from a configured folder
    pub fn configured(root: RootNode, folder: &FolderConfig) -> Self {
        Self {
            parent_id: root.id().to_string(),
            media_type: root.media_type(),
            mime_type: None,
            path: folder.path.clone(),
            name: Some(folder.label.clone()),
            local_path: root.is_local_path(),
            locked: true,
        }
    }
}

#[derive(Default)]
struct IndexState {
    elements: HashMap<String, IndexElement>,
    // Reverse lookup used by `add`. Every id holding an equal element, oldest first;
    // `add` answers with the first one.
    ids: HashMap<IndexElement, Vec<String>>,
}

impl IndexState {
    fn insert(&mut self, id: String, element: IndexElement) {
        self.ids.entry(element.clone()).or_default().push(id.clone());
        self.elements.insert(id, element);
    }

    fn remove(&mut self, id: &str) -> Option<IndexElement> {
        let element = self.elements.remove(id)?;
        if let Some(holders) = self.ids.get_mut(&element) {
            holders.retain(|holder| holder != id);
            if holders.is_empty() {
                self.ids.remove(&element);
            }
        }
        Some(element)
    }

    fn id_of(&self, element: &IndexElement) -> Option<&String> {
        self.ids.get(element).and_then(|holders| holders.first())
    }

    fn children_by_parent(&self) -> HashMap<&str, Vec<&str>> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, element) in &self.elements {
            children
                .entry(element.parent_id.as_str())
                .or_default()
                .push(id.as_str());
        }
        children
    }
}

/// Concurrent mapping between opaque ids and index elements.
///
/// Every mutation and check-then-act sequence runs under a single write lock.
/// `clean()` inspects the filesystem before taking that lock.
#[derive(Default)]
pub struct MediaIndex {
    state: RwLock<IndexState>,
}

impl MediaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<IndexElement> {
        self.state.read().await.elements.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.elements.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.elements.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.elements.is_empty()
    }

    /// Return the id of an equal element if one is indexed, otherwise index the element under
    /// a fresh id.
    pub async fn add(&self, element: IndexElement) -> String {
        let mut state = self.state.write().await;
        if let Some(id) = state.id_of(&element) {
            return id.clone();
        }

        let id = new_id();
        debug!("Add entry {} to media index: {:?}", id, element);
        state.insert(id.clone(), element);
        id
    }

    /// Index `element` under an externally assigned id. No-op when the id is already present.
    pub async fn put(&self, id: &str, element: IndexElement) {
        let mut state = self.state.write().await;
        if !state.elements.contains_key(id) {
            debug!("Put entry {} in media index: {:?}", id, element);
            state.insert(id.to_string(), element);
        }
    }

    /// Remove a single element
    pub async fn remove(&self, id: &str) -> Option<IndexElement> {
        self.state.write().await.remove(id)
    }

    /// Remove every transitive descendant of `parent_id`. The element stored under
    /// `parent_id` itself is kept.
    pub async fn remove_children(&self, parent_id: &str) -> usize {
        let mut state = self.state.write().await;

        let to_remove: Vec<String> = {
            let children = state.children_by_parent();
            let mut visited: HashSet<&str> = HashSet::new();
            let mut queue: VecDeque<&str> = VecDeque::from([parent_id]);

            while let Some(current) = queue.pop_front() {
                for child in children.get(current).into_iter().flatten() {
                    if *child != parent_id && visited.insert(child) {
                        queue.push_back(child);
                    }
                }
            }

            visited.into_iter().map(str::to_string).collect()
        };

        for id in &to_remove {
            if let Some(element) = state.remove(id) {
                debug!("Remove child entry {:?} from media index", element);
            }
        }

        to_remove.len()
    }

    /// Staleness sweep. Removes every unlocked element whose parent is gone, or whose local
    /// path no longer exists, together with everything below it. Returns the number of removed
    /// elements.
    pub async fn clean(&self) -> usize {
        let candidates: Vec<(String, IndexElement)> = {
            let state = self.state.read().await;
            state
                .elements
                .iter()
                .filter(|(_, element)| !element.locked && element.local_path)
                .map(|(id, element)| (id.clone(), element.clone()))
                .collect()
        };

        let mut missing = Vec::new();
        for (id, element) in candidates {
            // Errors other than "not found" keep the entry
            if let Ok(false) = tokio::fs::try_exists(&element.path).await {
                missing.push((id, element));
            }
        }

        let mut state = self.state.write().await;

        let to_remove: HashSet<String> = {
            let mut to_remove: HashSet<&str> = HashSet::new();
            let mut queue: VecDeque<&str> = VecDeque::new();

            // Elements replaced while the filesystem was inspected are left alone
            for (id, element) in &missing {
                if let Some((stored_id, stored)) = state.elements.get_key_value(id.as_str()) {
                    if stored == element {
                        debug!("Remove entry {:?} from media index (path does not exist)", stored);
                        to_remove.insert(stored_id.as_str());
                        queue.push_back(stored_id.as_str());
                    }
                }
            }

            for (id, element) in &state.elements {
                if element.locked || to_remove.contains(id.as_str()) {
                    continue;
                }
                let parent = element.parent_id.as_str();
                if !state.elements.contains_key(parent) && !RootNode::is_virtual_id(parent) {
                    debug!("Remove entry {:?} from media index (invalid parent id)", element);
                    to_remove.insert(id.as_str());
                    queue.push_back(id.as_str());
                }
            }

            // Cascade to the descendants of removed elements, stopping at locked ones
            let children = state.children_by_parent();
            while let Some(current) = queue.pop_front() {
                for child in children.get(current).into_iter().flatten() {
                    let locked = state.elements.get(*child).is_some_and(|e| e.locked);
                    if !locked && to_remove.insert(child) {
                        queue.push_back(child);
                    }
                }
            }

            to_remove.into_iter().map(str::to_string).collect()
        };

        for id in &to_remove {
            state.remove(id);
        }

        if !to_remove.is_empty() {
            info!(
                "Media index cleaned: {} entries removed, {} remaining",
                to_remove.len(),
                state.elements.len()
            );
        }
        to_remove.len()
    }

    /// Keep the index in line with configuration edits
    pub async fn handle_config_event(&self, event: &ConfigEvent) {
        match event {
            ConfigEvent::FolderAdded { root, folder } => {
                self.put(&folder.id, IndexElement::configured(*root, folder)).await;
            }
            ConfigEvent::FolderUpdated { root, old_id, folder } => {
                self.remove(old_id).await;
                self.remove_children(old_id).await;
                self.put(&folder.id, IndexElement::configured(*root, folder)).await;
            }
            ConfigEvent::FolderRemoved { folder, .. } => {
                self.remove(&folder.id).await;
                let removed = self.remove_children(&folder.id).await;
                debug!("Folder {} removed with {} indexed children", folder.id, removed);
            }
            ConfigEvent::SettingsChanged => {}
        }
    }
}

/// Apply configuration events to the index until the channel closes
pub fn spawn_config_listener(
    index: Arc<MediaIndex>,
    mut receiver: broadcast::Receiver<ConfigEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => index.handle_config_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Media index missed {} configuration events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn element(parent_id: &str, path: &str) -> IndexElement {
        IndexElement::discovered(parent_id, MediaType::Video, None, path.to_string(), None, false)
    }

    fn local_element(parent_id: &str, path: &std::path::Path) -> IndexElement {
        IndexElement::discovered(
            parent_id,
            MediaType::Video,
            Some("video/mp4".to_string()),
            path.to_string_lossy().to_string(),
            None,
            true,
        )
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let index = MediaIndex::new();
        let first = index.add(element("0", "/a")).await;
        let second = index.add(element("0", "/a")).await;
        let other = index.add(element("0", "/b")).await;

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(index.len().await, 2);
        assert_eq!(index.get(&first).await, Some(element("0", "/a")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_add_yields_one_id() {
        let index = Arc::new(MediaIndex::new());

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let index = index.clone();
                tokio::spawn(async move { index.add(element("0", "/same")).await })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_only_inserts_absent_ids() {
        let index = MediaIndex::new();
        index.put("cfg", element("1_VIDEOS", "/first")).await;
        index.put("cfg", element("1_VIDEOS", "/second")).await;

        assert_eq!(index.get("cfg").await, Some(element("1_VIDEOS", "/first")));
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_equal_element_under_two_ids_keeps_one_identity() {
        let index = MediaIndex::new();
        let shared = element("1_VIDEOS", "/shared");
        index.put("a", shared.clone()).await;
        index.put("b", shared.clone()).await;
        assert_eq!(index.add(shared.clone()).await, "a");

        index.remove("a").await;
        assert_eq!(index.add(shared.clone()).await, "b");
        assert_eq!(index.len().await, 1);

        index.remove("b").await;
        let fresh = index.add(shared).await;
        assert_ne!(fresh, "a");
        assert_ne!(fresh, "b");
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_absent() {
        let index = MediaIndex::new();
        assert!(index.get("missing").await.is_none());
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_children_is_transitive_and_scoped() {
        let index = MediaIndex::new();
        index.put("x", element("0", "/x")).await;
        index.put("sibling", element("0", "/sibling")).await;
        let b = index.add(element("x", "/x/b")).await;
        let a = index.add(element(&b, "/x/b/a")).await;
        let c = index.add(element("x", "/x/c")).await;
        let outside = index.add(element("sibling", "/sibling/d")).await;

        let removed = index.remove_children("x").await;

        assert_eq!(removed, 3);
        assert!(index.contains("x").await);
        assert!(index.contains("sibling").await);
        assert!(index.contains(&outside).await);
        for id in [a, b, c] {
            assert!(!index.contains(&id).await);
        }
    }

    #[tokio::test]
    async fn test_removed_element_gets_new_id_when_added_again() {
        let index = MediaIndex::new();
        index.put("x", element("0", "/x")).await;
        let child = index.add(element("x", "/x/child")).await;
        index.remove_children("x").await;

        let again = index.add(element("x", "/x/child")).await;
        assert_ne!(child, again);
        assert_eq!(index.len().await, 2);
    }

    #[tokio::test]
    async fn test_clean_removes_missing_unlocked_paths_only() {
        let dir = tempdir().unwrap();
        let locked_file = dir.path().join("locked.mp4");
        let unlocked_file = dir.path().join("unlocked.mp4");
        std::fs::write(&locked_file, b"x").unwrap();
        std::fs::write(&unlocked_file, b"x").unwrap();

        let index = MediaIndex::new();
        let mut locked = local_element("1_VIDEOS", &locked_file);
        locked.locked = true;
        index.put("locked", locked).await;
        let unlocked = index.add(local_element("1_VIDEOS", &unlocked_file)).await;

        assert_eq!(index.clean().await, 0);

        std::fs::remove_file(&locked_file).unwrap();
        std::fs::remove_file(&unlocked_file).unwrap();

        assert_eq!(index.clean().await, 1);
        assert!(index.contains("locked").await);
        assert!(!index.contains(&unlocked).await);
    }

    #[tokio::test]
    async fn test_clean_collapses_orphan_chain_in_one_pass() {
        let index = MediaIndex::new();
        index.put("c", element("0", "/c")).await;
        index.put("b", element("c", "/c/b")).await;
        index.put("a", element("b", "/c/b/a")).await;
        // Enumeration order must not matter, make the chain long
        let mut parent = "a".to_string();
        for i in 0..50 {
            parent = index.add(element(&parent, &format!("/deep/{}", i))).await;
        }

        index.remove("c").await;
        let removed = index.clean().await;

        assert_eq!(removed, 52);
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_clean_cascades_from_missing_path() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("folder");
        std::fs::create_dir(&folder).unwrap();
        let file = folder.join("movie.mp4");
        std::fs::write(&file, b"x").unwrap();

        let index = MediaIndex::new();
        let folder_id = index.add(local_element("1_VIDEOS", &folder)).await;
        let file_id = index.add(local_element(&folder_id, &file)).await;
        // Remote child of a local folder, no filesystem check of its own
        let remote_id = index.add(element(&folder_id, "http://example.com/stream")).await;

        std::fs::remove_dir_all(&folder).unwrap();
        assert_eq!(index.clean().await, 3);
        for id in [folder_id, file_id, remote_id] {
            assert!(!index.contains(&id).await);
        }
    }

    #[tokio::test]
    async fn test_clean_keeps_children_of_locked_elements() {
        let index = MediaIndex::new();
        let mut orphan_locked = element("gone", "/locked");
        orphan_locked.locked = true;
        index.put("locked", orphan_locked).await;
        let child = index.add(element("locked", "/locked/child")).await;

        assert_eq!(index.clean().await, 0);
        assert!(index.contains("locked").await);
        assert!(index.contains(&child).await);
    }

    #[tokio::test]
    async fn test_clean_keeps_virtual_root_children() {
        let index = MediaIndex::new();
        let id = index.add(element("4_PODCASTS", "http://example.com/feed")).await;
        assert_eq!(index.clean().await, 0);
        assert!(index.contains(&id).await);
    }

    #[tokio::test]
    async fn test_config_events() {
        let index = MediaIndex::new();
        let folder = FolderConfig {
            id: "cfg-1".to_string(),
            label: "Movies".to_string(),
            path: "/media/movies".to_string(),
        };

        index
            .handle_config_event(&ConfigEvent::FolderAdded {
                root: RootNode::Video,
                folder: folder.clone(),
            })
            .await;
        let stored = index.get("cfg-1").await.unwrap();
        assert!(stored.locked);
        assert_eq!(stored.parent_id, "1_VIDEOS");
        assert_eq!(stored.name.as_deref(), Some("Movies"));

        let child = index.add(element("cfg-1", "/media/movies/a")).await;

        let edited = FolderConfig {
            path: "/media/films".to_string(),
            ..folder.clone()
        };
        index
            .handle_config_event(&ConfigEvent::FolderUpdated {
                root: RootNode::Video,
                old_id: "cfg-1".to_string(),
                folder: edited.clone(),
            })
            .await;
        assert_eq!(index.get("cfg-1").await.unwrap().path, "/media/films");
        assert!(!index.contains(&child).await);

        // Redelivery is harmless
        index
            .handle_config_event(&ConfigEvent::FolderAdded {
                root: RootNode::Video,
                folder: edited.clone(),
            })
            .await;
        assert_eq!(index.len().await, 1);

        index
            .handle_config_event(&ConfigEvent::FolderRemoved {
                root: RootNode::Video,
                folder: edited,
            })
            .await;
        assert!(index.is_empty().await);
    }
}
