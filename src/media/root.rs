use serde::Serialize;

use super::index::MediaType;

/// Fixed virtual roots of the content tree. These are never stored in the media index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RootNode {
    Root,
    Video,
    Picture,
    Audio,
    Podcast,
    Radio,
    None,
}

const ALL_ROOTS: &[RootNode] = &[
    RootNode::Root,
    RootNode::Video,
    RootNode::Picture,
    RootNode::Audio,
    RootNode::Podcast,
    RootNode::Radio,
    RootNode::None,
];

const SUB_ROOTS: &[RootNode] = &[
    RootNode::Video,
    RootNode::Picture,
    RootNode::Audio,
    RootNode::Podcast,
    RootNode::Radio,
];

const FOLDER_ROOTS: &[RootNode] = &[
    RootNode::Video,
    RootNode::Picture,
    RootNode::Audio,
    RootNode::Podcast,
];

impl RootNode {
    /// Look a root up by its id. Unknown ids map to `RootNode::None`.
    pub fn from_id(id: &str) -> RootNode {
        ALL_ROOTS
            .iter()
            .copied()
            .find(|root| root.id() == id)
            .unwrap_or(RootNode::None)
    }

    /// Whether `id` names one of the virtual roots (the `None` sentinel excluded)
    pub fn is_virtual_id(id: &str) -> bool {
        Self::from_id(id) != RootNode::None
    }

    pub fn id(&self) -> &'static str {
        match self {
            RootNode::Root => "0",
            RootNode::Video => "1_VIDEOS",
            RootNode::Picture => "2_PICTURES",
            RootNode::Audio => "3_AUDIOS",
            RootNode::Podcast => "4_PODCASTS",
            RootNode::Radio => "5_RADIO",
            RootNode::None => "ROOT_NODE_NONE",
        }
    }

    pub fn parent_id(&self) -> &'static str {
        match self {
            RootNode::Root => "-1",
            RootNode::None => "",
            _ => RootNode::Root.id(),
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            RootNode::Video => MediaType::Video,
            RootNode::Picture => MediaType::Picture,
            RootNode::Audio => MediaType::Audio,
            RootNode::Podcast => MediaType::Podcast,
            RootNode::Radio => MediaType::Radio,
            RootNode::Root | RootNode::None => MediaType::Unknown,
        }
    }

    /// Whether folders of this root live on the local filesystem
    pub fn is_local_path(&self) -> bool {
        matches!(self, RootNode::Video | RootNode::Picture | RootNode::Audio)
    }

    /// Category roots directly below ROOT
    pub fn is_sub_root(&self) -> bool {
        self.parent_id() == RootNode::Root.id()
    }

    pub fn sub_roots() -> &'static [RootNode] {
        SUB_ROOTS
    }

    /// Category roots whose children come from configured folders
    pub fn folder_roots() -> &'static [RootNode] {
        FOLDER_ROOTS
    }

    pub fn default_label(&self) -> &'static str {
        match self {
            RootNode::Root => "Root",
            RootNode::Video => "Videos",
            RootNode::Picture => "Pictures",
            RootNode::Audio => "Music",
            RootNode::Podcast => "Podcasts",
            RootNode::Radio => "Internet radio",
            RootNode::None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        for root in ALL_ROOTS {
            assert_eq!(RootNode::from_id(root.id()), *root);
        }
        assert_eq!(RootNode::from_id("unknown"), RootNode::None);
        assert_eq!(RootNode::from_id(""), RootNode::None);
    }

    #[test]
    fn test_parent_relationships() {
        assert_eq!(RootNode::Root.parent_id(), "-1");
        for root in RootNode::sub_roots() {
            assert!(root.is_sub_root());
            assert_eq!(root.parent_id(), "0");
        }
        assert!(!RootNode::Root.is_sub_root());
        assert!(!RootNode::None.is_sub_root());
    }

    #[test]
    fn test_virtual_ids() {
        assert!(RootNode::is_virtual_id("0"));
        assert!(RootNode::is_virtual_id("4_PODCASTS"));
        assert!(!RootNode::is_virtual_id("ROOT_NODE_NONE"));
        assert!(!RootNode::is_virtual_id("some-uuid"));
    }
}
