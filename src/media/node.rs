use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use super::mime::MimeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Folder,
    Content,
    RawUrl,
}

/// What a raw-url node points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RawUrlKind {
    PodcastEntry,
    RadioStation,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderNode {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentNode {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub mime_type: MimeType,
    pub size: u64,
    pub path: String,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawUrlNode {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub kind: RawUrlKind,
    pub mime_type: Option<MimeType>,
    pub url: String,
    /// Human readable duration as published by the feed
    pub duration: Option<String>,
    pub icon_url: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

/// Node of the content tree handed to protocol front ends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Folder(FolderNode),
    Content(ContentNode),
    RawUrl(RawUrlNode),
}

impl Node {
    pub fn folder(id: &str, parent_id: &str, name: &str) -> Node {
        Node::Folder(FolderNode {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            modified: None,
            icon_url: None,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Node::Folder(node) => &node.id,
            Node::Content(node) => &node.id,
            Node::RawUrl(node) => &node.id,
        }
    }

    pub fn parent_id(&self) -> &str {
        match self {
            Node::Folder(node) => &node.parent_id,
            Node::Content(node) => &node.parent_id,
            Node::RawUrl(node) => &node.parent_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Folder(node) => &node.name,
            Node::Content(node) => &node.name,
            Node::RawUrl(node) => &node.name,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Folder(_) => NodeType::Folder,
            Node::Content(_) => NodeType::Content,
            Node::RawUrl(_) => NodeType::RawUrl,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Node::Folder(_))
    }

    pub fn mime_type(&self) -> Option<&MimeType> {
        match self {
            Node::Folder(_) => None,
            Node::Content(node) => Some(&node.mime_type),
            Node::RawUrl(node) => node.mime_type.as_ref(),
        }
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Folder(node) => node.modified,
            Node::Content(node) => node.modified,
            Node::RawUrl(node) => node.modified,
        }
    }

    pub fn icon_url(&self) -> Option<&str> {
        match self {
            Node::Folder(node) => node.icon_url.as_deref(),
            Node::Content(_) => None,
            Node::RawUrl(node) => node.icon_url.as_deref(),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Node::Folder(_) => 0,
            Node::Content(_) => 1,
            Node::RawUrl(_) => 2,
        }
    }

    /// Display order: folders first, then by name within the same node type
    pub fn display_cmp(&self, other: &Node) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| self.name().cmp(other.name()))
    }
}
