//! Content tree: media index, resolver and the manager façade used by the front ends.

pub mod dao;
pub mod id;
pub mod index;
pub mod manager;
pub mod mime;
pub mod node;
pub mod root;

pub use dao::MediaDao;
pub use index::{IndexElement, MediaIndex, MediaType};
pub use manager::{MediaEvent, MediaEventKind, MediaManager, MediaSearchRequest};
pub use mime::{MimeType, MimeTypeManager};
pub use node::{Node, NodeType, RawUrlKind};
pub use root::RootNode;
