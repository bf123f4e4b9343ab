use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::index::MediaType;

pub const SUBTITLE_MIME_TYPE: &str = "application/x-subrip";

/// A parsed `type/subtype` mime type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MimeType {
    mime_type: String,
    type_: String,
    sub_type: String,
}

impl MimeType {
    pub fn parse(mime_type: &str) -> Self {
        let (type_, sub_type) = mime_type.split_once('/').unwrap_or((mime_type, ""));
        Self {
            mime_type: mime_type.to_string(),
            type_: type_.to_string(),
            sub_type: sub_type.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.mime_type
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// Media category of the mime type; image maps to `Picture`
    pub fn media_type(&self) -> MediaType {
        match self.type_.as_str() {
            "video" => MediaType::Video,
            "audio" => MediaType::Audio,
            "image" => MediaType::Picture,
            _ => MediaType::Unknown,
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(self.type_.as_str(), "video" | "audio" | "image" | "*")
    }

    pub fn is_subtitle(&self) -> bool {
        self.mime_type == SUBTITLE_MIME_TYPE
    }

    /// Whether a client advertising `available` can play this type.
    /// An empty list accepts everything.
    pub fn is_compliant(&self, available: &[String]) -> bool {
        if available.is_empty() {
            return true;
        }
        let wildcard = format!("{}/*", self.type_);
        available
            .iter()
            .any(|mime| mime == &self.mime_type || mime == "*/*" || mime == &wildcard)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type)
    }
}

impl Serialize for MimeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.mime_type)
    }
}

const EXTENSIONS: &[(&str, &str)] = &[
    // Video formats
    ("mp4", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("webm", "video/webm"),
    ("m4v", "video/x-m4v"),
    ("3gp", "video/3gpp"),
    ("mpg", "video/mpeg"),
    ("mpeg", "video/mpeg"),
    ("ts", "video/mp2t"),
    ("vob", "video/dvd"),
    // Audio formats
    ("mp3", "audio/mpeg"),
    ("flac", "audio/x-flac"),
    ("wav", "audio/wav"),
    ("aac", "audio/aac"),
    ("ogg", "audio/ogg"),
    ("wma", "audio/x-ms-wma"),
    ("m4a", "audio/mp4"),
    ("opus", "audio/opus"),
    ("aiff", "audio/aiff"),
    // Image formats
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
    // Subtitles
    ("srt", SUBTITLE_MIME_TYPE),
];

// Alternative names players advertise for the same format
const ALIASES: &[(&str, &str)] = &[
    ("audio/x-flac", "audio/flac"),
    ("audio/flac", "audio/x-flac"),
    ("video/x-matroska", "video/x-mkv"),
    ("video/x-mkv", "video/x-matroska"),
    ("audio/wav", "audio/x-wav"),
    ("audio/x-wav", "audio/wav"),
    ("video/x-msvideo", "video/avi"),
    ("video/avi", "video/x-msvideo"),
];

/// Mime type resolver: file extension lookup and client compliance checks
pub struct MimeTypeManager {
    by_extension: HashMap<&'static str, &'static str>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Default for MimeTypeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeTypeManager {
    pub fn new() -> Self {
        Self {
            by_extension: EXTENSIONS.iter().copied().collect(),
            aliases: ALIASES.iter().copied().collect(),
        }
    }

    /// Mime type of a file name or URL path, by lower-cased extension
    pub fn get_mime_type(&self, file_name: &str) -> Option<MimeType> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_lowercase();

        self.by_extension
            .get(extension.as_str())
            .map(|mime| MimeType::parse(mime))
    }

    pub fn get_alias_mime_type(&self, mime_type: &MimeType) -> Option<MimeType> {
        self.aliases
            .get(mime_type.as_str())
            .map(|alias| MimeType::parse(alias))
    }

    /// Missing or empty mime types are always compliant
    pub fn is_mime_type_compliant(&self, mime_type: Option<&MimeType>, available: &[String]) -> bool {
        let Some(mime_type) = mime_type.filter(|mime| !mime.as_str().is_empty()) else {
            return true;
        };

        mime_type.is_compliant(available)
            || self
                .get_alias_mime_type(mime_type)
                .is_some_and(|alias| alias.is_compliant(available))
    }
}
