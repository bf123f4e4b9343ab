use xml::reader::{EventReader, XmlEvent};

use super::{FeedError, RawEntry};

/// Station listed in an Icecast yellow pages directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioStation {
    pub name: String,
    pub url: String,
    pub mime_type: Option<String>,
    /// Space separated genre tags as published by the directory
    pub genre: String,
}

impl RadioStation {
    pub fn to_entry(&self) -> RawEntry {
        RawEntry {
            name: self.name.clone(),
            url: self.url.clone(),
            mime_type: self.mime_type.clone(),
            duration: None,
            icon_url: None,
            published: None,
        }
    }
}

#[derive(Default)]
struct StationBuilder {
    name: String,
    url: String,
    mime_type: String,
    genre: String,
}

/// Parse an Icecast `yp.xml` directory. Entries without a listen url are skipped.
pub fn parse_directory(document: &str) -> Result<Vec<RadioStation>, FeedError> {
    let reader = EventReader::from_str(document);
    let mut stations = Vec::new();
    let mut current: Option<StationBuilder> = None;
    let mut text = String::new();
    let mut root_seen = false;

    for event in reader {
        match event? {
            XmlEvent::StartElement { name, .. } => {
                text.clear();
                if !root_seen {
                    root_seen = true;
                    if name.local_name != "directory" {
                        return Err(FeedError::Format(format!(
                            "expected an icecast directory, found <{}>",
                            name.local_name
                        )));
                    }
                } else if name.local_name == "entry" {
                    current = Some(StationBuilder::default());
                }
            }
            XmlEvent::Characters(chars) | XmlEvent::CData(chars) => text.push_str(&chars),
            XmlEvent::EndElement { name } => {
                let value = text.trim().to_string();
                text.clear();

                if name.local_name == "entry" {
                    if let Some(station) = current.take() {
                        if station.url.is_empty() {
                            continue;
                        }
                        stations.push(RadioStation {
                            name: if station.name.is_empty() { station.url.clone() } else { station.name },
                            url: station.url,
                            mime_type: Some(station.mime_type).filter(|mime| !mime.is_empty()),
                            genre: station.genre,
                        });
                    }
                    continue;
                }

                if let Some(station) = current.as_mut() {
                    match name.local_name.as_str() {
                        "server_name" => station.name = value,
                        "listen_url" => station.url = value,
                        "server_type" => station.mime_type = value,
                        "genre" => station.genre = value,
                        _ => {}
                    }
                }
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTORY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<directory>
  <entry>
    <server_name>Rock FM</server_name>
    <listen_url>http://radio.example.com:8000/rock</listen_url>
    <server_type>audio/mpeg</server_type>
    <bitrate>128</bitrate>
    <genre>rock classic</genre>
  </entry>
  <entry>
    <server_name>Broken</server_name>
    <server_type>audio/mpeg</server_type>
    <genre>rock</genre>
  </entry>
  <entry>
    <server_name>Jazz &amp; Co</server_name>
    <listen_url>http://radio.example.com:8000/jazz</listen_url>
    <server_type></server_type>
    <genre>jazz</genre>
  </entry>
</directory>"#;

    #[test]
    fn test_parse_directory() {
        let stations = parse_directory(DIRECTORY).unwrap();
        assert_eq!(stations.len(), 2);

        assert_eq!(stations[0].name, "Rock FM");
        assert_eq!(stations[0].url, "http://radio.example.com:8000/rock");
        assert_eq!(stations[0].mime_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(stations[0].genre, "rock classic");

        assert_eq!(stations[1].name, "Jazz & Co");
        assert!(stations[1].mime_type.is_none());
    }

    #[test]
    fn test_rejects_other_documents() {
        assert!(matches!(parse_directory("<rss/>"), Err(FeedError::Format(_))));
    }
}
