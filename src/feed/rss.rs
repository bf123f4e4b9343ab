use chrono::{DateTime, Utc};
use xml::attribute::OwnedAttribute;
use xml::name::OwnedName;
use xml::reader::{EventReader, XmlEvent};

use super::{FeedError, RawEntry};

#[derive(Default)]
struct ItemBuilder {
    title: Option<String>,
    enclosures: Vec<(String, Option<String>)>,
    duration: Option<String>,
    published: Option<DateTime<Utc>>,
    thumbnail: Option<String>,
}

impl ItemBuilder {
    fn finish(self, entries: &mut Vec<RawEntry>) {
        for (url, mime_type) in self.enclosures {
            let name = self
                .title
                .clone()
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| url.rsplit('/').next().unwrap_or(&url).to_string());

            entries.push(RawEntry {
                name,
                url,
                mime_type,
                duration: self.duration.clone(),
                icon_url: self.thumbnail.clone(),
                published: self.published,
            });
        }
    }
}

fn attribute<'a>(attributes: &'a [OwnedAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|attr| attr.name.local_name == name)
        .map(|attr| attr.value.as_str())
}

fn has_prefix(name: &OwnedName, prefix: &str) -> bool {
    name.prefix.as_deref() == Some(prefix)
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Read the playable entries of an RSS 2.0 or Atom podcast feed, one entry per enclosure
pub fn parse_podcast(document: &str) -> Result<Vec<RawEntry>, FeedError> {
    let reader = EventReader::from_str(document);
    let mut entries = Vec::new();
    let mut item: Option<ItemBuilder> = None;
    let mut text = String::new();
    let mut root_seen = false;

    for event in reader {
        match event? {
            XmlEvent::StartElement { name, attributes, .. } => {
                text.clear();

                if !root_seen {
                    root_seen = true;
                    if !matches!(name.local_name.as_str(), "rss" | "feed" | "RDF") {
                        return Err(FeedError::Format(format!(
                            "expected an rss or atom document, found <{}>",
                            name.local_name
                        )));
                    }
                    continue;
                }

                match name.local_name.as_str() {
                    "item" | "entry" if name.prefix.is_none() => item = Some(ItemBuilder::default()),
                    "enclosure" => {
                        if let (Some(item), Some(url)) = (item.as_mut(), attribute(&attributes, "url")) {
                            let mime_type = attribute(&attributes, "type").map(str::to_string);
                            item.enclosures.push((url.to_string(), mime_type));
                        }
                    }
                    // Atom enclosure
                    "link" if attribute(&attributes, "rel") == Some("enclosure") => {
                        if let (Some(item), Some(href)) = (item.as_mut(), attribute(&attributes, "href")) {
                            let mime_type = attribute(&attributes, "type").map(str::to_string);
                            item.enclosures.push((href.to_string(), mime_type));
                        }
                    }
                    "thumbnail" if has_prefix(&name, "media") => {
                        if let (Some(item), Some(url)) = (item.as_mut(), attribute(&attributes, "url")) {
                            item.thumbnail.get_or_insert_with(|| url.to_string());
                        }
                    }
                    "image" if has_prefix(&name, "itunes") => {
                        if let (Some(item), Some(href)) = (item.as_mut(), attribute(&attributes, "href")) {
                            item.thumbnail.get_or_insert_with(|| href.to_string());
                        }
                    }
                    _ => {}
                }
            }
            XmlEvent::Characters(chars) | XmlEvent::CData(chars) => text.push_str(&chars),
            XmlEvent::EndElement { name } => {
                if matches!(name.local_name.as_str(), "item" | "entry") && name.prefix.is_none() {
                    if let Some(finished) = item.take() {
                        finished.finish(&mut entries);
                    }
                    continue;
                }

                let Some(current) = item.as_mut() else {
                    continue;
                };
                let value = text.trim();

                match name.local_name.as_str() {
                    "title" if name.prefix.is_none() => current.title = Some(value.to_string()),
                    "duration" if has_prefix(&name, "itunes") && !value.is_empty() => {
                        current.duration = Some(value.to_string());
                    }
                    "pubDate" | "published" | "updated" if current.published.is_none() => {
                        current.published = parse_date(value);
                    }
                    _ => {}
                }
                text.clear();
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    Ok(entries)
}
