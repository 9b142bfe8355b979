use anyhow::{bail, Result};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use tracing::{debug, instrument};

use crate::record::{PatchRecord, RecordFields};
use crate::source::SourceDescriptor;

use super::FormatParser;

/// RSS 2.0, RSS 1.0 (RDF) and Atom feeds.
pub struct FeedParser;

impl FormatParser for FeedParser {
    #[instrument(skip(self, payload, source), fields(source = %source.url))]
    fn parse(&self, payload: &str, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
        let items = parse_feed(payload)?;
        debug!(count = items.len(), "parsed feed items");

        let records = items
            .into_iter()
            .map(|item| {
                RecordFields {
                    id: item.guid,
                    name: item.title,
                    description: item.description,
                    published: item.published.or(item.updated),
                    link: item.link,
                    ..Default::default()
                }
                .into_record(source)
            })
            .collect();

        Ok(records)
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}

#[derive(Debug, Default, PartialEq)]
struct FeedItem {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    guid: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Description,
    Link,
    Published,
    Updated,
    Guid,
}

fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Description),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"date" => Some(Field::Published),
        b"updated" => Some(Field::Updated),
        b"guid" | b"id" => Some(Field::Guid),
        _ => None,
    }
}

impl FeedItem {
    fn set(&mut self, field: Field, value: String) {
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Description => &mut self.description,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Guid => &mut self.guid,
        };
        slot.get_or_insert(value);
    }
}

fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    // Text is trimmed once per field, so whitespace between text and CDATA
    // fragments survives.
    let mut reader = Reader::from_str(xml);

    let mut items = Vec::new();
    let mut saw_feed_root = false;
    let mut current: Option<FeedItem> = None;
    // Element depth below the current item; 1 means a direct child.
    let mut nested = 0usize;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                if current.is_none() {
                    match local.as_ref() {
                        b"rss" | b"feed" | b"RDF" => saw_feed_root = true,
                        b"item" | b"entry" => {
                            current = Some(FeedItem::default());
                            nested = 0;
                        }
                        _ => {}
                    }
                    continue;
                }
                let Some(item) = current.as_mut() else {
                    continue;
                };

                nested += 1;
                if nested == 1 {
                    field = field_for(local.as_ref());
                    text.clear();
                    if local.as_ref() == b"link" {
                        if let Some(href) = atom_link(&e) {
                            item.set(Field::Link, href);
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => match current.as_mut() {
                Some(item) => {
                    if nested == 0 && e.local_name().as_ref() == b"link" {
                        if let Some(href) = atom_link(&e) {
                            item.set(Field::Link, href);
                        }
                    }
                }
                None => {
                    if matches!(e.local_name().as_ref(), b"item" | b"entry") {
                        items.push(FeedItem::default());
                    }
                }
            },
            Ok(Event::Text(e)) => {
                if field.is_some() && nested > 0 {
                    text.push_str(&decode_text(&e));
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() && nested > 0 {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                if current.is_none() {
                    continue;
                }
                if nested == 0 {
                    items.extend(current.take());
                    continue;
                }
                if nested == 1 {
                    if let (Some(f), Some(item)) = (field.take(), current.as_mut()) {
                        item.set(f, text.trim().to_string());
                    }
                    text.clear();
                }
                nested -= 1;
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "malformed feed XML at position {}: {e}",
                reader.buffer_position()
            ),
            _ => {}
        }
    }

    if !saw_feed_root {
        bail!("payload is not an RSS or Atom feed");
    }

    Ok(items)
}

fn decode_text(e: &BytesText) -> String {
    e.unescape()
        .map(|t| t.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(e).into_owned())
}

/// `href` of an Atom link, skipping non-alternate relations.
fn atom_link(e: &BytesStart) -> Option<String> {
    let attr = |name: &str| {
        e.try_get_attribute(name)
            .ok()
            .flatten()
            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
    };

    if attr("rel").is_some_and(|rel| rel != "alternate") {
        return None;
    }
    attr("href")
}
