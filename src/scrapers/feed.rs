//! RSS and Atom feed source.
//!
//! Feeds are downloaded with `reqwest` and read with a `quick-xml` event
//! loop. Three document shapes are understood:
//!
//! - RSS 2.0: `<rss><channel><item>…`
//! - RSS 1.0 (RDF): `<rdf:RDF><item>…`
//! - Atom: `<feed><entry>…`
//!
//! Entry links are resolved against the feed URL so relative links become
//! absolute. Summaries are reduced to plain text.

use super::FeedSource;
use crate::errors::FetchError;
use crate::models::FeedEntry;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::Html;
use std::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl FeedSource for HttpFeedSource {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transport {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: format!("HTTP {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let entries = parse_feed(&body, url)?;
        debug!(
            entries = entries.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched feed"
        );
        Ok(entries)
    }
}

/// Child of an entry whose text is being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
}

fn entry_field(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" | b"summary" => Some(Field::Summary),
        _ => None,
    }
}

/// An `<item>` or `<entry>` while its children are read.
#[derive(Debug, Default)]
struct PartialEntry {
    title: Option<String>,
    link_text: Option<String>,
    alternate_href: Option<String>,
    other_href: Option<String>,
    summary: Option<String>,
}

impl PartialEntry {
    /// First value wins. Blank link text is ignored.
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link if value.trim().is_empty() => return,
            Field::Link => &mut self.link_text,
            Field::Summary => &mut self.summary,
        };
        slot.get_or_insert(value);
    }

    /// Record the `href` of an Atom-style `<link>`, keyed on its `rel`.
    fn add_href(&mut self, link: &BytesStart) {
        let mut href = None;
        let mut rel = None;
        for attr in link.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(decode(&attr.value)),
                b"rel" => rel = Some(decode(&attr.value)),
                _ => {}
            }
        }
        let Some(href) = href else { return };
        let slot = match rel.as_deref() {
            None | Some("alternate") => &mut self.alternate_href,
            Some(_) => &mut self.other_href,
        };
        slot.get_or_insert(href);
    }

    /// RSS `<link>` text, then the `alternate` href, then any other href.
    fn finish(self, base: Option<&Url>) -> FeedEntry {
        let link = self.link_text.or(self.alternate_href).or(self.other_href);
        FeedEntry {
            link: link
                .map(|l| resolve_link(base, &l))
                .unwrap_or_default(),
            title: self.title.map(|t| html_to_text(&t)).unwrap_or_default(),
            summary: self.summary.map(|s| html_to_text(&s)),
        }
    }
}

fn decode(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match unescape(&text) {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => text.into_owned(),
    }
}

/// Name of the document element, without namespace prefix.
fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Decode a feed document into entries, in document order.
///
/// Only the direct `title`, `link` and `description`/`summary` children of
/// each entry are read, so unknown or repeated elements are ignored. Markup
/// nested in a title or summary contributes its text. If the document turns
/// malformed partway, the entries completed before that point are returned.
pub fn parse_feed(xml: &str, feed_url: &str) -> Result<Vec<FeedEntry>, FetchError> {
    let xml = xml.trim_start_matches('\u{feff}');
    let parse_err = |message: String| FetchError::Parse {
        url: feed_url.to_string(),
        message,
    };

    let entry_tag: &[u8] = match root_element(xml).as_deref() {
        Some("rss") | Some("RDF") => b"item",
        Some("feed") => b"entry",
        Some(other) => return Err(parse_err(format!("unsupported root element <{other}>"))),
        None => return Err(parse_err("not an XML document".to_string())),
    };

    let base = Url::parse(feed_url).ok();
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<(PartialEntry, usize)> = None;
    let mut field: Option<(Field, usize)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                match current.as_mut() {
                    Some(_) if field.is_some() => text.push(' '),
                    Some((entry, entry_depth)) if depth == *entry_depth + 1 => {
                        if let Some(f) = entry_field(e.local_name().as_ref()) {
                            if f == Field::Link {
                                entry.add_href(&e);
                            }
                            field = Some((f, depth));
                            text.clear();
                        }
                    }
                    Some(_) => {}
                    None if e.local_name().as_ref() == entry_tag => {
                        current = Some((PartialEntry::default(), depth));
                    }
                    None => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some((entry, entry_depth)) = current.as_mut() {
                    if field.is_none() && depth == *entry_depth && e.local_name().as_ref() == b"link" {
                        entry.add_href(&e);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some((f, field_depth)) = field {
                    if depth == field_depth {
                        if let Some((entry, _)) = current.as_mut() {
                            entry.set(f, std::mem::take(&mut text));
                        }
                        field = None;
                    } else {
                        text.push(' ');
                    }
                }
                if let Some((entry, _)) = current.take_if(|(_, d)| *d == depth) {
                    entries.push(entry.finish(base.as_ref()));
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(e)) if field.is_some() => text.push_str(&decode(&e)),
            Ok(Event::CData(e)) if field.is_some() => text.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::GeneralRef(e)) if field.is_some() => {
                let reference = format!("&{};", String::from_utf8_lossy(&e));
                text.push_str(&decode(reference.as_bytes()));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if entries.is_empty() {
                    return Err(parse_err(e.to_string()));
                }
                warn!(
                    feed_url,
                    error = %e,
                    position = reader.buffer_position(),
                    kept = entries.len(),
                    "Malformed feed; keeping the entries read so far"
                );
                break;
            }
            _ => {}
        }
    }
    Ok(entries)
}

/// Absolute form of `link`, or an empty string if it cannot be made absolute.
fn resolve_link(base: Option<&Url>, link: &str) -> String {
    let link = link.trim();
    if link.is_empty() {
        return String::new();
    }
    let resolved = match base {
        Some(base) => base.join(link),
        None => Url::parse(link),
    };
    match resolved {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u.to_string(),
        Ok(u) => {
            warn!(link, scheme = u.scheme(), "Ignoring non-HTTP feed link");
            String::new()
        }
        Err(e) => {
            warn!(link, error = %e, "Ignoring unparseable feed link");
            String::new()
        }
    }
}

/// Strip markup from a title or summary and collapse whitespace.
pub fn html_to_text(raw: &str) -> String {
    if !raw.contains('<') {
        return raw.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    let fragment = Html::parse_fragment(raw);
    fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
