//! Generic RSS 2.0 site adapter
//!
//! Reads the fields PT sites and Torznab proxies put in their feeds:
//! `<enclosure>`, `<size>`, and `torznab:attr` / `newznab:attr` pairs for
//! seeders, peers, promotion factors and hit-and-run.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use scraper::Html;
use tracing::{debug, info};

use super::{CandidateQuery, CandidateSource, RawCandidate, site_domain};
use crate::services::rate_limiter::RateLimitedClient;
use crate::services::text_utils::collapse_whitespace;

pub struct RssFeedSource {
    site_id: String,
    domain: String,
    feed_url: String,
    client: Arc<RateLimitedClient>,
}

impl RssFeedSource {
    pub fn new(site_id: &str, feed_url: &str, client: Arc<RateLimitedClient>) -> Result<Self> {
        let domain = site_domain(feed_url)
            .with_context(|| format!("invalid RSS url for site {site_id}: {feed_url}"))?;
        Ok(Self {
            site_id: site_id.to_string(),
            domain,
            feed_url: feed_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl CandidateSource for RssFeedSource {
    fn id(&self) -> &str {
        &self.site_id
    }

    fn identify(&self, url: &str) -> bool {
        site_domain(url).is_some_and(|d| d == self.domain)
    }

    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<RawCandidate>> {
        let content = self
            .client
            .get_text(&self.feed_url, &[], &[])
            .await
            .with_context(|| format!("failed to fetch RSS feed for {}", self.site_id))?;
        let mut candidates = parse_feed(&content, &self.site_id)?;

        if let Some(keyword) = query.keyword.as_deref().map(str::to_lowercase) {
            candidates.retain(|c| c.title.to_lowercase().contains(&keyword));
        }
        info!(site = %self.site_id, items = candidates.len(), "Fetched RSS feed");
        Ok(candidates)
    }
}

#[derive(Default)]
struct ItemBuilder {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    comments: Option<String>,
    enclosure_url: Option<String>,
    enclosure_length: Option<u64>,
    size: Option<u64>,
    seeders: Option<u32>,
    peers: Option<u32>,
    leechers: Option<u32>,
    upload_factor: Option<f64>,
    download_factor: Option<f64>,
    hit_and_run: bool,
}

impl ItemBuilder {
    fn set_text(&mut self, tag: &str, text: String) {
        if text.is_empty() {
            return;
        }
        match tag {
            "title" => self.title = Some(text),
            "description" => self.description = Some(text),
            "link" => self.link = Some(text),
            "comments" => self.comments = Some(text),
            "size" => self.size = text.trim().parse().ok(),
            _ => {}
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        let value = value.trim();
        match name.to_lowercase().as_str() {
            "size" => self.size = value.parse().ok(),
            "seeders" => self.seeders = value.parse().ok(),
            "peers" => self.peers = value.parse().ok(),
            "leechers" => self.leechers = value.parse().ok(),
            "uploadvolumefactor" => self.upload_factor = value.parse().ok(),
            "downloadvolumefactor" => self.download_factor = value.parse().ok(),
            "hr" | "hitandrun" => self.hit_and_run = matches!(value, "1" | "true" | "yes"),
            _ => {}
        }
    }

    fn build(self, site_id: &str) -> Option<RawCandidate> {
        let title = collapse_whitespace(self.title?.trim());
        if title.is_empty() {
            return None;
        }
        let enclosure_url = self.enclosure_url.or_else(|| self.link.clone())?;
        let page_url = self.comments.or(self.link).filter(|l| *l != enclosure_url);
        let seeders = self.seeders.unwrap_or(0);
        let peers = self
            .peers
            .or_else(|| self.leechers.map(|l| l + seeders))
            .unwrap_or(0);

        Some(RawCandidate {
            title,
            subtitle: self.description.as_deref().and_then(plain_text),
            enclosure_url,
            size: self.size.or(self.enclosure_length).unwrap_or(0),
            seeders,
            peers,
            upload_factor: self.upload_factor,
            download_factor: self.download_factor,
            site_id: site_id.to_string(),
            page_url,
            is_hit_and_run: self.hit_and_run,
        })
    }
}

/// Visible text of an HTML description
fn plain_text(description: &str) -> Option<String> {
    let text = if description.contains('<') {
        Html::parse_fragment(description)
            .root_element()
            .text()
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        description.to_string()
    };
    let text = collapse_whitespace(text.trim());
    (!text.is_empty()).then_some(text)
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn read_attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
            (key, value)
        })
        .collect()
}

fn apply_empty_element(item: &mut ItemBuilder, e: &BytesStart<'_>) {
    let tag = tag_name(e);
    let attrs = read_attributes(e);
    let get = |key: &str| {
        attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    match tag.as_str() {
        "enclosure" => {
            item.enclosure_url = get("url").map(str::to_string);
            item.enclosure_length = get("length").and_then(|v| v.parse().ok());
        }
        "torznab:attr" | "newznab:attr" => {
            if let (Some(name), Some(value)) = (get("name"), get("value")) {
                item.set_attr(name, value);
            }
        }
        _ => {}
    }
}

/// Parse an RSS 2.0 document into raw candidates for `site_id`
pub fn parse_feed(content: &str, site_id: &str) -> Result<Vec<RawCandidate>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut candidates = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut current_tag = String::new();

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed RSS from {site_id}"))?;
        match event {
            Event::Start(ref e) => {
                let tag = tag_name(e);
                if tag == "item" {
                    current = Some(ItemBuilder::default());
                } else if let Some(item) = current.as_mut() {
                    // Some feeds write enclosure/attr elements with a closing tag
                    apply_empty_element(item, e);
                }
                current_tag = tag;
            }
            Event::Empty(ref e) => {
                if let Some(item) = current.as_mut() {
                    apply_empty_element(item, e);
                }
            }
            Event::Text(ref e) => {
                if let Some(item) = current.as_mut() {
                    let text = e.unescape().map(|t| t.to_string()).unwrap_or_default();
                    item.set_text(&current_tag, text);
                }
            }
            Event::CData(ref e) => {
                if let Some(item) = current.as_mut() {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    item.set_text(&current_tag, text);
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"item"
                    && let Some(item) = current.take()
                {
                    match item.build(site_id) {
                        Some(candidate) => candidates.push(candidate),
                        None => debug!(site = %site_id, "Skipping RSS item without title or link"),
                    }
                }
                current_tag.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed">
<channel>
    <title>Example PT</title>
    <item>
        <title>Interstellar.2014.1080p.BluRay.x264-GROUP</title>
        <description><![CDATA[<b>星际穿越</b> 导演剪辑版]]></description>
        <link>https://pt.example/details.php?id=1</link>
        <enclosure url="https://pt.example/download.php?id=1&amp;passkey=abc" length="12884901888" type="application/x-bittorrent"/>
        <torznab:attr name="seeders" value="42"/>
        <torznab:attr name="leechers" value="3"/>
        <torznab:attr name="downloadvolumefactor" value="0"/>
        <torznab:attr name="uploadvolumefactor" value="1"/>
    </item>
    <item>
        <title>Some.Show.S02E05.1080p.WEB-DL</title>
        <link>https://pt.example/download.php?id=2</link>
        <size>1073741824</size>
        <torznab:attr name="hr" value="1"/>
    </item>
    <item>
        <description>no title here</description>
    </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_feed() {
        let items = parse_feed(FEED, "example").unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "Interstellar.2014.1080p.BluRay.x264-GROUP");
        assert_eq!(first.subtitle.as_deref(), Some("星际穿越 导演剪辑版"));
        assert_eq!(first.enclosure_url, "https://pt.example/download.php?id=1&passkey=abc");
        assert_eq!(first.page_url.as_deref(), Some("https://pt.example/details.php?id=1"));
        assert_eq!(first.size, 12_884_901_888);
        assert_eq!(first.seeders, 42);
        assert_eq!(first.peers, 45);
        assert_eq!(first.upload_factor, Some(1.0));
        assert_eq!(first.download_factor, Some(0.0));
        assert!(!first.is_hit_and_run);
        assert_eq!(first.site_id, "example");

        let second = &items[1];
        assert_eq!(second.enclosure_url, "https://pt.example/download.php?id=2");
        assert_eq!(second.page_url, None);
        assert_eq!(second.size, 1_073_741_824);
        assert!(second.is_hit_and_run);
        assert_eq!(second.upload_factor, None);
    }

    #[test]
    fn test_malformed_feed_is_an_error() {
        assert!(parse_feed("<rss><channel><item><title>x</item></rss>", "bad").is_err());
    }
}
