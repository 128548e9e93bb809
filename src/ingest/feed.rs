// src/ingest/feed.rs
//! RSS 2.0 item parsing for `feed` sources.

use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub published_at: Option<u64>,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

/// Parse channel items in document order. Items without a title are skipped.
pub fn parse_rss(xml: &str) -> Result<Vec<FeedItem>, quick_xml::DeError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean)?;

    Ok(rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            let title = it.title?;
            Some(FeedItem {
                title,
                link: it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_unix),
            })
        })
        .collect())
}

// HTML entities that feeds leak into XML and that an XML parser rejects.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
