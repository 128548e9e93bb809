// src/ingest/mod.rs
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod registry;
pub mod types;

pub use extract::{Extractor, ExtractSettings, Rejection};
pub use fetch::{Fetcher, FetchSettings, HttpFetcher};
pub use registry::SourceRegistry;
pub use types::{Candidate, Category, RawFetch, ScoredItem, Source, SourceKind};

/// Upper bound on a cleaned fragment, in characters.
pub const MAX_FRAGMENT_CHARS: usize = 300;

/// Normalize a raw markup fragment into plain text.
pub fn normalize_text(s: &str) -> String {
    // 1) Strip residual tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let mut out = re_tags.replace_all(s, "").to_string();

    // 2) HTML entity decode
    out = html_escape::decode_html_entities(&out).to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. decoded &nbsp;)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_FRAGMENT_CHARS {
        out = out.chars().take(MAX_FRAGMENT_CHARS).collect();
    }

    out
}
