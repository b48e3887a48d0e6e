use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::text::truncate_display;

/// Host fragment a product URL must carry for its item id to be trusted.
pub const ITEM_HOST: &str = "taobao.com";

/// A tracked product as listed in the product file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub url: String,
}

impl Product {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Parses a bare `name,url` line, splitting on the first comma only.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim().trim_start_matches('\u{feff}');
        let (name, url) = line.split_once(',')?;
        Some(Self::new(name.trim(), url.trim()))
    }

    /// The stable item id used as the history key.
    pub fn item_id(&self) -> Option<String> {
        item_id_from_url(&self.url)
    }

    /// Name shortened for console output.
    pub fn display_name(&self) -> String {
        truncate_display(&self.name, 30, 30)
    }
}

/// Canonical product page for an item id.
pub fn item_url(item_id: &str) -> String {
    format!("https://item.taobao.com/item.htm?id={}", item_id)
}

/// Scheme-relative links (`//item.taobao.com/...`) are common in saved pages.
pub fn normalize_href(href: &str) -> String {
    let href = href.trim();
    if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    }
}

/// Extracts the `id` query parameter from a Taobao item URL.
pub fn item_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(&normalize_href(url)).ok()?;
    if !parsed.host_str()?.contains(ITEM_HOST) {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}
