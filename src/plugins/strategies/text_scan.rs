use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::plugins::traits::ExtractionStrategy;
use crate::scraper::PageDriver;
use crate::utils::error::Result;

/// Matches at or above this value are never treated as a price.
const PRICE_CEILING: u32 = 100_000;

pub struct TextScanStrategy {
    patterns: Vec<Regex>,
}

impl Default for TextScanStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl TextScanStrategy {
    pub fn new() -> Self {
        let patterns = [
            r"(?:¥|￥)\s*(\d+(?:\.\d+)?)",
            r"(?:价格|促销价|折后价).{0,10}?(\d+(?:\.\d+)?)",
            r"(\d+(?:\.\d+)?)\s*(?:元|块钱)",
            r"(?:价格|价钱)\D*?(\d+(?:\.\d+)?)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("price pattern compiles"))
        .collect();

        TextScanStrategy { patterns }
    }

    /// Patterns are tried in order. The first one with any match inside
    /// `(0, 100000)` decides, and its smallest match is returned.
    pub fn scan(&self, text: &str) -> Option<String> {
        let ceiling = Decimal::from(PRICE_CEILING);

        for pattern in &self.patterns {
            let smallest = pattern
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .filter_map(|m| Decimal::from_str(m.as_str()).ok().map(|v| (v, m.as_str())))
                .filter(|(value, _)| *value > Decimal::ZERO && *value < ceiling)
                .min_by(|a, b| a.0.cmp(&b.0));

            if let Some((_, raw)) = smallest {
                return Some(raw.to_string());
            }
        }

        None
    }
}

#[async_trait]
impl ExtractionStrategy for TextScanStrategy {
    fn name(&self) -> &str {
        "text-scan"
    }

    fn description(&self) -> &str {
        "Scans the visible page text for price-like patterns"
    }

    async fn attempt(&self, page: &dyn PageDriver) -> Result<Option<String>> {
        let text = page.body_text().await?;
        Ok(self.scan(&text))
    }
}
