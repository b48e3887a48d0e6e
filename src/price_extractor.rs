use chrono::Local;
use std::path::{Path, PathBuf};

use crate::plugins::strategies::default_chain;
use crate::plugins::traits::ExtractionStrategy;
use crate::scraper::PageDriver;
use crate::utils::text::{first_decimal, sanitize_file_stem};

/// Returned as the price when no strategy produced a usable value.
pub const PRICE_NOT_FOUND: &str = "未找到价格";

/// Result of running the strategy chain on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceExtraction {
    pub price: String,
    pub success: bool,
    /// Name of the strategy that produced the price.
    pub strategy: Option<String>,
}

impl PriceExtraction {
    fn not_found() -> Self {
        Self {
            price: PRICE_NOT_FOUND.to_string(),
            success: false,
            strategy: None,
        }
    }
}

/// Leading decimal of `candidate` if it is a finite number above zero.
pub fn validate_price(candidate: &str) -> Option<String> {
    let number = first_decimal(candidate)?;
    let value: f64 = number.parse().ok()?;
    (value.is_finite() && value > 0.0).then(|| number.to_string())
}

/// Where page source and screenshots are dumped for post-hoc diagnosis.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    debug_dir: PathBuf,
    screenshot_dir: PathBuf,
}

impl DebugArtifacts {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            debug_dir: data_dir.join("debug"),
            screenshot_dir: data_dir.join("screenshots"),
        }
    }

    pub fn last_page_path(&self) -> PathBuf {
        self.debug_dir.join("last_page.html")
    }

    /// `<name>_<id>_<mmdd_HHMM>.png`, with missing parts left out.
    pub fn screenshot_path(&self, name: Option<&str>, id: Option<&str>) -> PathBuf {
        let timestamp = Local::now().format("%m%d_%H%M").to_string();
        let mut parts = Vec::new();
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            parts.push(sanitize_file_stem(name, 30));
        }
        if let Some(id) = id.filter(|i| !i.is_empty()) {
            parts.push(id.to_string());
        }
        if parts.is_empty() {
            parts.push("item".to_string());
        }
        parts.push(timestamp);
        self.screenshot_dir.join(format!("{}.png", parts.join("_")))
    }

    async fn save_page_source(&self, page: &dyn PageDriver) {
        let html = match page.html().await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Could not read page source for debugging: {}", e);
                return;
            }
        };
        let path = self.last_page_path();
        let result = match tokio::fs::create_dir_all(&self.debug_dir).await {
            Ok(()) => tokio::fs::write(&path, html).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Could not save {}: {}", path.display(), e);
        }
    }

    async fn save_screenshot(&self, page: &dyn PageDriver, name: Option<&str>, id: Option<&str>) {
        let png = match page.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!("Screenshot failed: {}", e);
                return;
            }
        };
        let path = self.screenshot_path(name, id);
        if let Err(e) = tokio::fs::create_dir_all(&self.screenshot_dir).await {
            tracing::warn!("Could not create {}: {}", self.screenshot_dir.display(), e);
            return;
        }
        match tokio::fs::write(&path, png).await {
            Ok(()) => tracing::info!("Saved page screenshot {}", path.display()),
            Err(e) => tracing::warn!("Could not save {}: {}", path.display(), e),
        }
    }
}

/// Runs the extraction strategies in order until one yields a valid price.
pub struct PriceExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    artifacts: Option<DebugArtifacts>,
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceExtractor {
    pub fn new() -> Self {
        Self::with_strategies(default_chain())
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self {
            strategies,
            artifacts: None,
        }
    }

    pub fn with_debug_artifacts(mut self, artifacts: DebugArtifacts) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn extract(
        &self,
        page: &dyn PageDriver,
        product_name: Option<&str>,
        product_id: Option<&str>,
    ) -> PriceExtraction {
        if let Some(artifacts) = &self.artifacts {
            artifacts.save_page_source(page).await;
        }

        let mut found = None;
        for (index, strategy) in self.strategies.iter().enumerate() {
            match strategy.attempt(page).await {
                Ok(Some(candidate)) => match validate_price(&candidate) {
                    Some(price) => {
                        tracing::info!(strategy = strategy.name(), %price, "Strategy {} extracted price", index + 1);
                        found = Some((price, strategy.name().to_string()));
                        break;
                    }
                    None => {
                        tracing::debug!(strategy = strategy.name(), %candidate, "Extracted value is not a valid price");
                    }
                },
                Ok(None) => {
                    tracing::debug!(strategy = strategy.name(), "Strategy found no price");
                }
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), "Strategy {} failed: {}", index + 1, e);
                }
            }
        }

        if let Some(artifacts) = &self.artifacts {
            artifacts.save_screenshot(page, product_name, product_id).await;
        }

        match found {
            Some((price, strategy)) => PriceExtraction {
                price,
                success: true,
                strategy: Some(strategy),
            },
            None => PriceExtraction::not_found(),
        }
    }
}
