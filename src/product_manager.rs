use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{AppConfig, MonitorConfig};
use crate::models::{ChangeEvent, PriceCheck, Product};
use crate::price_extractor::{DebugArtifacts, PriceExtractor};
use crate::price_history::PriceHistoryStore;
use crate::price_logger::PriceLogger;
use crate::report::SimplePushReporter;
use crate::scraper::{load_page_with_retry, random_delay, PageDriver};
use crate::utils::error::Result;

/// Terminal state of one product in a monitoring pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProductOutcome {
    SkippedNoId,
    LoadFailed { error: String },
    ExtractFailed,
    Recorded { check: PriceCheck, price: String },
    /// Unexpected error or panic while the product was processed.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCheckResult {
    pub name: String,
    pub product_id: Option<String>,
    pub outcome: ProductOutcome,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub results: Vec<ProductCheckResult>,
    pub changes: Vec<ChangeEvent>,
    pub history_saved: bool,
    /// `None` when no push was requested.
    pub report_sent: Option<bool>,
}

impl MonitorSummary {
    pub fn count(&self, predicate: impl Fn(&ProductOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn recorded(&self) -> usize {
        self.count(|o| matches!(o, ProductOutcome::Recorded { .. }))
    }

    pub fn new_items(&self) -> usize {
        self.count(|o| matches!(o, ProductOutcome::Recorded { check, .. } if check.is_new_item))
    }
}

/// Drives a product list through page load, extraction and change detection.
pub struct PriceMonitor {
    config: MonitorConfig,
    extractor: PriceExtractor,
    history: PriceHistoryStore,
    logger: PriceLogger,
    reporter: Option<SimplePushReporter>,
}

impl PriceMonitor {
    pub fn new(
        config: MonitorConfig,
        extractor: PriceExtractor,
        history: PriceHistoryStore,
        logger: PriceLogger,
    ) -> Self {
        Self {
            config,
            extractor,
            history,
            logger,
            reporter: None,
        }
    }

    /// Standard wiring below the configured data directory.
    pub fn from_config(config: &AppConfig) -> Self {
        let data_dir = config.data_dir();
        let mut extractor = PriceExtractor::new();
        if config.monitor.save_debug_info {
            extractor = extractor.with_debug_artifacts(DebugArtifacts::in_dir(data_dir));
        }

        Self::new(
            config.monitor.clone(),
            extractor,
            PriceHistoryStore::in_dir(data_dir),
            PriceLogger::in_dir(data_dir),
        )
    }

    pub fn with_reporter(mut self, reporter: SimplePushReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn history(&self) -> &PriceHistoryStore {
        &self.history
    }

    /// One full pass over `products`. Failures are isolated per product; history is
    /// written once at the end, and the report is pushed when `push` is set.
    pub async fn monitor_prices(
        &mut self,
        page: &dyn PageDriver,
        products: &[Product],
        push: bool,
        token: Option<&str>,
    ) -> MonitorSummary {
        let total = products.len();
        tracing::info!(total, "Starting price monitoring");
        self.logger.log_event(&format!("Monitoring started for {} products", total));

        let mut summary = MonitorSummary::default();

        for (index, product) in products.iter().enumerate() {
            let position = index + 1;
            let is_last = position == total;
            let started = Instant::now();

            let Some(product_id) = product.item_id() else {
                tracing::warn!(position, total, url = %product.url, "Skipping product: no item id in URL");
                summary.results.push(ProductCheckResult {
                    name: product.name.clone(),
                    product_id: None,
                    outcome: ProductOutcome::SkippedNoId,
                    total_time_ms: 0,
                });
                continue;
            };

            tracing::info!(position, total, id = %product_id, "Checking {}", product.display_name());

            let outcome = match AssertUnwindSafe(self.check_product(page, product, &product_id, &mut summary.changes))
                .catch_unwind()
                .await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    tracing::error!(id = %product_id, "Error while checking product: {:?}", e);
                    ProductOutcome::Failed { error: e.to_string() }
                }
                Err(panic) => {
                    let error = panic_message(panic.as_ref());
                    tracing::error!(id = %product_id, "Product check panicked: {}", error);
                    ProductOutcome::Failed { error }
                }
            };

            let pause = match &outcome {
                ProductOutcome::Recorded { .. } if !is_last => {
                    Some(random_delay(self.config.pacing_min_ms, self.config.pacing_max_ms))
                }
                ProductOutcome::Failed { .. } => Some(random_delay(
                    self.config.error_pause_min_ms,
                    self.config.error_pause_max_ms,
                )),
                _ => None,
            };

            summary.results.push(ProductCheckResult {
                name: product.name.clone(),
                product_id: Some(product_id),
                outcome,
                total_time_ms: started.elapsed().as_millis() as u64,
            });

            if let Some(pause) = pause {
                tracing::debug!(pause_ms = pause.as_millis() as u64, "Pausing before next product");
                tokio::time::sleep(pause).await;
            }
        }

        summary.history_saved = match self.history.save() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save price history: {}", e);
                false
            }
        };
        self.logger.log_event("Monitoring finished");
        tracing::info!(
            recorded = summary.recorded(),
            new_items = summary.new_items(),
            changes = summary.changes.len(),
            "Monitoring finished"
        );

        if push {
            summary.report_sent = Some(match &self.reporter {
                Some(reporter) => reporter.send_price_report(token, &self.history, &summary.changes).await,
                None => {
                    tracing::warn!("Push requested but no reporter is configured");
                    false
                }
            });
        }

        summary
    }

    async fn check_product(
        &mut self,
        page: &dyn PageDriver,
        product: &Product,
        product_id: &str,
        changes: &mut Vec<ChangeEvent>,
    ) -> Result<ProductOutcome> {
        if let Err(e) = load_page_with_retry(page, &product.url, &self.config).await {
            tracing::warn!(id = product_id, "Could not load page: {}", e);
            return Ok(ProductOutcome::LoadFailed { error: e.to_string() });
        }

        let extraction = self
            .extractor
            .extract(page, Some(&product.name), Some(product_id))
            .await;
        if !extraction.success {
            tracing::warn!(id = product_id, "Could not extract price: {}", extraction.price);
            return Ok(ProductOutcome::ExtractFailed);
        }
        let price = extraction.price;

        let check = self.history.check_price_change(product_id, &product.name, &price);
        if check.is_new_item {
            tracing::info!(id = product_id, %price, "New item");
        } else if let (true, Some(old_price)) = (check.has_changed, check.old_price.as_deref()) {
            let event = ChangeEvent::new(&product.name, product_id, old_price, &price);
            tracing::info!(
                id = product_id,
                old = old_price,
                new = %price,
                rate = %event.change_rate,
                "{} Price changed",
                event.change_type().emoji()
            );
            self.logger.log_price_change(&product.name, product_id, old_price, &price);
            changes.push(event);
        } else {
            tracing::info!(id = product_id, %price, "Price unchanged");
        }

        Ok(ProductOutcome::Recorded { check, price })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Upper bound of the pauses a pass of `products` items may take, for progress output.
pub fn expected_pacing(config: &MonitorConfig, products: usize) -> Duration {
    Duration::from_millis(config.pacing_max_ms * products.saturating_sub(1) as u64)
}
