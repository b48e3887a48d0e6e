use askama::Template;
use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::config::{AppConfig, PriceCalculationConfig};
use crate::models::ChangeEvent;
use crate::plugins::traits::{CONTENT_TYPE_HTML, NotifierPlugin, PushMessage};
use crate::price_history::PriceHistoryStore;
use crate::utils::text::truncate_display;

/// Shown when a suggested price cannot be derived from the stored price.
pub const SUGGESTED_PRICE_UNAVAILABLE: &str = "无法计算";

/// Applies the resale markup policy to stored prices.
#[derive(Debug, Clone)]
pub struct PriceCalculator {
    low_price_threshold: f64,
    low_price_multiplier: f64,
    high_price_multiplier: f64,
}

impl PriceCalculator {
    pub fn new(config: &PriceCalculationConfig) -> Self {
        Self {
            low_price_threshold: config.low_price_threshold,
            low_price_multiplier: config.low_price_multiplier,
            high_price_multiplier: config.high_price_multiplier,
        }
    }

    /// Numeric part of a stored price, ignoring a trailing `(...)` qualifier.
    pub fn base_price(price: &str) -> Option<Decimal> {
        let head = price.split(['(', '（']).next().unwrap_or_default().trim();
        Decimal::from_str(head).ok()
    }

    /// `ceil(price * multiplier * 10) / 10`, with the low multiplier applied at or
    /// below the threshold.
    pub fn calculate_suggested_price(&self, price: &str) -> String {
        self.suggest(price)
            .map(|value| format!("{:.1}", value))
            .unwrap_or_else(|| SUGGESTED_PRICE_UNAVAILABLE.to_string())
    }

    fn suggest(&self, price: &str) -> Option<Decimal> {
        let value = Self::base_price(price)?;
        let threshold = decimal_from_f64(self.low_price_threshold)?;
        let multiplier = if value <= threshold {
            self.low_price_multiplier
        } else {
            self.high_price_multiplier
        };
        let multiplier = decimal_from_f64(multiplier)?;
        let ten = Decimal::from(10);

        let scaled = value.checked_mul(multiplier)?.checked_mul(ten)?;
        Some(scaled.ceil() / ten)
    }
}

// via the shortest decimal text: 1.2 -> 1.2, not its binary expansion
fn decimal_from_f64(value: f64) -> Option<Decimal> {
    Decimal::from_str(&value.to_string()).ok()
}

pub struct ChangeRow {
    pub name: String,
    pub old_price: String,
    pub new_price: String,
    pub change_rate: String,
    pub suggested: String,
}

pub struct ItemRow {
    pub display_name: String,
    pub price: String,
    pub suggested: String,
    pub updated: String,
    pub background: &'static str,
}

#[derive(Template)]
#[template(path = "price_report.html")]
pub struct PriceReportTemplate {
    pub generated_at: String,
    pub changes: Vec<ChangeRow>,
    pub items: Vec<ItemRow>,
    pub threshold: String,
    pub low_multiplier: String,
    pub high_multiplier: String,
}

/// Renders the HTML price report.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    calculator: PriceCalculator,
}

impl ReportRenderer {
    pub fn new(config: &PriceCalculationConfig) -> Self {
        Self {
            calculator: PriceCalculator::new(config),
        }
    }

    pub fn calculator(&self) -> &PriceCalculator {
        &self.calculator
    }

    pub fn generate_price_report(&self, history: &PriceHistoryStore, changes: &[ChangeEvent]) -> String {
        self.generate_price_report_at(history, changes, Local::now().naive_local())
    }

    /// A template failure becomes an inline error notice instead of an error.
    pub fn generate_price_report_at(
        &self,
        history: &PriceHistoryStore,
        changes: &[ChangeEvent],
        now: NaiveDateTime,
    ) -> String {
        let template = self.build_template(history, changes, now);
        match template.render() {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render price report: {}", e);
                format!(
                    "<div style=\"padding: 15px; text-align: center; color: #ff6b6b;\">生成报告时发生错误: {}</div>",
                    e
                )
            }
        }
    }

    pub fn build_template(
        &self,
        history: &PriceHistoryStore,
        changes: &[ChangeEvent],
        now: NaiveDateTime,
    ) -> PriceReportTemplate {
        let changes = changes
            .iter()
            .map(|change| ChangeRow {
                name: change.name.clone(),
                old_price: change.old_price.clone(),
                new_price: change.new_price.clone(),
                change_rate: change.change_rate.clone(),
                suggested: self.calculator.calculate_suggested_price(&change.new_price),
            })
            .collect();

        let mut records: Vec<_> = history.records().values().collect();
        // stable sort: unparseable prices go last, ties keep id order
        records.sort_by(|a, b| {
            match (PriceCalculator::base_price(&a.price), PriceCalculator::base_price(&b.price)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });

        let items = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| ItemRow {
                display_name: truncate_display(&record.name, 25, 28),
                price: record.price.clone(),
                suggested: self.calculator.calculate_suggested_price(&record.price),
                updated: record.last_update_date(),
                background: if index % 2 == 0 { "#333" } else { "#3a3a3a" },
            })
            .collect();

        PriceReportTemplate {
            generated_at: now.format("%m月%d日 %H:%M").to_string(),
            changes,
            items,
            threshold: format!("{:?}", self.calculator.low_price_threshold),
            low_multiplier: format!("{:?}", self.calculator.low_price_multiplier),
            high_multiplier: format!("{:?}", self.calculator.high_price_multiplier),
        }
    }
}

/// Sends the rendered report through a push channel.
pub struct SimplePushReporter {
    renderer: ReportRenderer,
    notifier: Box<dyn NotifierPlugin>,
    default_token: String,
}

impl SimplePushReporter {
    pub fn new(renderer: ReportRenderer, notifier: Box<dyn NotifierPlugin>, default_token: impl Into<String>) -> Self {
        Self {
            renderer,
            notifier,
            default_token: default_token.into(),
        }
    }

    pub fn from_config(config: &AppConfig, notifier: Box<dyn NotifierPlugin>) -> Self {
        Self::new(
            ReportRenderer::new(&config.price_calculation),
            notifier,
            config.wx_push.default_spt.clone(),
        )
    }

    pub fn renderer(&self) -> &ReportRenderer {
        &self.renderer
    }

    /// Explicit token first, then the configured default.
    fn resolve_token<'a>(&'a self, token: Option<&'a str>) -> Option<&'a str> {
        token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| Some(self.default_token.trim()).filter(|t| !t.is_empty()))
    }

    /// Never fails: every problem is logged and reported as `false`.
    pub async fn send_price_report(
        &self,
        token: Option<&str>,
        history: &PriceHistoryStore,
        changes: &[ChangeEvent],
    ) -> bool {
        let Some(token) = self.resolve_token(token) else {
            tracing::error!("SPT (Simple Push Token) is not set, report not sent");
            return false;
        };

        let message = PushMessage {
            content: self.renderer.generate_price_report(history, changes),
            summary: format!("淘宝价格监控报告 {}", Local::now().format("%m-%d %H:%M")),
            content_type: CONTENT_TYPE_HTML,
            token: token.to_string(),
        };

        match self.notifier.notify(&message).await {
            Ok(result) if result.success => {
                tracing::info!(notifier = self.notifier.name(), "Price report pushed");
                true
            }
            Ok(result) => {
                tracing::warn!(
                    notifier = self.notifier.name(),
                    "Price report push rejected: {}",
                    result.error.unwrap_or_default()
                );
                false
            }
            Err(e) => {
                tracing::error!(notifier = self.notifier.name(), "Price report push failed: {}", e);
                false
            }
        }
    }
}
