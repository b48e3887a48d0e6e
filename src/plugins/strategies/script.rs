use async_trait::async_trait;

use crate::plugins::traits::ExtractionStrategy;
use crate::scraper::PageDriver;
use crate::utils::error::Result;
use crate::utils::text::first_decimal;

/// Evaluated in the page. Tries known price classes, then any element with a yen
/// glyph followed by a number, then the smallest short numeric-only text node.
pub const PRICE_PROBE_SCRIPT: &str = r#"(function () {
    const priceNodes = document.querySelectorAll(
        'span.text--Mdqy24Ex, [class*="price"] span, [class*="Price"] span, span.tm-price, .tb-rmb-num'
    );
    for (const el of priceNodes) {
        const text = el.textContent.trim();
        if (/\d+(\.\d+)?/.test(text)) {
            return text;
        }
    }

    const withYen = Array.from(document.querySelectorAll('*')).filter(
        el => el.textContent && (el.textContent.includes('￥') || el.textContent.includes('¥'))
    );
    for (const el of withYen) {
        const match = el.textContent.trim().match(/[¥￥]\s*(\d+(?:\.\d+)?)/);
        if (match) {
            return match[1];
        }
    }

    const numericTexts = Array.from(document.querySelectorAll('div, span, p'))
        .map(el => el.textContent.trim())
        .filter(text => /^\d+(\.\d+)?$/.test(text) && text.length < 10);
    if (numericTexts.length > 0) {
        return numericTexts.sort((a, b) => parseFloat(a) - parseFloat(b))[0];
    }

    return null;
})()"#;

pub struct ScriptStrategy {
    script: &'static str,
}

impl Default for ScriptStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptStrategy {
    pub fn new() -> Self {
        Self {
            script: PRICE_PROBE_SCRIPT,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for ScriptStrategy {
    fn name(&self) -> &str {
        "script"
    }

    fn description(&self) -> &str {
        "Evaluates a price probe script inside the page"
    }

    async fn attempt(&self, page: &dyn PageDriver) -> Result<Option<String>> {
        let Some(raw) = page.evaluate(self.script).await? else {
            return Ok(None);
        };
        tracing::debug!(raw = %raw, "Script returned price text");
        Ok(first_decimal(&raw).map(str::to_string))
    }
}
