use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::plugins::traits::ExtractionStrategy;
use crate::scraper::PageDriver;
use crate::utils::error::Result;
use crate::utils::text::first_decimal;

static SPAN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span").expect("span selector parses"));

const YEN_GLYPHS: [char; 2] = ['¥', '￥'];

/// Markup shapes that usually hold the price on an item page, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceProbe {
    /// `<span>¥</span><span class="text">12.5</span>`
    TextAfterYenSpan,
    /// `<span class="unit">¥</span><span>12.5</span>`
    AfterUnitSpan,
    /// A span with a yen glyph anywhere inside a `price`/`Price` container.
    InsidePriceContainer,
    /// A span inside a block styled with a red text colour.
    InsideHighlightBlock,
}

pub const PROBES: [PriceProbe; 4] = [
    PriceProbe::TextAfterYenSpan,
    PriceProbe::AfterUnitSpan,
    PriceProbe::InsidePriceContainer,
    PriceProbe::InsideHighlightBlock,
];

impl PriceProbe {
    /// Matching elements in document order.
    pub fn find<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let spans = doc.select(&SPAN);
        match self {
            PriceProbe::TextAfterYenSpan => spans
                .filter(|el| class_contains(el, "text"))
                .filter(|el| {
                    el.prev_siblings()
                        .filter_map(ElementRef::wrap)
                        .filter(|sib| sib.value().name() == "span")
                        .any(|sib| has_yen(&own_text(&sib)))
                })
                .collect(),
            PriceProbe::AfterUnitSpan => spans
                .filter(|el| class_contains(el, "unit") && has_yen(&own_text(el)))
                .flat_map(|unit| {
                    unit.next_siblings()
                        .filter_map(ElementRef::wrap)
                        .filter(|sib| sib.value().name() == "span")
                })
                .collect(),
            PriceProbe::InsidePriceContainer => spans
                .filter(|el| has_yen(&own_text(el)))
                .filter(|el| {
                    has_div_ancestor(el, |div| {
                        class_contains(div, "price") || class_contains(div, "Price")
                    })
                })
                .collect(),
            PriceProbe::InsideHighlightBlock => spans
                .filter(|el| own_text(el).contains('￥') || class_contains(el, "text"))
                .filter(|el| {
                    has_div_ancestor(el, |div| {
                        div.value()
                            .attr("style")
                            .is_some_and(|style| style.contains("color: rgb(255"))
                    })
                })
                .collect(),
        }
    }
}

fn class_contains(el: &ElementRef, fragment: &str) -> bool {
    el.value()
        .attr("class")
        .is_some_and(|class| class.contains(fragment))
}

fn has_yen(text: &str) -> bool {
    text.contains(YEN_GLYPHS)
}

/// Text nodes that are direct children of `el`.
fn own_text(el: &ElementRef) -> String {
    el.children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect()
}

fn has_div_ancestor(el: &ElementRef, predicate: impl Fn(&ElementRef) -> bool) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|anc| anc.value().name() == "div")
        .any(|div| predicate(&div))
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>()
}

/// Runs the probes in order. For the first probe with matches, the first element
/// whose text carries a number wins; failing that, the first such parent.
pub fn structural_price(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    for probe in PROBES {
        let elements = probe.find(&doc);
        if elements.is_empty() {
            continue;
        }
        tracing::debug!(?probe, matches = elements.len(), "Price elements found");

        if let Some(price) = elements
            .iter()
            .find_map(|el| first_decimal(&element_text(el)).map(str::to_string))
        {
            return Some(price);
        }

        if let Some(price) = elements.iter().find_map(|el| {
            let parent = el.parent().and_then(ElementRef::wrap)?;
            first_decimal(&element_text(&parent)).map(str::to_string)
        }) {
            return Some(price);
        }
    }

    None
}

pub struct StructuralStrategy;

impl Default for StructuralStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralStrategy {
    pub fn new() -> Self {
        StructuralStrategy
    }
}

#[async_trait]
impl ExtractionStrategy for StructuralStrategy {
    fn name(&self) -> &str {
        "structural"
    }

    fn description(&self) -> &str {
        "Searches common price-container markup in the page source"
    }

    async fn attempt(&self, page: &dyn PageDriver) -> Result<Option<String>> {
        let html = page.html().await?;
        Ok(structural_price(&html))
    }
}
