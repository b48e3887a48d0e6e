// Price extraction strategies, tried in the order returned by `default_chain`
pub mod structural;
pub mod script;
pub mod text_scan;

pub use structural::StructuralStrategy;
pub use script::ScriptStrategy;
pub use text_scan::TextScanStrategy;

use crate::plugins::traits::ExtractionStrategy;

/// Structural selectors first, then the in-page script, then the body text scan.
pub fn default_chain() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(StructuralStrategy::new()),
        Box::new(ScriptStrategy::new()),
        Box::new(TextScanStrategy::new()),
    ]
}
