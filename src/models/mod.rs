use serde::{Deserialize, Serialize};

pub mod change_event;
pub mod job_record;
pub mod price_history;
pub mod product;

// Re-exports for convenience
pub use change_event::*;
pub use job_record::*;
pub use price_history::*;
pub use product::*;

// Direction of a detected price change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Increased,
    Decreased,
    Unchanged,
}

impl ChangeType {
    pub fn emoji(&self) -> &'static str {
        match self {
            ChangeType::Decreased => "📉",
            ChangeType::Increased => "📈",
            ChangeType::Unchanged => "📊",
        }
    }
}
