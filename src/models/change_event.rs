use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ChangeType;

/// Shown instead of a percentage when the old price is not a usable number.
pub const CHANGE_RATE_UNKNOWN: &str = "未知";

/// A price difference detected during one monitoring pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub name: String,
    pub id: String,
    pub old_price: String,
    pub new_price: String,
    pub change_rate: String,
}

impl ChangeEvent {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        old_price: impl Into<String>,
        new_price: impl Into<String>,
    ) -> Self {
        let old_price = old_price.into();
        let new_price = new_price.into();
        let change_rate = format_change_rate(&old_price, &new_price);
        Self {
            name: name.into(),
            id: id.into(),
            old_price,
            new_price,
            change_rate,
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match (parse_plain(&self.old_price), parse_plain(&self.new_price)) {
            (Some(old), Some(new)) if new > old => ChangeType::Increased,
            (Some(old), Some(new)) if new < old => ChangeType::Decreased,
            _ => ChangeType::Unchanged,
        }
    }
}

fn parse_plain(price: &str) -> Option<Decimal> {
    Decimal::from_str(price.trim()).ok()
}

/// `(new - old) / old * 100` rendered as `+12.5%`; `0%` when the numbers agree and
/// [`CHANGE_RATE_UNKNOWN`] when either side is not a plain number or old is zero.
pub fn format_change_rate(old_price: &str, new_price: &str) -> String {
    let (Some(old), Some(new)) = (parse_plain(old_price), parse_plain(new_price)) else {
        return CHANGE_RATE_UNKNOWN.to_string();
    };
    if old.is_zero() {
        return CHANGE_RATE_UNKNOWN.to_string();
    }

    let rate = ((new - old) / old * Decimal::from(100))
        .to_f64()
        .unwrap_or(0.0);
    if rate == 0.0 {
        "0%".to_string()
    } else {
        format!("{:+.1}%", rate)
    }
}
