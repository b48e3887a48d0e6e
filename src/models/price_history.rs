use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Last known state of one tracked item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub name: String,
    /// Raw price text; the numeric value is its leading decimal.
    pub price: String,
    #[serde(with = "last_update_format")]
    pub last_update: NaiveDateTime,
}

/// Outcome of comparing an observed price against the stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCheck {
    pub is_new_item: bool,
    pub has_changed: bool,
    pub old_price: Option<String>,
}

impl PriceRecord {
    pub fn new(name: impl Into<String>, price: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            last_update: at,
        }
    }

    pub fn last_update_date(&self) -> String {
        self.last_update.format("%Y-%m-%d").to_string()
    }
}

mod last_update_format {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    use crate::utils::text::TIMESTAMP_FORMAT;

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
