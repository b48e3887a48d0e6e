use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{PriceCheck, PriceRecord};
use crate::utils::error::Result;

/// File name of the history inside the data directory.
pub const HISTORY_FILE: &str = "price_history.json";

/// Last known price per item id, persisted as one JSON object.
///
/// Mutations stay in memory until [`PriceHistoryStore::save`] is called.
#[derive(Debug, Clone)]
pub struct PriceHistoryStore {
    path: PathBuf,
    records: BTreeMap<String, PriceRecord>,
}

impl PriceHistoryStore {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::load(data_dir.join(HISTORY_FILE))
    }

    /// Reads the history at `path`. A missing or unreadable file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Price history {} is corrupt, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No price history at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!("Could not read price history {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        tracing::debug!(items = records.len(), "Price history loaded");
        Self { path, records }
    }

    pub fn check_price_change(&mut self, id: &str, name: &str, price: &str) -> PriceCheck {
        self.check_price_change_at(id, name, price, Local::now().naive_local())
    }

    /// Records `price` for `id` and reports how it relates to what was stored.
    /// Prices are compared as raw strings, so a changed qualifier counts as a change.
    pub fn check_price_change_at(
        &mut self,
        id: &str,
        name: &str,
        price: &str,
        now: NaiveDateTime,
    ) -> PriceCheck {
        let Some(record) = self.records.get_mut(id) else {
            self.records
                .insert(id.to_string(), PriceRecord::new(name, price, now));
            return PriceCheck {
                is_new_item: true,
                ..PriceCheck::default()
            };
        };

        record.name = name.to_string();
        if record.price == price {
            return PriceCheck {
                old_price: Some(record.price.clone()),
                ..PriceCheck::default()
            };
        }

        let old_price = std::mem::replace(&mut record.price, price.to_string());
        record.last_update = now;
        PriceCheck {
            is_new_item: false,
            has_changed: true,
            old_price: Some(old_price),
        }
    }

    /// Writes the whole history, replacing the previous file atomically.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::info!(items = self.records.len(), "Price history saved to {}", self.path.display());
        Ok(())
    }

    pub fn records(&self) -> &BTreeMap<String, PriceRecord> {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&PriceRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
