use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::item_url;
use crate::utils::text::TIMESTAMP_FORMAT;

pub const PRICE_LOG_DIR: &str = "price_logs";
pub const PRICE_LOG_FILE: &str = "price_changes.log";

/// Human-readable, append-only log of price changes and run events.
/// Write failures are reported through tracing and otherwise ignored.
#[derive(Debug, Clone)]
pub struct PriceLogger {
    path: PathBuf,
}

impl PriceLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(PRICE_LOG_DIR).join(PRICE_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_price_change(&self, name: &str, id: &str, old_price: &str, new_price: &str) {
        let entry = format!(
            "[{}] {} (ID: {})\nprice change: {} → {}\nlink: {}\n\n",
            timestamp(),
            name,
            id,
            old_price,
            new_price,
            item_url(id)
        );
        self.append(&entry);
    }

    pub fn log_event(&self, message: &str) {
        self.append(&format!("[{}] {}\n", timestamp(), message));
    }

    fn append(&self, entry: &str) {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(entry.as_bytes())
        })();

        if let Err(e) = result {
            tracing::warn!("Failed to write price log {}: {}", self.path.display(), e);
        }
    }
}

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
