pub mod catalog;
pub mod config;
pub mod harvest;
pub mod job_store;
pub mod models;
pub mod plugins;
pub mod price_extractor;
pub mod price_history;
pub mod price_logger;
pub mod product_manager;
pub mod report;
pub mod scheduler;
pub mod scraper;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use models::{ChangeEvent, JobRecord, Product};
pub use product_manager::{MonitorSummary, PriceMonitor};
pub use utils::error::{AppError, Result};
