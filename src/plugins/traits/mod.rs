pub mod strategy;
pub mod notifier;

pub use strategy::ExtractionStrategy;
pub use notifier::{NotifierPlugin, PushMessage, NotificationResult, CONTENT_TYPE_HTML};
