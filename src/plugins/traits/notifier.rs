use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// `contentType` value for an HTML body.
pub const CONTENT_TYPE_HTML: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub content: String,
    pub summary: String,
    pub content_type: u8,
    /// Bearer token identifying the recipient.
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Trait for implementing push delivery channels
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;

    /// Delivers one message. Rejections by the remote service are reported in the
    /// result; `Err` is reserved for transport and decoding failures.
    async fn notify(&self, message: &PushMessage) -> Result<NotificationResult>;
}
