use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::plugins::traits::{NotificationResult, NotifierPlugin, PushMessage};
use crate::utils::error::Result;

/// Public simple-push endpoint of WxPusher.
pub const WXPUSHER_SIMPLE_PUSH_URL: &str =
    "https://wxpusher.zjiecode.com/api/send/message/simple-push";

#[derive(Debug, Deserialize)]
struct WxPusherResponse {
    #[serde(default)]
    success: bool,
    msg: Option<String>,
}

/// Delivers messages through WxPusher's token based "simple push" API.
pub struct WxPusherNotifier {
    client: Client,
    api_url: String,
}

impl Default for WxPusherNotifier {
    fn default() -> Self {
        Self::new(WXPUSHER_SIMPLE_PUSH_URL)
    }
}

impl WxPusherNotifier {
    pub fn new(api_url: impl Into<String>) -> Self {
        WxPusherNotifier {
            client: Client::new(),
            api_url: api_url.into(),
        }
    }

    fn create_payload(&self, message: &PushMessage) -> serde_json::Value {
        json!({
            "content": message.content,
            "summary": message.summary,
            "contentType": message.content_type,
            "spt": message.token,
        })
    }
}

#[async_trait]
impl NotifierPlugin for WxPusherNotifier {
    fn name(&self) -> &str {
        "WxPusher"
    }

    fn plugin_type(&self) -> &str {
        "wxpusher"
    }

    async fn notify(&self, message: &PushMessage) -> Result<NotificationResult> {
        if message.token.trim().is_empty() {
            return Ok(NotificationResult::failed("SPT (Simple Push Token) is not set"));
        }

        let response = self
            .client
            .post(&self.api_url)
            .json(&self.create_payload(message))
            .send()
            .await?;
        let body: WxPusherResponse = response.json().await?;

        if body.success {
            Ok(NotificationResult {
                success: true,
                message_id: None,
                error: None,
            })
        } else {
            Ok(NotificationResult::failed(
                body.msg.unwrap_or_else(|| "push rejected".to_string()),
            ))
        }
    }
}
