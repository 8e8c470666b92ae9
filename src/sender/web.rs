use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{PushError, Result};
use crate::sender::sender_trait::ChannelSender;
use crate::types::{ChannelKey, PushMessage, Recipient, SendResult};

/// 默认推送保留时长：4 周（Web Push 规范允许的上限附近）
const DEFAULT_TTL_SECS: u64 = 4 * 7 * 24 * 3600;

/// Web Push Sender
///
/// deviceToken 即订阅端点 URL。负载加密不在本层范围内，
/// 只发送无负载的 tickle 推送（客户端收到后自行拉取）。
pub struct WebSender {
    client: Client,
    channel: ChannelKey,
    default_ttl_secs: u64,
}

impl WebSender {
    pub fn new(channel: ChannelKey, default_ttl_secs: Option<u64>) -> Self {
        Self {
            client: Client::new(),
            channel,
            default_ttl_secs: default_ttl_secs.unwrap_or(DEFAULT_TTL_SECS),
        }
    }

    fn ttl_for(&self, message: &PushMessage) -> u64 {
        message
            .expiration_time
            .map(|t| (t - Utc::now()).num_seconds().max(0) as u64)
            .unwrap_or(self.default_ttl_secs)
    }
}

#[async_trait]
impl ChannelSender for WebSender {
    async fn send(&self, message: &PushMessage, devices: &[Recipient]) -> Result<Vec<SendResult>> {
        info!("[WEB] sending to {} subscription(s)", devices.len());
        let ttl = self.ttl_for(message);

        let mut results = Vec::with_capacity(devices.len());
        for device in devices {
            let response = self
                .client
                .post(&device.device_token)
                .header("TTL", ttl.to_string())
                .header("Content-Length", "0")
                .send()
                .await
                .map_err(|e| PushError::Transport(format!("Web Push request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                results.push(SendResult::success(
                    device.into(),
                    Some(json!({ "status": status.as_u16() })),
                ));
            } else if status.as_u16() == 404 || status.as_u16() == 410 {
                // 订阅已失效
                warn!("[WEB] subscription gone: status={}", status);
                results.push(SendResult::failure_with_response(
                    device.into(),
                    json!({ "error": "subscription expired", "status": status.as_u16() }),
                ));
            } else {
                results.push(SendResult::failure_with_response(
                    device.into(),
                    json!({ "error": "push service rejected", "status": status.as_u16() }),
                ));
            }
        }

        Ok(results)
    }

    fn channel(&self) -> ChannelKey {
        self.channel
    }
}
