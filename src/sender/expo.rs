use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info};

use crate::error::{PushError, Result};
use crate::sender::sender_trait::ChannelSender;
use crate::types::{ChannelKey, PushMessage, Recipient, SendResult};

const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Expo 单次请求的最大消息数
const EXPO_CHUNK_SIZE: usize = 100;

/// Expo Push Sender
///
/// 批量提交（每批最多 100 条），按返回的 ticket 逐设备规范化结果。
pub struct ExpoSender {
    client: Client,
    channel: ChannelKey,
    access_token: Option<String>,
}

impl ExpoSender {
    pub fn new(channel: ChannelKey, access_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            channel,
            access_token,
        }
    }

    fn build_chunk_payload(&self, message: &PushMessage, chunk: &[Recipient]) -> serde_json::Value {
        let data = message.data.as_object();
        let title = data.and_then(|d| d.get("title")).cloned();
        let body = data.and_then(|d| d.get("alert").or_else(|| d.get("body"))).cloned();

        let messages: Vec<serde_json::Value> = chunk
            .iter()
            .map(|device| {
                json!({
                    "to": device.device_token,
                    "title": title,
                    "body": body,
                    "data": message.data,
                })
            })
            .collect();
        serde_json::Value::Array(messages)
    }
}

#[async_trait]
impl ChannelSender for ExpoSender {
    async fn send(&self, message: &PushMessage, devices: &[Recipient]) -> Result<Vec<SendResult>> {
        info!("[EXPO] sending to {} device(s)", devices.len());

        let mut results = Vec::with_capacity(devices.len());
        for chunk in devices.chunks(EXPO_CHUNK_SIZE) {
            let payload = self.build_chunk_payload(message, chunk);

            let mut request = self
                .client
                .post(EXPO_PUSH_URL)
                .header("Content-Type", "application/json");
            if let Some(token) = &self.access_token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            let response = request
                .json(&payload)
                .send()
                .await
                .map_err(|e| PushError::Transport(format!("Expo request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                error!("[EXPO] batch rejected: status={}, error={}", status, error_text);
                return Err(PushError::Transport(format!(
                    "Expo push failed: status={}, error={}",
                    status, error_text
                )));
            }

            let body: serde_json::Value = response.json().await?;
            let tickets = body
                .get("data")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default();

            for (i, device) in chunk.iter().enumerate() {
                match tickets.get(i) {
                    Some(ticket) if ticket.get("status").and_then(|s| s.as_str()) == Some("ok") => {
                        results.push(SendResult::success(device.into(), Some(ticket.clone())));
                    }
                    Some(ticket) => {
                        results.push(SendResult::failure_with_response(
                            device.into(),
                            ticket.clone(),
                        ));
                    }
                    None => {
                        results.push(SendResult::failure(
                            device.into(),
                            "no ticket returned for device",
                        ));
                    }
                }
            }
        }

        Ok(results)
    }

    fn channel(&self) -> ChannelKey {
        self.channel
    }
}
