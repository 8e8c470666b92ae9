use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info};

use crate::error::{PushError, Result};
use crate::sender::sender_trait::ChannelSender;
use crate::types::{ChannelKey, PushMessage, Recipient, SendResult};

/// FCM (Firebase Cloud Messaging) Sender
///
/// 使用 FCM HTTP v1 API。HTTP 错误状态规范化为单设备失败结果；
/// 传输异常视为通道级失败。
pub struct FcmSender {
    client: Client,
    channel: ChannelKey,
    project_id: String,
    access_token: String, // OAuth 2.0 access token
}

impl FcmSender {
    pub fn new(channel: ChannelKey, project_id: String, access_token: String) -> Self {
        Self {
            client: Client::new(),
            channel,
            project_id,
            access_token,
        }
    }

    /// 构建 FCM 消息 payload
    fn build_fcm_payload(&self, message: &PushMessage, token: &str) -> serde_json::Value {
        let data = message.data.as_object();
        let title = data
            .and_then(|d| d.get("title"))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let body = data
            .and_then(|d| d.get("alert").or_else(|| d.get("body")))
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        json!({
            "message": {
                "token": token,
                "notification": {
                    "title": title,
                    "body": body
                },
                "data": {
                    "payload": message.data.to_string()
                },
                "android": {
                    "priority": "high"
                }
            }
        })
    }
}

#[async_trait]
impl ChannelSender for FcmSender {
    async fn send(&self, message: &PushMessage, devices: &[Recipient]) -> Result<Vec<SendResult>> {
        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        );

        info!(
            "[FCM] sending to {} device(s) on channel {}",
            devices.len(),
            self.channel.as_str()
        );

        let mut results = Vec::with_capacity(devices.len());
        for device in devices {
            let payload = self.build_fcm_payload(message, &device.device_token);

            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.access_token))
                .header("Content-Type", "application/json")
                .json(&payload)
                .send()
                .await
                .map_err(|e| PushError::Transport(format!("FCM request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                let body: serde_json::Value = response.json().await.unwrap_or(json!({}));
                results.push(SendResult::success(device.into(), Some(body)));
            } else {
                let error_text = response.text().await.unwrap_or_default();
                error!(
                    "[FCM] push failed: status={}, error={}",
                    status, error_text
                );
                results.push(SendResult::failure_with_response(
                    device.into(),
                    json!({
                        "error": error_text,
                        "status": status.as_u16(),
                    }),
                ));
            }
        }

        Ok(results)
    }

    fn channel(&self) -> ChannelKey {
        self.channel
    }
}
