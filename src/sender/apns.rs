use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

use crate::cascade::{
    eligible_providers, send_through_providers, ProviderEndpoint, ProviderFailure,
    ProviderResponse,
};
use crate::config::ApnsCredential;
use crate::error::{PushError, Result};
use crate::sender::sender_trait::ChannelSender;
use crate::types::{ChannelKey, PushMessage, Recipient, SendResult};

const APNS_PRODUCTION_URL: &str = "https://api.push.apple.com";
const APNS_SANDBOX_URL: &str = "https://api.sandbox.push.apple.com";

/// APNs 单凭证客户端（级联中的一个 Provider）
///
/// 使用 APNs HTTP/2 API，JWT（ES256）认证。
pub struct ApnsClient {
    client: Client,
    team_id: String,
    key_id: String,
    private_key: EncodingKey,
    topic: Option<String>,
    index: usize,
    base_url: String,
}

impl ApnsClient {
    /// 读取并解析 .p8 私钥；失败属于配置错误，构造时同步抛出
    pub fn new(credential: &ApnsCredential, index: usize) -> Result<Self> {
        let pem = std::fs::read_to_string(&credential.private_key_path).map_err(|e| {
            PushError::Configuration(format!(
                "failed to read APNs private key {}: {}",
                credential.private_key_path, e
            ))
        })?;
        let private_key = EncodingKey::from_ec_pem(pem.as_bytes()).map_err(|e| {
            PushError::Configuration(format!("failed to parse APNs private key: {}", e))
        })?;

        Ok(Self {
            client: Client::new(),
            team_id: credential.team_id.clone(),
            key_id: credential.key_id.clone(),
            private_key,
            topic: credential.topic.clone(),
            index,
            base_url: if credential.production {
                APNS_PRODUCTION_URL.to_string()
            } else {
                APNS_SANDBOX_URL.to_string()
            },
        })
    }

    /// 生成 APNs JWT Token（有效期 1 小时，每次发送重新生成）
    fn generate_jwt_token(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PushError::Internal(e.to_string()))?
            .as_secs();

        let claims = json!({
            "iss": self.team_id,
            "iat": now
        });

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &self.private_key)
            .map_err(|e| PushError::Internal(format!("failed to generate APNs JWT: {}", e)))
    }
}

#[async_trait]
impl ProviderEndpoint for ApnsClient {
    fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    fn index(&self) -> usize {
        self.index
    }

    async fn push(
        &self,
        notification: &serde_json::Value,
        device_tokens: &[String],
    ) -> Result<ProviderResponse> {
        let jwt_token = self.generate_jwt_token()?;
        let payload = notification.get("payload").cloned().unwrap_or(json!({}));
        let expiration = notification.get("expiration").and_then(|v| v.as_i64());

        let mut response = ProviderResponse::default();
        for token in device_tokens {
            let url = format!("{}/3/device/{}", self.base_url, token);
            let mut request = self
                .client
                .post(&url)
                .header("authorization", format!("bearer {}", jwt_token))
                .header("apns-priority", "10")
                .header("apns-push-type", "alert");
            if let Some(topic) = &self.topic {
                request = request.header("apns-topic", topic);
            }
            if let Some(expiration) = expiration {
                request = request.header("apns-expiration", expiration.to_string());
            }

            match request.json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    response.sent.push(token.clone());
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let error_text = resp.text().await.unwrap_or_default();
                    // 解析 APNs 错误码
                    let reason = serde_json::from_str::<serde_json::Value>(&error_text)
                        .ok()
                        .and_then(|v| {
                            v.get("reason").and_then(|r| r.as_str()).map(String::from)
                        });
                    error!(
                        "[APNS] push failed: provider=#{}, status={}, reason={:?}",
                        self.index, status, reason
                    );
                    response.failed.push(ProviderFailure {
                        device: token.clone(),
                        status: Some(status),
                        response: Some(json!({
                            "reason": reason,
                            "body": error_text,
                        })),
                    });
                }
                Err(e) => {
                    error!("[APNS] request error: provider=#{}, error={}", self.index, e);
                    response.failed.push(ProviderFailure {
                        device: token.clone(),
                        status: None,
                        response: Some(json!({ "error": e.to_string() })),
                    });
                }
            }
        }

        Ok(response)
    }
}

/// APNs 系通道 Sender（ios/tvos/watchos/osx）
///
/// 支持多个签名凭证：按优先级升序排序（生产凭证默认排在沙箱之前），
/// 发送时按 appIdentifier 选择可用凭证并做级联失败转移。
pub struct ApnsSender {
    channel: ChannelKey,
    providers: Vec<Arc<dyn ProviderEndpoint>>,
}

impl ApnsSender {
    pub fn new(channel: ChannelKey, credentials: &[ApnsCredential]) -> Result<Self> {
        if credentials.is_empty() {
            return Err(PushError::Configuration(format!(
                "channel {} has no APNs credentials",
                channel.as_str()
            )));
        }

        // 升序稳定排序；下标分配后保持不变
        let mut sorted: Vec<&ApnsCredential> = credentials.iter().collect();
        sorted.sort_by_key(|c| c.effective_priority());

        let mut providers: Vec<Arc<dyn ProviderEndpoint>> = Vec::with_capacity(sorted.len());
        for (index, credential) in sorted.iter().enumerate() {
            providers.push(Arc::new(ApnsClient::new(credential, index)?));
        }

        Ok(Self { channel, providers })
    }

    /// 测试用：直接注入 Provider 列表
    pub fn with_providers(channel: ChannelKey, providers: Vec<Arc<dyn ProviderEndpoint>>) -> Self {
        Self { channel, providers }
    }

    /// 把 data 里的 APNs 标准字段折进 aps，其余作为自定义键保留
    fn build_notification(message: &PushMessage) -> serde_json::Value {
        let mut aps = serde_json::Map::new();
        let mut payload = serde_json::Map::new();

        if let Some(data) = message.data.as_object() {
            for (key, value) in data {
                match key.as_str() {
                    "alert" | "badge" | "sound" | "category" => {
                        aps.insert(key.clone(), value.clone());
                    }
                    "contentAvailable" => {
                        aps.insert("content-available".to_string(), value.clone());
                    }
                    "mutableContent" => {
                        aps.insert("mutable-content".to_string(), value.clone());
                    }
                    "threadId" => {
                        aps.insert("thread-id".to_string(), value.clone());
                    }
                    _ => {
                        payload.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        payload.insert("aps".to_string(), serde_json::Value::Object(aps));

        json!({
            "payload": serde_json::Value::Object(payload),
            "expiration": message.expiration_time.map(|t| t.timestamp()),
        })
    }
}

#[async_trait]
impl ChannelSender for ApnsSender {
    async fn send(&self, message: &PushMessage, devices: &[Recipient]) -> Result<Vec<SendResult>> {
        info!(
            "[APNS] sending to {} device(s) on channel {}",
            devices.len(),
            self.channel.as_str()
        );

        // 按 appIdentifier 分组，保持首次出现的顺序
        let mut groups: Vec<(Option<String>, Vec<&Recipient>)> = Vec::new();
        for device in devices {
            match groups
                .iter_mut()
                .find(|(id, _)| *id == device.app_identifier)
            {
                Some((_, list)) => list.push(device),
                None => groups.push((device.app_identifier.clone(), vec![device])),
            }
        }

        let notification = Self::build_notification(message);
        let mut results = Vec::with_capacity(devices.len());

        for (identifier, group) in groups {
            let providers = eligible_providers(&self.providers, identifier.as_deref());
            if providers.is_empty() {
                info!(
                    "[APNS] no eligible provider for appIdentifier={:?}, {} device(s) skipped",
                    identifier,
                    group.len()
                );
                for device in group {
                    results.push(SendResult::failure(
                        device.into(),
                        format!(
                            "no eligible APNs provider found for appIdentifier {}",
                            identifier.as_deref().unwrap_or("(none)")
                        ),
                    ));
                }
                continue;
            }

            let tokens: Vec<String> = group.iter().map(|d| d.device_token.clone()).collect();
            let response = send_through_providers(&notification, &tokens, &providers).await?;

            let sent: HashSet<&str> = response.sent.iter().map(String::as_str).collect();
            let failed: HashMap<&str, &ProviderFailure> = response
                .failed
                .iter()
                .map(|f| (f.device.as_str(), f))
                .collect();

            for device in group {
                let token = device.device_token.as_str();
                if sent.contains(token) {
                    results.push(SendResult::success(device.into(), None));
                } else if let Some(failure) = failed.get(token) {
                    results.push(SendResult::failure_with_response(
                        device.into(),
                        json!({
                            "error": failure.response,
                            "status": failure.status,
                        }),
                    ));
                } else {
                    results.push(SendResult::failure(
                        device.into(),
                        "device not acknowledged by any provider",
                    ));
                }
            }
        }

        Ok(results)
    }

    fn channel(&self) -> ChannelKey {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubProvider {
        topic: Option<String>,
        index: usize,
        failing: Vec<String>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ProviderEndpoint for StubProvider {
        fn topic(&self) -> Option<&str> {
            self.topic.as_deref()
        }

        fn index(&self) -> usize {
            self.index
        }

        async fn push(
            &self,
            _notification: &serde_json::Value,
            device_tokens: &[String],
        ) -> Result<ProviderResponse> {
            *self.calls.lock().unwrap() += 1;
            let mut response = ProviderResponse::default();
            for token in device_tokens {
                if self.failing.contains(token) {
                    response.failed.push(ProviderFailure {
                        device: token.clone(),
                        status: Some(410),
                        response: Some(json!({ "reason": "Unregistered" })),
                    });
                } else {
                    response.sent.push(token.clone());
                }
            }
            Ok(response)
        }
    }

    fn recipient(token: &str, app_identifier: Option<&str>) -> Recipient {
        Recipient {
            device_token: token.to_string(),
            device_type: "ios".to_string(),
            push_type: None,
            app_identifier: app_identifier.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_no_eligible_provider_yields_failure_without_invocation() {
        let provider = Arc::new(StubProvider {
            topic: Some("com.example.app".to_string()),
            index: 0,
            failing: vec![],
            calls: Mutex::new(0),
        });
        let sender = ApnsSender::with_providers(
            ChannelKey::Ios,
            vec![Arc::clone(&provider) as Arc<dyn ProviderEndpoint>],
        );

        let devices = vec![recipient("tok_a", Some("com.unknown.bundle"))];
        let results = sender
            .send(&PushMessage::new(json!({"alert": "hi"})), &devices)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(!results[0].transmitted);
        let error = results[0].response.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(error.contains("no eligible APNs provider"));
        assert_eq!(*provider.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_one_result_per_device_across_mixed_outcomes() {
        let provider = Arc::new(StubProvider {
            topic: None,
            index: 0,
            failing: vec!["tok_bad".to_string()],
            calls: Mutex::new(0),
        });
        let sender = ApnsSender::with_providers(
            ChannelKey::Ios,
            vec![provider as Arc<dyn ProviderEndpoint>],
        );

        let devices = vec![
            recipient("tok_a", Some("com.example.app")),
            recipient("tok_bad", Some("com.example.app")),
            recipient("tok_b", None),
        ];
        let results = sender
            .send(&PushMessage::new(json!({"alert": "hi"})), &devices)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].transmitted);
        assert!(!results[1].transmitted);
        assert!(results[2].transmitted);
    }

    #[test]
    fn test_build_notification_splits_aps_and_custom_keys() {
        let message = PushMessage::new(json!({
            "alert": "hello",
            "badge": 3,
            "contentAvailable": 1,
            "orderId": "o-17",
        }));
        let notification = ApnsSender::build_notification(&message);
        let payload = &notification["payload"];

        assert_eq!(payload["aps"]["alert"], "hello");
        assert_eq!(payload["aps"]["badge"], 3);
        assert_eq!(payload["aps"]["content-available"], 1);
        assert_eq!(payload["orderId"], "o-17");
        assert!(payload["aps"].get("orderId").is_none());
    }
}
