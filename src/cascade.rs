use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;

/// 单设备失败记录（Provider 规范化后的形态）
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub device: String,
    pub status: Option<u16>,
    pub response: Option<serde_json::Value>,
}

/// Provider 一次发送的结果
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub sent: Vec<String>,
    pub failed: Vec<ProviderFailure>,
}

/// 多凭证通道内的单个凭证/身份
///
/// 构造时按 priority 升序排序（0 最高）并分配稳定下标，
/// 级联依赖这个顺序。
#[async_trait]
pub trait ProviderEndpoint: Send + Sync {
    /// 此凭证绑定的 topic/bundle 标识（None = 不限定）
    fn topic(&self) -> Option<&str>;

    /// 排序后的稳定下标（用于日志）
    fn index(&self) -> usize;

    /// 向一组设备发送已渲染好的通知
    async fn push(
        &self,
        notification: &serde_json::Value,
        device_tokens: &[String],
    ) -> Result<ProviderResponse>;
}

/// 为目标标识选择可用的 Provider
///
/// 规则：先取 topic 精确匹配的；一个都没有时回退到未配置 topic 的；
/// 仍为空则返回空列表（调用方为每个设备产出 "no eligible provider" 结果）。
pub fn eligible_providers(
    providers: &[Arc<dyn ProviderEndpoint>],
    identifier: Option<&str>,
) -> Vec<Arc<dyn ProviderEndpoint>> {
    if let Some(id) = identifier {
        let matched: Vec<_> = providers
            .iter()
            .filter(|p| p.topic() == Some(id))
            .cloned()
            .collect();
        if !matched.is_empty() {
            return matched;
        }
    }
    providers
        .iter()
        .filter(|p| p.topic().is_none())
        .cloned()
        .collect()
}

/// 凭证级联发送
///
/// 依次尝试每个 Provider：只把上一个 Provider 失败的设备子集交给下一个，
/// `sent` 取各 Provider 成功集合的并集，`failed` 只保留最后一个被尝试的
/// Provider 之后仍失败的设备。每个设备对每个 Provider 至多尝试一次。
pub async fn send_through_providers(
    notification: &serde_json::Value,
    device_tokens: &[String],
    providers: &[Arc<dyn ProviderEndpoint>],
) -> Result<ProviderResponse> {
    let mut sent: Vec<String> = Vec::new();
    let mut failed: Vec<ProviderFailure> = Vec::new();
    let mut remaining: Vec<String> = device_tokens.to_vec();

    for provider in providers {
        if remaining.is_empty() {
            break;
        }

        let response = provider.push(notification, &remaining).await?;
        sent.extend(response.sent);
        failed = response.failed;

        if failed.is_empty() {
            break;
        }

        remaining = failed.iter().map(|f| f.device.clone()).collect();
        debug!(
            "[CASCADE] provider #{} left {} device(s) failed, cascading",
            provider.index(),
            remaining.len()
        );
    }

    if !failed.is_empty() {
        info!(
            "[CASCADE] {} device(s) failed after last provider",
            failed.len()
        );
    }

    Ok(ProviderResponse { sent, failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 测试用 Provider：按脚本决定哪些设备失败，并记录每次调用
    struct ScriptedProvider {
        topic: Option<String>,
        index: usize,
        failing: HashSet<String>,
        calls: Mutex<Vec<Vec<String>>>,
        call_count: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(topic: Option<&str>, index: usize, failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                topic: topic.map(|s| s.to_string()),
                index,
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProviderEndpoint for ScriptedProvider {
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
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(device_tokens.to_vec());

            let mut response = ProviderResponse::default();
            for token in device_tokens {
                if self.failing.contains(token) {
                    response.failed.push(ProviderFailure {
                        device: token.clone(),
                        status: Some(403),
                        response: Some(serde_json::json!({ "reason": "BadDeviceToken" })),
                    });
                } else {
                    response.sent.push(token.clone());
                }
            }
            Ok(response)
        }
    }

    fn as_endpoints(providers: &[Arc<ScriptedProvider>]) -> Vec<Arc<dyn ProviderEndpoint>> {
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn ProviderEndpoint>)
            .collect()
    }

    #[tokio::test]
    async fn test_cascade_retries_only_failed_subset() {
        // 设备 tok_bad 在 0/1 号 Provider 失败，在 2 号成功
        let p0 = ScriptedProvider::new(Some("com.example.app"), 0, &["tok_bad"]);
        let p1 = ScriptedProvider::new(Some("com.example.app"), 1, &["tok_bad"]);
        let p2 = ScriptedProvider::new(Some("com.example.app"), 2, &[]);
        let providers = as_endpoints(&[
            Arc::clone(&p0),
            Arc::clone(&p1),
            Arc::clone(&p2),
        ]);

        let tokens = vec!["tok_ok".to_string(), "tok_bad".to_string()];
        let result = send_through_providers(&serde_json::json!({}), &tokens, &providers)
            .await
            .unwrap();

        assert_eq!(result.sent.len(), 2);
        assert!(result.failed.is_empty());

        // 每个 Provider 对 tok_bad 恰好调用一次
        assert_eq!(p0.call_count.load(Ordering::SeqCst), 1);
        assert_eq!(p1.call_count.load(Ordering::SeqCst), 1);
        assert_eq!(p2.call_count.load(Ordering::SeqCst), 1);
        assert_eq!(p0.calls.lock().unwrap()[0], tokens);
        assert_eq!(p1.calls.lock().unwrap()[0], vec!["tok_bad".to_string()]);
        assert_eq!(p2.calls.lock().unwrap()[0], vec!["tok_bad".to_string()]);
    }

    #[tokio::test]
    async fn test_cascade_keeps_failures_of_last_provider() {
        let p0 = ScriptedProvider::new(None, 0, &["tok_bad"]);
        let p1 = ScriptedProvider::new(None, 1, &["tok_bad"]);
        let providers = as_endpoints(&[Arc::clone(&p0), Arc::clone(&p1)]);

        let tokens = vec!["tok_bad".to_string()];
        let result = send_through_providers(&serde_json::json!({}), &tokens, &providers)
            .await
            .unwrap();

        assert!(result.sent.is_empty());
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].device, "tok_bad");
    }

    #[tokio::test]
    async fn test_cascade_stops_when_all_succeed() {
        let p0 = ScriptedProvider::new(None, 0, &[]);
        let p1 = ScriptedProvider::new(None, 1, &[]);
        let providers = as_endpoints(&[Arc::clone(&p0), Arc::clone(&p1)]);

        let tokens = vec!["tok_a".to_string(), "tok_b".to_string()];
        let result = send_through_providers(&serde_json::json!({}), &tokens, &providers)
            .await
            .unwrap();

        assert_eq!(result.sent.len(), 2);
        assert_eq!(p0.call_count.load(Ordering::SeqCst), 1);
        assert_eq!(p1.call_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_eligible_providers_topic_match() {
        let p0 = ScriptedProvider::new(Some("com.example.app"), 0, &[]);
        let p1 = ScriptedProvider::new(Some("com.example.other"), 1, &[]);
        let p2 = ScriptedProvider::new(None, 2, &[]);
        let providers = as_endpoints(&[p0, p1, p2]);

        let matched = eligible_providers(&providers, Some("com.example.app"));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].index(), 0);
    }

    #[test]
    fn test_eligible_providers_falls_back_to_topicless() {
        let p0 = ScriptedProvider::new(Some("com.example.app"), 0, &[]);
        let p1 = ScriptedProvider::new(None, 1, &[]);
        let providers = as_endpoints(&[p0, p1]);

        let matched = eligible_providers(&providers, Some("com.unknown.bundle"));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].index(), 1);
    }

    #[test]
    fn test_eligible_providers_empty_when_no_match() {
        let p0 = ScriptedProvider::new(Some("com.example.app"), 0, &[]);
        let providers = as_endpoints(&[p0]);

        assert!(eligible_providers(&providers, Some("com.unknown.bundle")).is_empty());
    }
}
