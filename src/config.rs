use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PushError, Result};
use crate::queue::ThrottlePolicy;
use crate::types::ChannelKey;

/// 分发器配置
///
/// 以通道名为键（`ios`、`android`、`web`…），每个通道一份凭证配置
/// 和可选的节流策略。配置错误在构造时同步抛出，不会出现在分发过程中。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

/// 单通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(flatten)]
    pub credentials: ChannelCredentials,
    /// 配置了 queue 才会为该通道启用节流
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueuePolicyConfig>,
}

/// 通道凭证（按 provider 类型区分）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ChannelCredentials {
    /// APNs 系（ios/tvos/watchos/osx），支持多凭证级联
    Apns { credentials: Vec<ApnsCredential> },
    /// FCM HTTP v1
    Fcm {
        project_id: String,
        access_token: String,
    },
    /// Web Push（无负载 tickle 推送）
    Web {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_ttl_secs: Option<u64>,
    },
    /// Expo Push API
    Expo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
    },
}

/// APNs 单个签名凭证
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsCredential {
    pub team_id: String,
    pub key_id: String,
    /// .p8 私钥文件路径
    pub private_key_path: String,
    /// 绑定的 bundle id（None = 不限定，作为回退凭证）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default = "default_production")]
    pub production: bool,
    /// 级联顺序（0 最高）；缺省时 production 取 0、sandbox 取 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl ApnsCredential {
    /// 级联排序用的有效优先级
    pub fn effective_priority(&self) -> u32 {
        self.priority
            .unwrap_or(if self.production { 0 } else { 1 })
    }
}

fn default_production() -> bool {
    true
}

/// 节流策略配置（见 ThrottlePolicy）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueuePolicyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_capacity: Option<usize>,
    /// 窗口长度（毫秒，0 = 不做窗口限流）
    #[serde(default)]
    pub interval_ms: u64,
}

impl QueuePolicyConfig {
    pub fn to_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            concurrency: self.concurrency,
            interval_capacity: self.interval_capacity,
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

impl DispatcherConfig {
    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: DispatcherConfig = toml::from_str(&content)?;
        info!(
            "[CONFIG] loaded {} channel(s) from {}",
            config.channels.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    /// 校验配置（构造分发器前调用）
    pub fn validate(&self) -> Result<()> {
        for (name, channel) in &self.channels {
            if ChannelKey::from_str(name).is_none() {
                return Err(PushError::Configuration(format!(
                    "unsupported channel name: {}",
                    name
                )));
            }

            match &channel.credentials {
                ChannelCredentials::Apns { credentials } => {
                    if credentials.is_empty() {
                        return Err(PushError::Configuration(format!(
                            "channel {} has no APNs credentials",
                            name
                        )));
                    }
                    for cred in credentials {
                        if cred.team_id.is_empty()
                            || cred.key_id.is_empty()
                            || cred.private_key_path.is_empty()
                        {
                            return Err(PushError::Configuration(format!(
                                "channel {} has an APNs credential with missing fields",
                                name
                            )));
                        }
                    }
                }
                ChannelCredentials::Fcm {
                    project_id,
                    access_token,
                } => {
                    if project_id.is_empty() || access_token.is_empty() {
                        return Err(PushError::Configuration(format!(
                            "channel {} is missing FCM project_id or access_token",
                            name
                        )));
                    }
                }
                ChannelCredentials::Web { .. } | ChannelCredentials::Expo { .. } => {}
            }

            if let Some(queue) = &channel.queue {
                if queue.concurrency == Some(0) {
                    return Err(PushError::Configuration(format!(
                        "channel {} queue concurrency must be at least 1",
                        name
                    )));
                }
                if queue.interval_capacity == Some(0) {
                    return Err(PushError::Configuration(format!(
                        "channel {} queue interval_capacity must be at least 1",
                        name
                    )));
                }
                if queue.interval_capacity.is_some() && queue.interval_ms == 0 {
                    return Err(PushError::Configuration(format!(
                        "channel {} queue interval_ms must be positive when interval_capacity is set",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}
