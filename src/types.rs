use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 推送通道（目标平台类别）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKey {
    Ios,
    Tvos,
    Watchos,
    Osx,
    Android,
    Fcm,
    Web,
    Expo,
}

impl ChannelKey {
    /// 全部受支持的通道（分类时的 validChannels 集合）
    pub fn all() -> [ChannelKey; 8] {
        [
            ChannelKey::Ios,
            ChannelKey::Tvos,
            ChannelKey::Watchos,
            ChannelKey::Osx,
            ChannelKey::Android,
            ChannelKey::Fcm,
            ChannelKey::Web,
            ChannelKey::Expo,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKey::Ios => "ios",
            ChannelKey::Tvos => "tvos",
            ChannelKey::Watchos => "watchos",
            ChannelKey::Osx => "osx",
            ChannelKey::Android => "android",
            ChannelKey::Fcm => "fcm",
            ChannelKey::Web => "web",
            ChannelKey::Expo => "expo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ios" => Some(ChannelKey::Ios),
            "tvos" => Some(ChannelKey::Tvos),
            "watchos" => Some(ChannelKey::Watchos),
            "osx" => Some(ChannelKey::Osx),
            "android" => Some(ChannelKey::Android),
            "fcm" => Some(ChannelKey::Fcm),
            "web" => Some(ChannelKey::Web),
            "expo" => Some(ChannelKey::Expo),
            _ => None,
        }
    }
}

/// 接收者（来自安装记录的可寻址设备）
///
/// 外部产生，分类阶段只读。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub device_token: String,
    pub device_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_identifier: Option<String>,
}

impl Recipient {
    pub fn new(device_token: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            device_type: device_type.into(),
            push_type: None,
            app_identifier: None,
        }
    }
}

/// SendResult 中的设备标识
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRef {
    pub device_token: String,
    pub device_type: String,
}

impl From<&Recipient> for DeviceRef {
    fn from(recipient: &Recipient) -> Self {
        Self {
            device_token: recipient.device_token.clone(),
            device_type: recipient.device_type.clone(),
        }
    }
}

/// 单设备传输结果
///
/// 对每个被路由且 deviceToken 非空的接收者，恰好产生一条。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub device: DeviceRef,
    pub transmitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl SendResult {
    /// 传输成功
    pub fn success(device: DeviceRef, response: Option<serde_json::Value>) -> Self {
        Self {
            device,
            transmitted: true,
            response,
        }
    }

    /// 传输失败（本地恢复，不拒绝整个调用）
    pub fn failure(device: DeviceRef, error: impl Into<String>) -> Self {
        Self {
            device,
            transmitted: false,
            response: Some(serde_json::json!({ "error": error.into() })),
        }
    }

    /// 带 Provider 原始响应的失败结果
    pub fn failure_with_response(device: DeviceRef, response: serde_json::Value) -> Self {
        Self {
            device,
            transmitted: false,
            response: Some(response),
        }
    }
}

/// 推送消息
///
/// `data` 是不透明负载；`ttl`/`priority` 是节流队列提示，
/// 在进入 Sender 之前会被剥离。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub data: serde_json::Value,
    /// 过期时间（APNs apns-expiration 等）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<DateTime<Utc>>,
    /// 队列提示：TTL（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// 队列提示：优先级（默认 0，越大越先执行）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl PushMessage {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            expiration_time: None,
            ttl: None,
            priority: None,
        }
    }

    /// 剥离队列提示后的消息（Sender 看到的形态）
    pub fn stripped(&self) -> Self {
        Self {
            data: self.data.clone(),
            expiration_time: self.expiration_time,
            ttl: None,
            priority: None,
        }
    }
}
