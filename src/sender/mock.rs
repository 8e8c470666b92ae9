use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::{PushError, Result};
use crate::sender::sender_trait::ChannelSender;
use crate::types::{ChannelKey, PushMessage, Recipient, SendResult};

/// Mock Sender（用于测试）
///
/// 不调用真实 API；记录每次调用，按脚本决定单设备失败或通道级失败。
pub struct MockSender {
    channel: ChannelKey,
    failing_tokens: HashSet<String>,
    fail_channel: bool,
    calls: Mutex<Vec<(PushMessage, Vec<Recipient>)>>,
}

impl MockSender {
    pub fn new(channel: ChannelKey) -> Self {
        Self {
            channel,
            failing_tokens: HashSet::new(),
            fail_channel: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 指定哪些 token 报告单设备失败
    pub fn with_failing_tokens(channel: ChannelKey, tokens: &[&str]) -> Self {
        Self {
            channel,
            failing_tokens: tokens.iter().map(|s| s.to_string()).collect(),
            fail_channel: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 整个通道发送即失败（模拟传输异常）
    pub fn with_channel_failure(channel: ChannelKey) -> Self {
        Self {
            channel,
            failing_tokens: HashSet::new(),
            fail_channel: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 取出已记录的调用
    pub fn calls(&self) -> Vec<(PushMessage, Vec<Recipient>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    async fn send(&self, message: &PushMessage, devices: &[Recipient]) -> Result<Vec<SendResult>> {
        info!(
            "[MOCK PUSH] channel={}, devices={}",
            self.channel.as_str(),
            devices.len()
        );
        self.calls
            .lock()
            .unwrap()
            .push((message.clone(), devices.to_vec()));

        if self.fail_channel {
            return Err(PushError::Transport("mock channel failure".to_string()));
        }

        Ok(devices
            .iter()
            .map(|device| {
                if self.failing_tokens.contains(&device.device_token) {
                    SendResult::failure(device.into(), "mock device failure")
                } else {
                    SendResult::success(device.into(), Some(json!({ "mock": true })))
                }
            })
            .collect())
    }

    fn channel(&self) -> ChannelKey {
        self.channel
    }
}
