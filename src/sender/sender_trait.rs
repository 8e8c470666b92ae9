use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChannelKey, PushMessage, Recipient, SendResult};

/// Channel Sender Trait（通道发送器接口）
///
/// 每个已配置通道一个实例，构造时创建、长期存活。
/// 约定：必须为每个输入设备恰好产出一条 SendResult；
/// 单设备失败不允许拒绝（返回 Err 只保留给通道级失败，
/// 例如负载格式错误或传输异常）。
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// 发送消息到一组设备
    async fn send(&self, message: &PushMessage, devices: &[Recipient]) -> Result<Vec<SendResult>>;

    /// 此 Sender 服务的通道
    fn channel(&self) -> ChannelKey;
}
