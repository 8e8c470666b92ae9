use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::classify;
use crate::config::{ChannelCredentials, DispatcherConfig};
use crate::error::{PushError, Result};
use crate::queue::{ThrottlePolicy, ThrottleQueue};
use crate::sender::{ApnsSender, ChannelSender, ExpoSender, FcmSender, WebSender};
use crate::types::{ChannelKey, PushMessage, Recipient, SendResult};

type ChannelFuture = Pin<Box<dyn Future<Output = Result<Vec<SendResult>>> + Send>>;

/// 推送分发器
///
/// 持有通道 → Sender 映射和可选的按通道节流队列。
/// `send` 是唯一入口：分类、路由、（可选）节流、并发等待、
/// 把各通道结果压平成一张结果表。
///
/// 保证：每个 deviceToken 非空且被路由到某个通道的接收者，
/// 恰好对应一条 SendResult（未配置 Sender 的通道也会合成失败结果；
/// 被 TTL 丢弃的通道任务例外，其设备不出现在结果中，只记日志）。
pub struct PushDispatcher {
    senders: FxHashMap<ChannelKey, Arc<dyn ChannelSender>>,
    queues: FxHashMap<ChannelKey, ThrottleQueue>,
}

impl Default for PushDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PushDispatcher {
    pub fn new() -> Self {
        Self {
            senders: FxHashMap::default(),
            queues: FxHashMap::default(),
        }
    }

    /// 从配置构建：每个通道一个 Sender，配置了 queue 的通道附带节流队列。
    /// 配置错误（未知通道名、缺失凭证）在这里同步抛出。
    pub fn from_config(config: &DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let mut dispatcher = Self::new();
        for (name, channel_config) in &config.channels {
            let key = ChannelKey::from_str(name).ok_or_else(|| {
                PushError::Configuration(format!("unsupported channel name: {}", name))
            })?;

            let sender: Arc<dyn ChannelSender> = match &channel_config.credentials {
                ChannelCredentials::Apns { credentials } => {
                    Arc::new(ApnsSender::new(key, credentials)?)
                }
                ChannelCredentials::Fcm {
                    project_id,
                    access_token,
                } => Arc::new(FcmSender::new(
                    key,
                    project_id.clone(),
                    access_token.clone(),
                )),
                ChannelCredentials::Web { default_ttl_secs } => {
                    Arc::new(WebSender::new(key, *default_ttl_secs))
                }
                ChannelCredentials::Expo { access_token } => {
                    Arc::new(ExpoSender::new(key, access_token.clone()))
                }
            };
            dispatcher.register_sender(sender);

            if let Some(queue) = &channel_config.queue {
                dispatcher.set_queue(key, queue.to_policy());
            }
        }

        info!(
            "[DISPATCHER] configured {} channel(s)",
            dispatcher.senders.len()
        );
        Ok(dispatcher)
    }

    /// 注册一个通道 Sender（通道取自 sender.channel()）
    pub fn register_sender(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    /// 为某通道启用节流
    pub fn set_queue(&mut self, channel: ChannelKey, policy: ThrottlePolicy) {
        self.queues.insert(channel, ThrottleQueue::new(policy));
    }

    /// 分发一条推送消息到全部接收者
    ///
    /// 各通道并发进行，互相之间没有顺序保证；返回的结果表按
    /// 固定的通道顺序拼接，通道内保持输入顺序。
    /// 通道级失败（Sender 返回 Err）会拒绝整个调用——调用方应将其
    /// 理解为"该通道设备结果未知"，与结果表中 transmitted=false
    /// 的已知失败不同。
    pub async fn send(
        &self,
        message: &PushMessage,
        recipients: &[Recipient],
    ) -> Result<Vec<SendResult>> {
        let dispatch_id = Uuid::new_v4();
        let all_channels = ChannelKey::all();
        let mut device_map = classify(recipients, &all_channels);

        debug!(
            "[DISPATCHER] dispatch {}: {} recipient(s)",
            dispatch_id,
            recipients.len()
        );

        // 队列提示来自消息本身，进入 Sender 前剥离
        let stripped = Arc::new(message.stripped());
        let ttl = message.ttl.map(Duration::from_secs);
        let priority = message.priority.unwrap_or(0);

        let mut futures: Vec<ChannelFuture> = Vec::new();
        for channel in all_channels {
            let devices = device_map.remove(&channel).unwrap_or_default();
            if devices.is_empty() {
                continue;
            }

            match self.senders.get(&channel) {
                None => {
                    // 路由缺失：本地恢复，合成失败结果，不做网络 I/O
                    warn!(
                        "[DISPATCHER] dispatch {}: no sender for channel {}, {} device(s)",
                        dispatch_id,
                        channel.as_str(),
                        devices.len()
                    );
                    let results: Vec<SendResult> = devices
                        .iter()
                        .map(|device| {
                            SendResult::failure(
                                device.into(),
                                format!(
                                    "can not find sender for channel {}",
                                    channel.as_str()
                                ),
                            )
                        })
                        .collect();
                    futures.push(Box::pin(async move { Ok(results) }));
                }
                Some(sender) => {
                    let sender = Arc::clone(sender);
                    let msg = Arc::clone(&stripped);

                    match self.queues.get(&channel) {
                        Some(queue) => {
                            let handle = queue.enqueue(
                                async move { sender.send(&msg, &devices).await },
                                ttl,
                                priority,
                            );
                            futures.push(Box::pin(async move {
                                match handle.await {
                                    Some(result) => result,
                                    None => {
                                        // TTL 丢弃：未尝试，不合成结果
                                        warn!(
                                            "[DISPATCHER] dispatch {}: channel {} task dropped by TTL",
                                            dispatch_id,
                                            channel.as_str()
                                        );
                                        Ok(Vec::new())
                                    }
                                }
                            }));
                        }
                        None => {
                            futures.push(Box::pin(
                                async move { sender.send(&msg, &devices).await },
                            ));
                        }
                    }
                }
            }
        }

        let mut results = Vec::new();
        for channel_result in join_all(futures).await {
            results.extend(channel_result?);
        }

        debug!(
            "[DISPATCHER] dispatch {}: {} result(s)",
            dispatch_id,
            results.len()
        );
        Ok(results)
    }
}
