use rustc_hash::FxHashMap;
use tracing::debug;

use crate::types::{ChannelKey, Recipient};

/// 按通道划分的设备列表（每个通道内保持输入顺序）
pub type DeviceMap = FxHashMap<ChannelKey, Vec<Recipient>>;

/// 安装记录分类器
///
/// 把异构接收者列表划分为各通道的设备列表：
/// - 每个 `valid_channels` 中的通道都会出现在结果里（可能为空），
///   下游可以统一迭代
/// - deviceToken 为空的接收者直接丢弃
/// - 目标通道优先取 `pushType`（若命中已配置通道），否则取 `deviceType`，
///   都不命中则丢弃（容忍不支持的平台，不报错）
pub fn classify(recipients: &[Recipient], valid_channels: &[ChannelKey]) -> DeviceMap {
    let mut map: DeviceMap = FxHashMap::default();
    for channel in valid_channels {
        map.entry(*channel).or_default();
    }

    for recipient in recipients {
        if recipient.device_token.is_empty() {
            debug!("[CLASSIFY] recipient without deviceToken, dropping");
            continue;
        }

        let by_push_type = recipient
            .push_type
            .as_deref()
            .and_then(ChannelKey::from_str)
            .filter(|key| map.contains_key(key));
        let by_device_type =
            ChannelKey::from_str(&recipient.device_type).filter(|key| map.contains_key(key));

        match by_push_type.or(by_device_type) {
            Some(channel) => {
                if let Some(devices) = map.get_mut(&channel) {
                    devices.push(recipient.clone());
                }
            }
            None => {
                debug!(
                    "[CLASSIFY] no matching channel for deviceType={}, dropping",
                    recipient.device_type
                );
            }
        }
    }

    map
}
