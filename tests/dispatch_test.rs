use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use pushgate::{
    ChannelKey, ChannelSender, MockSender, PushDispatcher, PushMessage, Recipient, ThrottlePolicy,
};

fn recipient(token: &str, device_type: &str) -> Recipient {
    Recipient::new(token, device_type)
}

/// 端到端：多通道 + 节流 + 各种边界接收者，一次 send 走完整条链路
#[tokio::test]
async fn test_end_to_end_dispatch() {
    let ios_mock = Arc::new(MockSender::new(ChannelKey::Ios));
    let android_mock = Arc::new(MockSender::with_failing_tokens(
        ChannelKey::Android,
        &["tok_and_bad"],
    ));

    let mut dispatcher = PushDispatcher::new();
    dispatcher.register_sender(Arc::clone(&ios_mock) as Arc<dyn ChannelSender>);
    dispatcher.register_sender(Arc::clone(&android_mock) as Arc<dyn ChannelSender>);
    dispatcher.set_queue(
        ChannelKey::Android,
        ThrottlePolicy {
            concurrency: Some(1),
            interval_capacity: None,
            interval: Duration::ZERO,
        },
    );

    let recipients = vec![
        recipient("tok_ios_1", "ios"),
        recipient("tok_and_ok", "android"),
        recipient("tok_and_bad", "android"),
        recipient("", "ios"),              // 空 token：丢弃
        recipient("tok_kaios", "kaios"),   // 不支持的平台：丢弃
        recipient("tok_ios_2", "ios"),
        recipient("tok_expo", "expo"),     // 未配置 Sender：合成失败
    ];

    let mut message = PushMessage::new(json!({"alert": "release is out", "badge": 1}));
    message.priority = Some(2);

    let results = dispatcher.send(&message, &recipients).await.unwrap();

    // 每个非空 token 且被路由的接收者恰好一条结果
    assert_eq!(results.len(), 5);

    let ios_results: Vec<_> = results
        .iter()
        .filter(|r| r.device.device_type == "ios")
        .collect();
    assert_eq!(ios_results.len(), 2);
    assert!(ios_results.iter().all(|r| r.transmitted));
    // 通道内保持输入顺序
    assert_eq!(ios_results[0].device.device_token, "tok_ios_1");
    assert_eq!(ios_results[1].device.device_token, "tok_ios_2");

    let android_results: Vec<_> = results
        .iter()
        .filter(|r| r.device.device_type == "android")
        .collect();
    assert_eq!(android_results.len(), 2);
    assert!(android_results[0].transmitted);
    assert!(!android_results[1].transmitted);

    let expo_result = results
        .iter()
        .find(|r| r.device.device_token == "tok_expo")
        .unwrap();
    assert!(!expo_result.transmitted);
    let error = expo_result.response.as_ref().unwrap()["error"]
        .as_str()
        .unwrap();
    assert!(error.contains("expo"));

    // 每个通道 Sender 只被调用一次，且看到的消息不含队列提示
    assert_eq!(ios_mock.call_count(), 1);
    assert_eq!(android_mock.call_count(), 1);
    let (seen_message, seen_devices) = &android_mock.calls()[0];
    assert!(seen_message.priority.is_none());
    assert_eq!(seen_devices.len(), 2);
}

/// 重复 token 的接收者产生同等数量的结果（多重集不变式）
#[tokio::test]
async fn test_duplicate_tokens_preserved() {
    let mut dispatcher = PushDispatcher::new();
    dispatcher.register_sender(Arc::new(MockSender::new(ChannelKey::Web)));

    let recipients = vec![
        recipient("sub_a", "web"),
        recipient("sub_a", "web"),
        recipient("sub_b", "web"),
    ];
    let results = dispatcher
        .send(&PushMessage::new(json!({})), &recipients)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let dup_count = results
        .iter()
        .filter(|r| r.device.device_token == "sub_a")
        .count();
    assert_eq!(dup_count, 2);
}
