pub mod cascade;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod queue;
pub mod sender;
pub mod types;

pub use classify::{classify, DeviceMap};
pub use config::{
    ApnsCredential, ChannelConfig, ChannelCredentials, DispatcherConfig, QueuePolicyConfig,
};
pub use dispatcher::PushDispatcher;
pub use error::{PushError, Result};
pub use queue::{ThrottleHandle, ThrottlePolicy, ThrottleQueue};
pub use sender::{ApnsSender, ChannelSender, ExpoSender, FcmSender, MockSender, WebSender};
pub use types::{ChannelKey, DeviceRef, PushMessage, Recipient, SendResult};
