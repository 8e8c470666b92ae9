pub mod apns;
pub mod expo;
pub mod fcm;
pub mod mock;
pub mod sender_trait;
pub mod web;

pub use apns::{ApnsClient, ApnsSender};
pub use expo::ExpoSender;
pub use fcm::FcmSender;
pub use mock::MockSender;
pub use sender_trait::ChannelSender;
pub use web::WebSender;
