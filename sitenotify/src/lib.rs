//! Notification sync engine: REST client, realtime push channel and a
//! reactive notification store.

pub mod api;
pub mod client;
pub mod error;
pub mod models;
pub mod realtime;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

// Re-export main types
pub use client::{AuthInfo, HttpConfig, NotifyClient, NotifyClientBuilder};
pub use error::{Error, Result};

// Re-export commonly used models
pub use models::{
    ActionMethod, ActionStyle, Interface, Notification, NotificationAction, NotificationData,
    NotificationFilter, NotificationId, NotificationPage, Priority, UserId,
};

// Re-export API types
pub use api::{BroadcastingApi, ChannelAuth, NotificationApi, NotificationRemote};
pub use realtime::{
    ChannelConfig, PushTransport, PusherTransport, RealtimeConfig, RealtimeState,
    SubscriptionManager,
};
pub use session::{NotificationSession, SessionConfig};
pub use store::{
    NotificationState, NotificationStore, StoreConfig, Toast, ToastLevel, UnreadPolicy,
};
