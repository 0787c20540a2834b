//! API modules.

mod broadcasting;
mod notification;

pub use broadcasting::{BroadcastingApi, ChannelAuth, DEFAULT_AUTH_ENDPOINT};
pub use notification::{
    NotificationApi, NotificationListBuilder, NotificationRemote, DEFAULT_PER_PAGE,
};
