//! Data models exchanged with the notification API.

mod ids;
mod notification;
pub mod time;

pub use ids::{NotificationId, UserId};
pub use notification::{
    ActionMethod, ActionStyle, Interface, Notification, NotificationAction, NotificationData,
    NotificationFilter, NotificationPage, Priority,
};
