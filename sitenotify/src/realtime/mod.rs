//! Realtime notification delivery over a private push channel.

mod event;
mod manager;
mod pusher;
mod transport;

pub use event::{decode_object, normalize_event};
pub use manager::{ChannelConfig, NotificationSink, RealtimeState, SubscriptionManager};
pub use pusher::{PusherTransport, RealtimeConfig};
pub use transport::{PushSubscription, PushTransport, RawEvent};
