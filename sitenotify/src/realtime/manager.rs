//! Per-user push subscription lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::event::normalize_event;
use super::transport::{PushSubscription, PushTransport, RawEvent};
use crate::models::{Interface, Notification, UserId};

/// How long a pump may take to close its channel before it is aborted.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Receives notifications that arrived over the push channel.
pub trait NotificationSink: Send + Sync {
    fn receive_pushed(&self, notification: Notification);
}

/// Channel naming and filtering.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Prepended to the user id to form the private channel name.
    pub channel_prefix: String,
    /// Event carrying notification payloads.
    pub event: String,
    /// Audience this subscription serves.
    pub audience: Interface,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "private-App.Models.User.".to_owned(),
            event: "notification.created".to_owned(),
            audience: Interface::Lk,
        }
    }
}

impl ChannelConfig {
    /// Channel name for a user.
    pub fn channel_for(&self, user: &UserId) -> String {
        format!("{}{}", self.channel_prefix, user)
    }

    /// Whether `event` is the notification event. A leading `.` is ignored.
    pub fn matches_event(&self, event: &str) -> bool {
        event.trim_start_matches('.') == self.event.trim_start_matches('.')
    }
}

/// Realtime status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeState {
    /// No user known.
    Idle,
    /// A user is known but there is no credential; running without realtime.
    AwaitingCredential { user: UserId },
    /// Subscription requested.
    Subscribing { user: UserId, channel: String },
    /// Events are flowing.
    Subscribed { user: UserId, channel: String },
    /// The channel authorizer rejected the credential.
    AuthFailed {
        user: UserId,
        channel: String,
        reason: String,
    },
    /// The transport failed or went away. Nothing reconnects automatically.
    Disconnected {
        user: UserId,
        channel: String,
        reason: String,
    },
    /// Released by the owner.
    TornDown,
}

impl RealtimeState {
    /// User the state refers to.
    pub fn user(&self) -> Option<&UserId> {
        match self {
            RealtimeState::AwaitingCredential { user }
            | RealtimeState::Subscribing { user, .. }
            | RealtimeState::Subscribed { user, .. }
            | RealtimeState::AuthFailed { user, .. }
            | RealtimeState::Disconnected { user, .. } => Some(user),
            RealtimeState::Idle | RealtimeState::TornDown => None,
        }
    }

    /// Whether events are being received.
    pub fn is_live(&self) -> bool {
        matches!(self, RealtimeState::Subscribed { .. })
    }

    /// Whether a user is known but realtime is unavailable.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            RealtimeState::AwaitingCredential { .. }
                | RealtimeState::AuthFailed { .. }
                | RealtimeState::Disconnected { .. }
        )
    }
}

struct ActivePump {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct ManagerInner {
    transport: Arc<dyn PushTransport>,
    sink: Arc<dyn NotificationSink>,
    config: ChannelConfig,
    state: Arc<watch::Sender<RealtimeState>>,
    active: Mutex<Option<ActivePump>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(pump) = self.active.get_mut().take() {
            let _ = pump.shutdown.send(());
        }
    }
}

/// Owns at most one channel subscription, for the current user.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl SubscriptionManager {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        sink: Arc<dyn NotificationSink>,
        config: ChannelConfig,
    ) -> Self {
        let (state, _) = watch::channel(RealtimeState::Idle);
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                sink,
                config,
                state: Arc::new(state),
                active: Mutex::new(None),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> RealtimeState {
        self.inner.state.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<RealtimeState> {
        self.inner.state.subscribe()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Bring the subscription in line with the session's user and credential.
    pub async fn update_session(&self, user: Option<&UserId>, credential: Option<&str>) {
        let mut active = self.inner.active.lock().await;

        let Some(user) = user.filter(|u| !u.is_empty()) else {
            stop(&mut active).await;
            self.set_state(RealtimeState::Idle);
            return;
        };

        let channel = self.inner.config.channel_for(user);
        let current = self.state();
        let already_live = matches!(
            &current,
            RealtimeState::Subscribed { user: u, channel: c } if u == user && *c == channel
        );
        if already_live && active.is_some() {
            trace!(%channel, "Subscription already live");
            return;
        }

        // Exclusive ownership: the old channel goes before a new one opens.
        stop(&mut active).await;

        let Some(credential) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
            warn!(user = %user, "No credential; running without realtime");
            self.set_state(RealtimeState::AwaitingCredential { user: user.clone() });
            return;
        };

        self.set_state(RealtimeState::Subscribing {
            user: user.clone(),
            channel: channel.clone(),
        });

        match self.inner.transport.subscribe(&channel, credential).await {
            Ok(subscription) => {
                info!(%channel, "Realtime notifications active");
                self.set_state(RealtimeState::Subscribed {
                    user: user.clone(),
                    channel: channel.clone(),
                });

                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let pump = Pump {
                    sink: self.inner.sink.clone(),
                    config: self.inner.config.clone(),
                    state: self.inner.state.clone(),
                    user: user.clone(),
                    channel,
                };
                let task = tokio::spawn(pump.run(subscription, shutdown_rx));
                *active = Some(ActivePump {
                    shutdown: shutdown_tx,
                    task,
                });
            }
            Err(e) if e.is_auth_error() => {
                warn!(error = %e, %channel, "Channel authorization rejected; realtime disabled");
                self.set_state(RealtimeState::AuthFailed {
                    user: user.clone(),
                    channel,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                warn!(error = %e, %channel, "Could not open push channel; realtime disabled");
                self.set_state(RealtimeState::Disconnected {
                    user: user.clone(),
                    channel,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Release the channel. A later [`update_session`](Self::update_session) starts afresh.
    pub async fn teardown(&self) {
        let mut active = self.inner.active.lock().await;
        stop(&mut active).await;
        self.set_state(RealtimeState::TornDown);
        debug!("Realtime torn down");
    }

    fn set_state(&self, state: RealtimeState) {
        self.inner.state.send_replace(state);
    }
}

/// Signal the running pump and wait for it to let go of the channel.
async fn stop(active: &mut Option<ActivePump>) {
    let Some(pump) = active.take() else {
        return;
    };

    let _ = pump.shutdown.send(());
    let mut task = pump.task;
    if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
        warn!("Push pump did not stop in time; aborting");
        task.abort();
        let _ = task.await;
    }
}

/// Moves events from a subscription into the sink.
struct Pump {
    sink: Arc<dyn NotificationSink>,
    config: ChannelConfig,
    state: Arc<watch::Sender<RealtimeState>>,
    user: UserId,
    channel: String,
}

impl Pump {
    async fn run(self, mut subscription: PushSubscription, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    subscription.close().await;
                    debug!(channel = %self.channel, "Push pump stopped");
                    return;
                }
                event = subscription.next_event() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }

        warn!(channel = %self.channel, "Push channel lost; realtime degraded");
        let (user, channel) = (self.user, self.channel);
        self.state.send_if_modified(|state| match state {
            RealtimeState::Subscribed { user: u, channel: c } if *u == user && *c == channel => {
                *state = RealtimeState::Disconnected {
                    user,
                    channel,
                    reason: "push channel closed".to_owned(),
                };
                true
            }
            _ => false,
        });
    }

    fn dispatch(&self, event: RawEvent) {
        if !self.config.matches_event(&event.event) {
            trace!(event = %event.event, "Ignoring channel event");
            return;
        }

        match normalize_event(event.payload, self.config.audience) {
            Ok(Some(notification)) => {
                debug!(id = %notification.id, "Pushed notification");
                self.sink.receive_pushed(notification);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, channel = %self.channel, "Dropping malformed push event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pushed, MockTransport, Outcome};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    /// Sink forwarding into a channel the test can await.
    struct ChannelSink(mpsc::UnboundedSender<Notification>);

    impl NotificationSink for ChannelSink {
        fn receive_pushed(&self, notification: Notification) {
            let _ = self.0.send(notification);
        }
    }

    fn manager(
        transport: Arc<MockTransport>,
    ) -> (SubscriptionManager, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager =
            SubscriptionManager::new(transport, Arc::new(ChannelSink(tx)), ChannelConfig::default());
        (manager, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no notification delivered")
            .expect("sink closed")
    }

    #[tokio::test]
    async fn test_no_user_stays_idle() {
        let transport = MockTransport::with(vec![]);
        let (manager, _rx) = manager(transport.clone());

        manager.update_session(None, Some("tok")).await;

        assert_eq!(manager.state(), RealtimeState::Idle);
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_awaits_without_retry() {
        let transport = MockTransport::with(vec![]);
        let (manager, _rx) = manager(transport.clone());
        let user = UserId::new("17");

        manager.update_session(Some(&user), None).await;
        manager.update_session(Some(&user), Some("  ")).await;

        assert_eq!(manager.state(), RealtimeState::AwaitingCredential { user });
        assert!(manager.state().is_degraded());
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribes_to_user_channel_and_forwards_events() {
        let transport = MockTransport::with(vec![Outcome::Accept]);
        let (manager, mut rx) = manager(transport.clone());
        let user = UserId::new("17");

        manager.update_session(Some(&user), Some("tok")).await;
        assert!(manager.state().is_live());
        assert_eq!(
            transport.calls.lock().unwrap()[0],
            ("private-App.Models.User.17".to_owned(), "tok".to_owned())
        );

        transport.sender().send(pushed("n1", "lk")).await.unwrap();
        assert_eq!(next(&mut rx).await.id.as_str(), "n1");
    }

    #[tokio::test]
    async fn test_filters_audience_other_events_and_garbage() {
        let transport = MockTransport::with(vec![Outcome::Accept]);
        let (manager, mut rx) = manager(transport.clone());
        manager
            .update_session(Some(&UserId::new("17")), Some("tok"))
            .await;

        let tx = transport.sender();
        tx.send(pushed("admin-only", "admin")).await.unwrap();
        tx.send(RawEvent::new("user.updated", json!({"id": 1}))).await.unwrap();
        tx.send(RawEvent::new("notification.created", Value::String("{oops".into())))
            .await
            .unwrap();
        tx.send(RawEvent::new(
            ".notification.created",
            Value::String(pushed("encoded", "lk").payload.to_string()),
        ))
        .await
        .unwrap();

        // Only the well-formed lk event gets through, and the pump survived the garbage.
        assert_eq!(next(&mut rx).await.id.as_str(), "encoded");
        assert!(manager.state().is_live());
    }

    #[tokio::test]
    async fn test_auth_rejection_degrades() {
        let transport = MockTransport::with(vec![Outcome::RejectAuth]);
        let (manager, _rx) = manager(transport);
        let user = UserId::new("17");

        manager.update_session(Some(&user), Some("tok")).await;

        match manager.state() {
            RealtimeState::AuthFailed { user: u, .. } => assert_eq!(u, user),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_disconnects() {
        let transport = MockTransport::with(vec![Outcome::Fail]);
        let (manager, _rx) = manager(transport);

        manager
            .update_session(Some(&UserId::new("17")), Some("tok"))
            .await;

        assert!(matches!(manager.state(), RealtimeState::Disconnected { .. }));
    }

    #[tokio::test]
    async fn test_lost_channel_is_reported() {
        let transport = MockTransport::with(vec![Outcome::Accept]);
        let (manager, _rx) = manager(transport.clone());
        let mut states = manager.subscribe();
        manager
            .update_session(Some(&UserId::new("17")), Some("tok"))
            .await;

        transport.drop_senders();

        tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| matches!(s, RealtimeState::Disconnected { .. })),
        )
        .await
        .expect("state never degraded")
        .unwrap();
    }

    #[tokio::test]
    async fn test_same_user_is_not_resubscribed() {
        let transport = MockTransport::with(vec![]);
        let (manager, _rx) = manager(transport.clone());
        let user = UserId::new("17");

        manager.update_session(Some(&user), Some("tok")).await;
        manager.update_session(Some(&user), Some("tok")).await;

        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_change_tears_down_first() {
        let transport = MockTransport::with(vec![]);
        let (manager, _rx) = manager(transport.clone());

        manager
            .update_session(Some(&UserId::new("17")), Some("tok"))
            .await;
        let first = transport.sender();
        manager
            .update_session(Some(&UserId::new("18")), Some("tok2"))
            .await;

        assert!(first.is_closed());
        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls[1].0, "private-App.Models.User.18");
        assert!(matches!(
            manager.state(),
            RealtimeState::Subscribed { ref channel, .. } if channel == "private-App.Models.User.18"
        ));
    }

    #[tokio::test]
    async fn test_teardown_releases_channel() {
        let transport = MockTransport::with(vec![]);
        let (manager, _rx) = manager(transport.clone());
        manager
            .update_session(Some(&UserId::new("17")), Some("tok"))
            .await;
        let sender = transport.sender();

        manager.teardown().await;

        assert!(sender.is_closed());
        assert_eq!(manager.state(), RealtimeState::TornDown);

        // Re-entering starts a fresh subscription.
        manager
            .update_session(Some(&UserId::new("17")), Some("tok"))
            .await;
        assert!(manager.state().is_live());
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_event_name_matching() {
        let config = ChannelConfig::default();
        assert!(config.matches_event("notification.created"));
        assert!(config.matches_event(".notification.created"));
        assert!(!config.matches_event("notification.deleted"));
    }
}
