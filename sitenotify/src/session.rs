//! Per-user notification session.

use std::sync::Arc;

use tracing::debug;

use crate::api::NotificationRemote;
use crate::client::{AuthInfo, NotifyClient};
use crate::realtime::{ChannelConfig, PushTransport, RealtimeState, SubscriptionManager};
use crate::store::{NotificationStore, StoreConfig};

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub store: StoreConfig,
    pub channel: ChannelConfig,
}

/// Wires one store and one subscription manager for the signed-in user.
#[derive(Debug, Clone)]
pub struct NotificationSession {
    auth: Option<AuthInfo>,
    store: NotificationStore,
    realtime: SubscriptionManager,
}

impl NotificationSession {
    /// Session over the client's notification API and credentials.
    pub fn new(client: &NotifyClient, transport: Arc<dyn PushTransport>, config: SessionConfig) -> Self {
        Self::with_remote(
            Arc::new(client.notifications()),
            transport,
            client.auth_info().cloned(),
            config,
        )
    }

    /// Session over any notification backend.
    pub fn with_remote(
        remote: Arc<dyn NotificationRemote>,
        transport: Arc<dyn PushTransport>,
        auth: Option<AuthInfo>,
        config: SessionConfig,
    ) -> Self {
        let store = NotificationStore::new(remote, config.store);
        let realtime = SubscriptionManager::new(transport, Arc::new(store.clone()), config.channel);
        Self {
            auth,
            store,
            realtime,
        }
    }

    /// Load the initial state and open the push channel.
    pub async fn start(&self) {
        let user = self.auth.as_ref().map(|a| &a.user_id);
        let credential = self.auth.as_ref().and_then(AuthInfo::credential);

        tokio::join!(
            self.store.init(),
            self.realtime.update_session(user, credential)
        );
        debug!(realtime = ?self.realtime.state(), "Notification session started");
    }

    /// Release the push channel.
    pub async fn end(&self) {
        self.realtime.teardown().await;
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn realtime(&self) -> &SubscriptionManager {
        &self.realtime
    }

    pub fn realtime_state(&self) -> RealtimeState {
        self.realtime.state()
    }
}
