//! Notification store.
//!
//! One [`NotificationStore`] per session reconciles the initial fetch,
//! mutation acknowledgements and pushed notifications into a single
//! [`NotificationState`] published on a watch channel.

mod state;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

pub use state::NotificationState;
use state::{MarkRead, Received};

use crate::api::{NotificationRemote, DEFAULT_PER_PAGE};
use crate::error::{Error, Result};
use crate::models::{Notification, NotificationAction, NotificationFilter, NotificationId, NotificationPage};
use crate::realtime::NotificationSink;

const TOAST_BUFFER: usize = 32;

/// Where the unread count comes from after a local mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnreadPolicy {
    /// Adjust the count locally.
    #[default]
    Local,
    /// Adjust locally, then overwrite with the server's count.
    Refetch,
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Length of the compact list.
    pub capacity: usize,
    /// Page size for the full list view.
    pub page_size: u32,
    /// Undo optimistic changes when the server call fails.
    pub rollback_on_failure: bool,
    pub unread_policy: UnreadPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            page_size: DEFAULT_PER_PAGE,
            rollback_on_failure: true,
            unread_policy: UnreadPolicy::Local,
        }
    }
}

/// Severity of a [`Toast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

/// Transient notice for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub message: String,
}

impl Toast {
    fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

struct StoreInner {
    remote: Arc<dyn NotificationRemote>,
    config: StoreConfig,
    state: watch::Sender<NotificationState>,
    toasts: broadcast::Sender<Toast>,
}

/// Single source of truth for notification views.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl NotificationStore {
    pub fn new(remote: Arc<dyn NotificationRemote>, config: StoreConfig) -> Self {
        let (state, _) = watch::channel(NotificationState::default());
        let (toasts, _) = broadcast::channel(TOAST_BUFFER);
        Self {
            inner: Arc::new(StoreInner {
                remote,
                config,
                state,
                toasts,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Current state.
    pub fn snapshot(&self) -> NotificationState {
        self.inner.state.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<NotificationState> {
        self.inner.state.subscribe()
    }

    /// Receive toasts emitted from now on.
    pub fn toasts(&self) -> broadcast::Receiver<Toast> {
        self.inner.toasts.subscribe()
    }

    /// Load the unread count and the first page concurrently.
    ///
    /// Each result lands on its own; a failure in one leaves the other intact.
    pub async fn init(&self) {
        let count = async {
            match self.inner.remote.unread_count().await {
                Ok(count) => self.update(|s| s.set_unread_count(count)),
                Err(e) => warn!(error = %e, "Could not fetch unread count"),
            }
        };
        let list = async {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Could not fetch notifications");
            }
        };

        tokio::join!(count, list);
        debug!(unread = self.snapshot().unread_count, "Notification store initialized");
    }

    /// Re-fetch the first page into the compact list.
    pub async fn refresh(&self) -> Result<()> {
        let capacity = self.inner.config.capacity;
        self.update(|s| s.begin_load());

        let result = self
            .inner
            .remote
            .fetch_page(1, capacity as u32, NotificationFilter::All)
            .await;

        self.update(|s| {
            if let Ok(page) = &result {
                s.apply_page(page.notifications.clone(), capacity);
            }
            s.end_load();
        });
        result.map(|_| ())
    }

    /// Fetch a page for the full list view. The compact list is not touched.
    pub async fn fetch_page(&self, page: u32, filter: NotificationFilter) -> Result<NotificationPage> {
        self.inner
            .remote
            .fetch_page(page.max(1), self.inner.config.page_size, filter)
            .await
    }

    /// Mark one notification read.
    ///
    /// Already-read notifications are left alone. Ids outside the compact list
    /// go straight to the server without touching the count.
    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<()> {
        let at = Utc::now();
        let outcome = self.update(|s| s.mark_read(id, at));
        if outcome == MarkRead::AlreadyRead {
            debug!(%id, "Already read");
            return Ok(());
        }

        match self.inner.remote.mark_read(id).await {
            Ok(()) => {
                self.reconcile_unread().await;
                Ok(())
            }
            Err(e) => {
                if let MarkRead::Applied { decremented } = outcome {
                    self.rollback(|s| s.unmark_read(id, at, decremented));
                }
                Err(self.fail("Could not mark notification as read", e))
            }
        }
    }

    /// Mark everything read.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let at = Utc::now();
        let undo = self.update(|s| s.mark_all_read(at));

        match self.inner.remote.mark_all_read().await {
            Ok(()) => {
                self.reconcile_unread().await;
                Ok(())
            }
            Err(e) => {
                self.rollback(|s| s.unmark_all_read(&undo, at));
                Err(self.fail("Could not mark notifications as read", e))
            }
        }
    }

    /// Delete a notification.
    ///
    /// The unread count only moves when the notification was in the compact list.
    pub async fn delete(&self, id: &NotificationId) -> Result<()> {
        let removed = self.update(|s| s.remove(id));
        if removed.is_none() {
            debug!(%id, "Deleting a notification outside the compact list");
        }

        match self.inner.remote.delete(id).await {
            Ok(()) => {
                self.reconcile_unread().await;
                Ok(())
            }
            Err(e) => {
                if let Some(removed) = removed {
                    let capacity = self.inner.config.capacity;
                    self.rollback(|s| s.restore(removed, capacity));
                }
                Err(self.fail("Could not delete notification", e))
            }
        }
    }

    /// Add a notification that arrived over the push channel.
    pub fn receive_pushed(&self, notification: Notification) {
        let capacity = self.inner.config.capacity;
        let toast = Toast::info(&notification.data.title, &notification.data.message);
        let id = notification.id.clone();

        match self.update(|s| s.receive(notification, capacity)) {
            Received::Added { evicted } => {
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "Evicted from the compact list");
                }
                info!(%id, "New notification");
                let _ = self.inner.toasts.send(toast);
            }
            Received::Duplicate => debug!(%id, "Duplicate pushed notification ignored"),
        }
    }

    /// Run a notification action, then reload the first page.
    ///
    /// Actions carrying a confirmation prompt fail with
    /// [`Error::ConfirmationRequired`] unless `confirmed` is set.
    pub async fn execute_action(&self, action: &NotificationAction, confirmed: bool) -> Result<()> {
        if action.requires_confirmation() && !confirmed {
            return Err(Error::ConfirmationRequired(
                action.confirm.clone().unwrap_or_default(),
            ));
        }

        let result = self
            .inner
            .remote
            .execute_action(&action.url, action.method)
            .await;

        // Actions may change read state on the server.
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Could not reload notifications after action");
        }

        result.map_err(|e| self.fail(format!("Action \"{}\" failed", action.label), e))
    }

    fn update<R>(&self, f: impl FnOnce(&mut NotificationState) -> R) -> R {
        let mut out = None;
        self.inner.state.send_modify(|state| out = Some(f(state)));
        out.expect("send_modify runs its closure exactly once")
    }

    fn rollback(&self, f: impl FnOnce(&mut NotificationState)) {
        if self.inner.config.rollback_on_failure {
            self.update(f);
        }
    }

    async fn reconcile_unread(&self) {
        if self.inner.config.unread_policy != UnreadPolicy::Refetch {
            return;
        }
        match self.inner.remote.unread_count().await {
            Ok(count) => self.update(|s| s.set_unread_count(count)),
            Err(e) => warn!(error = %e, "Could not refresh unread count"),
        }
    }

    fn fail(&self, title: impl Into<String>, error: Error) -> Error {
        let title = title.into();
        warn!(error = %error, "{title}");
        let _ = self.inner.toasts.send(Toast::error(title, error.to_string()));
        error
    }
}

impl NotificationSink for NotificationStore {
    fn receive_pushed(&self, notification: Notification) {
        NotificationStore::receive_pushed(self, notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{notification, FakeRemote};
    use pretty_assertions::assert_eq;

    fn store(remote: &Arc<FakeRemote>) -> NotificationStore {
        NotificationStore::new(remote.clone(), StoreConfig::default())
    }

    async fn ready(ids: &[&str]) -> (Arc<FakeRemote>, NotificationStore) {
        let remote = FakeRemote::with(ids);
        let store = store(&remote);
        store.init().await;
        (remote, store)
    }

    fn ids(store: &NotificationStore) -> Vec<String> {
        store
            .snapshot()
            .notifications
            .iter()
            .map(|n| n.id.to_string())
            .collect()
    }

    fn action(confirm: Option<&str>) -> NotificationAction {
        serde_json::from_value(serde_json::json!({
            "label": "Accept",
            "url": "/tasks/3/accept",
            "method": "POST",
            "confirm": confirm,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_init_loads_count_and_first_page() {
        let (remote, store) = ready(&["A", "B", "C", "D", "E", "F", "G"]).await;

        let state = store.snapshot();
        assert_eq!(ids(&store), vec!["A", "B", "C", "D", "E"]);
        assert_eq!(state.unread_count, 7);
        assert!(!state.loading);
        assert_eq!(remote.count_calls("unread_count"), 1);
        assert_eq!(remote.count_calls("fetch_page"), 1);
    }

    #[tokio::test]
    async fn test_init_count_failure_falls_back_to_zero() {
        let remote = FakeRemote::with(&["A", "B"]);
        remote.fail("unread_count");
        let store = store(&remote);

        store.init().await;

        assert_eq!(store.snapshot().unread_count, 0);
        assert_eq!(ids(&store), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_init_list_failure_keeps_count() {
        let remote = FakeRemote::with(&["A", "B"]);
        remote.fail("fetch_page");
        let store = store(&remote);

        store.init().await;

        let state = store.snapshot();
        assert!(state.notifications.is_empty());
        assert_eq!(state.unread_count, 2);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_loading_only_during_list_fetch() {
        let remote = FakeRemote::with(&["A"]);
        let gate = remote.gate("fetch_page");
        let store = store(&remote);
        let mut states = store.subscribe();

        let init = tokio::spawn({
            let store = store.clone();
            async move { store.init().await }
        });
        states.wait_for(|s| s.loading).await.unwrap();

        gate.send(()).unwrap();
        init.await.unwrap();
        assert!(!store.snapshot().loading);
    }

    #[tokio::test]
    async fn test_push_before_init_completes_survives() {
        let remote = FakeRemote::with(&["A", "B"]);
        let gate = remote.gate("fetch_page");
        let store = store(&remote);
        let mut states = store.subscribe();

        let init = tokio::spawn({
            let store = store.clone();
            async move { store.init().await }
        });
        states.wait_for(|s| s.loading).await.unwrap();

        store.receive_pushed(notification("P"));
        gate.send(()).unwrap();
        init.await.unwrap();

        assert_eq!(ids(&store), vec!["P", "A", "B"]);
    }

    #[tokio::test]
    async fn test_scenario_a_push_prepends() {
        let (_remote, store) = ready(&["A", "B", "C"]).await;
        let mut toasts = store.toasts();

        store.receive_pushed(notification("D"));

        assert_eq!(ids(&store), vec!["D", "A", "B", "C"]);
        assert_eq!(store.snapshot().unread_count, 4);
        assert_eq!(toasts.try_recv().unwrap(), Toast::info("Title D", "m"));
    }

    #[tokio::test]
    async fn test_push_counts_even_when_already_read() {
        let (_remote, store) = ready(&["A", "B", "C"]).await;
        let mut pushed = notification("D");
        pushed.read_at = Some(Utc::now());

        store.receive_pushed(pushed);

        let state = store.snapshot();
        assert_eq!(state.notifications.len(), 4);
        assert_eq!(state.unread_count, 4);
    }

    #[tokio::test]
    async fn test_failed_mark_all_after_delete_matches_server() {
        let (remote, store) = ready(&["A", "B", "C"]).await;
        let gate = remote.gate("mark_all_read");

        let mark_all = tokio::spawn({
            let store = store.clone();
            async move { store.mark_all_as_read().await }
        });
        let mut states = store.subscribe();
        states.wait_for(|s| s.unread_count == 0).await.unwrap();

        store.delete(&NotificationId::new("A")).await.unwrap();
        remote.fail("mark_all_read");
        gate.send(()).unwrap();
        assert!(mark_all.await.unwrap().is_err());

        assert_eq!(store.snapshot().unread_count, remote.unread_count().await.unwrap());
        assert_eq!(store.snapshot().unread_count, 2);
    }

    #[tokio::test]
    async fn test_scenario_b_push_evicts_at_capacity() {
        let (_remote, store) = ready(&["E", "D", "A", "B", "C"]).await;

        store.receive_pushed(notification("F"));

        assert_eq!(ids(&store), vec!["F", "E", "D", "A", "B"]);
        assert_eq!(store.snapshot().unread_count, 6);
    }

    #[tokio::test]
    async fn test_scenario_c_mark_read_once() {
        let (remote, store) = ready(&["A", "B", "C"]).await;
        let id = NotificationId::new("A");

        store.mark_as_read(&id).await.unwrap();
        let after_first = store.snapshot();
        assert_eq!(after_first.unread_count, 2);
        assert!(after_first.get(&id).unwrap().read_at.is_some());

        store.mark_as_read(&id).await.unwrap();
        assert_eq!(store.snapshot(), after_first);
        assert_eq!(remote.count_calls("mark_read"), 1);
    }

    #[tokio::test]
    async fn test_scenario_d_delete_present_and_evicted() {
        let (remote, store) = ready(&["A", "B", "C", "D", "E", "Z"]).await;
        assert_eq!(store.snapshot().unread_count, 6);

        store.delete(&NotificationId::new("A")).await.unwrap();
        assert_eq!(ids(&store), vec!["B", "C", "D", "E"]);
        assert_eq!(store.snapshot().unread_count, 5);

        // Z never made it into the compact list; the count stays put.
        store.delete(&NotificationId::new("Z")).await.unwrap();
        assert_eq!(ids(&store), vec!["B", "C", "D", "E"]);
        assert_eq!(store.snapshot().unread_count, 5);
        assert_eq!(remote.count_calls("delete"), 2);
    }

    #[tokio::test]
    async fn test_refetch_policy_corrects_count() {
        let remote = FakeRemote::with(&["A", "B", "C", "D", "E", "Z"]);
        let store = NotificationStore::new(
            remote.clone(),
            StoreConfig {
                unread_policy: UnreadPolicy::Refetch,
                ..Default::default()
            },
        );
        store.init().await;

        store.delete(&NotificationId::new("Z")).await.unwrap();

        assert_eq!(store.snapshot().unread_count, 5);
    }

    #[tokio::test]
    async fn test_round_trip_count_matches_server() {
        let (remote, store) = ready(&["A", "B", "C"]).await;
        let k = store.snapshot().unread_count;

        store.mark_as_read(&NotificationId::new("B")).await.unwrap();

        assert_eq!(store.snapshot().unread_count, k - 1);
        assert_eq!(remote.unread_count().await.unwrap(), k - 1);
    }

    #[tokio::test]
    async fn test_mark_absent_calls_server_only() {
        let (remote, store) = ready(&["A"]).await;
        let before = store.snapshot();

        store.mark_as_read(&NotificationId::new("elsewhere")).await.unwrap();

        assert_eq!(store.snapshot(), before);
        assert_eq!(remote.count_calls("mark_read"), 1);
    }

    #[tokio::test]
    async fn test_mark_all_is_idempotent() {
        let (_remote, store) = ready(&["A", "B", "C"]).await;

        store.mark_all_as_read().await.unwrap();
        let once = store.snapshot();
        store.mark_all_as_read().await.unwrap();
        let twice = store.snapshot();

        assert_eq!(once.unread_count, 0);
        assert_eq!(once.unread_in_list(), 0);
        assert_eq!(once.unread_count, twice.unread_count);
        assert_eq!(ids(&store), vec!["A", "B", "C"]);
        assert_eq!(twice.unread_in_list(), 0);
    }

    #[tokio::test]
    async fn test_failed_mark_read_rolls_back() {
        let (remote, store) = ready(&["A", "B"]).await;
        let before = store.snapshot();
        let mut toasts = store.toasts();
        remote.fail("mark_read");

        let err = store.mark_as_read(&NotificationId::new("A")).await.unwrap_err();

        assert!(err.is_network_error());
        assert_eq!(store.snapshot(), before);
        assert_eq!(toasts.try_recv().unwrap().level, ToastLevel::Error);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_entry() {
        let (remote, store) = ready(&["A", "B", "C"]).await;
        let before = store.snapshot();
        remote.fail("delete");

        assert!(store.delete(&NotificationId::new("B")).await.is_err());

        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_failed_mark_all_rolls_back() {
        let (remote, store) = ready(&["A", "B"]).await;
        let before = store.snapshot();
        remote.fail("mark_all_read");

        assert!(store.mark_all_as_read().await.is_err());

        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_failure_without_rollback_keeps_optimistic_state() {
        let remote = FakeRemote::with(&["A"]);
        let store = NotificationStore::new(
            remote.clone(),
            StoreConfig {
                rollback_on_failure: false,
                ..Default::default()
            },
        );
        store.init().await;
        remote.fail("mark_read");

        assert!(store.mark_as_read(&NotificationId::new("A")).await.is_err());

        assert_eq!(store.snapshot().unread_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_push_is_ignored() {
        let (_remote, store) = ready(&["A", "B"]).await;
        let mut toasts = store.toasts();

        store.receive_pushed(notification("B"));

        assert_eq!(ids(&store), vec!["A", "B"]);
        assert_eq!(store.snapshot().unread_count, 2);
        assert!(toasts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invariants_hold_under_churn() {
        let (_remote, store) = ready(&["A", "B"]).await;

        for i in 0..12 {
            store.receive_pushed(notification(&format!("p{i}")));
            if i % 3 == 0 {
                store.mark_all_as_read().await.unwrap();
            }
            let state = store.snapshot();
            assert!(state.notifications.len() <= store.config().capacity);
        }
        for id in ids(&store) {
            store.delete(&NotificationId::new(id)).await.unwrap();
        }
        assert!(store.snapshot().notifications.is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_gate() {
        let (remote, store) = ready(&["A"]).await;

        let err = store.execute_action(&action(Some("Sure?")), false).await.unwrap_err();
        assert!(matches!(err, Error::ConfirmationRequired(ref prompt) if prompt == "Sure?"));
        assert_eq!(remote.count_calls("execute_action"), 0);

        store.execute_action(&action(Some("Sure?")), true).await.unwrap();
        assert_eq!(remote.count_calls("execute_action"), 1);
    }

    #[tokio::test]
    async fn test_action_always_refreshes() {
        let (remote, store) = ready(&["A"]).await;
        remote.fail("execute_action");
        let mut toasts = store.toasts();

        assert!(store.execute_action(&action(None), false).await.is_err());

        assert_eq!(remote.count_calls("fetch_page"), 2);
        assert!(remote.calls().contains(&"POST /tasks/3/accept".to_owned()));
        let toast = toasts.try_recv().unwrap();
        assert_eq!(toast.level, ToastLevel::Error);
        assert_eq!(toast.title, "Action \"Accept\" failed");

        remote.recover("execute_action");
        store.execute_action(&action(None), false).await.unwrap();
        assert_eq!(remote.count_calls("fetch_page"), 3);
    }

    #[tokio::test]
    async fn test_fetch_page_uses_page_size() {
        let remote = FakeRemote::with(&["A", "B", "C"]);
        let store = NotificationStore::new(
            remote.clone(),
            StoreConfig {
                page_size: 2,
                ..Default::default()
            },
        );

        let page = store.fetch_page(2, NotificationFilter::All).await.unwrap();

        assert_eq!(page.notifications.len(), 1);
        assert_eq!(page.last_page, 2);
        assert!(store.snapshot().notifications.is_empty());
    }
}
