//! Test doubles shared by the store, realtime and session tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::api::NotificationRemote;
use crate::error::{Error, Result};
use crate::models::{
    ActionMethod, Interface, Notification, NotificationData, NotificationFilter, NotificationId,
    NotificationPage,
};
use crate::realtime::{PushSubscription, PushTransport, RawEvent};

/// An unread `lk` notification titled after its id.
pub(crate) fn notification(id: &str) -> Notification {
    Notification {
        id: NotificationId::new(id),
        kind: "task".to_owned(),
        data: NotificationData {
            title: format!("Title {id}"),
            message: "m".to_owned(),
            interface: Interface::Lk,
            ..Default::default()
        },
        read_at: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
    }
}

/// A `notification.created` event as the server would push it.
pub(crate) fn pushed(id: &str, interface: &str) -> RawEvent {
    RawEvent::new(
        "notification.created",
        json!({
            "id": id,
            "type": "task",
            "data": {"title": format!("Title {id}"), "message": "m", "interface": interface},
        }),
    )
}

/// How the next subscribe call ends.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Accept,
    RejectAuth,
    Fail,
}

/// Transport handing out in-memory channels.
#[derive(Default)]
pub(crate) struct MockTransport {
    outcomes: StdMutex<VecDeque<Outcome>>,
    /// `(channel, credential)` per subscribe call.
    pub(crate) calls: StdMutex<Vec<(String, String)>>,
    senders: StdMutex<Vec<mpsc::Sender<RawEvent>>>,
}

impl MockTransport {
    /// Outcomes for successive calls; once exhausted every call is accepted.
    pub(crate) fn with(outcomes: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: StdMutex::new(outcomes.into()),
            ..Default::default()
        })
    }

    /// Sender feeding the most recent subscription.
    pub(crate) fn sender(&self) -> mpsc::Sender<RawEvent> {
        self.senders
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no subscription opened")
    }

    /// Simulate the server going away.
    pub(crate) fn drop_senders(&self) {
        self.senders.lock().unwrap().clear();
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn subscribe(&self, channel: &str, credential: &str) -> Result<PushSubscription> {
        self.calls
            .lock()
            .unwrap()
            .push((channel.to_owned(), credential.to_owned()));

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Accept);

        match outcome {
            Outcome::Accept => {
                let (tx, rx) = mpsc::channel(16);
                self.senders.lock().unwrap().push(tx);
                Ok(PushSubscription::new(channel, rx))
            }
            Outcome::RejectAuth => Err(Error::auth("forbidden")),
            Outcome::Fail => Err(Error::channel("connection refused")),
        }
    }
}

/// In-memory notification server.
#[derive(Default)]
pub(crate) struct FakeRemote {
    /// Server-side notifications, newest first.
    pub(crate) server: StdMutex<Vec<Notification>>,
    /// Operations that answer with a 500.
    failing: StdMutex<HashSet<&'static str>>,
    /// Operation names in call order.
    pub(crate) calls: StdMutex<Vec<String>>,
    /// Operations whose next call waits for a signal.
    gates: StdMutex<HashMap<&'static str, oneshot::Receiver<()>>>,
}

impl FakeRemote {
    /// Server holding unread notifications with these ids.
    pub(crate) fn with(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            server: StdMutex::new(ids.iter().map(|id| notification(id)).collect()),
            ..Default::default()
        })
    }

    /// Make `op` fail from now on.
    pub(crate) fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub(crate) fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Hold the next `op` call until the returned sender fires.
    pub(crate) fn gate(&self, op: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(op, rx);
        tx
    }

    async fn pass_gate(&self, op: &'static str) {
        let gate = self.gates.lock().unwrap().remove(op);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count_calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    fn enter(&self, op: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(op.to_owned());
        if self.failing.lock().unwrap().contains(op) {
            return Err(Error::api(500, format!("{op} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRemote for FakeRemote {
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        filter: NotificationFilter,
    ) -> Result<NotificationPage> {
        self.pass_gate("fetch_page").await;
        self.enter("fetch_page")?;

        let matching: Vec<Notification> = self
            .server
            .lock()
            .unwrap()
            .iter()
            .filter(|n| match filter {
                NotificationFilter::All => true,
                NotificationFilter::Unread => n.is_unread(),
                NotificationFilter::Read => !n.is_unread(),
            })
            .cloned()
            .collect();

        let per_page = per_page.max(1) as usize;
        let total = matching.len();
        let notifications = matching
            .into_iter()
            .skip((page.max(1) as usize - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(NotificationPage {
            notifications,
            current_page: page,
            last_page: total.div_ceil(per_page).max(1) as u32,
            total: total as u64,
        })
    }

    async fn unread_count(&self) -> Result<u32> {
        self.enter("unread_count")?;
        let server = self.server.lock().unwrap();
        Ok(server.iter().filter(|n| n.is_unread()).count() as u32)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        self.enter("mark_read")?;
        if let Some(n) = self.server.lock().unwrap().iter_mut().find(|n| &n.id == id) {
            n.read_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.pass_gate("mark_all_read").await;
        self.enter("mark_all_read")?;
        for n in self.server.lock().unwrap().iter_mut() {
            n.read_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn delete(&self, id: &NotificationId) -> Result<()> {
        self.enter("delete")?;
        self.server.lock().unwrap().retain(|n| &n.id != id);
        Ok(())
    }

    async fn execute_action(&self, url: &str, method: ActionMethod) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", method.as_str(), url));
        self.enter("execute_action")
    }
}
