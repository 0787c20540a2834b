//! Notification API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    client::NotifyClientInner,
    error::{Error, Result},
    models::{ActionMethod, Notification, NotificationFilter, NotificationId, NotificationPage},
};

/// Default page size for list requests.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Remote operations the notification store depends on.
#[async_trait]
pub trait NotificationRemote: Send + Sync {
    /// Fetch one page of notifications.
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        filter: NotificationFilter,
    ) -> Result<NotificationPage>;

    /// Fetch the server-side unread count.
    async fn unread_count(&self) -> Result<u32>;

    /// Mark a notification as read.
    async fn mark_read(&self, id: &NotificationId) -> Result<()>;

    /// Mark every notification as read.
    async fn mark_all_read(&self) -> Result<()>;

    /// Delete a notification.
    async fn delete(&self, id: &NotificationId) -> Result<()>;

    /// Perform the call described by a notification action.
    async fn execute_action(&self, url: &str, method: ActionMethod) -> Result<()>;
}

/// API for notification operations.
#[derive(Clone)]
pub struct NotificationApi {
    client: Arc<NotifyClientInner>,
}

impl NotificationApi {
    pub(crate) fn new(client: Arc<NotifyClientInner>) -> Self {
        Self { client }
    }

    /// List notifications.
    pub fn list(&self) -> NotificationListBuilder {
        NotificationListBuilder {
            client: self.client.clone(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            filter: NotificationFilter::All,
        }
    }

    /// Get the unread notification count.
    pub async fn unread_count(&self) -> Result<u32> {
        let text = self
            .client
            .send(Method::GET, "notifications/unread-count", &[], None)
            .await?;

        parse_unread_count(&text)
    }

    /// Mark notification as read.
    pub async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        let api = format!("notifications/{}/read", path_segment(id)?);
        self.client.send(Method::PATCH, &api, &[], None).await?;

        Ok(())
    }

    /// Mark all notifications as read.
    pub async fn mark_all_read(&self) -> Result<()> {
        self.client
            .send(Method::POST, "notifications/mark-all-read", &[], None)
            .await?;

        Ok(())
    }

    /// Delete a notification.
    pub async fn delete(&self, id: &NotificationId) -> Result<()> {
        let api = format!("notifications/{}", path_segment(id)?);
        self.client.send(Method::DELETE, &api, &[], None).await?;

        Ok(())
    }

    /// Call an action URL with the action's method.
    pub async fn execute_action(&self, url: &str, method: ActionMethod) -> Result<()> {
        if url.trim().is_empty() {
            return Err(Error::InvalidArgument("action url is empty".into()));
        }

        self.client
            .send(to_http_method(method), url.trim(), &[], None)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationRemote for NotificationApi {
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        filter: NotificationFilter,
    ) -> Result<NotificationPage> {
        self.list()
            .page(page)
            .per_page(per_page)
            .filter(filter)
            .send()
            .await
    }

    async fn unread_count(&self) -> Result<u32> {
        NotificationApi::unread_count(self).await
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        NotificationApi::mark_read(self, id).await
    }

    async fn mark_all_read(&self) -> Result<()> {
        NotificationApi::mark_all_read(self).await
    }

    async fn delete(&self, id: &NotificationId) -> Result<()> {
        NotificationApi::delete(self, id).await
    }

    async fn execute_action(&self, url: &str, method: ActionMethod) -> Result<()> {
        NotificationApi::execute_action(self, url, method).await
    }
}

/// Builder for notification list requests.
pub struct NotificationListBuilder {
    client: Arc<NotifyClientInner>,
    page: u32,
    per_page: u32,
    filter: NotificationFilter,
}

impl NotificationListBuilder {
    /// Set the page number.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Set the page size.
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Set the read-state filter.
    pub fn filter(mut self, filter: NotificationFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Execute the request.
    pub async fn send(self) -> Result<NotificationPage> {
        let page_str = self.page.to_string();
        let per_page_str = self.per_page.to_string();

        let text = self
            .client
            .send(
                Method::GET,
                "notifications",
                &[
                    ("page", &page_str),
                    ("per_page", &per_page_str),
                    ("filter", self.filter.param()),
                ],
                None,
            )
            .await?;

        parse_notification_page(&text, self.page)
    }
}

fn to_http_method(method: ActionMethod) -> Method {
    match method {
        ActionMethod::Get => Method::GET,
        ActionMethod::Post => Method::POST,
        ActionMethod::Patch => Method::PATCH,
        ActionMethod::Delete => Method::DELETE,
    }
}

/// Reject ids that would escape their path segment.
fn path_segment(id: &NotificationId) -> Result<&str> {
    let raw = id.as_str();
    if id.is_empty() || raw.contains(|c: char| matches!(c, '/' | '?' | '#')) {
        return Err(Error::InvalidArgument(format!("invalid notification id: {raw:?}")));
    }
    Ok(raw)
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    current_page: Option<u32>,
    last_page: Option<u32>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    data: Vec<Notification>,
    meta: Option<PageMeta>,
    current_page: Option<u32>,
    last_page: Option<u32>,
    total: Option<u64>,
}

/// Parse a list response in either the flat paginator or the `meta` resource shape.
fn parse_notification_page(text: &str, requested_page: u32) -> Result<NotificationPage> {
    let raw: RawPage = serde_json::from_str(text)?;
    let meta = raw.meta.as_ref();

    let current_page = raw
        .current_page
        .or_else(|| meta.and_then(|m| m.current_page))
        .unwrap_or(requested_page);
    let last_page = raw
        .last_page
        .or_else(|| meta.and_then(|m| m.last_page))
        .unwrap_or(current_page)
        .max(1);
    let total = raw
        .total
        .or_else(|| meta.and_then(|m| m.total))
        .unwrap_or(raw.data.len() as u64);

    Ok(NotificationPage {
        notifications: raw.data,
        current_page,
        last_page,
        total,
    })
}

/// Parse `{"count": n}`, optionally wrapped in `data`.
fn parse_unread_count(text: &str) -> Result<u32> {
    let value: Value = serde_json::from_str(text)?;
    let body = match value.get("data") {
        Some(data) if data.is_object() => data,
        _ => &value,
    };

    let count = body
        .get("count")
        .ok_or_else(|| Error::parse("unread count response has no `count` field"))?;

    count
        .as_u64()
        .or_else(|| count.as_str().and_then(|s| s.trim().parse().ok()))
        .map(|n| n.min(u32::MAX as u64) as u32)
        .ok_or_else(|| Error::parse(format!("invalid unread count: {count}")))
}
