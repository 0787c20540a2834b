//! Notification models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{time, NotificationId};

/// A notification for the current user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID.
    pub id: NotificationId,
    /// Classification tag, informational only.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Payload record.
    pub data: NotificationData,
    /// When the notification was read, `None` while unread.
    #[serde(default, with = "time::option")]
    pub read_at: Option<DateTime<Utc>>,
    /// Time when notification was created.
    #[serde(with = "time")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Whether the notification has not been read yet.
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    /// Audience the notification targets.
    pub fn interface(&self) -> Interface {
        self.data.interface
    }
}

/// Notification payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Headline.
    #[serde(default)]
    pub title: String,
    /// Body text.
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Which application surface this notification is meant for.
    #[serde(default)]
    pub interface: Interface,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Follow-up actions, in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    /// Payload keys this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Audience discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    /// Personal dashboard.
    #[default]
    Lk,
    /// Administration panel.
    Admin,
    /// Any surface this client does not know about.
    #[serde(other)]
    Other,
}

impl Interface {
    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Lk => "lk",
            Interface::Admin => "admin",
            Interface::Other => "other",
        }
    }

    /// Parse a wire value. Unknown strings map to [`Interface::Other`].
    pub fn from_param(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "lk" => Interface::Lk,
            "admin" => Interface::Admin,
            _ => Interface::Other,
        }
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A follow-up call a user can trigger from a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Display text.
    pub label: String,
    /// Target URL, absolute or relative to the API base.
    pub url: String,
    #[serde(default)]
    pub method: ActionMethod,
    #[serde(default)]
    pub style: ActionStyle,
    /// Confirmation prompt; the action must not fire before the user agrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
}

impl NotificationAction {
    /// Whether the user has to confirm before the action fires.
    pub fn requires_confirmation(&self) -> bool {
        self.confirm
            .as_deref()
            .is_some_and(|prompt| !prompt.trim().is_empty())
    }
}

/// HTTP method of a notification action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionMethod {
    #[default]
    Get,
    Post,
    Patch,
    Delete,
}

impl ActionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionMethod::Get => "GET",
            ActionMethod::Post => "POST",
            ActionMethod::Patch => "PATCH",
            ActionMethod::Delete => "DELETE",
        }
    }
}

/// Semantic style hint for an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStyle {
    Success,
    Danger,
    Warning,
    #[default]
    Info,
}

/// Read-state filter for list requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl NotificationFilter {
    /// Get the API parameter value.
    pub fn param(&self) -> &'static str {
        match self {
            NotificationFilter::All => "all",
            NotificationFilter::Unread => "unread",
            NotificationFilter::Read => "read",
        }
    }
}

impl std::str::FromStr for NotificationFilter {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(NotificationFilter::All),
            "unread" => Ok(NotificationFilter::Unread),
            "read" => Ok(NotificationFilter::Read),
            other => Err(crate::error::Error::InvalidArgument(format!(
                "unknown filter: {other}"
            ))),
        }
    }
}

/// One page of the notification list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationPage {
    /// Notifications on this page, newest first.
    pub notifications: Vec<Notification>,
    /// Current page.
    pub current_page: u32,
    /// Last available page.
    pub last_page: u32,
    /// Total notifications matching the filter.
    pub total: u64,
}

impl NotificationPage {
    /// Whether there is a page after this one.
    pub fn has_more(&self) -> bool {
        self.current_page < self.last_page
    }
}
