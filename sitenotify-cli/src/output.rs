//! Output formatting.

use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;
use sitenotify::{
    ActionStyle, Notification, NotificationAction, Priority, RealtimeState, Toast, ToastLevel,
};

/// Output format options.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table format
    Table,
    /// JSON format
    Json,
    /// Plain text format
    #[default]
    Plain,
}

/// Trait for plain text output.
pub trait PlainPrint {
    /// Print as plain text with formatting.
    fn plain_print(&self);
}

/// Trait for table row generation.
pub trait TableRow {
    /// Get table headers.
    fn headers() -> Vec<&'static str>;
    /// Get row data as strings.
    fn row(&self) -> Vec<String>;
}

/// Print items in plain text format.
pub fn print_plain<T: PlainPrint>(items: &[T]) {
    if items.is_empty() {
        println!("No results");
        return;
    }
    for item in items {
        item.plain_print();
    }
}

/// Format a timestamp in local time.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Format a timestamp relative to `now`.
pub fn format_relative_time_from(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - time).num_seconds();

    if diff < 0 {
        format_time(time)
    } else if diff < 60 {
        format!("{}s ago", diff)
    } else if diff < 3600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86400 {
        format!("{}h {}m ago", diff / 3600, (diff % 3600) / 60)
    } else if diff < 2592000 {
        format!("{}d {}h ago", diff / 86400, (diff % 86400) / 3600)
    } else {
        format_time(time)
    }
}

/// Format a timestamp relative to now.
pub fn format_relative_time(time: DateTime<Utc>) -> String {
    format_relative_time_from(time, Utc::now())
}

/// Print a table of items with proper formatting for each output mode.
pub fn print_table<T: TableRow + Serialize + PlainPrint>(items: Vec<T>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items).unwrap_or_default());
        }
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results");
                return;
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(T::headers());
            for item in &items {
                table.add_row(item.row());
            }
            println!("{table}");
        }
        OutputFormat::Plain => {
            print_plain(&items);
        }
    }
}

/// Row for notification display.
#[derive(Serialize)]
pub struct NotificationRow {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub unread: bool,
    pub priority: Option<Priority>,
    pub actions: usize,
    pub time: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.to_string(),
            kind: n.kind.clone(),
            title: n.data.title.clone(),
            message: n.data.message.clone(),
            unread: n.is_unread(),
            priority: n.data.priority,
            actions: n.data.actions.len(),
            time: format_relative_time(n.created_at),
            created_at: n.created_at,
        }
    }
}

impl TableRow for NotificationRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "", "Title", "Message", "Actions", "Time"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            if self.unread { "●".to_string() } else { String::new() },
            self.title.clone(),
            self.message.clone(),
            self.actions.to_string(),
            self.time.clone(),
        ]
    }
}

impl PlainPrint for NotificationRow {
    fn plain_print(&self) {
        let marker = if self.unread {
            "●".yellow().to_string()
        } else {
            " ".to_string()
        };
        let title = match self.priority {
            Some(Priority::High | Priority::Critical) => self.title.red().bold(),
            _ => self.title.bold(),
        };
        println!(
            "{} [{}] {} {}",
            marker,
            self.id.cyan(),
            title,
            self.time.dimmed()
        );
        for line in self.message.lines().filter(|l| !l.trim().is_empty()) {
            println!("    {}", line);
        }
        if self.actions > 0 {
            println!("    {}", format!("{} action(s)", self.actions).dimmed());
        }
    }
}

/// Row for notification action display.
#[derive(Serialize)]
pub struct ActionRow {
    pub index: usize,
    pub label: String,
    pub method: String,
    pub url: String,
    pub style: ActionStyle,
    pub confirm: Option<String>,
}

impl ActionRow {
    pub fn new(index: usize, action: &NotificationAction) -> Self {
        Self {
            index,
            label: action.label.clone(),
            method: action.method.as_str().to_string(),
            url: action.url.clone(),
            style: action.style,
            confirm: action.confirm.clone(),
        }
    }
}

impl TableRow for ActionRow {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Label", "Method", "URL", "Confirm"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.label.clone(),
            self.method.clone(),
            self.url.clone(),
            self.confirm.clone().unwrap_or_default(),
        ]
    }
}

impl PlainPrint for ActionRow {
    fn plain_print(&self) {
        let label = match self.style {
            ActionStyle::Success => self.label.green(),
            ActionStyle::Danger => self.label.red(),
            ActionStyle::Warning => self.label.yellow(),
            ActionStyle::Info => self.label.normal(),
        };
        println!(
            "{}. {} {}",
            self.index,
            label,
            format!("{} {}", self.method, self.url).dimmed()
        );
    }
}

/// Print a toast as a single line.
pub fn print_toast(toast: &Toast, format: OutputFormat) {
    if matches!(format, OutputFormat::Json) {
        let value = serde_json::json!({
            "level": match toast.level {
                ToastLevel::Info => "info",
                ToastLevel::Error => "error",
            },
            "title": toast.title,
            "message": toast.message,
        });
        println!("{value}");
        return;
    }

    match toast.level {
        ToastLevel::Info => println!("{} {} {}", "◆".cyan(), toast.title.bold(), toast.message),
        ToastLevel::Error => eprintln!("{} {} {}", "✗".red(), toast.title.red(), toast.message),
    }
}

/// Describe the realtime status.
pub fn describe_realtime(state: &RealtimeState) -> String {
    match state {
        RealtimeState::Idle => "idle".dimmed().to_string(),
        RealtimeState::AwaitingCredential { .. } => {
            "offline (no credential)".yellow().to_string()
        }
        RealtimeState::Subscribing { channel, .. } => format!("subscribing to {channel}"),
        RealtimeState::Subscribed { channel, .. } => {
            format!("{} {}", "live".green(), channel.dimmed())
        }
        RealtimeState::AuthFailed { reason, .. } => {
            format!("{} ({reason})", "offline, channel authorization rejected".yellow())
        }
        RealtimeState::Disconnected { reason, .. } => {
            format!("{} ({reason})", "offline".red())
        }
        RealtimeState::TornDown => "closed".dimmed().to_string(),
    }
}
