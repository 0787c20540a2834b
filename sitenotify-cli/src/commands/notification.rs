//! Notification commands.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use sitenotify::{
    Error, Notification, NotificationApi, NotificationFilter, NotificationId, NotificationStore,
    StoreConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{build_authed_client, Config, Overrides};
use crate::output::{print_table, ActionRow, NotificationRow, OutputFormat};

/// Page size used when searching for a single notification.
const LOOKUP_PAGE_SIZE: u32 = 50;

#[derive(Subcommand)]
pub enum NotificationAction {
    /// Show the unread notification count
    Count,

    /// List notifications
    #[command(alias = "ls")]
    List {
        /// Page number
        #[arg(short, long, default_value = "1")]
        page: u32,
        /// Page size
        #[arg(short = 'n', long, default_value = "20")]
        per_page: u32,
        /// Filter: all, unread, read
        #[arg(long, default_value = "all")]
        filter: String,
    },

    /// Mark notification as read
    Read {
        /// Notification ID
        id: String,
    },

    /// Mark all notifications as read
    ReadAll,

    /// Delete a notification
    #[command(alias = "rm")]
    Delete {
        /// Notification ID
        id: String,
    },

    /// Show the actions offered by a notification
    Actions {
        /// Notification ID
        id: String,
    },

    /// Run a notification action
    Run {
        /// Notification ID
        id: String,
        /// Action number, as shown by `actions`
        index: usize,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle(
    action: NotificationAction,
    format: OutputFormat,
    config: &Config,
    overrides: &Overrides,
) -> Result<()> {
    let client = build_authed_client(config, overrides)?;
    let api = client.notifications();

    match action {
        NotificationAction::Count => show_count(&api, format).await,
        NotificationAction::List {
            page,
            per_page,
            filter,
        } => list_notifications(&api, page, per_page, &filter, format).await,
        NotificationAction::Read { id } => mark_read(&api, &id).await,
        NotificationAction::ReadAll => mark_all_read(&api).await,
        NotificationAction::Delete { id } => delete(&api, &id).await,
        NotificationAction::Actions { id } => show_actions(&api, &id, format).await,
        NotificationAction::Run { id, index, yes } => run_action(api, &id, index, yes).await,
    }
}

async fn show_count(api: &NotificationApi, format: OutputFormat) -> Result<()> {
    let count = api.unread_count().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "unread": count })),
        _ if count > 0 => println!("Unread: {}", count.to_string().yellow()),
        _ => println!("Unread: {}", count.to_string().dimmed()),
    }

    Ok(())
}

async fn list_notifications(
    api: &NotificationApi,
    page: u32,
    per_page: u32,
    filter: &str,
    format: OutputFormat,
) -> Result<()> {
    let filter: NotificationFilter = filter.parse()?;

    let result = api
        .list()
        .page(page)
        .per_page(per_page)
        .filter(filter)
        .send()
        .await?;

    if matches!(format, OutputFormat::Plain) {
        println!(
            "Notifications ({}, page {}/{}, {} total)\n",
            filter.param(),
            result.current_page,
            result.last_page,
            result.total
        );
    }

    let rows: Vec<NotificationRow> = result.notifications.iter().map(NotificationRow::from).collect();
    print_table(rows, format);

    Ok(())
}

async fn mark_read(api: &NotificationApi, id: &str) -> Result<()> {
    api.mark_read(&NotificationId::new(id)).await?;

    println!("{} Marked notification {} as read", "✓".green(), id);

    Ok(())
}

async fn mark_all_read(api: &NotificationApi) -> Result<()> {
    api.mark_all_read().await?;

    println!("{} Marked all notifications as read", "✓".green());

    Ok(())
}

async fn delete(api: &NotificationApi, id: &str) -> Result<()> {
    api.delete(&NotificationId::new(id)).await?;

    println!("{} Deleted notification {}", "✓".green(), id);

    Ok(())
}

async fn show_actions(api: &NotificationApi, id: &str, format: OutputFormat) -> Result<()> {
    let noti = find_notification(api, id).await?;

    let rows: Vec<ActionRow> = noti
        .data
        .actions
        .iter()
        .enumerate()
        .map(|(i, action)| ActionRow::new(i + 1, action))
        .collect();
    print_table(rows, format);

    Ok(())
}

async fn run_action(api: NotificationApi, id: &str, index: usize, yes: bool) -> Result<()> {
    let noti = find_notification(&api, id).await?;
    let action = index
        .checked_sub(1)
        .and_then(|i| noti.data.actions.get(i))
        .with_context(|| {
            format!(
                "Notification {} has no action #{} ({} available)",
                id,
                index,
                noti.data.actions.len()
            )
        })?
        .clone();

    let store = NotificationStore::new(Arc::new(api), StoreConfig::default());

    match store.execute_action(&action, yes).await {
        Err(Error::ConfirmationRequired(prompt)) => {
            if !confirm(&prompt).await? {
                println!("Cancelled");
                return Ok(());
            }
            store.execute_action(&action, true).await?;
        }
        result => result?,
    }

    println!("{} {}", "✓".green(), action.label);

    Ok(())
}

/// Look a notification up by walking the list.
async fn find_notification(api: &NotificationApi, id: &str) -> Result<Notification> {
    let id = NotificationId::new(id);
    let mut page = 1;

    loop {
        let result = api
            .list()
            .page(page)
            .per_page(LOOKUP_PAGE_SIZE)
            .send()
            .await?;

        if let Some(noti) = result.notifications.into_iter().find(|n| n.id == id) {
            return Ok(noti);
        }
        if result.current_page >= result.last_page {
            bail!("Notification {} not found", id);
        }
        page += 1;
    }
}

async fn confirm(prompt: &str) -> Result<bool> {
    println!("{} [y/N]", prompt.yellow());

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read confirmation")?;

    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
