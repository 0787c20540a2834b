//! Live notification feed.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use sitenotify::{NotificationSession, SessionConfig, StoreConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::config::{build_authed_client, Config, Overrides};
use crate::output::{describe_realtime, print_table, print_toast, NotificationRow, OutputFormat};

/// Show the latest notifications, then print new ones until interrupted.
pub async fn run(format: OutputFormat, config: &Config, overrides: &Overrides) -> Result<()> {
    let client = build_authed_client(config, overrides)?;
    let transport = Arc::new(client.realtime(config.realtime_config(overrides)));
    let session = NotificationSession::new(
        &client,
        transport,
        SessionConfig {
            store: StoreConfig::default(),
            channel: config.channel_config(),
        },
    );

    let mut toasts = session.store().toasts();
    let mut realtime = session.realtime().subscribe();

    session.start().await;
    realtime.borrow_and_update();

    let state = session.store().snapshot();
    let rows: Vec<NotificationRow> = state.notifications.iter().map(NotificationRow::from).collect();
    print_table(rows, format);
    if !matches!(format, OutputFormat::Json) {
        println!(
            "\n{} unread · realtime {}",
            state.unread_count.to_string().yellow(),
            describe_realtime(&session.realtime_state())
        );
        println!("{}", "Waiting for notifications, Ctrl-C to stop".dimmed());
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            toast = toasts.recv() => match toast {
                Ok(toast) => print_toast(&toast, format),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped notices"),
                Err(RecvError::Closed) => break,
            },
            changed = realtime.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = realtime.borrow_and_update().clone();
                eprintln!("realtime {}", describe_realtime(&state));
            }
        }
    }

    session.end().await;
    Ok(())
}
