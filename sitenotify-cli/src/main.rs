//! Site notification CLI.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{notification, watch};
use tracing_subscriber::EnvFilter;

/// Site notifications from the command line
#[derive(Parser)]
#[command(name = "sitenotify")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "plain")]
    format: output::OutputFormat,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: config::Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage authentication
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Notification operations
    #[command(alias = "n")]
    Notification {
        #[command(subcommand)]
        action: notification::NotificationAction,
    },

    /// Follow new notifications in real time
    #[command(alias = "w")]
    Watch,

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum AuthAction {
    /// Login with token and user id
    Login {
        /// Bearer token
        #[arg(short, long)]
        token: String,
        /// User ID
        #[arg(short, long)]
        user: String,
    },
    /// Logout
    Logout,
    /// Show current auth status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config()?;

    match cli.command {
        Commands::Auth { action } => handle_auth(action, cfg, &cli.overrides),
        Commands::Notification { action } => {
            notification::handle(action, cli.format, &cfg, &cli.overrides).await
        }
        Commands::Watch => watch::run(cli.format, &cfg, &cli.overrides).await,
        Commands::Config => {
            println!("Config file: {}", config::config_path()?.display());
            println!(
                "API: {}",
                cli.overrides
                    .base_url
                    .as_deref()
                    .or(cfg.api.base_url.as_deref())
                    .unwrap_or(sitenotify::client::DEFAULT_BASE_URL)
            );
            let realtime = cfg.realtime_config(&cli.overrides);
            let channel = cfg.channel_config();
            println!("WebSocket: {}", realtime.ws_url);
            println!(
                "Audience: {} (event {})",
                channel.audience.as_str(),
                channel.event
            );
            println!(
                "Authenticated: {}",
                cfg.effective_auth(&cli.overrides).is_some()
            );
            Ok(())
        }
    }
}

fn handle_auth(action: AuthAction, mut cfg: config::Config, overrides: &config::Overrides) -> Result<()> {
    match action {
        AuthAction::Login { token, user } => {
            cfg.auth = Some(config::AuthConfig {
                token,
                user_id: user.clone(),
            });
            config::save_config(&cfg)?;
            println!("{} Logged in as {}", "✓".green(), user);
            Ok(())
        }
        AuthAction::Logout => {
            cfg.auth = None;
            config::save_config(&cfg)?;
            println!("Logged out");
            Ok(())
        }
        AuthAction::Status => {
            match cfg.effective_auth(overrides) {
                Some(auth) => println!("Logged in as {}", auth.user_id),
                None => println!("Not logged in"),
            }
            Ok(())
        }
    }
}
