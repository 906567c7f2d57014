//! Worklog CLI - terminal time-tracking client
//!
//! Logs in against the tracking backend, runs a work session timer, and
//! reports session events and screenshots.

mod api;
mod auth;
mod capture;
mod config;
mod models;
mod session;
mod tui;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::ApiClient;
use capture::{CommandCapture, ScreenCapture, SyntheticCapture};
use config::{Config, ConfigTokenStore};
use session::{ScreenshotTrigger, SessionRunner};

#[derive(Parser)]
#[command(name = "worklog")]
#[command(about = "Terminal time-tracking client with session timer and screenshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the API base URL from the config file
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        /// Account email (prompted if omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Log in again even if credentials are stored
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Capture and upload one screenshot
    Screenshot {
        /// Upload a generated placeholder image instead of grabbing the screen
        #[arg(long)]
        synthetic_capture: bool,
    },

    /// Open the session dashboard
    Run {
        /// Start with automatic screenshots enabled
        #[arg(long)]
        auto_screenshot: bool,

        /// Upload a generated placeholder image instead of grabbing the screen
        #[arg(long)]
        synthetic_capture: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The dashboard owns the terminal, so its logs go to the in-app pane.
    let logs = tui::LogBuffer::new();
    init_logging(cli.verbose, matches!(cli.command, Commands::Run { .. }), &logs);

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
        config.validate()?;
    }

    let store = Arc::new(ConfigTokenStore::new(Config::config_path()?));
    let client = ApiClient::from_config(&config, store)?;

    match cli.command {
        Commands::Login { email, force } => {
            tracing::info!("Starting login...");
            auth::login(&client, email, force).await?;
        }
        Commands::Logout => {
            auth::logout(&client);
        }
        Commands::Status => {
            auth::status(&client);
        }
        Commands::Screenshot { synthetic_capture } => {
            require_login(&client)?;
            let capture = screen_capture(&config, synthetic_capture)?;
            session::upload_screenshot(&client, capture, ScreenshotTrigger::Manual, Local::now())
                .await
                .context("Screenshot upload failed")?;
            println!("Screenshot uploaded.");
        }
        Commands::Run {
            auto_screenshot,
            synthetic_capture,
        } => {
            require_login(&client)?;
            let capture = screen_capture(&config, synthetic_capture)?;
            if auto_screenshot {
                config.session.auto_screenshot = true;
            }
            let runner = SessionRunner::new(Arc::new(client), capture, &config.session);
            tui::run(runner, logs).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, to_buffer: bool, logs: &tui::LogBuffer) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if to_buffer {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(logs.clone()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn require_login(client: &ApiClient) -> Result<()> {
    if !client.auth().is_authenticated() {
        bail!("Not logged in. Run 'worklog login' first.");
    }
    Ok(())
}

fn screen_capture(config: &Config, synthetic: bool) -> Result<Arc<dyn ScreenCapture>> {
    if synthetic {
        return Ok(Arc::new(SyntheticCapture));
    }
    let capture = CommandCapture::new(config.capture.command.clone())
        .context("Invalid [capture] command in config")?;
    Ok(Arc::new(capture))
}
