mod clipboard;
mod config;
mod identity;
mod models;
mod rpc;
mod session;
mod store;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::clipboard::CommandClipboard;
use crate::config::SessionConfig;
use crate::identity::format_short_address;
use crate::rpc::{IdentityApiClient, WalletAgentClient};
use crate::session::{
    ConnectOutcome, ConnectionPhase, CopyFeedback, DetectionState, EditState, IndicatorTimers,
    SaveOutcome, SessionController, Snapshot,
};
use crate::store::FileStore;

type Controller =
    SessionController<WalletAgentClient, IdentityApiClient, FileStore, CommandClipboard>;

#[derive(Parser)]
#[command(
    name = "skills-session",
    version,
    about = "Wallet session controller for the Stellar Skills app"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Restore the persisted session, if any, and print its state.
    Status,
    /// Connect the wallet, creating or refreshing the identity record.
    Login,
    /// Disconnect and clear the persisted session.
    Logout,
    /// Validate and save a new display name.
    SetUsername { name: String },
    /// Copy the full wallet address to the system clipboard.
    CopyAddress,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SessionConfig::load().context("Failed to load configuration")?;

    let wallet = WalletAgentClient::new(&config.wallet.rpc_url, config.wallet.request_timeout())
        .context("Failed to initialize wallet agent client")?;
    let backend =
        IdentityApiClient::new(&config.backend.rpc_url, config.backend.request_timeout())
            .context("Failed to initialize identity backend client")?;
    let store = FileStore::new(config.storage.session_path()?);
    let clipboard = match &config.ui.clipboard_command {
        Some(command) => CommandClipboard::new(command)?,
        None => CommandClipboard::platform_default(),
    };

    let controller = SessionController::new(
        wallet,
        backend,
        store,
        clipboard,
        config.wallet.detect_attempts(),
        config.wallet.detect_interval(),
        IndicatorTimers {
            welcome_window: config.ui.welcome_window(),
            redirect_delay: config.ui.redirect_delay(),
            copy_feedback_window: config.ui.copy_feedback_window(),
        },
    );

    match cli.command {
        CliCommand::Status => status(&controller).await,
        CliCommand::Login => login(&controller).await,
        CliCommand::Logout => logout(&controller).await,
        CliCommand::SetUsername { name } => set_username(&controller, &name).await,
        CliCommand::CopyAddress => copy_address(&controller).await,
    }
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn status(controller: &Controller) -> Result<()> {
    controller.restore().await;
    render(&controller.snapshot());
    Ok(())
}

async fn login(controller: &Controller) -> Result<()> {
    if controller.restore().await {
        render(&controller.snapshot());
        controller.await_redirect().await;
        println!("Session restored. Proceeding to the dashboard.");
        return Ok(());
    }

    if !controller.detect().await {
        render(&controller.snapshot());
        bail!("wallet extension not detected");
    }

    match controller.connect().await {
        ConnectOutcome::Connected { is_new_user: true } => {
            render(&controller.snapshot());
            println!("Pick a display name with `skills-session set-username <name>`.");
            Ok(())
        }
        ConnectOutcome::Connected { is_new_user: false } => {
            render(&controller.snapshot());
            controller.await_redirect().await;
            println!("Proceeding to the dashboard.");
            Ok(())
        }
        ConnectOutcome::Failed => {
            render(&controller.snapshot());
            bail!("wallet connect failed");
        }
        ConnectOutcome::Pending | ConnectOutcome::Refused => bail!("wallet connect refused"),
    }
}

async fn logout(controller: &Controller) -> Result<()> {
    controller.disconnect().await;
    println!("Disconnected.");
    Ok(())
}

async fn set_username(controller: &Controller, name: &str) -> Result<()> {
    if !controller.restore().await {
        bail!("no active session; run `skills-session login` first");
    }
    if !controller.begin_edit() {
        bail!("username editor is unavailable");
    }
    controller.update_draft(name);

    match controller.save_username().await {
        SaveOutcome::Saved => {
            let snapshot = controller.snapshot();
            let username = snapshot
                .user
                .and_then(|user| user.username)
                .unwrap_or_default();
            println!("Username saved: {username}");
            Ok(())
        }
        SaveOutcome::Invalid(err) => bail!("{err}"),
        SaveOutcome::Taken => bail!("that username is already taken"),
        SaveOutcome::Failed => bail!("could not save username; please try again"),
        SaveOutcome::Pending | SaveOutcome::Refused => bail!("username save refused"),
    }
}

async fn copy_address(controller: &Controller) -> Result<()> {
    if !controller.restore().await {
        bail!("no active session; run `skills-session login` first");
    }
    controller.copy_address().await;
    match controller.snapshot().copy_feedback {
        Some(CopyFeedback::Copied) => println!("Copied!"),
        Some(CopyFeedback::Failed) => println!("Failed to copy"),
        None => {}
    }
    Ok(())
}

/// Renders the login screen as a pure function of controller state.
fn render(snapshot: &Snapshot) {
    let detection = match snapshot.detection {
        DetectionState::Checking => "Checking...",
        DetectionState::Detected => "Detected",
        DetectionState::NotInstalled => "Not installed",
    };
    println!("Freighter wallet: {detection}");

    match snapshot.phase {
        ConnectionPhase::Disconnected => println!("Status: disconnected"),
        ConnectionPhase::Connecting => println!("Status: connecting..."),
        ConnectionPhase::Connected => {
            if let Some(address) = &snapshot.wallet_address {
                println!("Connected wallet: {}", format_short_address(address));
            }
            if let Some(user) = &snapshot.user {
                println!("User ID: {}", user.id);
                println!(
                    "Username: {}",
                    user.username.as_deref().unwrap_or("(not set)")
                );
                println!("Joined: {}", user.created_at.format("%Y-%m-%d"));
                println!(
                    "Last login: {}",
                    user.last_login.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
    }

    if snapshot.welcome_visible {
        println!("Welcome to Stellar Skills! Your account is ready.");
    }
    if let Some(feedback) = snapshot.copy_feedback {
        match feedback {
            CopyFeedback::Copied => println!("Copied!"),
            CopyFeedback::Failed => println!("Failed to copy"),
        }
    }
    if let EditState::Editing {
        error: Some(issue), ..
    } = &snapshot.edit
    {
        println!("! {}", issue.user_message());
    }
    if let Some(message) = &snapshot.message {
        println!("! {message}");
    }
}
