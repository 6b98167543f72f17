//! Flowdesk CLI - sign in to a tenant, browse workflow templates, submit
//! requests, and approve or reject requests assigned to you.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowdesk_core::{ApiClient, Config, CredentialStore};

use commands::Session;

/// Directory for a daily rolling log file, in addition to stderr
const LOG_DIR_ENV: &str = "FLOWDESK_LOG_DIR";

#[derive(Parser, Debug)]
#[command(name = "flowdesk", version, about = "Multi-tenant workflow approvals from the terminal")]
struct Cli {
    /// Tenant slug (defaults to the signed-in tenant)
    #[arg(long, short, global = true)]
    tenant: Option<String>,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start sign-up; a verification code is emailed
    Signup { email: String },
    /// Finish sign-up with the emailed verification code
    Verify {
        email: String,
        #[arg(long)]
        code: String,
    },
    /// Resend the sign-up verification code
    SendVerification { email: String },
    /// Sign in to a tenant
    Signin {
        /// Defaults to the last email signed in with
        email: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Sign out and forget stored tokens
    Signout,
    /// Show the signed-in identity
    Whoami,
    /// Change the password of the signed-in user
    ChangePassword,
    /// Email a password-reset code
    ForgotPassword { email: String },
    /// Reset a password with the emailed code
    ResetPassword {
        email: String,
        #[arg(long)]
        otp: String,
    },
    /// List workflow templates
    Templates,
    /// Submit a request for a workflow template
    Apply {
        definition_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show progress and approval chain of a request
    Status { request_id: String },
    /// List your submitted requests
    MyRequests,
    /// List requests waiting on your approval
    Pending,
    /// Approve a request
    Approve { request_id: String },
    /// Reject a request
    Reject {
        request_id: String,
        #[arg(long)]
        reason: String,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "flowdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        debug!(error = ?e, "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let data_dir = config.data_dir()?;
    let credentials = Arc::new(CredentialStore::open_in(&data_dir));
    let api = ApiClient::new(&config, credentials).context("Failed to create API client")?;
    info!(base_url = api.base_url(), "Flowdesk CLI starting");

    let mut session = Session::new(config, api, cli.tenant, cli.json);

    match cli.command {
        Command::Signup { email } => session.signup(&email).await,
        Command::Verify { email, code } => session.verify(&email, &code).await,
        Command::SendVerification { email } => session.send_verification(&email).await,
        Command::Signin { email, remember } => session.signin(email, remember).await,
        Command::Signout => session.signout().await,
        Command::Whoami => session.whoami(),
        Command::ChangePassword => session.change_password().await,
        Command::ForgotPassword { email } => session.forgot_password(&email).await,
        Command::ResetPassword { email, otp } => session.reset_password(&email, &otp).await,
        Command::Templates => session.templates().await,
        Command::Apply {
            definition_id,
            title,
            description,
        } => session.apply(&definition_id, title, description).await,
        Command::Status { request_id } => session.status(&request_id).await,
        Command::MyRequests => session.my_requests().await,
        Command::Pending => session.pending().await,
        Command::Approve { request_id } => session.approve(&request_id).await,
        Command::Reject { request_id, reason } => session.reject(&request_id, &reason).await,
    }
}
