//! fixpre - presentation feedback from the terminal.
//!
//! Log in, upload a presentation, wait for the generated feedback and browse
//! past results and dashboard statistics.

mod app;
mod format;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, Command};
use fixpre_core::config::{Config, API_URL_ENV, UPLOAD_URL_ENV};

#[derive(Debug, Parser)]
#[command(name = "fixpre", version, about = "Presentation feedback from the command line")]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// API base URL
    #[arg(long, global = true, env = API_URL_ENV)]
    api_url: Option<String>,

    /// Base URL for uploads and results, when it differs from the API
    #[arg(long, global = true, env = UPLOAD_URL_ENV)]
    upload_url: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: Option<String>,
    },
    /// Finish Google sign-in with the code from the callback URL
    Google {
        #[arg(long)]
        code: String,
    },
    /// Email a password reset link
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using the token from the reset email
    ResetPassword {
        #[arg(long)]
        token: String,
    },
    /// Forget the stored token
    Logout,
    /// Show configuration and login state
    Status,
    /// Upload a presentation and wait for feedback
    Upload {
        file: PathBuf,
        /// Print the feedback as compact JSON
        #[arg(long)]
        json: bool,
        /// Print the job id and exit without waiting for feedback
        #[arg(long, conflicts_with = "json")]
        detach: bool,
    },
    /// List past feedback
    History {
        #[arg(long)]
        json: bool,
    },
    /// Show your score summary and recent feedback
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Look up feedback for a presentation by its URL
    Lookup {
        url: String,
        #[arg(long)]
        json: bool,
    },
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Login { email } => Command::Login { email },
            CliCommand::Register { email } => Command::Register { email },
            CliCommand::Google { code } => Command::Google { code },
            CliCommand::ForgotPassword { email } => Command::ForgotPassword { email },
            CliCommand::ResetPassword { token } => Command::ResetPassword { token },
            CliCommand::Logout => Command::Logout,
            CliCommand::Status => Command::Status,
            CliCommand::Upload { file, json, detach } => Command::Upload { file, json, detach },
            CliCommand::History { json } => Command::History { json },
            CliCommand::Dashboard { json } => Command::Dashboard { json },
            CliCommand::Lookup { url, json } => Command::Lookup { url, json },
        }
    }
}

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file writer and must outlive `main`'s work.
fn init_tracing(log_file: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file = log_file.and_then(|path| {
        let name = path.file_name()?.to_owned();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Some((dir, name))
    });

    match file {
        Some((dir, name)) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref());
    info!("fixpre starting");

    let mut config = Config::load()?;
    config.apply_overrides(cli.api_url, cli.upload_url);

    let app = App::new(config)?;
    app.run(cli.command.into()).await
}
