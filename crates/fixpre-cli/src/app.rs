//! Command handling for the fixpre CLI.
//!
//! `App` wires the shared `Session` into every component and runs each
//! command through the navigation guard before doing any work, the same way
//! the web client guards its pages.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fixpre_core::auth::{FileCredentials, KeyringCredentials};
use fixpre_core::config::CredentialBackendKind;
use fixpre_core::feedback::UploadFile;
use fixpre_core::guard::{GuardDecision, Navigation, Page, Router};
use fixpre_core::{
    ApiClient, AuthManager, Config, FeedbackClient, HistoryReader, Session, StatsReader,
};
use tracing::{debug, info};

use crate::format::{history_line, stats_summary};

/// Number of recent entries shown under the dashboard summary
const DASHBOARD_RECENT_ENTRIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Register { email: Option<String> },
    Google { code: String },
    ForgotPassword { email: String },
    ResetPassword { token: String },
    Logout,
    Status,
    Upload {
        file: PathBuf,
        json: bool,
        /// Print the job id and return without waiting for feedback
        detach: bool,
    },
    History { json: bool },
    Dashboard { json: bool },
    Lookup { url: String, json: bool },
}

impl Command {
    /// The page this command stands for; `None` for commands that are not
    /// navigations.
    pub fn page(&self) -> Option<Page> {
        match self {
            Command::Login { .. } => Some(Page::Login),
            Command::Register { .. } => Some(Page::Register),
            Command::Google { .. } => Some(Page::GoogleCallback),
            Command::ForgotPassword { .. } => Some(Page::ForgotPassword),
            Command::ResetPassword { .. } => Some(Page::ResetPassword),
            Command::Upload { .. } | Command::Lookup { .. } => Some(Page::Home),
            Command::History { .. } => Some(Page::History),
            Command::Dashboard { .. } => Some(Page::Dashboard),
            Command::Logout | Command::Status => None,
        }
    }
}

/// What to do after the guard ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    /// Stop quietly; the user is already where the command would take them
    AlreadyLoggedIn,
}

pub struct App {
    config: Config,
    session: Session,
    api: ApiClient,
    router: Router,
    auth: AuthManager,
    feedback: FeedbackClient,
    history: HistoryReader,
    stats: StatsReader,
}

impl App {
    /// Open the configured credential backend and build every component on it.
    pub fn new(config: Config) -> Result<Self> {
        let session = match config.credential_backend {
            CredentialBackendKind::File => {
                Session::open(FileCredentials::new(config.session_path()?))
            }
            CredentialBackendKind::Keyring => Session::open(KeyringCredentials),
        };
        Self::with_session(config, session)
    }

    pub fn with_session(config: Config, session: Session) -> Result<Self> {
        let api = ApiClient::new(&config, session.clone()).context("Failed to build HTTP client")?;
        debug!(api = %config.api_base_url, feedback = %config.feedback_base_url(), "App configured");

        Ok(Self {
            router: Router::new(session.clone()),
            auth: AuthManager::new(api.clone()),
            feedback: FeedbackClient::new(api.clone(), config.upload_policy(), config.poll_timing()),
            history: HistoryReader::history(api.clone()),
            stats: StatsReader::dashboard_stats(api.clone()),
            api,
            session,
            config,
        })
    }

    /// Run the guard for `command`.
    pub fn gate(&self, command: &Command) -> Result<Gate> {
        let Some(page) = command.page() else {
            return Ok(Gate::Proceed);
        };
        let Navigation { decision, .. } = self.router.navigate_to(page);
        debug!(page = page.name(), ?decision, "Navigation checked");
        match decision {
            GuardDecision::Allow => Ok(Gate::Proceed),
            GuardDecision::RedirectToHome => Ok(Gate::AlreadyLoggedIn),
            GuardDecision::RedirectToLogin => {
                bail!("You need to log in first. Run `fixpre login`.")
            }
        }
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        if self.gate(&command)? == Gate::AlreadyLoggedIn {
            println!("You are already logged in. Run `fixpre logout` to switch accounts.");
            return Ok(());
        }

        match command {
            Command::Login { email } => self.login(email).await,
            Command::Register { email } => self.register(email).await,
            Command::Google { code } => self.google(&code).await,
            Command::ForgotPassword { email } => self.forgot_password(&email).await,
            Command::ResetPassword { token } => self.reset_password(&token).await,
            Command::Logout => {
                self.auth
                    .logout()
                    .context("Logged out of this session, but the stored token could not be removed")?;
                println!("Logged out.");
                Ok(())
            }
            Command::Status => {
                self.status();
                Ok(())
            }
            Command::Upload { file, json, detach } => self.upload(&file, json, detach).await,
            Command::History { json } => self.show_history(json).await,
            Command::Dashboard { json } => self.show_dashboard(json).await,
            Command::Lookup { url, json } => self.lookup(&url, json).await,
        }
    }

    async fn login(&self, email: Option<String>) -> Result<()> {
        let email = match email {
            Some(email) => email,
            None => prompt_line("Email: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;

        println!("Logging in...");
        self.auth.login(&email, &password).await?;
        println!("Login successful!");
        Ok(())
    }

    async fn register(&self, email: Option<String>) -> Result<()> {
        let email = match email {
            Some(email) => email,
            None => prompt_line("Email: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;
        let confirm = rpassword::prompt_password("Confirm password: ")?;
        if password != confirm {
            bail!("Passwords do not match.");
        }

        if self.auth.register(&email, &password).await? {
            println!("Account created. You are now logged in.");
        } else {
            println!("Account created. Run `fixpre login` to sign in.");
        }
        Ok(())
    }

    async fn google(&self, code: &str) -> Result<()> {
        if self.auth.login_with_code(code).await? {
            println!("Signed in with Google.");
        } else {
            println!("Google accepted the code but issued no session. Try `fixpre login`.");
        }
        Ok(())
    }

    async fn forgot_password(&self, email: &str) -> Result<()> {
        let notice = self.auth.request_password_reset(email).await?;
        println!("{}", notice);
        Ok(())
    }

    async fn reset_password(&self, token: &str) -> Result<()> {
        let password = rpassword::prompt_password("New password: ")?;
        let confirm = rpassword::prompt_password("Confirm new password: ")?;
        if password != confirm {
            bail!("Passwords do not match.");
        }
        let notice = self.auth.reset_password(token, &password).await?;
        println!("{}", notice);
        Ok(())
    }

    fn status(&self) {
        println!("API:      {}", self.config.api_base_url);
        println!("Uploads:  {}", self.config.feedback_base_url());
        println!("Token in: {}", self.session.backend_description());
        match self.session.saved_at() {
            Some(saved_at) => println!(
                "Logged in since {}",
                saved_at.with_timezone(&chrono::Local).format("%b %d, %Y %H:%M")
            ),
            None => println!("Not logged in"),
        }
    }

    async fn upload(&self, path: &Path, json: bool, detach: bool) -> Result<()> {
        let file = UploadFile::from_path(path)?;
        let job_id = self.feedback.submit(Some(&file)).await?;
        if detach {
            info!(job_id = %job_id, "Upload detached");
            println!("{}", job_id);
            return Ok(());
        }
        eprintln!("Uploaded {} (job {}). Waiting for feedback...", file.file_name, job_id);

        let mut progress = self.feedback.subscribe();
        let wait = self.feedback.wait();
        tokio::pin!(wait);
        let mut last_polls = 0;
        let report = loop {
            tokio::select! {
                result = &mut wait => break result?,
                Ok(()) = progress.changed() => {
                    let polls = progress.borrow().job.as_ref().map_or(0, |job| job.polls);
                    if polls > last_polls {
                        last_polls = polls;
                        eprintln!("  still processing (check {})", polls);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    self.feedback.start_over();
                    bail!("Cancelled.");
                }
            }
        };

        info!(job_id = %job_id, "Feedback received");
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(())
    }

    async fn show_history(&self, json: bool) -> Result<()> {
        let entries = self.history.fetch().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else if entries.is_empty() {
            println!("No feedback yet. Upload a presentation with `fixpre upload <file>`.");
        } else {
            for (i, entry) in entries.iter().enumerate() {
                println!("{}", history_line(i, entry));
            }
        }
        Ok(())
    }

    async fn show_dashboard(&self, json: bool) -> Result<()> {
        let (stats, history) = futures::join!(self.stats.fetch(), self.history.fetch());
        let stats = stats?;

        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("{}", stats_summary(&stats));
        match history {
            Ok(entries) if !entries.is_empty() => {
                println!("\nRecent feedback:");
                for (i, entry) in entries.iter().take(DASHBOARD_RECENT_ENTRIES).enumerate() {
                    println!("{}", history_line(i, entry));
                }
            }
            Ok(_) => {}
            Err(e) => eprintln!("\nCould not load recent feedback: {}", e),
        }
        Ok(())
    }

    async fn lookup(&self, url: &str, json: bool) -> Result<()> {
        let value = self.api.presentation_feedback(url).await?;
        if json {
            println!("{}", serde_json::to_string(&value)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Ok(())
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
