//! Portal CLI: terminal host for the customer dashboard engine.
//!
//! Every invocation is one "page visit": restore the last location, revalidate
//! the stored session, perform the requested intent, render the active view,
//! and remember where we ended up for the next run.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use portal_core::api::Environment;
use portal_core::filters::{ActivityStatus, AnalyticsRange, EnvFilter, StatusFilter};
use portal_core::keys::{AutoConfirm, Confirm, MutationOutcome};
use portal_core::prefs::Preferences;
use portal_core::session::SESSION_ENDED_NOTICE;
use portal_core::{AuthState, Console, ConsoleConfig, HashRouter, HttpApi, View};
use portal_storage::FileStore;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::render::{
    BOLD, DIM, RED, RESET, YELLOW, header, kv_line, print_json, print_screen, print_signed_out,
    screen_json, success, warning,
};

// ── CLI structure ────────────────────────────────────────────────────

/// Portal: the customer dashboard in your terminal.
#[derive(Parser)]
#[command(
    name = "portal",
    version,
    about = "Portal CLI: sign in, browse analytics, manage API keys and filter activity",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         PORTAL_API_URL       Dashboard API base URL (default: http://127.0.0.1:8000/dashboard/api)\n  \
         PORTAL_STATE_DIR     Session and preference directory (default: $HOME/.portal)\n  \
         PORTAL_LOG_LEVEL     Log filter when RUST_LOG is unset (default: warn)\n  \
         PORTAL_TIMEOUT_SECS  Request timeout in seconds (default: 10)\n  \
         PORTAL_PASSWORD      Password for login/register\n\n\
         {DIM}Examples:{RESET}\n  \
         portal login --email owner@example.com\n  \
         portal range 7d\n  \
         portal keys list --status active --env live\n  \
         portal keys create \"CI deploys\" --env test\n  \
         portal activity --status error --action deploy --limit 50\n  \
         portal open '#/metrics?range=30d'"
    ),
)]
struct Cli {
    /// Dashboard API base URL.
    #[arg(long, env = "PORTAL_API_URL", global = true)]
    api_url: Option<String>,

    /// Directory holding the session and preferences.
    #[arg(long, env = "PORTAL_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "PORTAL_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Print the resulting screen as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Answer yes to confirmation prompts.
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and open the last visited view.
    Login {
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted.
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted.
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and forget the stored session.
    Logout,
    /// Show who is signed in.
    Whoami,
    /// Open a view by name (`overview`, `keys`, `metrics`, `activity`) or a
    /// full location such as `#/keys?status=active`. Without an argument,
    /// shows the last visited view.
    Open { location: Option<String> },
    /// Set the analytics range shared by overview and metrics.
    Range {
        #[arg(value_parser = parse_range)]
        range: AnalyticsRange,
    },
    /// List and manage API keys.
    Keys {
        #[command(subcommand)]
        action: Option<KeysCommands>,
    },
    /// Filter the activity feed.
    Activity {
        /// `any`, `success`, `info` or `error`.
        #[arg(long, value_parser = parse_activity_status)]
        status: Option<ActivityStatus>,
        /// Action name to match, e.g. `deploy`.
        #[arg(long)]
        action: Option<String>,
        /// Maximum number of events (1-100).
        #[arg(long)]
        limit: Option<String>,
        /// Clear every filter.
        #[arg(long, conflicts_with_all = ["status", "action", "limit"])]
        reset: bool,
    },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// List keys, optionally narrowing the live filters.
    List {
        /// Match label, id or prefix.
        #[arg(long)]
        query: Option<String>,
        /// `all`, `active` or `revoked`.
        #[arg(long, value_parser = parse_status_filter)]
        status: Option<StatusFilter>,
        /// `all`, `live` or `test`.
        #[arg(long, value_parser = parse_env_filter)]
        env: Option<EnvFilter>,
    },
    /// Create a new key.
    Create {
        label: String,
        #[arg(long, value_parser = parse_environment, default_value = "test")]
        env: Environment,
    },
    /// Issue a new secret for a key.
    Rotate { id: String },
    /// Revoke a key. Asks for confirmation unless `--yes`.
    Revoke { id: String },
    /// Re-activate a revoked key.
    Activate { id: String },
}

// ── Argument parsers ─────────────────────────────────────────────────

fn parse_range(raw: &str) -> Result<AnalyticsRange, String> {
    AnalyticsRange::parse(raw).ok_or_else(|| format!("invalid range '{raw}' (expected 24h, 7d or 30d)"))
}

fn parse_status_filter(raw: &str) -> Result<StatusFilter, String> {
    let status = StatusFilter::parse_or_default(raw);
    if status.as_str() == raw {
        Ok(status)
    } else {
        Err(format!("invalid status '{raw}' (expected all, active or revoked)"))
    }
}

fn parse_env_filter(raw: &str) -> Result<EnvFilter, String> {
    let env = EnvFilter::parse_or_default(raw);
    if env.as_str() == raw {
        Ok(env)
    } else {
        Err(format!("invalid environment '{raw}' (expected all, live or test)"))
    }
}

fn parse_environment(raw: &str) -> Result<Environment, String> {
    Environment::parse(raw).ok_or_else(|| format!("invalid environment '{raw}' (expected live or test)"))
}

fn parse_activity_status(raw: &str) -> Result<ActivityStatus, String> {
    if raw == "any" || raw == "all" {
        return Ok(ActivityStatus::Any);
    }
    let status = ActivityStatus::parse_or_default(raw);
    if status.as_str() == raw {
        Ok(status)
    } else {
        Err(format!("invalid status '{raw}' (expected any, success, info or error)"))
    }
}

/// `keys?status=active` and `/keys` are accepted as well as `#/keys`.
fn to_fragment(location: &str) -> String {
    if location.starts_with('#') {
        location.to_owned()
    } else {
        format!("#/{}", location.trim_start_matches('/'))
    }
}

// ── Terminal input ───────────────────────────────────────────────────

async fn read_line() -> std::io::Result<Option<String>> {
    let mut line = String::new();
    let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok((read > 0).then(|| line.trim_end_matches(['\r', '\n']).to_owned()))
}

async fn read_password(given: Option<String>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    eprint!("Password: ");
    read_line()
        .await
        .context("failed to read password")?
        .context("no password given (use --password or PORTAL_PASSWORD)")
}

/// Asks on the terminal; anything but `y`/`yes` declines.
struct TerminalConfirm;

#[async_trait::async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        eprint!("{YELLOW}{BOLD}?{RESET} {prompt} {DIM}[y/N]{RESET} ");
        match read_line().await {
            Ok(Some(answer)) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

// ── Setup ────────────────────────────────────────────────────────────

fn resolve_config(cli: &Cli) -> ConsoleConfig {
    let mut config = ConsoleConfig::from_env();
    if let Some(url) = &cli.api_url {
        config.api_url = portal_core::config::normalize_api_url(url);
    }
    if let Some(dir) = &cli.state_dir {
        config.state_dir.clone_from(dir);
    }
    if let Some(level) = &cli.log_level {
        config.log_level.clone_from(level);
    }
    config
}

fn init_tracing(log_level: &str, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

struct Output {
    json: bool,
}

impl Output {
    fn screen(&self, console: &Console) {
        if self.json {
            print_json(&screen_json(console));
        } else {
            print_screen(console);
        }
    }
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli);
    init_tracing(&config.log_level, cli.log_json);

    let store = Arc::new(
        FileStore::open(config.state_dir.clone())
            .await
            .with_context(|| format!("failed to open state directory {}", config.state_dir.display()))?,
    );
    let api = Arc::new(HttpApi::from_config(&config).context("failed to build HTTP client")?);

    let location = Preferences::new(store.clone()).location().await.unwrap_or_default();
    debug!(location = %location, api = %config.api_url, "resuming");
    let console = Console::new(api, store, Arc::new(HashRouter::new(location)));
    console.start().await;

    let out = Output { json: cli.json };
    let confirm: Box<dyn Confirm> = if cli.yes {
        Box::new(AutoConfirm(true))
    } else {
        Box::new(TerminalConfirm)
    };

    let result = dispatch(&console, cli.command, &out, confirm.as_ref(), &config).await;
    console.save_location().await;
    result
}

async fn dispatch(
    console: &Console,
    command: Commands,
    out: &Output,
    confirm: &dyn Confirm,
    config: &ConsoleConfig,
) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            let password = read_password(password).await?;
            let session = console.login(&email, &password).await.context("sign-in failed")?;
            if !out.json {
                success(&format!("Signed in as {} ({})", session.email, session.tenant_id));
            }
            out.screen(console);
            Ok(())
        }
        Commands::Register { email, password } => {
            let password = read_password(password).await?;
            let session = console.register(&email, &password).await.context("registration failed")?;
            if !out.json {
                success(&format!("Account created for {} ({})", session.email, session.tenant_id));
            }
            out.screen(console);
            Ok(())
        }
        Commands::Logout => {
            console.logout().await;
            if out.json {
                print_json(&json!({ "auth": render::auth_json(&console.auth_state()) }));
            } else {
                success("Signed out.");
            }
            Ok(())
        }
        Commands::Whoami => {
            cmd_whoami(console, out, config);
            Ok(())
        }
        Commands::Open { location } => {
            match location.as_deref() {
                None => {}
                Some(name) => match View::parse(name) {
                    Some(view) => {
                        console.open(view).await;
                    }
                    None => {
                        console.open_location(&to_fragment(name)).await;
                    }
                },
            }
            out.screen(console);
            Ok(())
        }
        Commands::Range { range } => {
            console.set_range(range).await;
            out.screen(console);
            Ok(())
        }
        Commands::Keys { action } => cmd_keys(console, action, out, confirm).await,
        Commands::Activity {
            status,
            action,
            limit,
            reset,
        } => {
            console.open(View::Activity).await;
            if reset {
                console.reset_activity_filters().await;
            } else if status.is_some() || action.is_some() || limit.is_some() {
                console.edit_activity_draft(|draft| {
                    if let Some(status) = status {
                        draft.status = status;
                    }
                    if let Some(action) = action {
                        draft.action = action;
                    }
                    if let Some(limit) = limit {
                        draft.limit = limit;
                    }
                });
                console.apply_activity_filters().await;
            }
            out.screen(console);
            Ok(())
        }
    }
}

fn cmd_whoami(console: &Console, out: &Output, config: &ConsoleConfig) {
    let auth = console.auth_state();
    if out.json {
        print_json(&json!({
            "auth": render::auth_json(&auth),
            "apiUrl": config.api_url,
            "location": console.router().fragment(),
        }));
        return;
    }

    match auth {
        AuthState::Authenticated(session) => {
            println!();
            header("●", "Session");
            kv_line("Email", &session.email);
            kv_line("Tenant", &session.tenant_id);
            kv_line("API", &config.api_url);
            kv_line("Location", &console.router().fragment());
            println!();
        }
        AuthState::Unauthenticated { notice } => print_signed_out(notice.as_deref()),
        AuthState::Checking => {}
    }
}

async fn cmd_keys(
    console: &Console,
    action: Option<KeysCommands>,
    out: &Output,
    confirm: &dyn Confirm,
) -> Result<()> {
    console.open(View::Keys).await;

    let outcome = match action {
        None => None,
        Some(KeysCommands::List { query, status, env }) => {
            if query.is_some() || status.is_some() || env.is_some() {
                let mut next = console.key_filters();
                if let Some(query) = query {
                    next.query = query;
                }
                if let Some(status) = status {
                    next.status = status;
                }
                if let Some(env) = env {
                    next.env = env;
                }
                console.edit_key_filters(next).await;
            }
            None
        }
        Some(KeysCommands::Create { label, env }) => Some(console.create_key(&label, env).await),
        Some(KeysCommands::Rotate { id }) => Some(console.rotate_key(&id).await),
        Some(KeysCommands::Revoke { id }) => Some(console.revoke_key(&id, confirm).await),
        Some(KeysCommands::Activate { id }) => Some(console.activate_key(&id).await),
    };

    match outcome {
        None | Some(MutationOutcome::Completed) => {
            out.screen(console);
            Ok(())
        }
        Some(MutationOutcome::Cancelled) => {
            if !out.json {
                warning("Revoke cancelled. Nothing was changed.");
            }
            Ok(())
        }
        Some(MutationOutcome::Busy) => bail!("another key action is still in progress"),
        Some(MutationOutcome::Failed) => {
            let error = console.keys().feedback().error;
            bail!(error.unwrap_or_else(|| "key action failed".to_owned()))
        }
        Some(MutationOutcome::LoggedOut) => bail!(SESSION_ENDED_NOTICE),
    }
}
