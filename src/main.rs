use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use taskdeck::transport::HttpTransport;
use taskdeck::{Engine, EngineConfig};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "taskdeck")]
#[command(version, about = "CLI client for a GitHub-backed collaborative task tracker")]
pub struct Cli {
    /// API base URL (overrides the config file and TASKDECK_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open the provider authorization page in the browser
    Login,
    /// Complete an OAuth redirect with its query parameters
    Callback {
        /// One-time authorization code from the redirect
        code: Option<String>,

        /// Provider error, if the redirect carried one instead of a code
        #[arg(long)]
        error: Option<String>,

        #[arg(long)]
        error_description: Option<String>,
    },
    /// Show the authenticated identity
    Whoami,
    /// Terminate the server session and reset local state
    Logout,
    /// List all tasks
    Tasks,
    /// Show one task in detail
    Task { id: i64 },
    /// Create a task
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        assignee: String,

        #[arg(long)]
        description: Option<String>,

        /// May be given multiple times
        #[arg(long = "watcher")]
        watchers: Vec<String>,

        /// May be given multiple times
        #[arg(long = "reviewer")]
        reviewers: Vec<String>,
    },
    /// Move a task to a new status (validated against the status machine)
    Move { id: i64, status: String },
    /// Assign the identity responsible for a task's branch
    AssignBranch { id: i64, login: String },
    /// Show the statistics snapshot
    Stats,
    /// Upload an attachment and print its reference URL
    Upload { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = EngineConfig::load()?;
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }

    let transport = Arc::new(HttpTransport::new(
        &config.api_base_url,
        config.request_timeout,
    )?);
    cmd::restore_session(&transport);
    let engine = Engine::with_transport(config, transport.clone());

    match cli.command {
        Commands::Login => cmd::cmd_login(&engine),
        Commands::Callback {
            code,
            error,
            error_description,
        } => cmd::cmd_callback(&engine, &transport, code, error, error_description).await,
        Commands::Whoami => cmd::cmd_whoami(&engine).await,
        Commands::Logout => cmd::cmd_logout(&engine).await,
        Commands::Tasks => cmd::cmd_tasks(&engine).await,
        Commands::Task { id } => cmd::cmd_task(&engine, id).await,
        Commands::Create {
            title,
            assignee,
            description,
            watchers,
            reviewers,
        } => cmd::cmd_create(&engine, title, assignee, description, watchers, reviewers).await,
        Commands::Move { id, status } => cmd::cmd_move(&engine, id, &status).await,
        Commands::AssignBranch { id, login } => {
            cmd::cmd_assign_branch(&engine, id, &login).await
        }
        Commands::Stats => cmd::cmd_stats(&engine).await,
        Commands::Upload { file } => cmd::cmd_upload(&engine, &file).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "taskdeck=debug"
    } else {
        "taskdeck=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
