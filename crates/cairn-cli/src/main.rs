mod cmd_config;
mod cmd_export;
mod cmd_flush;
mod cmd_ingest;
mod cmd_init;
mod cmd_status;
mod cmd_sync;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cairn", version, about = "Git-backed thought history for autonomous agents")]
struct Cli {
    /// Thought-history repository (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,
    /// JSON config file to use instead of the repository's config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or reopen) a thought-history repository
    Init,
    /// Read thought records as JSON lines and add them to the history
    Ingest {
        /// JSONL file (reads stdin when omitted or `-`)
        file: Option<PathBuf>,
        /// Drain afterwards: force a final flush and push
        #[arg(long)]
        shutdown: bool,
        /// Print commit reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Commit buffered thoughts if they are due
    Flush {
        /// Ignore the commit interval (the daily quota still applies)
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Drain buffered thoughts and push to the remote, if any
    Shutdown {
        #[arg(long)]
        json: bool,
    },
    /// Show repository status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Export the repository as a JSON snapshot or a zip archive
    Export {
        /// json or zip
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Push all branches and tags to the configured remote
    Push,
    /// Pull from the configured remote
    Pull,
    /// Read or edit the repository's config.json
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cairn=info")))
        .init();

    let cli = Cli::parse();
    let repo_root = match cli.repo {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let config_path = cli.config.as_deref();

    match cli.cmd {
        Command::Init => cmd_init::execute(&repo_root, config_path),
        Command::Ingest {
            file,
            shutdown,
            json,
        } => cmd_ingest::execute(&repo_root, config_path, file.as_deref(), shutdown, json),
        Command::Flush { force, json } => cmd_flush::flush(&repo_root, config_path, force, json),
        Command::Shutdown { json } => cmd_flush::shutdown(&repo_root, config_path, json),
        Command::Status { json } => cmd_status::execute(&repo_root, config_path, json),
        Command::Export { format } => cmd_export::execute(&repo_root, config_path, &format),
        Command::Push => cmd_sync::push(&repo_root, config_path),
        Command::Pull => cmd_sync::pull(&repo_root, config_path),
        Command::Config { cmd } => cmd_config::run(cmd, &repo_root),
    }
}
