//! Grove command-line tool.
//!
//! Packages are nested git repositories pinned to specific revisions; the
//! manifest (`Grovefile`) records what is installed. Every subcommand except
//! `pull` is a straight-line sequence of VCS calls; `pull` runs the
//! reconciliation engine.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Package manager over nested, revision-pinned git repositories.
#[derive(Parser, Debug)]
#[command(name = "grove", version, about)]
struct Cli {
    /// Working tree of the top-level repository.
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new, empty grove repository.
    Init,

    /// Clone an existing grove repository, packages included.
    Clone {
        /// Repository URL.
        url: String,

        /// Destination directory (defaults to the repository name).
        dest: Option<PathBuf>,
    },

    /// Install a package from a repository URL.
    Install {
        /// Package repository URL.
        url: String,

        /// Working-tree path for the package (defaults to the repo name).
        #[arg(short, long)]
        path: Option<String>,

        /// Branch to track (omit to pin a detached revision).
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Remove an installed package.
    Remove {
        /// Package name.
        name: String,
    },

    /// Record the current state of every package into the manifest.
    Checkpoint,

    /// Push the current branch and checkpoint markers to the remote.
    Push,

    /// Fetch the remote state and reconcile it with local state.
    Pull,

    /// List installed packages.
    Status {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Init => commands::init(&cli.dir).await?,
        Commands::Clone { url, dest } => commands::clone(&url, dest.as_deref()).await?,
        Commands::Install { url, path, branch } => {
            commands::install(&cli.dir, &url, path.as_deref(), branch.as_deref()).await?
        }
        Commands::Remove { name } => commands::remove(&cli.dir, &name).await?,
        Commands::Checkpoint => commands::checkpoint(&cli.dir).await?,
        Commands::Push => commands::push(&cli.dir).await?,
        Commands::Pull => {
            let clean = commands::pull(&cli.dir).await?;
            if !clean {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Status { json } => commands::status(&cli.dir, json).await?,
    }
    Ok(ExitCode::SUCCESS)
}
