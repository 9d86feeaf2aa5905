//! mergequeue CLI

mod cli;

use anstream::eprintln;
use clap::{ArgAction, Parser, Subcommand};
use cli::style::{Stylize, cross};
use mergequeue::config::{Config, ConfigOverrides, FileConfig, SECRET_ENV};
use mergequeue::error::{Error, Result};
use mergequeue::queue::default_snapshot_path;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "mergequeue")]
#[command(about = "Serialized merge queue for GitHub pull requests")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/mergequeue/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook service
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, short)]
        port: Option<u16>,

        /// Repository owner
        #[arg(long)]
        owner: Option<String>,

        /// Repository name
        #[arg(long)]
        repo: Option<String>,

        /// Maximum number of pending merge requests
        #[arg(long)]
        capacity: Option<usize>,

        /// Queue snapshot file
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },

    /// Show the queue saved in the snapshot file
    Status {
        /// Queue snapshot file
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },

    /// Print the X-Hub-Signature-256 header value for a request body
    Sign {
        /// File holding the body (`-` for stdin)
        #[arg(value_name = "FILE")]
        body: PathBuf,

        /// Webhook secret (default: MERGEQUEUE_WEBHOOK_SECRET, then the config file)
        #[arg(long)]
        secret: Option<String>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "mergequeue=debug,info",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Read the config file without validating it; used by the offline commands
fn read_file_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => FileConfig::read(path),
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => FileConfig::read(&path),
            None => Ok(FileConfig::default()),
        },
    }
}

fn snapshot_or_default(
    explicit: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<Option<PathBuf>> {
    if explicit.is_some() {
        return Ok(explicit);
    }
    let file = read_file_config(config_path)?;
    Ok(file.snapshot_path.or_else(default_snapshot_path))
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            host,
            port,
            owner,
            repo,
            capacity,
            snapshot,
        } => {
            let overrides = ConfigOverrides {
                repo_owner: owner,
                repo_name: repo,
                host,
                port,
                queue_capacity: capacity,
                snapshot_path: snapshot,
            };
            let mut config = Config::load(config_path, overrides)?;
            if config.snapshot_path.is_none() {
                config.snapshot_path = default_snapshot_path();
            }
            cli::run_serve(config).await
        }
        Commands::Status { snapshot } => {
            let path = snapshot_or_default(snapshot, config_path)?.ok_or_else(|| {
                Error::Config("no snapshot path configured; pass --snapshot".to_string())
            })?;
            cli::run_status(&path)
        }
        Commands::Sign { body, secret } => {
            let secret = match secret.or_else(|| std::env::var(SECRET_ENV).ok()) {
                Some(secret) => secret,
                None => read_file_config(config_path)?
                    .webhook_secret
                    .ok_or_else(|| {
                        Error::Config(format!("no secret given; pass --secret or set {SECRET_ENV}"))
                    })?,
            };
            cli::run_sign(&body, SecretString::from(secret))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", cross(), e.to_string().error());
            ExitCode::FAILURE
        }
    }
}
