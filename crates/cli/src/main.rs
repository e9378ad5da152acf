mod config;
mod session;
mod upload;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tether", about = "Session-aware HTTP client for cookie-authenticated APIs")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config,

    /// Fetch the server's runtime configuration
    Check,

    /// Log in and keep the session alive until it expires
    Session {
        #[arg(long)]
        email: String,

        #[arg(long, env = "TETHER_PASSWORD")]
        password: String,

        /// Stop after this many account fetches
        #[arg(long)]
        polls: Option<u32>,
    },

    /// Log in and upload a file as multipart form data
    Upload {
        #[arg(long)]
        email: String,

        #[arg(long, env = "TETHER_PASSWORD")]
        password: String,

        /// Path to the file
        file: PathBuf,

        /// Endpoint path under the API prefix
        #[arg(long, default_value = "/uploads")]
        path: String,

        /// Extra form field, as key=value (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = config::resolve_path(cli.config)?;
    match cli.command {
        Commands::Config => config::show_config(&path),
        Commands::Check => session::run_check(config::load(&path)?).await,
        Commands::Session {
            email,
            password,
            polls,
        } => session::run_session(config::load(&path)?, email, password, polls).await,
        Commands::Upload {
            email,
            password,
            file,
            path: endpoint,
            fields,
        } => {
            let client_config = config::load(&path)?;
            upload::run_upload(client_config, email, password, &endpoint, &file, &fields).await
        }
    }
}
