//! Threadline CLI: the main entry point.
//!
//! Commands:
//! - `serve`   : Start the HTTP gateway
//! - `chat`    : Interactive chat or single-message mode
//! - `history` : Print a session's stored transcript
//! - `sessions`: List sessions in a memory mode
//! - `forget`  : Delete a session

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "threadline",
    about = "Threadline: session-aware chat backend with gated tool use",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.threadline/config.toml)
    #[arg(short, long, global = true, env = "THREADLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Session to continue (a fresh one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Memory mode: temporary or persistent
        #[arg(long)]
        mode: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the stored history of a session
    History {
        #[arg(short, long)]
        session: String,

        #[arg(long)]
        mode: Option<String>,

        /// Print raw JSON instead of a transcript
        #[arg(long)]
        json: bool,
    },

    /// List sessions in a memory mode
    Sessions {
        #[arg(long)]
        mode: Option<String>,
    },

    /// Delete a session and its history
    Forget {
        #[arg(short, long)]
        session: String,

        #[arg(long)]
        mode: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat {
            session,
            mode,
            message,
        } => commands::chat::run(config_path, session, mode, message).await?,
        Commands::History {
            session,
            mode,
            json,
        } => commands::history::run(config_path, &session, mode.as_deref(), json).await?,
        Commands::Sessions { mode } => {
            commands::history::list(config_path, mode.as_deref()).await?
        }
        Commands::Forget { session, mode } => {
            commands::forget::run(config_path, &session, mode.as_deref()).await?
        }
    }

    Ok(())
}
