mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storyloom_core::Config;

#[derive(Parser)]
#[command(name = "storyloom")]
#[command(about = "Routing and orchestration core for a fiction-writing assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (YAML); defaults apply when absent
    #[arg(short, long, global = true, default_value = "storyloom.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive loop: each stdin line is routed, stream events print
    /// as JSON lines
    Chat {
        /// Session ID
        #[arg(short, long, default_value = "cli:default")]
        session: String,
    },

    /// Route a single message and exit
    Route {
        /// Message text
        message: String,

        /// Session ID
        #[arg(short, long, default_value = "cli:route")]
        session: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(config.log.level.clone())
    };

    // Logs go to stderr so stdout stays a clean JSON event stream
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Chat { session } => {
            commands::chat::run(&config, &session).await?;
        }
        Commands::Route { message, session } => {
            commands::route::run(&config, &session, &message).await?;
        }
    }

    Ok(())
}
