//! fanout: command-line front end for the GEO fan-out generator.
//!
//! Serves the web form and JSON API, or runs a single generation from the
//! terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Generate quotable GEO answer blocks for a keyword
#[derive(Parser, Debug)]
#[command(name = "fanout", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads `.fanout/config.toml` from here)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the web form and JSON API
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one generation and print the result envelope as JSON
    Generate {
        /// Target keyword
        #[arg(short, long)]
        keyword: String,
        /// Source content to rewrite
        #[arg(long)]
        content: Option<String>,
        /// Text file appended to the content
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Plan and retrieve even when content is present
        #[arg(long)]
        fan_out: bool,
    },
    /// Validate a saved result document without calling a model
    Check {
        /// JSON file holding `main_keyword`, `analysis_summary` and `blocks`
        file: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default `.fanout/config.toml` into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

/// Global options threaded through every subcommand.
#[derive(Debug, Clone, Default)]
struct Options {
    workspace: PathBuf,
    config_file: Option<PathBuf>,
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer, one file per day
    let log_dir = directories::ProjectDirs::from("dev", "fanout", "fanout")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "fanout.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let options = Options {
        workspace,
        config_file: cli.config,
        model: cli.model,
    };
    commands::handle_command(cli.command, &options).await
}
