//! Swarmcast CLI - drive a remote download engine from the terminal
//!
//! Submits magnet links and URLs to an aria2-compatible engine, follows
//! them with live progress and builds magnet links for local files.

mod commands;
mod config;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Swarmcast - remote download orchestration
#[derive(Parser)]
#[command(name = "swarmcast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (JSON)
    #[arg(long, env = "SWARMCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Engine JSON-RPC endpoint
    #[arg(long, env = "SWARMCAST_RPC_URL")]
    rpc_url: Option<String>,

    /// Engine RPC secret
    #[arg(long, env = "SWARMCAST_RPC_SECRET", hide_env_values = true)]
    rpc_secret: Option<String>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a magnet link or URL to the engine
    Add {
        /// Magnet link or URL
        uri: String,

        /// Download directory on the engine host
        #[arg(short, long)]
        dir: Option<String>,

        /// Extra engine option as key=value (repeatable)
        #[arg(short = 'O', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Follow the download until it finishes
        #[arg(short, long)]
        wait: bool,
    },

    /// List downloads the engine is working on
    List,

    /// Show engine status of one download
    Status {
        /// Engine GID
        gid: String,
    },

    /// Remove a download from the engine
    Cancel {
        /// Engine GID
        gid: String,
    },

    /// Engine information
    Engine {
        #[command(subcommand)]
        action: EngineAction,
    },

    /// Build a magnet link for a local file
    Magnet {
        /// File path the content id is derived from
        path: PathBuf,

        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Base URL serving the file as a web seed
        #[arg(long)]
        web_seed: Option<String>,
    },

    /// Show/update settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum EngineAction {
    /// Check the connection and print the engine version
    Version,

    /// Global transfer statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key
        key: String,

        /// Config value
        value: String,
    },

    /// Show all config
    Show,

    /// Print the config file location
    Path,

    /// Reset to defaults
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config_path = cli.config.unwrap_or_else(config::default_path);

    // Config edits and completions never need a loaded config
    match cli.command {
        Commands::Config { action } => {
            return commands::config_action(&config_path, action, cli.output);
        }
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "swarmcast", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let mut settings = config::load(&config_path)?;
    config::apply_overrides(&mut settings, cli.rpc_url, cli.rpc_secret);

    match cli.command {
        Commands::Add {
            uri,
            dir,
            options,
            wait,
        } => commands::add_download(settings, &uri, dir, options, wait, cli.output).await?,

        Commands::List => commands::list_downloads(settings, cli.output).await?,

        Commands::Status { gid } => commands::show_status(settings, &gid, cli.output).await?,

        Commands::Cancel { gid } => commands::cancel_download(settings, &gid, cli.output).await?,

        Commands::Engine { action } => commands::engine_action(settings, action, cli.output).await?,

        Commands::Magnet {
            path,
            name,
            web_seed,
        } => commands::build_magnet(&path, name, web_seed, cli.output)?,

        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
