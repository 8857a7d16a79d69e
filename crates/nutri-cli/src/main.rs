mod chat_cmd;
mod config;
mod plan_cmd;
mod serve_cmd;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use config::NutriConfig;

#[derive(Parser)]
#[command(name = "nutri", about = "Condition-aware diet routing and nutrition plan assembly")]
struct Cli {
    /// Base URL for every stage service (overrides NUTRI_A1_URL..NUTRI_A5_URL)
    #[arg(long, global = true)]
    stage_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a nutri config file with every default spelled out
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show which specialist a message routes to
    Classify {
        /// Free-text message
        text: String,
        /// List every matching specialist in precedence order
        #[arg(long)]
        all: bool,
    },
    /// Send a message to the routed specialist and print the reply
    Chat {
        /// Free-text message
        text: String,
        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assemble a nutrition plan for a profile JSON file
    Plan {
        /// Path to the profile JSON file
        file: PathBuf,
        /// Run stages 1-4 concurrently
        #[arg(long)]
        concurrent: bool,
    },
    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Execute the `nutri init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let path = config::save_config(&config::ConfigFile::defaults())?;

    println!("Config written to {}", path.display());
    println!();
    println!("Edit [stages] and [specialists.*] to point at your services.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Classify { text, all } => {
            chat_cmd::run_classify(&text, all)?;
        }
        Commands::Chat { text, json } => {
            let resolved = NutriConfig::resolve(cli.stage_url.as_deref())?;
            chat_cmd::run_chat(&resolved.settings, &text, json).await?;
        }
        Commands::Plan { file, concurrent } => {
            let resolved = NutriConfig::resolve(cli.stage_url.as_deref())?;
            plan_cmd::run_plan(&resolved.settings, &file, concurrent).await?;
        }
        Commands::Serve { bind, port } => {
            let resolved = NutriConfig::resolve(cli.stage_url.as_deref())?;
            serve_cmd::run_serve(&resolved.settings, &bind, port).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "nutri", &mut std::io::stdout());
        }
    }

    Ok(())
}
