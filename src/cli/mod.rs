pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file, defaults to the platform config directory
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web UI and API
    Serve {
        /// Address to bind, overrides the configuration
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides the configuration
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one scrape in the foreground and print its log and statistics
    Scrape {
        /// Company identifiers, comma separated or repeated
        #[arg(short = 'C', long = "company", required = true, value_delimiter = ',')]
        companies: Vec<String>,

        /// Keywords, comma separated or repeated
        #[arg(short, long = "keyword", required = true)]
        keywords: Vec<String>,

        /// Login email
        #[arg(long, env = "SCRAPER_EMAIL")]
        email: String,

        /// Login password
        #[arg(long, env = "SCRAPER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Manage API keys
    Keys {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Create a new API key and print it
    Create {
        #[arg(short, long, default_value = "API Key")]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List keys, masked
    List,

    /// Delete a key
    Delete {
        #[arg(required = true)]
        key: String,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { host, port } => {
            info!("Starting web server");
            commands::serve(config_path, host, port).await
        }
        Commands::Scrape { companies, keywords, email, password } => {
            info!("Starting foreground scrape of {} companies", companies.len());
            commands::scrape(config_path, companies, keywords, email, password).await
        }
        Commands::Keys { action } => match action {
            KeyAction::Create { name, description } => commands::create_key(config_path, name, description).await,
            KeyAction::List => commands::list_keys(config_path).await,
            KeyAction::Delete { key } => commands::delete_key(config_path, key).await,
        },
        Commands::Config { init } => {
            if init {
                info!("Writing default configuration");
                commands::init_config(config_path).await
            } else {
                commands::show_config(config_path).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn scrape_arguments_split_on_commas() {
        let cli = Cli::try_parse_from([
            "people-scraper",
            "scrape",
            "-C",
            "acme,globex",
            "-k",
            "engineer,manager",
            "--email",
            "me@example.com",
            "--password",
            "pw",
        ])
        .unwrap();

        match cli.command {
            Commands::Scrape { companies, keywords, .. } => {
                assert_eq!(companies, ["acme", "globex"]);
                // keywords are split later, with the rest of request normalization
                assert_eq!(keywords, ["engineer,manager"]);
            }
            _ => panic!("expected scrape"),
        }
    }
}
