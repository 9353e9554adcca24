//! CLI module for anchored-templates.
//!
//! Subcommands:
//! - `replicate`: Create an element from a template held in a JSON fixture
//! - `config`: Print the effective configuration

mod config;
mod replicate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

pub use replicate::ReplicateCommand;

/// Anchored Templates - replicate anchored metadata graphs from templates
#[derive(Parser)]
#[command(name = "anchored-templates")]
#[command(about = "Create metadata elements by replicating anchored templates")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file to use instead of the user and project files
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an element from a template in a repository fixture
    Replicate(ReplicateCommand),

    /// Print the effective configuration as JSON
    Config,
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> color_eyre::Result<()> {
        let config = self.load_config()?;
        match self.command {
            Command::Replicate(cmd) => cmd.run(config).await,
            Command::Config => config::run_config(&config),
        }
    }

    fn load_config(&self) -> color_eyre::Result<Config> {
        let config = match &self.config {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading configuration file");
                Config::load_from(path)?
            }
            None => Config::load()?,
        };
        Ok(config)
    }
}
