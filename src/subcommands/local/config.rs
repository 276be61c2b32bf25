//! `config` subcommand.

use crate::config::IntegrateConfig;
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color;
use std::path::Path;

/// CLI arguments for the `config` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct ConfigCmd;

impl ConfigCmd {
    /// Run the `config` subcommand.
    pub fn run(self, path: &Path, config: &IntegrateConfig) -> Result<()> {
        println!("{}", toml::to_string_pretty(config)?);

        match config.validate(path) {
            Ok(()) => println!(
                "Configuration successfully initialized at: {}",
                Color::Blue.paint(path.display().to_string())
            ),
            Err(e) => println!("{}", Color::Yellow.paint(e.to_string())),
        }
        Ok(())
    }
}
