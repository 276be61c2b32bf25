//! The CLI for `integrate`.

use crate::{config::IntegrateConfig, subcommands::Subcommands};
use anyhow::{anyhow, Result};
use clap::{
    builder::styling::{AnsiColor, Color, Style},
    ArgAction, Parser,
};
use std::path::PathBuf;
use tracing::Level;

const ABOUT: &str =
    "integrate steps an operator through merging upstream revisions into a downstream repository.";

/// The CLI application for `integrate`.
#[derive(Parser, Debug, Clone, Eq, PartialEq)]
#[command(about = ABOUT, version, styles = cli_styles())]
pub struct Cli {
    /// Verbosity level (0-4)
    #[arg(short, action = ArgAction::Count, global = true)]
    pub v: u8,
    /// Path to the configuration file. Defaults to `$HOME/.integrate.toml`.
    #[arg(long, env = "INTEGRATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,
    /// The operator issuing the command. Defaults to `$USER`.
    #[arg(long, env = "INTEGRATE_OPERATOR", global = true)]
    pub operator: Option<String>,
    /// The subcommand to run
    #[clap(subcommand)]
    pub subcommand: Subcommands,
}

impl Cli {
    /// Run the CLI application with the given arguments.
    pub async fn run(self) -> Result<()> {
        let cli = self.init_tracing_subscriber()?;

        let config_path = cli.config.clone().unwrap_or_else(IntegrateConfig::default_path);
        let config = IntegrateConfig::load_or_initialize(&config_path)?;
        let operator = cli
            .operator
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .ok_or_else(|| anyhow!("Could not determine the operator. Pass `--operator`."))?;

        cli.subcommand.run(config_path, config, operator).await
    }

    /// Initializes the tracing subscriber
    ///
    /// # Returns
    /// - `Result<()>` - Ok if successful, Err otherwise.
    pub(crate) fn init_tracing_subscriber(self) -> Result<Self> {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match self.v {
                0 => Level::ERROR,
                1 => Level::WARN,
                2 => Level::INFO,
                3 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))?;

        Ok(self)
    }
}

/// Styles for the CLI application.
const fn cli_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}

#[cfg(test)]
mod test {
    use super::Cli;
    use crate::subcommands::Subcommands;
    use clap::Parser;

    #[test]
    fn parses_legacy_alias_and_globals() {
        let cli = Cli::try_parse_from(["integrate", "integerate", "-vv", "--operator", "alice"])
            .unwrap();
        assert_eq!(cli.v, 2);
        assert_eq!(cli.operator.as_deref(), Some("alice"));
        assert!(matches!(cli.subcommand, Subcommands::Start(_)));
    }

    #[test]
    fn parses_status_thread() {
        let cli = Cli::try_parse_from(["integrate", "status", "--thread", "t1"]).unwrap();
        let Subcommands::Status(status) = cli.subcommand else {
            panic!("expected status");
        };
        assert_eq!(status.thread.thread.as_deref(), Some("t1"));
    }
}
