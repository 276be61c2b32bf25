//! The subcommands for the `integrate` application.

use crate::{config::IntegrateConfig, ctx::IntegrateContext};
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

mod local;
use local::ConfigCmd;

mod review;
use review::StatusCmd;

mod session;
use session::{CloseCmd, SessionsCmd, StartCmd};

#[derive(Debug, Clone, Eq, PartialEq, Subcommand)]
pub enum Subcommands {
    /// Start a new integration session on a fresh branch off the updated trunk.
    #[clap(alias = "integerate")]
    Start(StartCmd),
    /// Review the unmerged upstream commits of a session and act on them.
    #[clap(alias = "st")]
    Status(StatusCmd),
    /// List the recorded integration sessions.
    #[clap(aliases = ["ls", "list"])]
    Sessions(SessionsCmd),
    /// Mark a session inactive, e.g. once its pull request has landed.
    Close(CloseCmd),
    /// Print and validate the configuration.
    Config(ConfigCmd),
}

impl Subcommands {
    /// Run the subcommand with the loaded configuration.
    pub async fn run(
        self,
        config_path: PathBuf,
        config: IntegrateConfig,
        operator: String,
    ) -> Result<()> {
        match self {
            Self::Start(args) => args.run(load_context(&config_path, config)?, &operator),
            Self::Status(args) => {
                args.run(load_context(&config_path, config)?, &operator)
                    .await
            }
            Self::Sessions(args) => args.run(load_context(&config_path, config)?),
            Self::Close(args) => args.run(load_context(&config_path, config)?, &operator),
            Self::Config(args) => args.run(&config_path, &config),
        }
    }
}

/// Validates `config` and opens the downstream checkout it names.
fn load_context(config_path: &Path, config: IntegrateConfig) -> Result<IntegrateContext> {
    config.validate(config_path)?;
    Ok(IntegrateContext::load(config)?)
}

/// Selects the conversation thread a command applies to.
#[derive(Debug, Clone, Default, Eq, PartialEq, Args)]
pub struct ThreadArgs {
    /// The session's thread. Defaults to the checked out branch, the thread of a session started
    /// without `--thread`.
    #[arg(long, env = "INTEGRATE_THREAD")]
    pub thread: Option<String>,
}

impl ThreadArgs {
    /// Resolves the thread reference, falling back to the checked out branch.
    pub fn resolve(&self, ctx: &IntegrateContext) -> Result<String> {
        match &self.thread {
            Some(thread) => Ok(thread.clone()),
            None => Ok(ctx.current_branch()?),
        }
    }
}
