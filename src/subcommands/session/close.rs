//! `close` subcommand.

use crate::{ctx::IntegrateContext, subcommands::ThreadArgs};
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color::Blue;

/// CLI arguments for the `close` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct CloseCmd {
    #[command(flatten)]
    pub thread: ThreadArgs,
}

impl CloseCmd {
    /// Run the `close` subcommand.
    pub fn run(self, mut ctx: IntegrateContext, operator: &str) -> Result<()> {
        ctx.config.check_role(operator)?;
        let thread = self.thread.resolve(&ctx)?;

        let confirm = inquire::Confirm::new(
            format!("Close the session bound to thread `{}`?", Blue.paint(&thread)).as_str(),
        )
        .with_default(false)
        .prompt()?;
        if !confirm {
            return Ok(());
        }

        let session = ctx.close_session(&thread)?;
        println!(
            "Closed session on branch `{}`.",
            Blue.paint(session.branch_name)
        );
        Ok(())
    }
}
