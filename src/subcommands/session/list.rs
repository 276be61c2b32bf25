//! `sessions` subcommand.

use crate::{
    constants::{EMPTY_CIRCLE, FILLED_CIRCLE},
    ctx::IntegrateContext,
};
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `sessions` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct SessionsCmd;

impl SessionsCmd {
    /// Run the `sessions` subcommand.
    pub fn run(self, ctx: IntegrateContext) -> Result<()> {
        let checked_out = ctx.current_branch()?;
        if let Some(pointer) = ctx.pointer()? {
            println!(
                "Merged upstream revision: {} (advanced {})",
                Color::Purple.paint(&pointer.commit_id),
                pointer.advanced_at.format("%Y-%m-%d %H:%M UTC")
            );
        }

        let mut any = false;
        for record in ctx.registry().records() {
            any = true;
            let session = &record.session;
            let icon = if session.branch_name == checked_out {
                FILLED_CIRCLE
            } else {
                EMPTY_CIRCLE
            };
            let state = if record.active {
                Color::Green.paint("active")
            } else {
                Color::DarkGray.paint("closed")
            };
            println!(
                "{} {} [{}] thread `{}`, started {}",
                icon,
                Color::Blue.paint(&session.branch_name),
                state,
                session.thread_ref,
                session.created_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        if !any {
            println!("No integration sessions recorded. Start one with `integrate start`.");
        }
        Ok(())
    }
}
