//! `start` subcommand.

use crate::ctx::IntegrateContext;
use anyhow::Result;
use chrono::Local;
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `start` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct StartCmd {
    /// Thread to bind the new session to. Defaults to the new branch's name.
    #[arg(long, env = "INTEGRATE_THREAD")]
    pub thread: Option<String>,
}

impl StartCmd {
    /// Run the `start` subcommand.
    pub fn run(self, mut ctx: IntegrateContext, operator: &str) -> Result<()> {
        ctx.config.check_role(operator)?;

        println!("Starting integrate...");
        let session = match ctx.start_session(self.thread.as_deref()) {
            Ok(session) => session,
            Err(e) => {
                eprintln!(
                    "{} {}",
                    Color::Red.bold().paint("There was an error while starting the integrate:"),
                    e
                );
                return Ok(());
            }
        };

        println!("Date: {}", Local::now().date_naive());
        println!("Author: {}", Color::Blue.paint(operator));
        println!(
            "Integrate started on branch `{}` (thread `{}`).",
            Color::Green.paint(&session.branch_name),
            Color::Blue.paint(&session.thread_ref)
        );
        println!(
            "Create a PR for this integrate: {}",
            Color::Cyan.italic().paint(format!(
                "{}/pull/new/{}",
                ctx.config.downstream_url.trim_end_matches('/'),
                session.branch_name
            ))
        );
        Ok(())
    }
}
