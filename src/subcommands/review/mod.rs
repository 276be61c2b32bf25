//! `status` subcommand: the interactive review pager.

use crate::{
    build::{BuildResult, ProgressReporter},
    constants::LOG_VIEW_LIMIT,
    ctx::{ActionOutcome, DeliveredReport, IntegrateContext},
    review::{render_page, truncate_tail, Action, Direction, ReviewSession},
    subcommands::ThreadArgs,
};
use anyhow::Result;
use clap::Args;
use inquire::Select;
use nu_ansi_term::Color;
use std::fmt::Display;

/// CLI arguments for the `status` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct StatusCmd {
    #[command(flatten)]
    pub thread: ThreadArgs,
}

impl StatusCmd {
    /// Run the `status` subcommand.
    pub async fn run(self, ctx: IntegrateContext, operator: &str) -> Result<()> {
        ctx.config.check_role(operator)?;
        let thread = self.thread.resolve(&ctx)?;

        println!("Fetching upstream commits...");
        let review = ctx.open_review(operator, &thread)?;

        while review.is_open() {
            let mut buf = String::new();
            render_page(&mut buf, &review.page(), &ctx.config.upstream_url)?;
            println!("\n{buf}");

            let choice = Select::new("", PagerChoice::available(&review)).prompt()?;
            let action = match choice {
                PagerChoice::Move(direction) => {
                    review.navigate(operator, direction)?;
                    continue;
                }
                PagerChoice::Quit => return Ok(()),
                PagerChoice::Fire(action) => action,
            };

            let mut reporter = TerminalReporter::new(ctx.config.progress_interval_secs);
            match action {
                Action::AdvanceTo => println!("{}", Color::Yellow.paint("Advancing...")),
                Action::Build => reporter.header(),
                Action::Push { .. } => println!("{}", Color::Yellow.paint("Pushing to GitHub...")),
            }

            // Failures are reported to the operator, never propagated.
            match ctx
                .dispatch_action(&review, operator, action, &mut reporter)
                .await
            {
                Ok(outcome) => report_outcome(&outcome),
                Err(e) => eprintln!("{} {}", Color::Red.bold().paint("Error:"), e),
            }
        }
        Ok(())
    }
}

/// The entries of the pager prompt.
#[derive(Debug, Clone, Copy)]
enum PagerChoice {
    Move(Direction),
    Fire(Action),
    Quit,
}

impl PagerChoice {
    fn available(review: &ReviewSession) -> Vec<Self> {
        let page = review.page();
        let mut choices = Vec::new();
        if page.index + 1 < page.total {
            choices.push(Self::Move(Direction::Next));
        }
        if page.index > 0 {
            choices.push(Self::Move(Direction::Previous));
        }
        if page.total > 2 {
            choices.extend([Self::Move(Direction::First), Self::Move(Direction::Last)]);
        }
        if page.commit.is_some() {
            choices.push(Self::Fire(Action::AdvanceTo));
        }
        choices.extend([
            Self::Fire(Action::Build),
            Self::Fire(Action::Push { force: false }),
            Self::Fire(Action::Push { force: true }),
            Self::Quit,
        ]);
        choices
    }
}

impl Display for PagerChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Move(Direction::Next) => "Next commit",
            Self::Move(Direction::Previous) => "Previous commit",
            Self::Move(Direction::First) => "Oldest commit",
            Self::Move(Direction::Last) => "Newest commit",
            Self::Fire(Action::AdvanceTo) => "Advance to this commit",
            Self::Fire(Action::Build) => "Build and test",
            Self::Fire(Action::Push { force: false }) => "Push to GitHub",
            Self::Fire(Action::Push { force: true }) => "Force push to GitHub",
            Self::Quit => "Quit",
        };
        write!(f, "{}", label)
    }
}

/// Prints the tail of the build log each time a snapshot is published.
struct TerminalReporter {
    interval_secs: u64,
}

impl TerminalReporter {
    fn new(interval_secs: u64) -> Self {
        Self { interval_secs }
    }

    fn header(&self) {
        println!(
            "{}",
            Color::Yellow.paint(format!(
                "Building and testing... (streamed every {} seconds)",
                self.interval_secs
            ))
        );
    }
}

impl ProgressReporter for TerminalReporter {
    fn publish(&mut self, output: &str) -> anyhow::Result<()> {
        let (tail, truncated) = truncate_tail(output, LOG_VIEW_LIMIT);
        let title = if truncated {
            "Building and testing... (truncated)"
        } else {
            "Building and testing..."
        };
        println!("{}\n{}", Color::Yellow.bold().paint(title), tail);
        Ok(())
    }
}

fn report_outcome(outcome: &ActionOutcome) {
    match outcome {
        ActionOutcome::Advanced(pointer) => println!(
            "{} `{}`",
            Color::Green.paint("Advanced successfully to commit"),
            Color::Purple.paint(&pointer.commit_id)
        ),
        ActionOutcome::Pushed { branch, force } => println!(
            "{} `{}`{}",
            Color::Green.paint("Pushed to GitHub successfully:"),
            Color::Blue.paint(branch),
            if *force { " (forced)" } else { "" }
        ),
        ActionOutcome::Built { result, report } => report_build(result, report.as_ref()),
    }
}

fn report_build(result: &BuildResult, report: Option<&DeliveredReport>) {
    let (tail, truncated) = truncate_tail(&result.output, LOG_VIEW_LIMIT);
    let elapsed = result.finished_at - result.started_at;
    let title = if result.succeeded() {
        Color::Green.bold().paint("Build and test successful")
    } else {
        Color::Red.bold().paint("Build and test failed")
    };
    println!(
        "{}{} after {}s\n{}",
        title,
        if truncated { " (truncated)" } else { "" },
        elapsed.num_seconds(),
        tail
    );

    match report {
        Some(DeliveredReport::Inline(text)) => {
            println!("{}\n{}", Color::Red.bold().paint("Summarized errors"), text)
        }
        Some(DeliveredReport::Attachment(path)) => println!(
            "{} written to {}",
            Color::Red.bold().paint("Summarized errors"),
            Color::Cyan.paint(path.display().to_string())
        ),
        None => {}
    }
}
