//! Error types for the `integrate` application.

use nu_ansi_term::Color;
use thiserror::Error;

/// Errors that can occur while orchestrating an integration session.
#[derive(Error, Debug)]
pub enum IntegrateError {
    /// An external tool (revision tool, `git`, build pipeline) exited unsuccessfully.
    #[error("`{}` failed with exit code {}: {}", Color::Blue.paint(.tool), display_code(.code), .output)]
    ExternalTool {
        tool: String,
        code: Option<i32>,
        output: String,
    },
    /// Starting a new integration session failed.
    #[error("Failed to start integration session while {step}: {reason}")]
    SessionStart { step: &'static str, reason: String },
    /// The revision tool refused to move the pointer.
    #[error("Revision tool rejected advancing to `{}`.", Color::Blue.paint(.0))]
    AdvanceRejected(String),
    /// The advance target is not part of the last fetched backlog.
    #[error("Commit `{}` is not in the current backlog. Refresh the backlog first.", Color::Blue.paint(.0))]
    NotInBacklog(String),
    /// No active session is bound to the thread.
    #[error("No integration session bound to thread `{}`. Start one first or use the session's thread.", Color::Blue.paint(.0))]
    SessionNotFound(String),
    /// The session's branch is no longer the one checked out downstream.
    #[error("Session branch is `{}` but the checked out branch is `{}`. Start a new session or use the correct thread.", Color::Blue.paint(.bound), Color::Blue.paint(.checked_out))]
    StaleSession { bound: String, checked_out: String },
    /// A branch is already bound to an active session.
    #[error("Branch `{}` already belongs to an active session.", Color::Blue.paint(.0))]
    BranchAlreadyActive(String),
    /// A thread is already bound to another active session.
    #[error("Thread `{}` is already bound to active branch `{}`.", Color::Blue.paint(.thread), Color::Blue.paint(.branch))]
    ThreadAlreadyBound { thread: String, branch: String },
    /// The review has already dispatched its action or was closed.
    #[error("This review is closed. Run `integrate status` again.")]
    ReviewClosed,
    /// The review has been idle for too long.
    #[error("This review timed out. Run `integrate status` again.")]
    ReviewExpired,
    /// An action is already running for this review.
    #[error("An action is already in flight for this review.")]
    ActionInFlight,
    /// Someone other than the review's owner tried to interact with it.
    #[error("Only `{}` can interact with this review.", Color::Blue.paint(.0))]
    NotReviewOwner(String),
    /// There is no commit to act on.
    #[error("The backlog is empty; there is nothing to advance to.")]
    EmptyBacklog,
    /// The operator lacks the access role.
    #[error("You need the role `{}` to use this command.", Color::Blue.paint(.0))]
    MissingRole(String),
    /// The configuration file is missing required values.
    #[error("Configuration at `{}` is incomplete: {}", Color::Blue.paint(.path), .reason)]
    ConfigNotInitialized { path: String, reason: String },
    /// A [git2::Error] occurred.
    #[error("libgit2 error: {}", .0)]
    Git2(#[from] git2::Error),
    /// An [std::io::Error] occurred.
    #[error("io error: {}", .0)]
    Io(#[from] std::io::Error),
    /// A [toml::de::Error] occurred.
    #[error("toml deserialization error: {}", .0)]
    TomlDe(#[from] toml::de::Error),
    /// A [toml::ser::Error] occurred.
    #[error("toml serialization error: {}", .0)]
    TomlSer(#[from] toml::ser::Error),
    /// An [inquire::InquireError] occurred.
    #[error("inquire error: {}", .0)]
    Inquire(#[from] inquire::InquireError),
}

pub type IntegrateResult<T> = Result<T, IntegrateError>;

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "?".to_string(), |c| c.to_string())
}
