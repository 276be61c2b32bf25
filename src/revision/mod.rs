//! Tracking of the upstream revision merged downstream, and the backlog of commits after it.

use crate::errors::{IntegrateError, IntegrateResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, warn};

mod commit;
pub use commit::Commit;

/// The upstream commit currently merged into downstream.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RevisionPointer {
    pub commit_id: String,
    pub advanced_at: DateTime<Utc>,
}

/// Durable storage for the single [RevisionPointer].
pub trait PointerStore {
    /// Loads the pointer, or [None] if it was never advanced.
    fn load(&self) -> IntegrateResult<Option<RevisionPointer>>;

    /// Persists `pointer`, replacing the previous value.
    fn store(&self, pointer: &RevisionPointer) -> IntegrateResult<()>;
}

/// A [PointerStore] backed by a TOML file.
pub struct PointerFile {
    path: PathBuf,
}

impl PointerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PointerStore for PointerFile {
    fn load(&self) -> IntegrateResult<Option<RevisionPointer>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let pointer = toml::from_str(&std::fs::read_to_string(&self.path)?)?;
        Ok(Some(pointer))
    }

    fn store(&self, pointer: &RevisionPointer) -> IntegrateResult<()> {
        // Write-then-rename so a crash never leaves a truncated pointer behind.
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, toml::to_string_pretty(pointer)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// The external revision-tracking tool.
pub trait RevisionTool {
    /// Refreshes upstream and returns the unmerged commits as `(id, raw description)` pairs,
    /// oldest first.
    fn fetch(&self) -> IntegrateResult<Vec<(String, String)>>;

    /// Moves the tool's pointer to `commit_id`. The exit status is the only signal.
    fn advance_to(&self, commit_id: &str) -> IntegrateResult<bool>;
}

/// A [RevisionTool] implemented by an executable, invoked as `<tool> fetch` and
/// `<tool> next --advance-to=<id>`.
pub struct RevisionScript {
    program: PathBuf,
    workdir: PathBuf,
}

impl RevisionScript {
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.into(),
        }
    }

    fn tool_name(&self, subcommand: &str) -> String {
        format!("{} {}", self.program.display(), subcommand)
    }
}

impl RevisionTool for RevisionScript {
    fn fetch(&self) -> IntegrateResult<Vec<(String, String)>> {
        debug!(program = %self.program.display(), "Fetching upstream backlog");
        let output = Command::new(&self.program)
            .arg("fetch")
            .current_dir(&self.workdir)
            .output()?;

        if !output.status.success() {
            return Err(IntegrateError::ExternalTool {
                tool: self.tool_name("fetch"),
                code: output.status.code(),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn advance_to(&self, commit_id: &str) -> IntegrateResult<bool> {
        let status = Command::new(&self.program)
            .arg("next")
            .arg(format!("--advance-to={commit_id}"))
            .current_dir(&self.workdir)
            .status()?;
        Ok(status.success())
    }
}

/// Parses the `fetch` listing: one `<id> <raw description>` commit per line.
fn parse_listing(listing: &str) -> Vec<(String, String)> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((id, desc)) => (id.to_string(), desc.trim().to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

/// Owns the [RevisionPointer] and the most recently fetched backlog.
///
/// Methods take `&mut self`; advancing and fetching are never interleaved within one store.
pub struct RevisionStore {
    tool: Box<dyn RevisionTool>,
    pointer: Box<dyn PointerStore>,
    backlog: Vec<Commit>,
}

impl RevisionStore {
    pub fn new(tool: Box<dyn RevisionTool>, pointer: Box<dyn PointerStore>) -> Self {
        Self {
            tool,
            pointer,
            backlog: Vec::new(),
        }
    }

    /// Opens the store over the revision script `program`, run inside `workdir`, with the pointer
    /// persisted at `pointer_path`.
    pub fn open(program: &Path, workdir: &Path, pointer_path: &Path) -> Self {
        Self::new(
            Box::new(RevisionScript::new(program, workdir)),
            Box::new(PointerFile::new(pointer_path)),
        )
    }

    /// The persisted pointer.
    pub fn pointer(&self) -> IntegrateResult<Option<RevisionPointer>> {
        self.pointer.load()
    }

    /// The backlog as of the last [RevisionStore::fetch_backlog].
    pub fn backlog(&self) -> &[Commit] {
        &self.backlog
    }

    /// Refreshes and returns the commits strictly after the pointer, oldest first.
    pub fn fetch_backlog(&mut self) -> IntegrateResult<Vec<Commit>> {
        let listing = self.tool.fetch()?;
        let mut commits = listing
            .iter()
            .map(|(id, raw)| Commit::parse(id, raw))
            .collect::<Vec<_>>();

        // The tool normally lists only unmerged commits. If it still reports the merged one,
        // drop everything up to and including it.
        if let Some(pointer) = self.pointer.load()? {
            if let Some(merged) = commits.iter().position(|c| c.id == pointer.commit_id) {
                warn!(commit = %pointer.commit_id, "Revision tool listed already merged commits");
                commits.drain(..=merged);
            }
        }

        info!(count = commits.len(), "Fetched upstream backlog");
        self.backlog = commits.clone();
        Ok(commits)
    }

    /// Moves the pointer forward to `commit_id`, which must be in the last fetched backlog.
    ///
    /// Any backlog member is a valid target, so intermediate commits may be skipped.
    pub fn advance(&mut self, commit_id: &str) -> IntegrateResult<RevisionPointer> {
        let Some(position) = self.backlog.iter().position(|c| c.id == commit_id) else {
            return Err(IntegrateError::NotInBacklog(commit_id.to_string()));
        };

        if !self.tool.advance_to(commit_id)? {
            return Err(IntegrateError::AdvanceRejected(commit_id.to_string()));
        }

        let pointer = RevisionPointer {
            commit_id: commit_id.to_string(),
            advanced_at: Utc::now(),
        };
        self.pointer.store(&pointer)?;
        self.backlog.drain(..=position);

        info!(commit = commit_id, "Advanced revision pointer");
        Ok(pointer)
    }
}
