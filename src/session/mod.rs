//! Integration sessions and the registry binding them to branches and threads.

use crate::{
    errors::{IntegrateError, IntegrateResult},
    git::Vcs,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

mod start;
pub use start::IntegrationSessionManager;

/// One in-progress integration: a dedicated downstream branch bound to one conversation thread.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IntegrationSession {
    pub branch_name: String,
    pub created_at: DateTime<Utc>,
    /// Opaque identity of the conversation thread driving the session.
    pub thread_ref: String,
}

/// A registry entry. Entries are never removed; only the `active` marker moves.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionRecord {
    pub session: IntegrationSession,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Maps sessions to their branches and threads, persisted as TOML keyed by branch name.
///
/// While sessions are active, branch names are unique and threads map one-to-one onto branches.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionRegistry {
    sessions: BTreeMap<String, SessionRecord>,
}

impl SessionRegistry {
    /// Loads the registry at `path`, or an empty registry if none was written yet.
    pub fn load(path: &Path) -> IntegrateResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No session registry on disk");
            return Ok(Self::default());
        }
        Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Persists the registry to `path`.
    pub fn write(&self, path: &Path) -> IntegrateResult<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Records `session` as active.
    ///
    /// ## Returns
    /// - `Err(BranchAlreadyActive)` - If an active session already owns the branch.
    /// - `Err(ThreadAlreadyBound)` - If the thread is bound to another active branch.
    pub fn register(&mut self, session: IntegrationSession) -> IntegrateResult<()> {
        if self.active(&session.branch_name).is_some() {
            return Err(IntegrateError::BranchAlreadyActive(session.branch_name));
        }
        if let Some(other) = self.find_by_thread(&session.thread_ref) {
            return Err(IntegrateError::ThreadAlreadyBound {
                thread: session.thread_ref,
                branch: other.branch_name.clone(),
            });
        }

        info!(branch = %session.branch_name, thread = %session.thread_ref, "Registered session");
        self.sessions.insert(
            session.branch_name.clone(),
            SessionRecord {
                session,
                active: true,
                closed_at: None,
            },
        );
        Ok(())
    }

    /// Retires every active session and records `session` as the only active one.
    ///
    /// The downstream checkout holds one session at a time, so a new session supersedes all
    /// others, including one bound to the same thread.
    ///
    /// ## Returns
    /// - `Ok(Vec<IntegrationSession>)` - The sessions that were retired.
    pub fn supersede(
        &mut self,
        session: IntegrationSession,
    ) -> IntegrateResult<Vec<IntegrationSession>> {
        let active = self
            .sessions
            .values()
            .filter(|r| r.active)
            .map(|r| r.session.branch_name.clone())
            .collect::<Vec<_>>();
        let retired = active
            .iter()
            .map(|branch| self.retire(branch))
            .collect::<IntegrateResult<Vec<_>>>()?;

        self.register(session)?;
        Ok(retired)
    }

    /// Resolves the active session bound to `thread_ref`.
    pub fn bind_active_session(&self, thread_ref: &str) -> IntegrateResult<IntegrationSession> {
        self.find_by_thread(thread_ref)
            .cloned()
            .ok_or_else(|| IntegrateError::SessionNotFound(thread_ref.to_string()))
    }

    /// Checks that `session`'s branch is the one checked out in the downstream repository.
    ///
    /// A mismatch means another session took over the checkout, and the session must not mutate it.
    pub fn validate_active(
        &self,
        session: &IntegrationSession,
        vcs: &dyn Vcs,
    ) -> IntegrateResult<()> {
        let checked_out = vcs.current_branch()?;
        if checked_out != session.branch_name {
            return Err(IntegrateError::StaleSession {
                bound: session.branch_name.clone(),
                checked_out,
            });
        }
        Ok(())
    }

    /// Binds `thread_ref` and validates the resulting session against the checkout. Every mutating
    /// action goes through here first.
    pub fn authorize(&self, thread_ref: &str, vcs: &dyn Vcs) -> IntegrateResult<IntegrationSession> {
        let session = self.bind_active_session(thread_ref)?;
        self.validate_active(&session, vcs)?;
        Ok(session)
    }

    /// Marks the active session on `branch` inactive.
    pub fn retire(&mut self, branch: &str) -> IntegrateResult<IntegrationSession> {
        let record = self
            .sessions
            .get_mut(branch)
            .filter(|r| r.active)
            .ok_or_else(|| IntegrateError::SessionNotFound(branch.to_string()))?;

        record.active = false;
        record.closed_at = Some(Utc::now());
        info!(branch, "Retired session");
        Ok(record.session.clone())
    }

    /// All recorded sessions, ordered by branch name.
    pub fn records(&self) -> impl Iterator<Item = &SessionRecord> {
        self.sessions.values()
    }

    fn active(&self, branch: &str) -> Option<&IntegrationSession> {
        self.sessions
            .get(branch)
            .filter(|r| r.active)
            .map(|r| &r.session)
    }

    fn find_by_thread(&self, thread_ref: &str) -> Option<&IntegrationSession> {
        self.sessions
            .values()
            .filter(|r| r.active)
            .map(|r| &r.session)
            .find(|s| s.thread_ref == thread_ref)
    }
}

/// Returns the directory holding persisted state for the repository whose `.git` is `git_dir`.
pub fn state_dir(git_dir: &Path) -> PathBuf {
    git_dir.join(crate::constants::STATE_DIR_NAME)
}
