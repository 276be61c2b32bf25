//! Creation of new integration sessions.

use super::IntegrationSession;
use crate::{
    config::IntegrateConfig,
    errors::{IntegrateError, IntegrateResult},
    git::Vcs,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::info;

/// Derives the first free branch name for `date`: `<prefix><YYYYMMDD>`, then `_1`, `_2`, ...
pub fn derive_branch_name(
    prefix: &str,
    date: NaiveDate,
    exists: impl Fn(&str) -> IntegrateResult<bool>,
) -> IntegrateResult<String> {
    let base = format!("{}{}", prefix, date.format("%Y%m%d"));
    let mut candidate = base.clone();
    let mut suffix = 1;
    while exists(&candidate)? {
        candidate = format!("{base}_{suffix}");
        suffix += 1;
    }
    Ok(candidate)
}

/// Prepares the downstream repository and creates the branch for a new session.
pub struct IntegrationSessionManager<'a> {
    config: &'a IntegrateConfig,
    vcs: &'a dyn Vcs,
}

impl<'a> IntegrationSessionManager<'a> {
    pub fn new(config: &'a IntegrateConfig, vcs: &'a dyn Vcs) -> Self {
        Self { config, vcs }
    }

    /// Starts a new session for `thread_ref`, created at `now`. The branch is dated with the
    /// calendar day of `now` in its own time zone.
    ///
    /// Synchronization failures abort before any branch exists. If branch creation or the anchor
    /// commit fails, the branch may be left behind without a session.
    ///
    /// The caller pushes the branch and registers the session.
    pub fn start_session<Tz: TimeZone>(
        &self,
        thread_ref: Option<&str>,
        now: DateTime<Tz>,
    ) -> IntegrateResult<IntegrationSession> {
        let trunk = self.config.trunk.as_str();
        let remote = self.config.remote.as_str();

        let current = self.vcs.current_branch().map_err(step("reading the current branch"))?;
        info!(current, "Current branch");
        if current != trunk {
            self.vcs.switch(trunk).map_err(step("switching to trunk"))?;
        }
        self.vcs.fetch(remote).map_err(step("fetching trunk"))?;
        self.vcs
            .pull_fast_forward(remote, trunk)
            .map_err(step("fast-forwarding trunk"))?;
        self.vcs
            .sync_submodules()
            .map_err(step("updating submodules"))?;

        let branch_name = derive_branch_name(&self.config.branch_prefix, now.date_naive(), |b| {
            self.vcs.branch_exists(b)
        })?;

        info!(branch = %branch_name, "Creating session branch");
        self.vcs.create_branch(&branch_name, &self.config.base_ref())?;
        self.vcs
            .commit_empty(&format!("Start integrate {branch_name}"))?;

        Ok(IntegrationSession {
            thread_ref: thread_ref.unwrap_or(&branch_name).to_string(),
            branch_name,
            created_at: now.with_timezone(&Utc),
        })
    }
}

fn step(step: &'static str) -> impl Fn(IntegrateError) -> IntegrateError {
    move |e| IntegrateError::SessionStart {
        step,
        reason: e.to_string(),
    }
}
