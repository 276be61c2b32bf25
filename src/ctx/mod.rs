//! The in-memory context of the `integrate` application.

use crate::{
    build::BuildRunner,
    config::IntegrateConfig,
    constants::{POINTER_FILE_NAME, REGISTRY_FILE_NAME},
    errors::IntegrateResult,
    git::{GitCheckout, Vcs},
    review::ReviewSession,
    revision::{Commit, RevisionPointer, RevisionStore},
    session::{state_dir, IntegrationSession, IntegrationSessionManager, SessionRegistry},
};
use chrono::Local;
use std::{
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::info;

mod actions;
pub use actions::{ActionOutcome, DeliveredReport};

/// Everything the orchestrator holds for one downstream checkout.
pub struct IntegrateContext {
    pub config: IntegrateConfig,
    vcs: Box<dyn Vcs>,
    registry: SessionRegistry,
    revisions: Mutex<RevisionStore>,
    builder: BuildRunner,
    state_dir: PathBuf,
}

impl IntegrateContext {
    /// Opens the downstream checkout named by `config` and loads its persisted state.
    pub fn load(config: IntegrateConfig) -> IntegrateResult<Self> {
        let checkout = GitCheckout::open(&config.downstream_repo)?;
        let state_dir = state_dir(checkout.git_dir());
        std::fs::create_dir_all(&state_dir)?;

        let revisions = RevisionStore::open(
            &config.resolve(&config.revision_tool),
            &config.downstream_repo,
            &state_dir.join(POINTER_FILE_NAME),
        );
        let registry = SessionRegistry::load(&state_dir.join(REGISTRY_FILE_NAME))?;

        Ok(Self::from_parts(
            config,
            Box::new(checkout),
            registry,
            revisions,
            state_dir,
        ))
    }

    /// Assembles a context from already-opened parts.
    pub fn from_parts(
        config: IntegrateConfig,
        vcs: Box<dyn Vcs>,
        registry: SessionRegistry,
        revisions: RevisionStore,
        state_dir: PathBuf,
    ) -> Self {
        let builder = BuildRunner::new(
            &config.resolve(&config.build_command),
            &config.downstream_repo,
            config.progress_interval(),
        );
        Self {
            config,
            vcs,
            registry,
            revisions: Mutex::new(revisions),
            builder,
            state_dir,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The branch checked out in the downstream repository.
    pub fn current_branch(&self) -> IntegrateResult<String> {
        self.vcs.current_branch()
    }

    /// The persisted revision pointer.
    pub fn pointer(&self) -> IntegrateResult<Option<RevisionPointer>> {
        self.revisions().pointer()
    }

    /// Persists the session registry.
    pub fn persist(&self) -> IntegrateResult<()> {
        self.registry
            .write(&self.state_dir.join(REGISTRY_FILE_NAME))
    }

    /// Starts a new session bound to `thread_ref` (or to a thread named after the branch), retiring
    /// every session it supersedes, then pushes its branch to the shared remote.
    ///
    /// The session is persisted before the push, so a failed push leaves a usable session that a
    /// later `Push` action can publish.
    pub fn start_session(&mut self, thread_ref: Option<&str>) -> IntegrateResult<IntegrationSession> {
        let session = IntegrationSessionManager::new(&self.config, self.vcs.as_ref())
            .start_session(thread_ref, Local::now())?;

        for retired in self.registry.supersede(session.clone())? {
            info!(branch = %retired.branch_name, "Superseded session");
        }
        self.persist()?;

        self.vcs
            .push_branch(&self.config.remote, &session.branch_name, false)?;
        info!(branch = %session.branch_name, "Integration session started");
        Ok(session)
    }

    /// Marks the session bound to `thread_ref` inactive.
    pub fn close_session(&mut self, thread_ref: &str) -> IntegrateResult<IntegrationSession> {
        let session = self.registry.bind_active_session(thread_ref)?;
        let retired = self.registry.retire(&session.branch_name)?;
        self.persist()?;
        Ok(retired)
    }

    /// Fetches the backlog for the session bound to `thread_ref` and opens a review of it owned
    /// by `operator`.
    pub fn open_review(&self, operator: &str, thread_ref: &str) -> IntegrateResult<ReviewSession> {
        self.registry.authorize(thread_ref, self.vcs.as_ref())?;
        let backlog = self.fetch_backlog()?;
        Ok(ReviewSession::open(
            backlog,
            operator,
            thread_ref,
            self.config.review_timeout(),
        ))
    }

    /// Refreshes the backlog of unmerged upstream commits.
    pub fn fetch_backlog(&self) -> IntegrateResult<Vec<Commit>> {
        self.revisions().fetch_backlog()
    }

    fn revisions(&self) -> MutexGuard<'_, RevisionStore> {
        self.revisions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
