//! Actions that can be dispatched from a review.

use super::IntegrateContext;
use crate::{
    build::{BuildResult, ProgressReporter, ReportDelivery},
    constants::ERRORS_ATTACHMENT_NAME,
    errors::{IntegrateError, IntegrateResult},
    review::{Action, ReviewSession, Selection},
    revision::RevisionPointer,
};
use std::path::PathBuf;
use tracing::{info, warn};

/// The effect of a dispatched action.
#[derive(Debug)]
pub enum ActionOutcome {
    /// The revision pointer moved.
    Advanced(RevisionPointer),
    /// The build ran to completion; `report` is set when it failed.
    Built {
        result: BuildResult,
        report: Option<DeliveredReport>,
    },
    /// The session branch was pushed.
    Pushed { branch: String, force: bool },
}

/// A condensed error report as handed to the operator.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DeliveredReport {
    Inline(String),
    /// The report was too long to show and was written to this file.
    Attachment(PathBuf),
}

impl IntegrateContext {
    /// Dispatches `action` from `review` on behalf of `who`.
    ///
    /// Navigation is frozen and the commit in view captured before anything else happens. The
    /// review is closed afterwards whether or not the action succeeded.
    pub async fn dispatch_action(
        &self,
        review: &ReviewSession,
        who: &str,
        action: Action,
        reporter: &mut dyn ProgressReporter,
    ) -> IntegrateResult<ActionOutcome> {
        let selection = review.freeze(who, action)?;
        let thread_ref = review.thread_ref();
        info!(?action, index = selection.index, thread = thread_ref, "Dispatching action");

        let outcome = match selection.action {
            Action::AdvanceTo => self.advance_to(thread_ref, &selection),
            Action::Build => self.build(thread_ref, reporter).await,
            Action::Push { force } => self.push(thread_ref, force),
        };

        review.close();
        if let Err(e) = &outcome {
            warn!(?action, error = %e, "Action failed");
        }
        outcome
    }

    fn advance_to(&self, thread_ref: &str, selection: &Selection) -> IntegrateResult<ActionOutcome> {
        let commit = selection
            .commit
            .as_ref()
            .ok_or(IntegrateError::EmptyBacklog)?;
        self.registry.authorize(thread_ref, self.vcs.as_ref())?;

        let pointer = self.revisions().advance(&commit.id)?;
        Ok(ActionOutcome::Advanced(pointer))
    }

    async fn build(
        &self,
        thread_ref: &str,
        reporter: &mut dyn ProgressReporter,
    ) -> IntegrateResult<ActionOutcome> {
        let session = self.registry.authorize(thread_ref, self.vcs.as_ref())?;
        info!(branch = %session.branch_name, "Building session branch");

        let result = self.builder.run(reporter).await?;
        let report = match &result.report {
            Some(report) => Some(self.deliver(report.delivery(self.config.report_inline_limit))?),
            None => None,
        };
        Ok(ActionOutcome::Built { result, report })
    }

    fn push(&self, thread_ref: &str, force: bool) -> IntegrateResult<ActionOutcome> {
        let session = self.registry.authorize(thread_ref, self.vcs.as_ref())?;
        self.vcs
            .push_branch(&self.config.remote, &session.branch_name, force)?;
        Ok(ActionOutcome::Pushed {
            branch: session.branch_name,
            force,
        })
    }

    /// Writes attachments into the state directory.
    fn deliver(&self, delivery: ReportDelivery) -> IntegrateResult<DeliveredReport> {
        match delivery {
            ReportDelivery::Inline(text) => Ok(DeliveredReport::Inline(text)),
            ReportDelivery::Attachment(text) => {
                let path = self.state_dir.join(ERRORS_ATTACHMENT_NAME);
                std::fs::write(&path, text)?;
                Ok(DeliveredReport::Attachment(path))
            }
        }
    }
}
