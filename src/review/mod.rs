//! Paged review over the backlog of unmerged commits.
//!
//! A [ReviewSession] shows one commit per page. Firing an action freezes navigation and reads
//! the commit in view under the same lock, so an action can never apply to a page the operator
//! has already navigated away from. Every action is terminal for the review.

use crate::{
    errors::{IntegrateError, IntegrateResult},
    revision::Commit,
};
use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::debug;

mod fmt;
pub use fmt::{render_page, truncate_tail};

/// A page change.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    First,
    Previous,
    Next,
    Last,
}

/// The actions that can be fired from a review.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Action {
    /// Advance the revision pointer to the commit in view.
    AdvanceTo,
    /// Build and test the session branch.
    Build,
    /// Push the session branch to the shared remote.
    Push { force: bool },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    Browsing,
    InFlight(Action),
    Closed,
}

#[derive(Debug)]
struct ReviewState {
    current_index: usize,
    phase: Phase,
    last_touched: Instant,
}

/// The commit in view at the instant an action was fired.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Selection {
    pub action: Action,
    pub index: usize,
    /// [None] only when the backlog is empty, which [Action::AdvanceTo] never accepts.
    pub commit: Option<Commit>,
}

/// What a single page shows.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub index: usize,
    pub total: usize,
    pub commit: Option<&'a Commit>,
}

/// One operator's navigation over a fetched backlog.
#[derive(Debug)]
pub struct ReviewSession {
    backlog: Vec<Commit>,
    owner: String,
    thread_ref: String,
    timeout: Duration,
    state: Mutex<ReviewState>,
}

impl ReviewSession {
    /// Opens a review over `backlog`, starting at the oldest unmerged commit.
    pub fn open(
        backlog: Vec<Commit>,
        owner: impl Into<String>,
        thread_ref: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            backlog,
            owner: owner.into(),
            thread_ref: thread_ref.into(),
            timeout,
            state: Mutex::new(ReviewState {
                current_index: 0,
                phase: Phase::Browsing,
                last_touched: Instant::now(),
            }),
        }
    }

    /// The thread the review was opened from.
    pub fn thread_ref(&self) -> &str {
        &self.thread_ref
    }

    /// Whether the review still accepts navigation and actions.
    pub fn is_open(&self) -> bool {
        self.lock().phase == Phase::Browsing
    }

    /// The page currently in view.
    pub fn page(&self) -> Page<'_> {
        let index = self.lock().current_index;
        Page {
            index,
            total: self.backlog.len(),
            commit: self.backlog.get(index),
        }
    }

    /// Moves the view, clamping at the first and last pages.
    pub fn navigate(&self, who: &str, direction: Direction) -> IntegrateResult<usize> {
        let mut state = self.lock();
        self.check_interactive(who, &mut state)?;

        let last = self.backlog.len().saturating_sub(1);
        state.current_index = match direction {
            Direction::First => 0,
            Direction::Previous => state.current_index.saturating_sub(1),
            Direction::Next => (state.current_index + 1).min(last),
            Direction::Last => last,
        };
        state.last_touched = Instant::now();
        Ok(state.current_index)
    }

    /// Freezes navigation and captures the commit in view for `action`.
    ///
    /// Only one action is ever accepted per review. A second one is rejected with
    /// [IntegrateError::ActionInFlight] while the first runs, and [IntegrateError::ReviewClosed]
    /// afterwards.
    pub fn freeze(&self, who: &str, action: Action) -> IntegrateResult<Selection> {
        let mut state = self.lock();
        self.check_interactive(who, &mut state)?;

        let commit = self.backlog.get(state.current_index).cloned();
        if commit.is_none() && action == Action::AdvanceTo {
            return Err(IntegrateError::EmptyBacklog);
        }

        state.phase = Phase::InFlight(action);
        debug!(?action, index = state.current_index, "Froze review");
        Ok(Selection {
            action,
            index: state.current_index,
            commit,
        })
    }

    /// Ends the review once its action has completed.
    pub fn close(&self) {
        self.lock().phase = Phase::Closed;
    }

    fn check_interactive(&self, who: &str, state: &mut ReviewState) -> IntegrateResult<()> {
        if who != self.owner {
            return Err(IntegrateError::NotReviewOwner(self.owner.clone()));
        }
        match state.phase {
            Phase::InFlight(_) => return Err(IntegrateError::ActionInFlight),
            Phase::Closed => return Err(IntegrateError::ReviewClosed),
            Phase::Browsing => {}
        }
        if state.last_touched.elapsed() >= self.timeout {
            state.phase = Phase::Closed;
            return Err(IntegrateError::ReviewExpired);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ReviewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::{Action, Direction, ReviewSession};
    use crate::{errors::IntegrateError, revision::Commit};
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    fn backlog(n: usize) -> Vec<Commit> {
        (0..n)
            .map(|i| Commit::parse(&format!("c{i}"), &format!("Change {i} (Dev on 2024-01-0{i})")))
            .collect()
    }

    #[test]
    fn navigation_clamps_to_backlog() {
        let review = ReviewSession::open(backlog(3), "alice", "t1", HOUR);

        assert_eq!(review.navigate("alice", Direction::Previous).unwrap(), 0);
        assert_eq!(review.navigate("alice", Direction::Next).unwrap(), 1);
        assert_eq!(review.navigate("alice", Direction::Next).unwrap(), 2);
        assert_eq!(review.navigate("alice", Direction::Next).unwrap(), 2);
        assert_eq!(review.navigate("alice", Direction::First).unwrap(), 0);
        assert_eq!(review.navigate("alice", Direction::Last).unwrap(), 2);

        let page = review.page();
        assert_eq!((page.index, page.total), (2, 3));
        assert_eq!(page.commit.unwrap().id, "c2");
    }

    #[test]
    fn navigation_never_leaves_bounds() {
        for len in 0..5 {
            let review = ReviewSession::open(backlog(len), "alice", "t1", HOUR);
            let moves = [
                Direction::Next,
                Direction::Next,
                Direction::Previous,
                Direction::Last,
                Direction::Next,
                Direction::Previous,
                Direction::Previous,
                Direction::Previous,
                Direction::First,
                Direction::Previous,
            ];
            for direction in moves {
                let index = review.navigate("alice", direction).unwrap();
                assert!(index < len.max(1));
                assert_eq!(review.page().commit.is_some(), len > 0);
            }
        }
    }

    #[test]
    fn freeze_captures_commit_in_view_and_blocks_navigation() {
        let review = ReviewSession::open(backlog(3), "alice", "t1", HOUR);
        review.navigate("alice", Direction::Next).unwrap();

        let selection = review.freeze("alice", Action::AdvanceTo).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.commit.unwrap().id, "c1");

        assert!(matches!(
            review.navigate("alice", Direction::Next),
            Err(IntegrateError::ActionInFlight)
        ));
        assert!(matches!(
            review.freeze("alice", Action::AdvanceTo),
            Err(IntegrateError::ActionInFlight)
        ));
        assert!(matches!(
            review.freeze("alice", Action::Build),
            Err(IntegrateError::ActionInFlight)
        ));

        review.close();
        assert!(!review.is_open());
        assert!(matches!(
            review.freeze("alice", Action::Push { force: false }),
            Err(IntegrateError::ReviewClosed)
        ));
    }

    #[test]
    fn only_owner_interacts() {
        let review = ReviewSession::open(backlog(2), "alice", "t1", HOUR);
        assert!(matches!(
            review.navigate("bob", Direction::Next),
            Err(IntegrateError::NotReviewOwner(owner)) if owner == "alice"
        ));
        assert!(review.freeze("bob", Action::Build).is_err());
        assert!(review.is_open());
    }

    #[test]
    fn empty_backlog_cannot_advance() {
        let review = ReviewSession::open(Vec::new(), "alice", "t1", HOUR);
        assert!(matches!(
            review.freeze("alice", Action::AdvanceTo),
            Err(IntegrateError::EmptyBacklog)
        ));
        assert!(review.is_open());

        let selection = review.freeze("alice", Action::Build).unwrap();
        assert_eq!(selection.commit, None);
    }

    #[test]
    fn idle_review_expires() {
        let review = ReviewSession::open(backlog(2), "alice", "t1", Duration::ZERO);
        assert!(matches!(
            review.navigate("alice", Direction::Next),
            Err(IntegrateError::ReviewExpired)
        ));
        assert!(matches!(
            review.freeze("alice", Action::Build),
            Err(IntegrateError::ReviewClosed)
        ));
    }
}
