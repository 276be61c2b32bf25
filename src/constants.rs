//! Constants for the `integrate` application.

use nu_ansi_term::Color;
use std::time::Duration;

/// Name of the configuration file, relative to `$HOME`.
pub(crate) const CFG_FILE_NAME: &str = ".integrate.toml";

/// Directory within the downstream repository's `.git` that holds persisted state.
pub(crate) const STATE_DIR_NAME: &str = "integrate";
pub(crate) const POINTER_FILE_NAME: &str = "pointer.toml";
pub(crate) const REGISTRY_FILE_NAME: &str = "sessions.toml";
pub(crate) const ERRORS_ATTACHMENT_NAME: &str = "errors.txt";

/// Minimum wall-clock time between two build progress snapshots.
pub(crate) const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Condensed error reports at or above this many characters are delivered as an attachment.
pub(crate) const REPORT_INLINE_LIMIT: usize = 1500;

/// Rendered logs are cut down to their last `LOG_VIEW_LIMIT` characters.
pub(crate) const LOG_VIEW_LIMIT: usize = 1500;

/// Idle time after which an open review expires.
pub(crate) const DEFAULT_REVIEW_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Markers that select a build output line for the condensed error report.
pub(crate) const BUILD_FAILURE_PREFIX: &str = "FAILED:";
pub(crate) const COMPILER_ERROR_MARKER: &str = "error:";
pub(crate) const ASSERTION_MARKER: &str = "Assertion";

pub(crate) const ACCENT: Color = Color::Purple;
pub(crate) const FILLED_CIRCLE: char = '●';
pub(crate) const EMPTY_CIRCLE: char = '○';
