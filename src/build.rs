//! Execution of the build-and-test pipeline, with rate-limited progress streaming.

use crate::{
    constants::{ASSERTION_MARKER, BUILD_FAILURE_PREFIX, COMPILER_ERROR_MARKER},
    errors::IntegrateResult,
};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Lifecycle of a build. There is no cancelled state; a started build always runs to exit.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BuildStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// Receives snapshots of the accumulated build output while the build runs.
pub trait ProgressReporter {
    /// Publishes the full output accumulated so far. Failures are logged and otherwise ignored.
    fn publish(&mut self, output: &str) -> anyhow::Result<()>;
}

/// A single build, owned by the [BuildRunner] until the process exits.
#[derive(Debug)]
pub struct BuildRun {
    started_at: DateTime<Utc>,
    output: String,
    status: BuildStatus,
}

impl Default for BuildRun {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            output: String::new(),
            status: BuildStatus::NotStarted,
        }
    }
}

impl BuildRun {
    fn start(&mut self) {
        self.started_at = Utc::now();
        self.status = BuildStatus::Running;
    }

    fn push_line(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }

    /// Completes the run with the process exit code. Only a zero exit code succeeds.
    fn finish(mut self, exit_code: Option<i32>) -> BuildResult {
        self.status = if exit_code == Some(0) {
            BuildStatus::Succeeded
        } else {
            BuildStatus::Failed
        };

        let report =
            (self.status == BuildStatus::Failed).then(|| ErrorReport::extract(&self.output));

        BuildResult {
            status: self.status,
            exit_code,
            started_at: self.started_at,
            finished_at: Utc::now(),
            output: self.output,
            report,
        }
    }
}

/// The outcome of a finished build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub status: BuildStatus,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every line the pipeline printed, stdout and stderr interleaved.
    pub output: String,
    /// The condensed error report, present when the build failed.
    pub report: Option<ErrorReport>,
}

impl BuildResult {
    pub fn succeeded(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }
}

/// How a condensed error report is handed to the operator.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReportDelivery {
    Inline(String),
    Attachment(String),
}

/// The build output lines that look like failures. Best effort; unmarked errors are missed.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ErrorReport {
    pub lines: Vec<String>,
}

impl ErrorReport {
    /// Keeps, in order, the lines starting with `FAILED:` or containing `error:` or `Assertion`.
    pub fn extract(output: &str) -> Self {
        let lines = output
            .lines()
            .filter(|line| {
                line.starts_with(BUILD_FAILURE_PREFIX)
                    || line.contains(COMPILER_ERROR_MARKER)
                    || line.contains(ASSERTION_MARKER)
            })
            .map(ToOwned::to_owned)
            .collect();
        Self { lines }
    }

    pub fn text(&self) -> String {
        self.lines.iter().join("\n")
    }

    /// Inline below `inline_limit` characters, an attachment otherwise.
    pub fn delivery(&self, inline_limit: usize) -> ReportDelivery {
        let text = self.text();
        if text.chars().count() < inline_limit {
            ReportDelivery::Inline(text)
        } else {
            ReportDelivery::Attachment(text)
        }
    }
}

/// Runs the build pipeline.
pub struct BuildRunner {
    command: PathBuf,
    workdir: PathBuf,
    interval: Duration,
}

impl BuildRunner {
    /// Creates a runner for `command`, executed in `workdir`, publishing progress at most once
    /// per `interval`.
    pub fn new(command: &Path, workdir: &Path, interval: Duration) -> Self {
        Self {
            command: command.to_path_buf(),
            workdir: workdir.to_path_buf(),
            interval,
        }
    }

    /// Runs the pipeline to completion, publishing output snapshots to `reporter` as it goes.
    ///
    /// A non-zero exit is a [BuildStatus::Failed] result, not an error. Errors are reserved for
    /// failing to spawn or wait on the process.
    pub async fn run(&self, reporter: &mut dyn ProgressReporter) -> IntegrateResult<BuildResult> {
        let mut run = BuildRun::default();

        info!(command = %self.command.display(), "Starting build");
        let mut child = Command::new(&self.command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        run.start();

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        stream_output(&mut run, rx, self.interval, reporter).await;

        let status = child.wait().await?;
        let result = run.finish(status.code());
        info!(status = ?result.status, code = ?result.exit_code, "Build finished");
        Ok(result)
    }
}

/// Forwards each line of `reader` into `tx` until EOF.
async fn forward_lines<R>(reader: R, tx: UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(&['\n', '\r'][..]);
                if tx.send(line.to_string()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed reading build output");
                break;
            }
        }
    }
}

/// Accumulates every line from `lines` into `run` until all producers hang up, publishing the
/// accumulated output to `reporter` at most once per `interval` and only when it changed.
///
/// Returns the number of snapshots published.
async fn stream_output(
    run: &mut BuildRun,
    mut lines: UnboundedReceiver<String>,
    interval: Duration,
    reporter: &mut dyn ProgressReporter,
) -> usize {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut published_len = 0;
    let mut snapshots = 0;
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => run.push_line(&line),
                None => break,
            },
            _ = ticker.tick() => {
                if run.output.len() == published_len {
                    continue;
                }
                published_len = run.output.len();
                snapshots += 1;
                debug!(bytes = published_len, "Publishing build progress");
                if let Err(e) = reporter.publish(&run.output) {
                    warn!(error = %e, "Failed to publish build progress");
                }
            }
        }
    }
    snapshots
}

#[cfg(test)]
mod test {
    use super::{
        stream_output, BuildRun, BuildRunner, BuildStatus, ErrorReport, ProgressReporter,
        ReportDelivery,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        snapshots: Vec<String>,
        fail_first: bool,
    }

    impl ProgressReporter for Recorder {
        fn publish(&mut self, output: &str) -> anyhow::Result<()> {
            self.snapshots.push(output.to_string());
            if std::mem::take(&mut self.fail_first) {
                anyhow::bail!("progress channel unavailable");
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_at_bounded_cadence_and_keeps_every_line() {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for i in 1..=15 {
                tokio::time::sleep(Duration::from_secs(2)).await;
                tx.send(format!("line {i}")).unwrap();
            }
        });

        let mut run = BuildRun::default();
        run.start();
        let mut recorder = Recorder::default();
        let snapshots =
            stream_output(&mut run, rx, Duration::from_secs(10), &mut recorder).await;

        assert!((2..=3).contains(&snapshots), "got {snapshots} snapshots");
        assert_eq!(recorder.snapshots.len(), snapshots);
        assert!((4..=5).contains(&recorder.snapshots[0].lines().count()));

        let result = run.finish(Some(0));
        assert_eq!(result.status, BuildStatus::Succeeded);
        assert!(result.report.is_none());
        assert_eq!(result.output.lines().count(), 15);
        assert!(result.output.starts_with("line 1\n"));
        assert!(result.output.ends_with("line 15\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_build_publishes_nothing_new() {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tx.send("configuring".to_string()).unwrap();
            tokio::time::sleep(Duration::from_secs(45)).await;
        });

        let mut run = BuildRun::default();
        let mut recorder = Recorder::default();
        let snapshots =
            stream_output(&mut run, rx, Duration::from_secs(10), &mut recorder).await;

        assert_eq!(snapshots, 1);
        assert_eq!(recorder.snapshots, ["configuring\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_failure_does_not_abort_the_build() {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for i in 1..=3 {
                tx.send(format!("step {i}")).unwrap();
                tokio::time::sleep(Duration::from_secs(11)).await;
            }
        });

        let mut run = BuildRun::default();
        let mut recorder = Recorder {
            fail_first: true,
            ..Default::default()
        };
        let snapshots =
            stream_output(&mut run, rx, Duration::from_secs(10), &mut recorder).await;

        assert!(snapshots >= 2);
        assert_eq!(run.output.lines().count(), 3);
    }

    #[test]
    fn extracts_error_report() {
        let output = "FAILED: target\nnote: something\nerror: bad type\n";
        let report = ErrorReport::extract(output);
        assert_eq!(report.lines, ["FAILED: target", "error: bad type"]);

        let output = "ok\nfoo.cpp:3: Assertion `x' failed.\n  FAILED: indented\n";
        assert_eq!(
            ErrorReport::extract(output).lines,
            ["foo.cpp:3: Assertion `x' failed."]
        );
    }

    #[test]
    fn long_reports_become_attachments() {
        let short = ErrorReport {
            lines: vec!["error: x".to_string()],
        };
        assert_eq!(
            short.delivery(1500),
            ReportDelivery::Inline("error: x".to_string())
        );

        let long = ErrorReport {
            lines: vec!["error: ".repeat(300)],
        };
        assert!(matches!(long.delivery(1500), ReportDelivery::Attachment(t) if t.len() == 2100));
    }

    #[test]
    fn nonzero_exit_fails_with_report() {
        let mut run = BuildRun::default();
        run.start();
        assert_eq!(run.status, BuildStatus::Running);
        run.push_line("FAILED: obj/foo.o");
        run.push_line("building bar");

        let result = run.finish(Some(1));
        assert!(!result.succeeded());
        assert_eq!(result.report.unwrap().lines, ["FAILED: obj/foo.o"]);

        let killed = BuildRun::default().finish(None);
        assert_eq!(killed.status, BuildStatus::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_pipeline_and_merges_streams() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("build_and_validate.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'building'\necho 'error: bad type' >&2\necho 'FAILED: target'\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = BuildRunner::new(&script, dir.path(), Duration::from_secs(10));
        let mut recorder = Recorder::default();
        let result = runner.run(&mut recorder).await.unwrap();

        assert_eq!(result.status, BuildStatus::Failed);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.output.lines().count(), 3);

        let mut report = result.report.unwrap().lines;
        report.sort();
        assert_eq!(report, ["FAILED: target", "error: bad type"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_pipeline() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("build.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'all tests passed'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = BuildRunner::new(&script, dir.path(), Duration::from_secs(10));
        let result = runner.run(&mut Recorder::default()).await.unwrap();
        assert!(result.succeeded());
        assert_eq!(result.output, "all tests passed\n");
    }
}
