//! Utilities for interacting with the downstream `git` checkout.

use crate::errors::{IntegrateError, IntegrateResult};
use git2::{BranchType, Repository};
use std::{
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info};

/// The version-control operations the orchestrator needs from the downstream checkout.
///
/// Every method is a single blocking call with no internal timeout.
pub trait Vcs {
    /// Returns the name of the currently checked out branch.
    fn current_branch(&self) -> IntegrateResult<String>;

    /// Switches the working copy to `branch`. Fails if local changes block the switch.
    fn switch(&self, branch: &str) -> IntegrateResult<()>;

    /// Fetches from `remote`.
    fn fetch(&self, remote: &str) -> IntegrateResult<()>;

    /// Fast-forwards the current branch to `remote`/`branch`. Fails if a fast-forward is not possible.
    fn pull_fast_forward(&self, remote: &str, branch: &str) -> IntegrateResult<()>;

    /// Updates nested repositories to the versions recorded in the current commit.
    fn sync_submodules(&self) -> IntegrateResult<()>;

    /// Returns whether a local branch named `branch` exists.
    fn branch_exists(&self, branch: &str) -> IntegrateResult<bool>;

    /// Creates `branch` pointing at `from_ref` and checks it out.
    fn create_branch(&self, branch: &str, from_ref: &str) -> IntegrateResult<()>;

    /// Records an empty commit with `message` on the current branch, returning its id.
    fn commit_empty(&self, message: &str) -> IntegrateResult<String>;

    /// Pushes `branch` to `remote`, optionally forcing.
    fn push_branch(&self, remote: &str, branch: &str, force: bool) -> IntegrateResult<()>;
}

/// The downstream checkout, backed by a [Repository] and the `git` binary for the operations
/// `libgit2` does not cover (credentials, submodule recursion, safe switching).
pub struct GitCheckout {
    repository: Repository,
    workdir: PathBuf,
}

impl GitCheckout {
    /// Opens the repository at `path`.
    pub fn open(path: &Path) -> IntegrateResult<Self> {
        let repository = Repository::open(path)?;
        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        Ok(Self {
            repository,
            workdir,
        })
    }

    /// Path of the repository's `.git` directory.
    pub fn git_dir(&self) -> &Path {
        self.repository.path()
    }

    /// Runs `git` with `args` inside the working copy, mapping a non-zero exit to
    /// [IntegrateError::ExternalTool].
    fn git(&self, args: &[&str]) -> IntegrateResult<()> {
        debug!(?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()?;

        if output.status.success() {
            return Ok(());
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(IntegrateError::ExternalTool {
            tool: format!("git {}", args.join(" ")),
            code: output.status.code(),
            output: text.trim().to_string(),
        })
    }
}

impl Vcs for GitCheckout {
    fn current_branch(&self) -> IntegrateResult<String> {
        let head = self.repository.head()?;
        let name = head.shorthand().ok_or_else(|| {
            git2::Error::from_str("HEAD ref does not have a valid UTF-8 name")
        })?;
        Ok(name.to_string())
    }

    fn switch(&self, branch: &str) -> IntegrateResult<()> {
        self.git(&["switch", branch])
    }

    fn fetch(&self, remote: &str) -> IntegrateResult<()> {
        self.git(&["fetch", remote])
    }

    fn pull_fast_forward(&self, remote: &str, branch: &str) -> IntegrateResult<()> {
        self.git(&["pull", "--ff-only", remote, branch])
    }

    fn sync_submodules(&self) -> IntegrateResult<()> {
        self.git(&["submodule", "update", "--init"])
    }

    fn branch_exists(&self, branch: &str) -> IntegrateResult<bool> {
        match self.repository.find_branch(branch, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn create_branch(&self, branch: &str, from_ref: &str) -> IntegrateResult<()> {
        let target = self.repository.revparse_single(from_ref)?.peel_to_commit()?;
        self.repository.branch(branch, &target, false)?;

        let tree = target.tree()?;
        self.repository.checkout_tree(tree.as_object(), None)?;
        self.repository
            .set_head(format!("refs/heads/{}", branch).as_str())?;

        info!(branch, from_ref, "Created branch");
        Ok(())
    }

    fn commit_empty(&self, message: &str) -> IntegrateResult<String> {
        let head_commit = self.repository.head()?.peel_to_commit()?;
        let tree = head_commit.tree()?;
        let signature = self.repository.signature()?;

        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&head_commit],
        )?;
        Ok(oid.to_string())
    }

    fn push_branch(&self, remote: &str, branch: &str, force: bool) -> IntegrateResult<()> {
        let mut args = vec!["push", remote, branch];
        if force {
            args.push("--force");
        }
        self.git(&args)?;
        info!(remote, branch, force, "Pushed branch");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{GitCheckout, Vcs};
    use crate::errors::{IntegrateError, IntegrateResult};
    use git2::{Repository, Signature};
    use std::{cell::RefCell, collections::HashSet};
    use tempfile::TempDir;

    /// Initializes a repository with a single commit on `main`.
    pub(crate) fn init_repository() -> (TempDir, GitCheckout) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Integrator").unwrap();
            config.set_str("user.email", "integrator@example.com").unwrap();

            let signature = Signature::now("Integrator", "integrator@example.com").unwrap();
            let tree_id = repo.index().unwrap().write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let oid = repo
                .commit(None, &signature, &signature, "initial", &tree, &[])
                .unwrap();
            let commit = repo.find_commit(oid).unwrap();
            repo.branch("main", &commit, true).unwrap();
            repo.set_head("refs/heads/main").unwrap();
        }

        let checkout = GitCheckout::open(dir.path()).unwrap();
        (dir, checkout)
    }

    /// An in-memory [Vcs] that records the calls made against it.
    #[derive(Default)]
    pub(crate) struct FakeVcs {
        pub(crate) current: RefCell<String>,
        pub(crate) branches: RefCell<HashSet<String>>,
        pub(crate) calls: RefCell<Vec<String>>,
        pub(crate) fail_on: Option<&'static str>,
    }

    impl FakeVcs {
        pub(crate) fn on_branch(branch: &str) -> Self {
            let fake = Self::default();
            fake.current.replace(branch.to_string());
            fake.branches.borrow_mut().insert(branch.to_string());
            fake
        }

        fn record(&self, call: &'static str, detail: String) -> IntegrateResult<()> {
            self.calls.borrow_mut().push(format!("{call} {detail}").trim().to_string());
            if self.fail_on == Some(call) {
                return Err(IntegrateError::ExternalTool {
                    tool: format!("git {call}"),
                    code: Some(1),
                    output: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    impl Vcs for FakeVcs {
        fn current_branch(&self) -> IntegrateResult<String> {
            Ok(self.current.borrow().clone())
        }

        fn switch(&self, branch: &str) -> IntegrateResult<()> {
            self.record("switch", branch.to_string())?;
            self.current.replace(branch.to_string());
            Ok(())
        }

        fn fetch(&self, remote: &str) -> IntegrateResult<()> {
            self.record("fetch", remote.to_string())
        }

        fn pull_fast_forward(&self, remote: &str, branch: &str) -> IntegrateResult<()> {
            self.record("pull", format!("{remote} {branch}"))
        }

        fn sync_submodules(&self) -> IntegrateResult<()> {
            self.record("submodules", String::new())
        }

        fn branch_exists(&self, branch: &str) -> IntegrateResult<bool> {
            Ok(self.branches.borrow().contains(branch))
        }

        fn create_branch(&self, branch: &str, from_ref: &str) -> IntegrateResult<()> {
            self.record("branch", format!("{branch} {from_ref}"))?;
            self.branches.borrow_mut().insert(branch.to_string());
            self.current.replace(branch.to_string());
            Ok(())
        }

        fn commit_empty(&self, message: &str) -> IntegrateResult<String> {
            self.record("commit", message.to_string())?;
            Ok("0000000".to_string())
        }

        fn push_branch(&self, remote: &str, branch: &str, force: bool) -> IntegrateResult<()> {
            self.record("push", format!("{remote} {branch} force={force}"))
        }
    }

    #[test]
    fn reports_current_branch() {
        let (_dir, checkout) = init_repository();
        assert_eq!(checkout.current_branch().unwrap(), "main");
    }

    #[test]
    fn branch_exists_distinguishes_missing() {
        let (_dir, checkout) = init_repository();
        assert!(checkout.branch_exists("main").unwrap());
        assert!(!checkout.branch_exists("integrate-llvm-20240101").unwrap());
    }

    #[test]
    fn creates_branch_with_empty_anchor_commit() {
        let (dir, checkout) = init_repository();

        checkout.create_branch("integrate-llvm-20240101", "main").unwrap();
        assert_eq!(checkout.current_branch().unwrap(), "integrate-llvm-20240101");

        let oid = checkout
            .commit_empty("Start integrate integrate-llvm-20240101")
            .unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let commit = repo
            .find_commit(git2::Oid::from_str(&oid).unwrap())
            .unwrap();
        assert_eq!(
            commit.message(),
            Some("Start integrate integrate-llvm-20240101")
        );
        assert_eq!(commit.parent(0).unwrap().tree_id(), commit.tree_id());

        // Trunk is left where it was.
        let main = repo.revparse_single("main").unwrap().peel_to_commit().unwrap();
        assert_eq!(main.id(), commit.parent_id(0).unwrap());
    }
}
