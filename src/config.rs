//! Persistent configuration for the `integrate` application.

use crate::{
    constants::{
        CFG_FILE_NAME, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REVIEW_TIMEOUT, REPORT_INLINE_LIMIT,
    },
    errors::{IntegrateError, IntegrateResult},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

/// Configuration for the `integrate` application, stored as TOML.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IntegrateConfig {
    /// Path to the downstream repository that receives upstream revisions.
    pub downstream_repo: PathBuf,
    /// The trunk branch of the downstream repository.
    pub trunk: String,
    /// The shared remote that trunk is pulled from and session branches are pushed to.
    pub remote: String,
    /// Prefix of session branch names. The date is appended to it.
    pub branch_prefix: String,
    /// The revision-tracking tool, invoked as `<tool> fetch` and `<tool> next --advance-to=<id>`.
    pub revision_tool: PathBuf,
    /// The build-and-test pipeline.
    pub build_command: PathBuf,
    /// Web URL of the upstream project, used to link commits and pull requests.
    pub upstream_url: String,
    /// Web URL of the downstream project, used to link new pull requests.
    pub downstream_url: String,
    /// Role an operator must hold to use `start` and `status`.
    pub access_role: String,
    /// Seconds between build progress snapshots.
    pub progress_interval_secs: u64,
    /// Idle seconds after which an open review expires.
    pub review_timeout_secs: u64,
    /// Condensed error reports of at least this many characters are attached rather than inlined.
    pub report_inline_limit: usize,
    /// Operator names mapped to their roles.
    pub operators: HashMap<String, Vec<String>>,
}

impl Default for IntegrateConfig {
    fn default() -> Self {
        Self {
            downstream_repo: PathBuf::new(),
            trunk: "main".to_string(),
            remote: "origin".to_string(),
            branch_prefix: "integrate-llvm-".to_string(),
            revision_tool: PathBuf::from("scripts/llvm_revision"),
            build_command: PathBuf::from("scripts/build_and_validate.sh"),
            upstream_url: "https://github.com/llvm/llvm-project".to_string(),
            downstream_url: "https://github.com/iree-org/iree".to_string(),
            access_role: "integrator".to_string(),
            progress_interval_secs: DEFAULT_PROGRESS_INTERVAL.as_secs(),
            review_timeout_secs: DEFAULT_REVIEW_TIMEOUT.as_secs(),
            report_inline_limit: REPORT_INLINE_LIMIT,
            operators: HashMap::new(),
        }
    }
}

impl IntegrateConfig {
    /// Returns the default path of the configuration file, `$HOME/.integrate.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(CFG_FILE_NAME)
    }

    /// Loads the configuration at `path`, writing a default configuration there if none exists.
    pub fn load_or_initialize(path: &Path) -> IntegrateResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Writing default configuration");
            let config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&config)?)?;
            return Ok(config);
        }

        debug!(path = %path.display(), "Loading configuration");
        let config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        Ok(config)
    }

    /// Checks that the values the orchestrator cannot run without are present.
    pub fn validate(&self, path: &Path) -> IntegrateResult<()> {
        let incomplete = |reason: &str| IntegrateError::ConfigNotInitialized {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        if self.downstream_repo.as_os_str().is_empty() {
            return Err(incomplete("`downstream-repo` is not set"));
        }
        if self.trunk.is_empty() || self.remote.is_empty() {
            return Err(incomplete("`trunk` and `remote` must be set"));
        }
        if self.progress_interval_secs == 0 {
            return Err(incomplete("`progress-interval-secs` must be positive"));
        }
        Ok(())
    }

    /// Resolves a tool path relative to the downstream repository.
    pub fn resolve(&self, tool: &Path) -> PathBuf {
        if tool.is_absolute() {
            tool.to_path_buf()
        } else {
            self.downstream_repo.join(tool)
        }
    }

    /// The ref session branches are created from.
    pub fn base_ref(&self) -> String {
        format!("{}/{}", self.remote, self.trunk)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn review_timeout(&self) -> Duration {
        Duration::from_secs(self.review_timeout_secs)
    }

    /// Checks that `operator` holds the configured access role.
    pub fn check_role(&self, operator: &str) -> IntegrateResult<()> {
        let allowed = self
            .operators
            .get(operator)
            .is_some_and(|roles| roles.iter().any(|r| r == &self.access_role));

        if allowed {
            Ok(())
        } else {
            Err(IntegrateError::MissingRole(self.access_role.clone()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::IntegrateConfig;
    use crate::errors::IntegrateError;
    use std::path::Path;

    #[test]
    fn initializes_missing_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");

        let config = IntegrateConfig::load_or_initialize(&path).unwrap();
        assert_eq!(config, IntegrateConfig::default());
        assert!(path.exists());

        let reloaded = IntegrateConfig::load_or_initialize(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(
            &path,
            "downstream-repo = \"/src/iree\"\n[operators]\nalice = [\"integrator\"]\n",
        )
        .unwrap();

        let config = IntegrateConfig::load_or_initialize(&path).unwrap();
        assert_eq!(config.downstream_repo, Path::new("/src/iree"));
        assert_eq!(config.trunk, "main");
        assert_eq!(config.base_ref(), "origin/main");
        assert!(config.validate(&path).is_ok());
        assert_eq!(
            config.resolve(Path::new("scripts/llvm_revision")),
            Path::new("/src/iree/scripts/llvm_revision")
        );
    }

    #[test]
    fn validate_rejects_missing_repo() {
        let config = IntegrateConfig::default();
        assert!(matches!(
            config.validate(Path::new("cfg.toml")),
            Err(IntegrateError::ConfigNotInitialized { .. })
        ));
    }

    #[test]
    fn role_check() {
        let mut config = IntegrateConfig::default();
        config
            .operators
            .insert("alice".to_string(), vec!["integrator".to_string()]);
        config
            .operators
            .insert("bob".to_string(), vec!["viewer".to_string()]);

        assert!(config.check_role("alice").is_ok());
        assert!(matches!(
            config.check_role("bob"),
            Err(IntegrateError::MissingRole(role)) if role == "integrator"
        ));
        assert!(config.check_role("mallory").is_err());
    }
}
