use cairn_core::naming::{
    validate_ref_component, ANALYSIS_PATTERNS_BRANCH, DEFAULT_BRANCH_PREFIX, MAIN_BRANCH,
};
use cairn_core::{CairnError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options recognized by a thought-history repository. Serialized as the
/// repository's `config.json`; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub repo_path: PathBuf,
    pub branch_prefix: String,
    /// Minimum time between flushes, in milliseconds.
    pub commit_interval: u64,
    pub max_commits_per_day: u32,
    pub enable_branches: bool,
    pub enable_tags: bool,
    pub enable_collaboration: bool,
    pub remote_url: Option<String>,
    pub remote_name: String,
    pub author_name: String,
    pub author_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("thought-history"),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            commit_interval: 300_000,
            max_commits_per_day: 100,
            enable_branches: true,
            enable_tags: true,
            enable_collaboration: false,
            remote_url: None,
            remote_name: "origin".to_string(),
            author_name: "cairn".to_string(),
            author_email: "cairn@localhost".to_string(),
        }
    }
}

impl Config {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            ..Self::default()
        }
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repo_path.as_os_str().is_empty() {
            return Err(CairnError::validation("repoPath", "must not be empty"));
        }
        if self.max_commits_per_day == 0 {
            return Err(CairnError::validation(
                "maxCommitsPerDay",
                "must be at least 1",
            ));
        }
        self.validate_branch_prefix()?;
        if self.remote_name.trim().is_empty() {
            return Err(CairnError::validation("remoteName", "must not be empty"));
        }
        Ok(())
    }

    /// Each segment must be a valid ref component, and the agent branches
    /// must not nest under `main` or the `analysis/*` branches.
    fn validate_branch_prefix(&self) -> Result<()> {
        let prefix = self.branch_prefix.as_str();
        if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(CairnError::validation(
                "branchPrefix",
                format!("{prefix:?} is not usable in a branch name"),
            ));
        }
        for segment in prefix.split('/') {
            validate_ref_component("branchPrefix", segment)?;
        }
        let first = prefix.split('/').next().unwrap_or_default();
        let analysis_root = ANALYSIS_PATTERNS_BRANCH.split('/').next().unwrap_or_default();
        if first == MAIN_BRANCH || first == analysis_root {
            return Err(CairnError::validation(
                "branchPrefix",
                format!("{prefix:?} collides with the {first:?} branch"),
            ));
        }
        Ok(())
    }

    pub fn commit_interval(&self) -> time::Duration {
        time::Duration::milliseconds(i64::try_from(self.commit_interval).unwrap_or(i64::MAX))
    }

    pub fn has_remote(&self) -> bool {
        self.remote_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
