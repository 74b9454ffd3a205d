use cairn_core::naming::MAIN_BRANCH;
use cairn_core::{CairnError, Result};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{ArchiveFormat, FileWrite, RepoBackend, RepoStatus};

/// A commit recorded by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCommit {
    pub branch: String,
    pub message: String,
    pub paths: Vec<String>,
}

type Tree = BTreeMap<String, String>;

/// In-process backend with git-like semantics: branches fork from the base
/// branch, commits with no changes fail, tags are unique. Used for dry runs
/// and tests; failures can be injected per commit message prefix.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    initialized: bool,
    base_branch: String,
    current: String,
    branches: BTreeMap<String, Tree>,
    commits: Vec<MemoryCommit>,
    tags: BTreeMap<String, String>,
    remotes: BTreeMap<String, String>,
    pushes: usize,
    pulls: usize,
    fail_commit_prefix: Option<String>,
    fail_remote: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            initialized: false,
            base_branch: MAIN_BRANCH.to_string(),
            current: MAIN_BRANCH.to_string(),
            branches: BTreeMap::new(),
            commits: Vec::new(),
            tags: BTreeMap::new(),
            remotes: BTreeMap::new(),
            pushes: 0,
            pulls: 0,
            fail_commit_prefix: None,
            fail_remote: false,
        }
    }
}

fn injected(command: &str) -> CairnError {
    CairnError::CommandExecution {
        command: command.to_string(),
        stderr: "injected failure".to_string(),
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every commit whose message starts with `prefix` fail.
    pub fn fail_commits_starting_with(&mut self, prefix: impl Into<String>) {
        self.fail_commit_prefix = Some(prefix.into());
    }

    pub fn clear_commit_failure(&mut self) {
        self.fail_commit_prefix = None;
    }

    pub fn fail_remote(&mut self, fail: bool) {
        self.fail_remote = fail;
    }

    pub fn commits(&self) -> &[MemoryCommit] {
        &self.commits
    }

    /// Tag name to the branch that was checked out when it was created.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn remotes(&self) -> &BTreeMap<String, String> {
        &self.remotes
    }

    pub fn pushes(&self) -> usize {
        self.pushes
    }

    pub fn pulls(&self) -> usize {
        self.pulls
    }

    fn check_remote(&self, remote: &str, op: &str) -> Result<()> {
        if self.fail_remote {
            return Err(injected(&format!("{op} {remote}")));
        }
        if !self.remotes.contains_key(remote) {
            return Err(CairnError::CommandExecution {
                command: format!("{op} {remote}"),
                stderr: format!("'{remote}' does not appear to be a repository"),
            });
        }
        Ok(())
    }
}

impl RepoBackend for MemoryBackend {
    fn init(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        Ok(self.branches.keys().cloned().collect())
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.current.clone())
    }

    fn create_or_switch_branch(&mut self, name: &str) -> Result<()> {
        if !self.branches.contains_key(name) {
            let start = self
                .branches
                .get(&self.base_branch)
                .or_else(|| self.branches.get(&self.current))
                .cloned()
                .unwrap_or_default();
            self.branches.insert(name.to_string(), start);
        }
        self.current = name.to_string();
        Ok(())
    }

    fn commit_files(&mut self, files: &[FileWrite], message: &str) -> Result<()> {
        if let Some(prefix) = &self.fail_commit_prefix {
            if message.starts_with(prefix.as_str()) {
                return Err(injected(&format!("commit -m {message}")));
            }
        }
        let tree = self.branches.entry(self.current.clone()).or_default();
        let changed = files
            .iter()
            .any(|f| tree.get(&f.path) != Some(&f.content));
        if !changed {
            return Err(CairnError::CommandExecution {
                command: format!("commit -m {message}"),
                stderr: "nothing to commit, working tree clean".to_string(),
            });
        }
        for file in files {
            tree.insert(file.path.clone(), file.content.clone());
        }
        self.commits.push(MemoryCommit {
            branch: self.current.clone(),
            message: message.to_string(),
            paths: files.iter().map(|f| f.path.clone()).collect(),
        });
        Ok(())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        Ok(self.tags.keys().cloned().collect())
    }

    fn create_tag(&mut self, name: &str, _message: &str) -> Result<()> {
        if self.tags.contains_key(name) {
            return Err(CairnError::CommandExecution {
                command: format!("tag -a {name}"),
                stderr: format!("tag '{name}' already exists"),
            });
        }
        self.tags.insert(name.to_string(), self.current.clone());
        Ok(())
    }

    fn set_remote(&mut self, name: &str, url: &str) -> Result<()> {
        self.remotes.insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn push(&mut self, remote: &str, _all_branches: bool, _all_tags: bool) -> Result<()> {
        self.check_remote(remote, "push")?;
        self.pushes += 1;
        Ok(())
    }

    fn pull(&mut self, remote: &str, _all_branches: bool) -> Result<()> {
        self.check_remote(remote, "pull")?;
        self.pulls += 1;
        Ok(())
    }

    fn archive(&self, format: ArchiveFormat, _output: &Path) -> Result<()> {
        Err(CairnError::Unsupported(format!(
            "{} archive of an in-memory repository",
            format.as_str()
        )))
    }

    fn status(&self) -> Result<RepoStatus> {
        Ok(RepoStatus {
            changes: Vec::new(),
            current_branch: self.current.clone(),
            branches: self.list_branches()?,
            tags: self.list_tags()?,
        })
    }

    fn commit_count(&self) -> Result<usize> {
        Ok(self.commits.len())
    }

    fn list_files(&self, branch: &str, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .branches
            .get(branch)
            .map(|tree| {
                tree.keys()
                    .filter(|p| p.starts_with(&prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_file(&self, branch: &str, path: &str) -> Result<String> {
        self.branches
            .get(branch)
            .and_then(|tree| tree.get(path))
            .cloned()
            .ok_or_else(|| CairnError::CommandExecution {
                command: format!("show {branch}:{path}"),
                stderr: format!("path '{path}' does not exist in '{branch}'"),
            })
    }
}
