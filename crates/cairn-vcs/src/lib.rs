//! Version-control backends.
//!
//! Everything the ledger persists goes through [`RepoBackend`]. The working
//! tree (checked-out branch, staged files) is shared mutable state, so every
//! mutating call takes `&mut self` and callers serialize through one owner.

pub mod git;
pub mod memory;

pub use git::GitCli;
pub use memory::{MemoryBackend, MemoryCommit};

use cairn_core::Result;
use std::path::Path;

/// One file to write into the working tree before committing.
/// `path` is repo-relative with forward slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
}

impl FileWrite {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
}

impl ArchiveFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
        }
    }
}

/// Snapshot of the repository as seen by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    /// Porcelain lines; empty when the tree is clean.
    pub changes: Vec<String>,
    pub current_branch: String,
    pub branches: Vec<String>,
    pub tags: Vec<String>,
}

impl RepoStatus {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Version-control primitives the ledger needs. Implementations are
/// synchronous; a call returns only after the underlying operation finished.
pub trait RepoBackend {
    /// Create the repository if it does not exist yet.
    fn init(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    fn list_branches(&self) -> Result<Vec<String>>;

    fn current_branch(&self) -> Result<String>;

    /// Switch to `name`, creating it first if it does not exist.
    fn create_or_switch_branch(&mut self, name: &str) -> Result<()>;

    /// Write every file, stage exactly those paths, and make one commit on
    /// the current branch.
    fn commit_files(&mut self, files: &[FileWrite], message: &str) -> Result<()>;

    fn write_and_commit(&mut self, path: &str, content: &str, message: &str) -> Result<()> {
        self.commit_files(&[FileWrite::new(path, content)], message)
    }

    fn list_tags(&self) -> Result<Vec<String>>;

    /// Create an annotated tag at HEAD.
    fn create_tag(&mut self, name: &str, message: &str) -> Result<()>;

    /// Add `name` pointing at `url`, or repoint it if it already exists.
    fn set_remote(&mut self, name: &str, url: &str) -> Result<()>;

    fn push(&mut self, remote: &str, all_branches: bool, all_tags: bool) -> Result<()>;

    /// With `all_branches`, every branch is fast-forwarded to the remote tip
    /// and branches that exist only on the remote are created locally.
    fn pull(&mut self, remote: &str, all_branches: bool) -> Result<()>;

    /// Archive HEAD into `output`.
    fn archive(&self, format: ArchiveFormat, output: &Path) -> Result<()>;

    fn status(&self) -> Result<RepoStatus>;

    /// Number of commits reachable from any branch.
    fn commit_count(&self) -> Result<usize>;

    /// Repo-relative paths of files under `dir` on `branch`. Empty when the
    /// branch does not exist.
    fn list_files(&self, branch: &str, dir: &str) -> Result<Vec<String>>;

    fn read_file(&self, branch: &str, path: &str) -> Result<String>;
}
