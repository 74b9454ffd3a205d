use std::path::{Path, PathBuf};

/// Local, git-ignored bookkeeping directory inside the repository.
pub const CAIRN_DIR: &str = ".cairn";

/// Every well-known path in a thought-history repository.
#[derive(Debug, Clone)]
pub struct CairnPaths {
    pub root: PathBuf,
    pub cairn_dir: PathBuf,
    pub state_json: PathBuf,
    pub pending_jsonl: PathBuf,
    pub inflight_json: PathBuf,
    pub lock_file: PathBuf,
    pub exports_dir: PathBuf,
    pub config_json: PathBuf,
}

impl CairnPaths {
    /// Derive all paths from a repo root. Pure computation, no I/O.
    pub fn discover(repo_root: impl Into<PathBuf>) -> Self {
        let root = repo_root.into();
        let cairn_dir = root.join(CAIRN_DIR);
        Self {
            state_json: cairn_dir.join("state.json"),
            pending_jsonl: cairn_dir.join("pending.jsonl"),
            inflight_json: cairn_dir.join("inflight.json"),
            lock_file: cairn_dir.join("LOCK"),
            exports_dir: root.join("exports"),
            config_json: root.join("config.json"),
            cairn_dir,
            root,
        }
    }

    /// Create the untracked local directories. Idempotent.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [&self.root, &self.cairn_dir, &self.exports_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_builds_correct_paths() {
        let p = CairnPaths::discover("/tmp/repo");
        assert_eq!(p.cairn_dir, PathBuf::from("/tmp/repo/.cairn"));
        assert_eq!(p.state_json, PathBuf::from("/tmp/repo/.cairn/state.json"));
        assert_eq!(p.pending_jsonl, PathBuf::from("/tmp/repo/.cairn/pending.jsonl"));
        assert_eq!(p.inflight_json, PathBuf::from("/tmp/repo/.cairn/inflight.json"));
        assert_eq!(p.lock_file, PathBuf::from("/tmp/repo/.cairn/LOCK"));
        assert_eq!(p.exports_dir, PathBuf::from("/tmp/repo/exports"));
        assert_eq!(p.config_json, PathBuf::from("/tmp/repo/config.json"));
    }

    #[test]
    fn ensure_layout_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let p = CairnPaths::discover(tmp.path().join("history"));
        p.ensure_layout().unwrap();
        assert!(p.root.is_dir());
        assert!(p.cairn_dir.is_dir());
        assert!(p.exports_dir.is_dir());
    }
}
