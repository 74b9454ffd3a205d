use cairn_core::naming::MAIN_BRANCH;
use cairn_core::{CairnError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{ArchiveFormat, FileWrite, RepoBackend, RepoStatus};

/// Backend that shells out to the `git` binary, one subprocess per primitive.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    identity: Option<(String, String)>,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            identity: None,
        }
    }

    /// Author name/email written to the repo-local config on `init`.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let command = format!("git {}", args.join(" "));
        tracing::debug!(cwd = %self.root.display(), %command, "running");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| CairnError::CommandExecution {
                command: command.clone(),
                stderr: format!("git not available: {e}"),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(CairnError::CommandExecution { command, stderr });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_lines(&self, args: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .run(args)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.run(&["merge-base", "--is-ancestor", ancestor, descendant])
            .is_ok()
    }

    /// Move a branch that is not checked out to `target`, fast-forward only.
    fn fast_forward(&self, branch: &str, target: &str) -> Result<()> {
        let local_ref = format!("refs/heads/{branch}");
        if self.is_ancestor(&local_ref, target) {
            self.run(&["update-ref", &local_ref, target])?;
        } else if !self.is_ancestor(target, &local_ref) {
            return Err(CairnError::CommandExecution {
                command: format!("git update-ref {local_ref} {target}"),
                stderr: format!("{branch} has diverged from {target}; not a fast-forward"),
            });
        }
        Ok(())
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute()
            || rel_path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(CairnError::validation(
                "path",
                format!("{rel:?} escapes the repository"),
            ));
        }
        Ok(self.root.join(rel_path))
    }
}

impl RepoBackend for GitCli {
    fn init(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        if !self.is_initialized() {
            self.run(&["init", "-q"])?;
            let head_ref = format!("refs/heads/{MAIN_BRANCH}");
            self.run(&["symbolic-ref", "HEAD", &head_ref])?;
        }
        if let Some((name, email)) = self.identity.clone() {
            self.run(&["config", "user.name", &name])?;
            self.run(&["config", "user.email", &email])?;
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        self.run_lines(&["branch", "--list", "--format=%(refname:short)"])
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.run(&["symbolic-ref", "--short", "HEAD"])?.trim().to_string())
    }

    fn create_or_switch_branch(&mut self, name: &str) -> Result<()> {
        let branches = self.list_branches()?;
        if branches.iter().any(|b| b == name) {
            if self.current_branch()? != name {
                self.run(&["switch", "-q", name])?;
            }
            return Ok(());
        }
        if name != MAIN_BRANCH && branches.iter().any(|b| b == MAIN_BRANCH) {
            self.run(&["switch", "-q", "-c", name, MAIN_BRANCH])?;
        } else {
            self.run(&["switch", "-q", "-c", name])?;
        }
        Ok(())
    }

    fn commit_files(&mut self, files: &[FileWrite], message: &str) -> Result<()> {
        if files.is_empty() {
            return Err(CairnError::CommandExecution {
                command: "git commit".into(),
                stderr: "no files to commit".into(),
            });
        }
        for file in files {
            let abs = self.resolve(&file.path)?;
            if let Some(parent) = abs.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&abs, file.content.as_bytes())?;
        }
        let mut add_args = vec!["add", "--"];
        add_args.extend(files.iter().map(|f| f.path.as_str()));
        self.run(&add_args)?;
        self.run(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        self.run_lines(&["tag", "--list"])
    }

    fn create_tag(&mut self, name: &str, message: &str) -> Result<()> {
        self.run(&["tag", "-a", name, "-m", message])?;
        Ok(())
    }

    fn set_remote(&mut self, name: &str, url: &str) -> Result<()> {
        let remotes = self.run_lines(&["remote"])?;
        if remotes.iter().any(|r| r == name) {
            self.run(&["remote", "set-url", name, url])?;
        } else {
            self.run(&["remote", "add", name, url])?;
        }
        Ok(())
    }

    fn push(&mut self, remote: &str, all_branches: bool, all_tags: bool) -> Result<()> {
        if !all_branches && !all_tags {
            self.run(&["push", remote, "HEAD"])?;
            return Ok(());
        }
        if all_branches {
            self.run(&["push", remote, "--all"])?;
        }
        if all_tags {
            self.run(&["push", remote, "--tags"])?;
        }
        Ok(())
    }

    fn pull(&mut self, remote: &str, all_branches: bool) -> Result<()> {
        if !all_branches {
            let current = self.current_branch()?;
            self.run(&["pull", "--ff-only", remote, &current])?;
            return Ok(());
        }
        let refspec = format!("+refs/heads/*:refs/remotes/{remote}/*");
        self.run(&["fetch", "--prune", "--tags", remote, &refspec])?;

        let current = self.current_branch()?;
        let local = self.list_branches()?;
        let tracking_root = format!("refs/remotes/{remote}");
        let tracking_prefix = format!("{tracking_root}/");
        for tracking in self.run_lines(&["for-each-ref", "--format=%(refname)", &tracking_root])? {
            let Some(name) = tracking.strip_prefix(&tracking_prefix) else {
                continue;
            };
            if name == "HEAD" {
                continue;
            }
            if name == current {
                if local.iter().any(|b| b == name) {
                    self.run(&["merge", "--ff-only", "-q", &tracking])?;
                } else {
                    // Unborn HEAD: adopt the remote tip as-is.
                    self.run(&["reset", "-q", "--hard", &tracking])?;
                }
            } else if !local.iter().any(|b| b == name) {
                self.run(&["branch", "-q", "--no-track", name, &tracking])?;
            } else {
                self.fast_forward(name, &tracking)?;
            }
        }
        Ok(())
    }

    fn archive(&self, format: ArchiveFormat, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let format_arg = format!("--format={}", format.as_str());
        let output_arg = output.to_string_lossy();
        self.run(&["archive", &format_arg, "-o", &output_arg, "HEAD"])?;
        Ok(())
    }

    fn status(&self) -> Result<RepoStatus> {
        let changes = self
            .run(&["status", "--porcelain"])?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        Ok(RepoStatus {
            changes,
            current_branch: self.current_branch()?,
            branches: self.list_branches()?,
            tags: self.list_tags()?,
        })
    }

    fn commit_count(&self) -> Result<usize> {
        if self.list_branches()?.is_empty() {
            return Ok(0);
        }
        let out = self.run(&["rev-list", "--all", "--count"])?;
        out.trim()
            .parse()
            .map_err(|e| CairnError::CommandExecution {
                command: "git rev-list --all --count".into(),
                stderr: format!("unexpected output {:?}: {e}", out.trim()),
            })
    }

    fn list_files(&self, branch: &str, dir: &str) -> Result<Vec<String>> {
        if !self.list_branches()?.iter().any(|b| b == branch) {
            return Ok(Vec::new());
        }
        self.run_lines(&["ls-tree", "-r", "--name-only", branch, "--", dir])
    }

    fn read_file(&self, branch: &str, path: &str) -> Result<String> {
        self.run(&["show", &format!("{branch}:{path}")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_repo() -> (tempfile::TempDir, GitCli) {
        let dir = tempfile::tempdir().unwrap();
        let mut git = GitCli::new(dir.path()).with_identity("Test", "test@test.com");
        git.init().unwrap();
        (dir, git)
    }

    #[test]
    fn init_starts_on_unborn_main() {
        let (_dir, git) = git_repo();
        assert!(git.is_initialized());
        assert_eq!(git.current_branch().unwrap(), "main");
        assert!(git.list_branches().unwrap().is_empty());
        assert_eq!(git.commit_count().unwrap(), 0);
    }

    #[test]
    fn commit_then_branch_from_main() {
        let (_dir, mut git) = git_repo();
        git.write_and_commit("README.md", "# hi\n", "init").unwrap();
        assert_eq!(git.list_branches().unwrap(), vec!["main"]);

        git.create_or_switch_branch("thoughts/agent-A").unwrap();
        assert_eq!(git.current_branch().unwrap(), "thoughts/agent-A");
        git.write_and_commit("thoughts/agent-A/b1.json", "{}", "add A").unwrap();

        // Second call only switches.
        git.create_or_switch_branch("main").unwrap();
        git.create_or_switch_branch("analysis/patterns").unwrap();
        // Forked from main, so agent A's file is not here.
        assert!(git
            .list_files("analysis/patterns", "thoughts")
            .unwrap()
            .is_empty());
        assert_eq!(
            git.list_files("thoughts/agent-A", "thoughts").unwrap(),
            vec!["thoughts/agent-A/b1.json"]
        );
        assert_eq!(
            git.read_file("thoughts/agent-A", "thoughts/agent-A/b1.json").unwrap(),
            "{}"
        );
        assert_eq!(git.commit_count().unwrap(), 2);
    }

    #[test]
    fn tags_and_status() {
        let (_dir, mut git) = git_repo();
        git.write_and_commit("a.txt", "a", "first").unwrap();
        git.create_tag("agent-A-2026-10-15", "high confidence").unwrap();
        assert_eq!(git.list_tags().unwrap(), vec!["agent-A-2026-10-15"]);
        assert!(git.create_tag("agent-A-2026-10-15", "again").is_err());

        let status = git.status().unwrap();
        assert!(!status.has_changes());
        assert_eq!(status.current_branch, "main");
        assert_eq!(status.tags.len(), 1);
    }

    #[test]
    fn nothing_to_commit_is_command_error() {
        let (_dir, mut git) = git_repo();
        git.write_and_commit("a.txt", "a", "first").unwrap();
        let err = git.write_and_commit("a.txt", "a", "again").unwrap_err();
        match err {
            CairnError::CommandExecution { command, .. } => {
                assert!(command.starts_with("git commit"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_paths_outside_repo() {
        let (_dir, mut git) = git_repo();
        assert!(git.write_and_commit("../evil.txt", "x", "nope").is_err());
    }

    #[test]
    fn push_without_remote_fails() {
        let (_dir, mut git) = git_repo();
        git.write_and_commit("a.txt", "a", "first").unwrap();
        assert!(git.push("origin", true, true).is_err());
    }

    #[test]
    fn push_to_bare_remote() {
        let (_dir, mut git) = git_repo();
        let remote = bare_remote();
        git.write_and_commit("a.txt", "a", "first").unwrap();
        git.create_tag("agent-A-2026-10-15", "tag").unwrap();
        git.set_remote("origin", &remote.path().to_string_lossy()).unwrap();
        git.push("origin", true, true).unwrap();

        let out = Command::new("git")
            .args(["tag", "--list"])
            .current_dir(remote.path())
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&out.stdout).contains("agent-A-2026-10-15"));
    }

    fn bare_remote() -> tempfile::TempDir {
        let remote = tempfile::tempdir().unwrap();
        Command::new("git")
            .args(["init", "-q", "--bare"])
            .current_dir(remote.path())
            .output()
            .unwrap();
        remote
    }

    fn tip(git: &GitCli, branch: &str) -> String {
        git.run(&["rev-parse", branch]).unwrap().trim().to_string()
    }

    #[test]
    fn pull_updates_every_branch() {
        let remote = bare_remote();
        let url = remote.path().to_string_lossy().to_string();

        let (_a_dir, mut a) = git_repo();
        a.set_remote("origin", &url).unwrap();
        a.write_and_commit("a.txt", "a", "first").unwrap();
        a.create_or_switch_branch("thoughts/agent-X").unwrap();
        a.write_and_commit("thoughts/agent-X/b1.json", "{}", "x1").unwrap();
        a.create_or_switch_branch("main").unwrap();
        a.push("origin", true, true).unwrap();

        // Fresh clone-alike: unborn main, no branches.
        let (b_dir, mut b) = git_repo();
        b.set_remote("origin", &url).unwrap();
        b.pull("origin", true).unwrap();
        let mut branches = b.list_branches().unwrap();
        branches.sort();
        assert_eq!(branches, vec!["main", "thoughts/agent-X"]);
        assert_eq!(b.current_branch().unwrap(), "main");
        assert!(b_dir.path().join("a.txt").is_file());

        // New commits on both branches upstream.
        a.create_or_switch_branch("thoughts/agent-X").unwrap();
        a.write_and_commit("thoughts/agent-X/b2.json", "{}", "x2").unwrap();
        a.create_or_switch_branch("main").unwrap();
        a.write_and_commit("b.txt", "b", "second").unwrap();
        a.push("origin", true, true).unwrap();

        b.pull("origin", true).unwrap();
        assert_eq!(tip(&b, "main"), tip(&a, "main"));
        assert_eq!(tip(&b, "thoughts/agent-X"), tip(&a, "thoughts/agent-X"));
        assert!(b_dir.path().join("b.txt").is_file());
        assert_eq!(
            b.read_file("thoughts/agent-X", "thoughts/agent-X/b2.json").unwrap(),
            "{}"
        );

        // B extends the agent branch and can push it back.
        b.create_or_switch_branch("thoughts/agent-X").unwrap();
        b.write_and_commit("thoughts/agent-X/b3.json", "{}", "x3").unwrap();
        b.push("origin", true, true).unwrap();
    }

    #[test]
    fn pull_refuses_diverged_branch() {
        let remote = bare_remote();
        let url = remote.path().to_string_lossy().to_string();

        let (_a_dir, mut a) = git_repo();
        a.set_remote("origin", &url).unwrap();
        a.write_and_commit("a.txt", "a", "first").unwrap();
        a.create_or_switch_branch("thoughts/agent-X").unwrap();
        a.write_and_commit("thoughts/agent-X/b1.json", "{}", "x1").unwrap();
        a.push("origin", true, true).unwrap();

        let (_b_dir, mut b) = git_repo();
        b.set_remote("origin", &url).unwrap();
        b.pull("origin", true).unwrap();
        b.create_or_switch_branch("thoughts/agent-X").unwrap();
        b.write_and_commit("thoughts/agent-X/local.json", "{}", "local").unwrap();
        b.create_or_switch_branch("main").unwrap();

        a.write_and_commit("thoughts/agent-X/b2.json", "{}", "x2").unwrap();
        a.push("origin", true, true).unwrap();

        let local_tip = tip(&b, "thoughts/agent-X");
        assert!(matches!(
            b.pull("origin", true),
            Err(CairnError::CommandExecution { .. })
        ));
        assert_eq!(tip(&b, "thoughts/agent-X"), local_tip);
    }

    #[test]
    fn archive_writes_zip() {
        let (dir, mut git) = git_repo();
        git.write_and_commit("a.txt", "a", "first").unwrap();
        let out = dir.path().join("exports").join("snap.zip");
        git.archive(ArchiveFormat::Zip, &out).unwrap();
        assert!(out.is_file());
    }
}
