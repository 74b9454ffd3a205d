//! `ThoughtHistory`: the single owner of one repository's buffer, scheduler,
//! backend and lifecycle. Every operation takes `&mut self`, so commit runs,
//! exports and remote sync on one instance can never interleave.

use cairn_core::naming::MAIN_BRANCH;
use cairn_core::time_fmt::{now_utc, rfc3339};
use cairn_core::{new_batch_id, Batch, CairnError, Result, ThoughtRecord};
use cairn_store::{
    read_json_opt, read_jsonl, try_lock_file, write_json_atomic, write_jsonl_atomic, LockGuard,
};
use cairn_vcs::{ArchiveFormat, FileWrite, GitCli, RepoBackend};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::config::Config;
use crate::export::{
    build_snapshot, export_path, ExportFormat, ExportOutcome, LiveCounters, Snapshot, SyncOutcome,
};
use crate::paths::CairnPaths;
use crate::protocol::{commit_batch, BatchProgress, CommitReport, RefCache};
use crate::scheduler::{CommitScheduler, SchedulerState};

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Active,
    Draining,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: LifecycleState,
    pub has_changes: bool,
    pub current_branch: String,
    pub branches: Vec<String>,
    pub tags: Vec<String>,
    pub pending_thoughts: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_commit_at: Option<OffsetDateTime>,
    pub daily_commit_count: u32,
    /// Batch id of a flush that failed partway and will be resumed.
    pub in_flight_batch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownReport {
    pub final_commit: Option<CommitReport>,
    /// Records written to the spill file for the next session.
    pub spilled: usize,
    pub pushed: bool,
    pub remote_error: Option<String>,
}

const SKELETON_MESSAGE: &str = "Initialize thought history repository";

fn readme() -> String {
    "# Thought history\n\
     \n\
     Agent thoughts recorded by cairn.\n\
     \n\
     - `thoughts/agent-<id>/` on each agent branch: raw thoughts per batch\n\
     - `thoughts/summaries/` on `main`: one summary per batch\n\
     - `analysis/` on `analysis/patterns`: distributions and insights per batch\n\
     - `collaborators/` on `main`: per-agent participation, when enabled\n"
        .to_string()
}

const GITIGNORE: &str = ".cairn/\nexports/\n";

pub struct ThoughtHistory<B: RepoBackend = GitCli> {
    config: Config,
    paths: CairnPaths,
    backend: B,
    state: LifecycleState,
    pending: Vec<ThoughtRecord>,
    scheduler: CommitScheduler,
    in_flight: Option<BatchProgress>,
    refs: RefCache,
    clock: Clock,
    lock: Option<LockGuard>,
}

impl ThoughtHistory<GitCli> {
    /// A history backed by the `git` binary at `config.repo_path`.
    pub fn new(config: Config) -> Self {
        let backend = GitCli::new(&config.repo_path)
            .with_identity(config.author_name.clone(), config.author_email.clone());
        Self::with_backend(config, backend)
    }
}

impl<B: RepoBackend> ThoughtHistory<B> {
    pub fn with_backend(config: Config, backend: B) -> Self {
        let scheduler = CommitScheduler::new(
            config.commit_interval(),
            config.max_commits_per_day,
            SchedulerState::default(),
        );
        Self {
            paths: CairnPaths::discover(&config.repo_path),
            config,
            backend,
            state: LifecycleState::Uninitialized,
            pending: Vec::new(),
            scheduler,
            in_flight: None,
            refs: RefCache::default(),
            clock: Arc::new(now_utc),
            lock: None,
        }
    }

    /// Replace the wall clock, e.g. with a fixed or stepping one in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> OffsetDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &CairnPaths {
        &self.paths
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_batch(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|p| p.batch_id.as_str())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn now(&self) -> OffsetDateTime {
        (self.clock)()
    }

    fn require(&self, operation: &str, allowed: &[LifecycleState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CairnError::InvalidState {
                operation: operation.to_string(),
                state: self.state.to_string(),
            })
        }
    }

    // ── Lifecycle ──

    /// Create or reopen the repository and move to `Active`. Any failure is
    /// reported as an initialization error and leaves the instance `Closed`.
    pub fn initialize(&mut self) -> Result<()> {
        self.require("initialize", &[LifecycleState::Uninitialized])?;
        self.state = LifecycleState::Initializing;
        match self.open_repository() {
            Ok(()) => {
                self.state = LifecycleState::Active;
                tracing::info!(
                    repo = %self.paths.root.display(),
                    pending = self.pending.len(),
                    daily_commits = self.scheduler.daily_commit_count(),
                    "thought history active"
                );
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Closed;
                self.lock = None;
                Err(match e {
                    CairnError::Initialization(_) => e,
                    other => CairnError::Initialization(other.to_string()),
                })
            }
        }
    }

    fn open_repository(&mut self) -> Result<()> {
        self.config.validate()?;
        self.paths.ensure_layout()?;
        self.lock = Some(try_lock_file(&self.paths.lock_file)?);

        let reopen = self.backend.is_initialized() && !self.backend.list_branches()?.is_empty();
        self.backend.init()?;
        if reopen {
            tracing::debug!("existing repository, skipping skeleton");
        } else {
            let files = [
                FileWrite::new("README.md", readme()),
                FileWrite::new(".gitignore", GITIGNORE),
                FileWrite::new("config.json", self.config.to_json_pretty()? + "\n"),
                FileWrite::new("thoughts/.gitkeep", ""),
                FileWrite::new("analysis/.gitkeep", ""),
                FileWrite::new("collaborators/.gitkeep", ""),
            ];
            self.backend.commit_files(&files, SKELETON_MESSAGE)?;
        }

        if let Some(url) = self.config.remote_url.as_deref().filter(|_| self.config.has_remote()) {
            self.backend.set_remote(&self.config.remote_name, url)?;
        }
        self.backend.create_or_switch_branch(MAIN_BRANCH)?;
        self.refresh_refs()?;

        let saved: SchedulerState = read_json_opt(&self.paths.state_json)?.unwrap_or_default();
        self.scheduler = CommitScheduler::new(
            self.config.commit_interval(),
            self.config.max_commits_per_day,
            saved,
        );
        self.pending = read_jsonl(&self.paths.pending_jsonl)?;
        self.in_flight = read_json_opt(&self.paths.inflight_json)?;
        if !self.pending.is_empty() {
            tracing::info!(records = self.pending.len(), "restored spilled thoughts");
        }
        Ok(())
    }

    fn refresh_refs(&mut self) -> Result<()> {
        self.refs = RefCache {
            tags: self.backend.list_tags()?.into_iter().collect(),
        };
        Ok(())
    }

    /// Drain and close: force one final flush (within today's quota), spill
    /// whatever could not be committed, push if a remote is configured.
    ///
    /// A failed final flush is returned as the error, after the records are
    /// spilled and the instance is closed.
    pub fn shutdown(&mut self) -> Result<ShutdownReport> {
        self.require("shutdown", &[LifecycleState::Active])?;
        self.state = LifecycleState::Draining;
        let mut report = ShutdownReport::default();
        let mut failure = None;

        match self.force_flush() {
            Ok(commit) => report.final_commit = commit,
            Err(e) => failure = Some(e),
        }

        if !self.pending.is_empty() {
            match self.spill() {
                Ok(()) => report.spilled = self.pending.len(),
                Err(e) => {
                    tracing::error!(error = %e, "could not spill pending thoughts");
                    failure.get_or_insert(e);
                }
            }
        }

        if self.config.has_remote() {
            match self.push_to_remote() {
                Ok(outcome) => report.pushed = outcome == SyncOutcome::Pushed,
                Err(e) => report.remote_error = Some(e.to_string()),
            }
        }

        self.state = LifecycleState::Closed;
        self.lock = None;
        tracing::info!(
            spilled = report.spilled,
            final_commit = report.final_commit.is_some(),
            "thought history closed"
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Close without flushing or pushing: the buffer (and any in-flight
    /// checkpoint) is spilled for the next session. Returns the spilled count.
    pub fn close(&mut self) -> Result<usize> {
        self.require("close", &[LifecycleState::Active])?;
        let spilled = self.pending.len();
        if spilled > 0 {
            self.spill()?;
        }
        self.state = LifecycleState::Closed;
        self.lock = None;
        tracing::debug!(spilled, "thought history closed without flush");
        Ok(spilled)
    }

    fn spill(&self) -> Result<()> {
        write_jsonl_atomic(&self.paths.pending_jsonl, &self.pending)?;
        if let Some(progress) = &self.in_flight {
            write_json_atomic(&self.paths.inflight_json, progress)?;
        }
        tracing::warn!(
            records = self.pending.len(),
            path = %self.paths.pending_jsonl.display(),
            "pending thoughts spilled for the next session"
        );
        Ok(())
    }

    fn clear_spill(&self) {
        for path in [&self.paths.pending_jsonl, &self.paths.inflight_json] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove spill file");
                }
            }
        }
    }

    // ── Ingest and flush ──

    /// Buffer one record, then flush if the scheduler says so.
    pub fn add_thought(&mut self, record: ThoughtRecord) -> Result<Option<CommitReport>> {
        self.add_thoughts([record])
    }

    /// Buffer several records and evaluate the scheduler once. Nothing is
    /// buffered if any record is invalid.
    pub fn add_thoughts(
        &mut self,
        records: impl IntoIterator<Item = ThoughtRecord>,
    ) -> Result<Option<CommitReport>> {
        self.require("add thoughts", &[LifecycleState::Active])?;
        let records: Vec<ThoughtRecord> = records.into_iter().collect();
        for record in &records {
            record.validate()?;
        }
        self.pending.extend(records);
        self.flush()
    }

    /// Whether the buffer is due for a flush right now.
    pub fn should_commit(&mut self) -> bool {
        let now = self.now();
        self.scheduler.should_commit(self.pending.len(), now)
    }

    /// Commit the buffer if the interval has elapsed and quota remains.
    pub fn flush(&mut self) -> Result<Option<CommitReport>> {
        self.require("flush", &[LifecycleState::Active])?;
        if !self.should_commit() {
            return Ok(None);
        }
        self.commit_pending().map(Some)
    }

    /// Commit the buffer ignoring the interval. The daily quota still holds.
    pub fn force_flush(&mut self) -> Result<Option<CommitReport>> {
        self.require("flush", &[LifecycleState::Active, LifecycleState::Draining])?;
        let now = self.now();
        if !self.scheduler.may_force(self.pending.len(), now) {
            return Ok(None);
        }
        self.commit_pending().map(Some)
    }

    fn commit_pending(&mut self) -> Result<CommitReport> {
        let now = self.now();
        let mut progress = self
            .in_flight
            .take()
            .unwrap_or_else(|| BatchProgress::new(new_batch_id(), now));
        let batch = Batch::with_id(
            progress.batch_id.clone(),
            std::mem::take(&mut self.pending),
            progress.created_at,
        );

        let result = commit_batch(
            &mut self.backend,
            &self.config,
            &batch,
            &mut progress,
            &mut self.refs,
            now,
        );
        match result {
            Ok(report) => {
                self.scheduler.record_commit(now);
                if let Err(e) = write_json_atomic(&self.paths.state_json, self.scheduler.state()) {
                    tracing::warn!(error = %e, "could not persist scheduler state");
                }
                self.clear_spill();
                tracing::info!(
                    batch_id = %report.batch_id,
                    thoughts = report.thought_count,
                    agents = report.agents.len(),
                    commits = report.commits.len(),
                    tags = report.tags.len(),
                    "batch committed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(batch_id = %batch.batch_id, error = %e, "batch commit failed, records kept");
                self.pending = batch.records;
                self.in_flight = Some(progress);
                Err(e)
            }
        }
    }

    // ── Export and sync ──

    /// Everything committed so far, assembled from every branch.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.require("snapshot", &[LifecycleState::Active, LifecycleState::Draining])?;
        let counters = LiveCounters {
            daily_commit_count: self.scheduler.daily_commit_count(),
            pending_thoughts: self.pending.len(),
        };
        build_snapshot(&self.backend, &self.config, counters, self.now())
    }

    /// Write `exports/thought-history-{stamp}.{zip|json}` and return its path.
    pub fn export_repository(&mut self, format: ExportFormat) -> Result<ExportOutcome> {
        self.require("export", &[LifecycleState::Active])?;
        let path = export_path(&self.paths.exports_dir, format, self.now());
        let warnings = match format {
            ExportFormat::Zip => {
                self.backend
                    .archive(ArchiveFormat::Zip, &path)
                    .map_err(|e| match e {
                        CairnError::Unsupported(_) => e,
                        other => CairnError::Export(other.to_string()),
                    })?;
                Vec::new()
            }
            ExportFormat::Json => {
                let snapshot = self.snapshot()?;
                write_json_atomic(&path, &snapshot).map_err(|e| {
                    CairnError::Export(format!("cannot write {}: {e}", path.display()))
                })?;
                snapshot.warnings
            }
        };
        if !warnings.is_empty() {
            tracing::warn!(skipped = warnings.len(), "export is incomplete");
        }
        tracing::info!(path = %path.display(), "exported");
        Ok(ExportOutcome { path, warnings })
    }

    /// Push all branches and tags. Skipped with a warning when no remote is
    /// configured; a failure comes back as `RemoteSync` and never touches
    /// local state.
    pub fn push_to_remote(&mut self) -> Result<SyncOutcome> {
        self.require("push", &[LifecycleState::Active, LifecycleState::Draining])?;
        if !self.config.has_remote() {
            tracing::warn!("no remote configured, skipping push");
            return Ok(SyncOutcome::Skipped);
        }
        let remote = self.config.remote_name.clone();
        self.backend.push(&remote, true, true).map_err(|e| {
            tracing::warn!(%remote, error = %e, "push failed");
            CairnError::RemoteSync(e.to_string())
        })?;
        tracing::info!(%remote, "pushed");
        Ok(SyncOutcome::Pushed)
    }

    pub fn pull_from_remote(&mut self) -> Result<SyncOutcome> {
        self.require("pull", &[LifecycleState::Active])?;
        if !self.config.has_remote() {
            tracing::warn!("no remote configured, skipping pull");
            return Ok(SyncOutcome::Skipped);
        }
        let remote = self.config.remote_name.clone();
        self.backend.pull(&remote, true).map_err(|e| {
            tracing::warn!(%remote, error = %e, "pull failed");
            CairnError::RemoteSync(e.to_string())
        })?;
        self.refresh_refs()?;
        tracing::info!(%remote, "pulled");
        Ok(SyncOutcome::Pulled)
    }

    pub fn get_status(&self) -> Result<StatusReport> {
        self.require("read status", &[LifecycleState::Active, LifecycleState::Draining])?;
        let repo = self.backend.status()?;
        Ok(StatusReport {
            state: self.state,
            has_changes: repo.has_changes(),
            current_branch: repo.current_branch,
            branches: repo.branches,
            tags: repo.tags,
            pending_thoughts: self.pending.len(),
            last_commit_at: self.scheduler.last_commit_at(),
            daily_commit_count: self.scheduler.daily_commit_count(),
            in_flight_batch: self.in_flight_batch().map(str::to_string),
        })
    }
}

impl<B: RepoBackend> Drop for ThoughtHistory<B> {
    fn drop(&mut self) {
        if self.state == LifecycleState::Active && !self.pending.is_empty() {
            if let Err(e) = self.spill() {
                tracing::error!(error = %e, records = self.pending.len(), "pending thoughts lost on drop");
            }
        }
    }
}

impl StatusReport {
    pub fn last_commit_display(&self) -> String {
        self.last_commit_at
            .map(rfc3339)
            .unwrap_or_else(|| "never".to_string())
    }
}
