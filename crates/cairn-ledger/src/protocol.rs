//! The per-batch write sequence: one commit per agent branch, one summary
//! commit on `main`, one analysis commit on `analysis/patterns`.
//!
//! Every step records how many records it has durably committed in a
//! [`BatchProgress`]. A retried flush carries the same progress, skips
//! steps whose coverage is already complete, and rewrites the rest.

use cairn_core::naming::{agent_branch, agent_tag, ANALYSIS_PATTERNS_BRANCH, MAIN_BRANCH};
use cairn_core::{partition_by_agent, Batch, BatchId, CairnError, Result};
use cairn_derive::{
    build_agent_file, build_analysis_file, build_batch_summary, agent_file_path,
    analysis_file_path, collaborator_file_path, has_high_confidence, summary_file_path,
    update_collaborator, CollaboratorFile, COLLABORATORS_DIR, HIGH_CONFIDENCE,
};
use cairn_vcs::{FileWrite, RepoBackend};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Agent(String),
    Summary,
    Analysis,
}

/// Completion checkpoint for one logical batch. Spilled next to the pending
/// records on shutdown so a restart resumes under the same batch id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub batch_id: BatchId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "step_list")]
    steps: BTreeMap<Step, usize>,
}

// JSON object keys must be strings; store the map as `[[step, records], ..]`.
mod step_list {
    use super::Step;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        steps: &BTreeMap<Step, usize>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        s.collect_seq(steps.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<BTreeMap<Step, usize>, D::Error> {
        Ok(Vec::<(Step, usize)>::deserialize(d)?.into_iter().collect())
    }
}

impl BatchProgress {
    pub fn new(batch_id: impl Into<BatchId>, created_at: OffsetDateTime) -> Self {
        Self {
            batch_id: batch_id.into(),
            created_at,
            steps: BTreeMap::new(),
        }
    }

    /// Whether `step` already committed exactly `records` records.
    pub fn is_covered(&self, step: &Step, records: usize) -> bool {
        self.steps.get(step) == Some(&records)
    }

    pub fn mark(&mut self, step: Step, records: usize) {
        self.steps.insert(step, records);
    }

    /// True when no step has committed anything yet.
    pub fn is_fresh(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Tags known to exist, kept in sync as the protocol runs.
#[derive(Debug, Clone, Default)]
pub struct RefCache {
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRef {
    pub branch: String,
    pub message: String,
}

/// What one successful flush wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub batch_id: BatchId,
    pub agents: Vec<String>,
    pub thought_count: usize,
    pub commits: Vec<CommitRef>,
    pub tags: Vec<String>,
    /// The batch had committed some steps in an earlier, failed attempt.
    pub resumed: bool,
}

pub fn agent_commit_message(agent_id: &str, batch_id: &str) -> String {
    format!("Add thoughts for agent {agent_id} - batch {batch_id}")
}

pub fn summary_commit_message(batch_id: &str) -> String {
    format!("Add thought summary - batch {batch_id}")
}

pub fn analysis_commit_message(batch_id: &str) -> String {
    format!("Add pattern analysis - batch {batch_id}")
}

struct Writer<'a, B: RepoBackend + ?Sized> {
    backend: &'a mut B,
    refs: &'a mut RefCache,
    report: CommitReport,
}

impl<B: RepoBackend + ?Sized> Writer<'_, B> {
    fn switch(&mut self, branch: &str) -> Result<()> {
        self.backend.create_or_switch_branch(branch)
    }

    fn commit(&mut self, branch: &str, files: &[FileWrite], message: String) -> Result<()> {
        self.backend.commit_files(files, &message)?;
        tracing::debug!(branch, %message, "committed");
        self.report.commits.push(CommitRef {
            branch: branch.to_string(),
            message,
        });
        Ok(())
    }

    fn tag(&mut self, name: String, message: &str) -> Result<()> {
        self.backend.create_tag(&name, message)?;
        tracing::info!(tag = %name, "tagged high-confidence batch");
        self.refs.tags.insert(name.clone());
        self.report.tags.push(name);
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

fn read_collaborator<B: RepoBackend + ?Sized>(
    backend: &B,
    existing: &BTreeSet<String>,
    agent_id: &str,
) -> Option<CollaboratorFile> {
    let path = collaborator_file_path(agent_id);
    if !existing.contains(&path) {
        return None;
    }
    match backend
        .read_file(MAIN_BRANCH, &path)
        .and_then(|s| serde_json::from_str(&s).map_err(CairnError::from))
    {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(%path, error = %e, "unreadable collaborator file, starting over");
            None
        }
    }
}

/// Run the commit protocol for `batch`, resuming from `progress`.
///
/// On error, `progress` holds every step that did commit; pass it back in
/// with the same batch id to resume.
pub fn commit_batch<B: RepoBackend + ?Sized>(
    backend: &mut B,
    config: &Config,
    batch: &Batch,
    progress: &mut BatchProgress,
    refs: &mut RefCache,
    now: OffsetDateTime,
) -> Result<CommitReport> {
    let batch_id = batch.batch_id.as_str();
    let groups = partition_by_agent(&batch.records);
    let resumed = !progress.is_fresh();

    let mut w = Writer {
        backend,
        refs,
        report: CommitReport {
            batch_id: batch.batch_id.clone(),
            agents: groups.keys().map(|a| a.to_string()).collect(),
            thought_count: batch.len(),
            commits: Vec::new(),
            tags: Vec::new(),
            resumed,
        },
    };

    let branch_for = |name: String| {
        if config.enable_branches {
            name
        } else {
            MAIN_BRANCH.to_string()
        }
    };

    // 1. One commit per agent branch, plus a tag on high confidence.
    let today = now.to_offset(time::UtcOffset::UTC).date();
    for (agent_id, records) in &groups {
        let branch = branch_for(agent_branch(&config.branch_prefix, agent_id));
        let step = Step::Agent(agent_id.to_string());
        let mut on_branch = false;

        if !progress.is_covered(&step, records.len()) {
            w.switch(&branch)?;
            on_branch = true;
            let file = build_agent_file(batch_id, agent_id, records, now);
            w.commit(
                &branch,
                &[FileWrite::new(agent_file_path(agent_id, batch_id), to_json(&file)?)],
                agent_commit_message(agent_id, batch_id),
            )?;
            progress.mark(step, records.len());
        }

        let tag = agent_tag(agent_id, today);
        if config.enable_tags && has_high_confidence(records) && !w.refs.tags.contains(&tag) {
            if !on_branch {
                w.switch(&branch)?;
            }
            let strong = records
                .iter()
                .filter(|r| r.confidence() > HIGH_CONFIDENCE)
                .count();
            let message = format!(
                "High-confidence thoughts from agent {agent_id}: {strong} above {HIGH_CONFIDENCE} - batch {batch_id}"
            );
            w.tag(tag, &message)?;
        }
    }

    // 2. Batch summary on main.
    if !progress.is_covered(&Step::Summary, batch.len()) {
        w.switch(MAIN_BRANCH)?;
        let summary = build_batch_summary(batch, now);
        let mut files = vec![FileWrite::new(summary_file_path(batch_id), to_json(&summary)?)];
        if config.enable_collaboration {
            let existing: BTreeSet<String> = w
                .backend
                .list_files(MAIN_BRANCH, COLLABORATORS_DIR)?
                .into_iter()
                .collect();
            for (agent_id, records) in &groups {
                let prior = read_collaborator(&*w.backend, &existing, agent_id);
                let entry = update_collaborator(prior, agent_id, batch_id, records.len(), now);
                files.push(FileWrite::new(
                    collaborator_file_path(agent_id),
                    to_json(&entry)?,
                ));
            }
        }
        w.commit(MAIN_BRANCH, &files, summary_commit_message(batch_id))?;
        progress.mark(Step::Summary, batch.len());
    }

    // 3. Pattern analysis.
    if !progress.is_covered(&Step::Analysis, batch.len()) {
        let branch = branch_for(ANALYSIS_PATTERNS_BRANCH.to_string());
        w.switch(&branch)?;
        let analysis = build_analysis_file(batch, now);
        w.commit(
            &branch,
            &[FileWrite::new(analysis_file_path(batch_id), to_json(&analysis)?)],
            analysis_commit_message(batch_id),
        )?;
        progress.mark(Step::Analysis, batch.len());
    }

    Ok(w.report)
}
