use cairn_core::time_fmt::{compact_stamp, rfc3339};
use cairn_core::{CairnError, Result};
use cairn_derive::{
    AgentThoughtFile, AnalysisFile, BatchSummaryFile, ANALYSIS_DIR, SUMMARIES_DIR, THOUGHTS_DIR,
};
use cairn_vcs::RepoBackend;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::OffsetDateTime;

use crate::config::Config;

// ── Formats and outcomes ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Zip,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Zip => "zip",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CairnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "zip" => Ok(Self::Zip),
            other => Err(CairnError::validation(
                "format",
                format!("unknown export format {other:?} (expected json or zip)"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    /// Files that could not be read or parsed and were left out.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No remote configured; nothing was attempted.
    Skipped,
    Pushed,
    Pulled,
}

// ── Snapshot document ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub exported_at: String,
    pub repo_path: String,
    pub generator: String,
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatistics {
    pub total_commits: usize,
    pub branch_count: usize,
    pub tag_count: usize,
    pub daily_commit_count: u32,
    pub pending_thoughts: usize,
}

/// Everything persisted in the repository, as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub statistics: SnapshotStatistics,
    pub thoughts: Vec<AgentThoughtFile>,
    pub summaries: Vec<BatchSummaryFile>,
    pub analysis: Vec<AnalysisFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Snapshot {
    /// Every batch id seen in any persisted document.
    pub fn batch_ids(&self) -> BTreeSet<String> {
        self.thoughts
            .iter()
            .map(|t| t.batch_id.clone())
            .chain(self.summaries.iter().map(|s| s.batch_id.clone()))
            .chain(self.analysis.iter().map(|a| a.batch_id.clone()))
            .collect()
    }

    pub fn agent_ids(&self) -> BTreeSet<String> {
        self.thoughts
            .iter()
            .map(|t| t.agent_id.clone())
            .chain(self.summaries.iter().flat_map(|s| s.agents.iter().cloned()))
            .collect()
    }

    pub fn thought_count(&self) -> usize {
        self.thoughts.iter().map(|t| t.thoughts.len()).sum()
    }
}

/// Runtime counters that live outside the repository.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LiveCounters {
    pub daily_commit_count: u32,
    pub pending_thoughts: usize,
}

// ── Assembly ──

fn to_export_error(e: CairnError) -> CairnError {
    match e {
        CairnError::Export(_) => e,
        other => CairnError::Export(other.to_string()),
    }
}

/// Read every file under `dir` accepted by `keep`, across all branches.
/// The same path on several branches is read once.
fn collect_documents<B, T>(
    backend: &B,
    branches: &[String],
    dir: &str,
    keep: impl Fn(&str) -> bool,
    warnings: &mut Vec<String>,
) -> Result<Vec<T>>
where
    B: RepoBackend + ?Sized,
    T: DeserializeOwned,
{
    let mut found: BTreeMap<String, &str> = BTreeMap::new();
    for branch in branches {
        for path in backend.list_files(branch, dir).map_err(to_export_error)? {
            if keep(&path) {
                found.entry(path).or_insert(branch.as_str());
            }
        }
    }

    let mut docs = Vec::with_capacity(found.len());
    for (path, branch) in found {
        let parsed = backend
            .read_file(branch, &path)
            .and_then(|s| serde_json::from_str::<T>(&s).map_err(CairnError::from));
        match parsed {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                tracing::warn!(%path, branch, error = %e, "skipping unreadable file in export");
                warnings.push(format!("{branch}:{path}: {e}"));
            }
        }
    }
    Ok(docs)
}

pub(crate) fn build_snapshot<B: RepoBackend + ?Sized>(
    backend: &B,
    config: &Config,
    counters: LiveCounters,
    now: OffsetDateTime,
) -> Result<Snapshot> {
    let branches = backend.list_branches().map_err(to_export_error)?;
    let tags = backend.list_tags().map_err(to_export_error)?;
    let total_commits = backend.commit_count().map_err(to_export_error)?;
    let mut warnings = Vec::new();

    let agent_prefix = format!("{THOUGHTS_DIR}/agent-");
    let summaries_prefix = format!("{SUMMARIES_DIR}/");
    let analysis_prefix = format!("{ANALYSIS_DIR}/patterns-");
    let is_json = |p: &str| p.ends_with(".json");

    let mut thoughts: Vec<AgentThoughtFile> = collect_documents(
        backend,
        &branches,
        THOUGHTS_DIR,
        |p| p.starts_with(&agent_prefix) && is_json(p),
        &mut warnings,
    )?;
    let mut summaries: Vec<BatchSummaryFile> = collect_documents(
        backend,
        &branches,
        SUMMARIES_DIR,
        |p| p.starts_with(&summaries_prefix) && is_json(p),
        &mut warnings,
    )?;
    let mut analysis: Vec<AnalysisFile> = collect_documents(
        backend,
        &branches,
        ANALYSIS_DIR,
        |p| p.starts_with(&analysis_prefix) && is_json(p),
        &mut warnings,
    )?;

    thoughts.sort_by(|a, b| (&a.timestamp, &a.agent_id).cmp(&(&b.timestamp, &b.agent_id)));
    summaries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    analysis.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    Ok(Snapshot {
        metadata: SnapshotMetadata {
            exported_at: rfc3339(now),
            repo_path: config.repo_path.display().to_string(),
            generator: format!("cairn {}", env!("CARGO_PKG_VERSION")),
            config: config.clone(),
        },
        statistics: SnapshotStatistics {
            total_commits,
            branch_count: branches.len(),
            tag_count: tags.len(),
            daily_commit_count: counters.daily_commit_count,
            pending_thoughts: counters.pending_thoughts,
        },
        thoughts,
        summaries,
        analysis,
        warnings,
    })
}

/// `exports/thought-history-{stamp}.{ext}`
pub fn export_path(exports_dir: &Path, format: ExportFormat, now: OffsetDateTime) -> PathBuf {
    exports_dir.join(format!(
        "thought-history-{}.{}",
        compact_stamp(now),
        format.extension()
    ))
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CairnError::Export(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| CairnError::Export(format!("cannot parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_vcs::{FileWrite, MemoryBackend};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-10-15 09:30:00 UTC);

    #[test]
    fn format_parsing() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("ZIP".parse::<ExportFormat>().unwrap(), ExportFormat::Zip);
        assert!("tar".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn export_path_uses_stamp() {
        let p = export_path(Path::new("/r/exports"), ExportFormat::Zip, NOW);
        assert_eq!(
            p,
            PathBuf::from("/r/exports/thought-history-20261015T093000Z.zip")
        );
    }

    #[test]
    fn unreadable_documents_become_warnings() {
        let mut mem = MemoryBackend::new();
        mem.commit_files(
            &[
                FileWrite::new("thoughts/summaries/batch_bad.json", "{not json"),
                FileWrite::new("thoughts/summaries/README.md", "notes"),
            ],
            "seed",
        )
        .unwrap();
        let counters = LiveCounters {
            daily_commit_count: 0,
            pending_thoughts: 2,
        };
        let snap = build_snapshot(&mem, &Config::default(), counters, NOW).unwrap();
        assert!(snap.summaries.is_empty());
        assert_eq!(snap.warnings.len(), 1);
        assert!(snap.warnings[0].contains("batch_bad.json"));
        assert_eq!(snap.statistics.pending_thoughts, 2);
        assert_eq!(snap.statistics.total_commits, 1);
        assert_eq!(snap.statistics.branch_count, 1);
    }
}
