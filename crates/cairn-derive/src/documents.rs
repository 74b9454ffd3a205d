//! The JSON documents committed for every batch, and where they live.

use cairn_core::time_fmt::rfc3339;
use cairn_core::{partition_by_agent, Batch, ThoughtRecord};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::analytics::{analyze, mean, Insights, Patterns, HIGH_CONFIDENCE};

/// Main-branch summary counts records strictly above / below these.
pub const SUMMARY_HIGH_CONFIDENCE: f64 = 0.7;
pub const SUMMARY_LOW_CONFIDENCE: f64 = 0.3;

// ── Paths ──

pub const THOUGHTS_DIR: &str = "thoughts";
pub const SUMMARIES_DIR: &str = "thoughts/summaries";
pub const ANALYSIS_DIR: &str = "analysis";
pub const COLLABORATORS_DIR: &str = "collaborators";

pub fn agent_file_path(agent_id: &str, batch_id: &str) -> String {
    format!("{THOUGHTS_DIR}/agent-{agent_id}/{batch_id}.json")
}

pub fn summary_file_path(batch_id: &str) -> String {
    format!("{SUMMARIES_DIR}/{batch_id}.json")
}

pub fn analysis_file_path(batch_id: &str) -> String {
    format!("{ANALYSIS_DIR}/patterns-{batch_id}.json")
}

pub fn collaborator_file_path(agent_id: &str) -> String {
    format!("{COLLABORATORS_DIR}/{agent_id}.json")
}

// ── Documents ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub total_thoughts: usize,
    pub average_confidence: f64,
    pub average_quality: f64,
}

/// `thoughts/agent-{id}/{batchId}.json` on the agent's branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentThoughtFile {
    pub agent_id: String,
    pub batch_id: String,
    pub timestamp: String,
    pub thoughts: Vec<ThoughtRecord>,
    pub summary: AgentSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummaryStats {
    pub average_confidence: f64,
    pub average_quality: f64,
    pub high_confidence_thoughts: usize,
    pub low_confidence_thoughts: usize,
}

/// `thoughts/summaries/{batchId}.json` on `main`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummaryFile {
    pub batch_id: String,
    pub timestamp: String,
    pub total_thoughts: usize,
    pub agents: Vec<String>,
    pub summary: BatchSummaryStats,
}

/// `analysis/patterns-{batchId}.json` on `analysis/patterns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFile {
    pub batch_id: String,
    pub timestamp: String,
    pub patterns: Patterns,
    pub insights: Insights,
}

/// `collaborators/{agentId}.json` on `main`, kept when collaboration is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorFile {
    pub agent_id: String,
    pub first_seen: String,
    pub last_seen: String,
    pub batch_count: usize,
    pub total_thoughts: usize,
    pub last_batch_id: String,
    pub last_batch_thoughts: usize,
}

// ── Builders ──

pub fn build_agent_file(
    batch_id: &str,
    agent_id: &str,
    records: &[&ThoughtRecord],
    now: OffsetDateTime,
) -> AgentThoughtFile {
    AgentThoughtFile {
        agent_id: agent_id.to_string(),
        batch_id: batch_id.to_string(),
        timestamp: rfc3339(now),
        thoughts: records.iter().map(|r| (*r).clone()).collect(),
        summary: AgentSummary {
            total_thoughts: records.len(),
            average_confidence: mean(records.iter().map(|r| r.confidence())),
            average_quality: mean(records.iter().map(|r| r.reasoning_quality())),
        },
    }
}

pub fn build_batch_summary(batch: &Batch, now: OffsetDateTime) -> BatchSummaryFile {
    let records = &batch.records;
    BatchSummaryFile {
        batch_id: batch.batch_id.clone(),
        timestamp: rfc3339(now),
        total_thoughts: records.len(),
        agents: partition_by_agent(records)
            .keys()
            .map(|a| a.to_string())
            .collect(),
        summary: BatchSummaryStats {
            average_confidence: mean(records.iter().map(|r| r.confidence())),
            average_quality: mean(records.iter().map(|r| r.reasoning_quality())),
            high_confidence_thoughts: records
                .iter()
                .filter(|r| r.confidence() > SUMMARY_HIGH_CONFIDENCE)
                .count(),
            low_confidence_thoughts: records
                .iter()
                .filter(|r| r.confidence() < SUMMARY_LOW_CONFIDENCE)
                .count(),
        },
    }
}

pub fn build_analysis_file(batch: &Batch, now: OffsetDateTime) -> AnalysisFile {
    let analysis = analyze(&batch.records);
    AnalysisFile {
        batch_id: batch.batch_id.clone(),
        timestamp: rfc3339(now),
        patterns: analysis.patterns,
        insights: analysis.insights,
    }
}

/// Fold one batch's records for `agent_id` into the collaborator entry.
/// Re-folding the same batch (a retried flush) replaces its earlier count
/// instead of adding to it.
pub fn update_collaborator(
    existing: Option<CollaboratorFile>,
    agent_id: &str,
    batch_id: &str,
    thoughts_in_batch: usize,
    now: OffsetDateTime,
) -> CollaboratorFile {
    let now = rfc3339(now);
    match existing {
        Some(mut c) if c.last_batch_id == batch_id => {
            c.last_seen = now;
            c.total_thoughts =
                c.total_thoughts.saturating_sub(c.last_batch_thoughts) + thoughts_in_batch;
            c.last_batch_thoughts = thoughts_in_batch;
            c
        }
        Some(mut c) => {
            c.last_seen = now;
            c.batch_count += 1;
            c.total_thoughts += thoughts_in_batch;
            c.last_batch_id = batch_id.to_string();
            c.last_batch_thoughts = thoughts_in_batch;
            c
        }
        None => CollaboratorFile {
            agent_id: agent_id.to_string(),
            first_seen: now.clone(),
            last_seen: now,
            batch_count: 1,
            total_thoughts: thoughts_in_batch,
            last_batch_id: batch_id.to_string(),
            last_batch_thoughts: thoughts_in_batch,
        },
    }
}

/// Whether an agent group earns a tag.
pub fn has_high_confidence(records: &[&ThoughtRecord]) -> bool {
    records.iter().any(|r| r.confidence() > HIGH_CONFIDENCE)
}
