use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CairnError, Result};
use crate::naming::validate_agent_id;

/// Quality annotations attached to every thought.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtMetadata {
    pub reasoning_quality: f64,
    pub thought_complexity: f64,
}

impl ThoughtMetadata {
    pub fn new(reasoning_quality: f64, thought_complexity: f64) -> Self {
        Self {
            reasoning_quality,
            thought_complexity,
        }
    }
}

/// One agent-produced observation. Construction validates every field, and
/// deserialization goes through the same checks, so a `ThoughtRecord` that
/// exists is always in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawThoughtRecord")]
pub struct ThoughtRecord {
    agent_id: String,
    thought: String,
    confidence: f64,
    metadata: ThoughtMetadata,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThoughtRecord {
    agent_id: String,
    #[serde(default)]
    thought: String,
    confidence: f64,
    metadata: ThoughtMetadata,
    #[serde(default, with = "time::serde::rfc3339::option")]
    timestamp: Option<OffsetDateTime>,
}

impl TryFrom<RawThoughtRecord> for ThoughtRecord {
    type Error = CairnError;

    fn try_from(raw: RawThoughtRecord) -> Result<Self> {
        ThoughtRecord::at(
            raw.agent_id,
            raw.thought,
            raw.confidence,
            raw.metadata,
            raw.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
        )
    }
}

fn check_unit(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(CairnError::validation(
            field,
            format!("{value} is outside [0, 1]"),
        ));
    }
    Ok(())
}

impl ThoughtRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        agent_id: impl Into<String>,
        thought: impl Into<String>,
        confidence: f64,
        metadata: ThoughtMetadata,
    ) -> Result<Self> {
        Self::at(
            agent_id,
            thought,
            confidence,
            metadata,
            OffsetDateTime::now_utc(),
        )
    }

    /// Create a record with an explicit timestamp.
    pub fn at(
        agent_id: impl Into<String>,
        thought: impl Into<String>,
        confidence: f64,
        metadata: ThoughtMetadata,
        timestamp: OffsetDateTime,
    ) -> Result<Self> {
        let record = Self {
            agent_id: agent_id.into(),
            thought: thought.into(),
            confidence,
            metadata,
            timestamp,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<()> {
        validate_agent_id(&self.agent_id)?;
        check_unit("confidence", self.confidence)?;
        check_unit("metadata.reasoningQuality", self.metadata.reasoning_quality)?;
        check_unit("metadata.thoughtComplexity", self.metadata.thought_complexity)?;
        Ok(())
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn thought(&self) -> &str {
        &self.thought
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning_quality(&self) -> f64 {
        self.metadata.reasoning_quality
    }

    pub fn thought_complexity(&self) -> f64 {
        self.metadata.thought_complexity
    }

    pub fn metadata(&self) -> &ThoughtMetadata {
        &self.metadata
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

/// Batch ID format: `batch_<ulid>`
pub type BatchId = String;

pub fn new_batch_id() -> BatchId {
    format!("batch_{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// The records flushed together in one commit-protocol run.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub batch_id: BatchId,
    pub created_at: OffsetDateTime,
    pub records: Vec<ThoughtRecord>,
}

impl Batch {
    pub fn with_id(
        batch_id: impl Into<BatchId>,
        records: Vec<ThoughtRecord>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            created_at,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ThoughtMetadata {
        ThoughtMetadata::new(0.5, 0.5)
    }

    #[test]
    fn new_accepts_boundaries() {
        assert!(ThoughtRecord::new("A", "x", 0.0, meta()).is_ok());
        assert!(ThoughtRecord::new("A", "x", 1.0, ThoughtMetadata::new(1.0, 0.0)).is_ok());
    }

    #[test]
    fn new_rejects_out_of_range() {
        let err = ThoughtRecord::new("A", "x", 1.01, meta()).unwrap_err();
        assert!(matches!(err, CairnError::Validation { ref field, .. } if field == "confidence"));

        let err = ThoughtRecord::new("A", "x", 0.5, ThoughtMetadata::new(-0.1, 0.5)).unwrap_err();
        assert!(err.to_string().contains("reasoningQuality"));

        let err = ThoughtRecord::new("A", "x", 0.5, ThoughtMetadata::new(0.5, f64::NAN)).unwrap_err();
        assert!(err.to_string().contains("thoughtComplexity"));
    }

    #[test]
    fn new_rejects_empty_agent() {
        assert!(ThoughtRecord::new("", "x", 0.5, meta()).is_err());
    }

    #[test]
    fn deserialize_validates() {
        let good = r#"{"agentId":"A","thought":"hi","confidence":0.9,
            "metadata":{"reasoningQuality":0.8,"thoughtComplexity":0.3},
            "timestamp":"2026-10-15T09:30:00Z"}"#;
        let rec: ThoughtRecord = serde_json::from_str(good).unwrap();
        assert_eq!(rec.agent_id(), "A");
        assert_eq!(rec.confidence(), 0.9);

        let bad = r#"{"agentId":"A","thought":"hi","confidence":2.0,
            "metadata":{"reasoningQuality":0.8,"thoughtComplexity":0.3}}"#;
        assert!(serde_json::from_str::<ThoughtRecord>(bad).is_err());

        let missing_agent = r#"{"thought":"hi","confidence":0.2,
            "metadata":{"reasoningQuality":0.8,"thoughtComplexity":0.3}}"#;
        assert!(serde_json::from_str::<ThoughtRecord>(missing_agent).is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let rec = ThoughtRecord::new("A", "hi", 0.4, ThoughtMetadata::new(0.6, 0.7)).unwrap();
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["agentId"], "A");
        assert_eq!(v["metadata"]["reasoningQuality"], 0.6);
        assert_eq!(v["metadata"]["thoughtComplexity"], 0.7);
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn batch_ids_are_unique_and_prefixed() {
        let a = new_batch_id();
        let b = new_batch_id();
        assert!(a.starts_with("batch_"));
        assert_ne!(a, b);
    }
}
