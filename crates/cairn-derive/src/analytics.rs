use cairn_core::{partition_by_agent, ThoughtRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Thresholds ──

/// Above this a value is `high`; `medium` runs from `BUCKET_LOW` to here inclusive.
pub const BUCKET_HIGH: f64 = 0.7;
pub const BUCKET_LOW: f64 = 0.4;

pub const HIGH_CONFIDENCE: f64 = 0.8;
pub const LOW_CONFIDENCE: f64 = 0.3;

pub const TREND_IMPROVING: f64 = 0.6;
pub const TREND_DECLINING: f64 = 0.4;

/// Share of low-confidence records above which a high-priority recommendation fires.
pub const LOW_CONFIDENCE_RATIO: f64 = 0.2;
pub const LOW_QUALITY_MEAN: f64 = 0.5;

pub const INSIGHT_TEXT_LIMIT: usize = 100;

pub const LOW_CONFIDENCE_ADVICE: &str =
    "Gather more context or cross-check with another agent before acting on this thought";

// ── Data structures ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    High,
    Medium,
    Low,
}

pub fn bucket(value: f64) -> Bucket {
    if value > BUCKET_HIGH {
        Bucket::High
    } else if value >= BUCKET_LOW {
        Bucket::Medium
    } else {
        Bucket::Low
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl Distribution {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut dist = Self::default();
        for v in values {
            match bucket(v) {
                Bucket::High => dist.high += 1,
                Bucket::Medium => dist.medium += 1,
                Bucket::Low => dist.low += 1,
            }
        }
        dist
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    pub average_confidence: f64,
    pub average_quality: f64,
    pub average_complexity: f64,
    pub thought_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patterns {
    pub confidence_distribution: Distribution,
    pub quality_distribution: Distribution,
    pub complexity_distribution: Distribution,
    pub agent_performance: BTreeMap<String, AgentPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighConfidenceInsight {
    pub thought: String,
    pub confidence: f64,
    pub quality: f64,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowConfidenceWarning {
    pub thought: String,
    pub confidence: f64,
    pub quality: f64,
    pub agent_id: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTrend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityTrends {
    pub trend: QualityTrend,
    pub average_quality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub high_confidence_insights: Vec<HighConfidenceInsight>,
    pub low_confidence_warnings: Vec<LowConfidenceWarning>,
    pub quality_trends: QualityTrends,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub patterns: Patterns,
    pub insights: Insights,
}

// ── Helpers ──

/// Arithmetic mean; 0.0 for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Cut `text` to at most `limit` characters, appending `...` when cut.
pub fn truncate_text(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn quality_trend(average_quality: f64) -> QualityTrend {
    if average_quality > TREND_IMPROVING {
        QualityTrend::Improving
    } else if average_quality < TREND_DECLINING {
        QualityTrend::Declining
    } else {
        QualityTrend::Stable
    }
}

// ── Engine ──

pub fn analyze_patterns(records: &[ThoughtRecord]) -> Patterns {
    let agent_performance = partition_by_agent(records)
        .into_iter()
        .map(|(agent, group)| {
            let perf = AgentPerformance {
                average_confidence: mean(group.iter().map(|r| r.confidence())),
                average_quality: mean(group.iter().map(|r| r.reasoning_quality())),
                average_complexity: mean(group.iter().map(|r| r.thought_complexity())),
                thought_count: group.len(),
            };
            (agent.to_string(), perf)
        })
        .collect();

    Patterns {
        confidence_distribution: Distribution::from_values(records.iter().map(|r| r.confidence())),
        quality_distribution: Distribution::from_values(
            records.iter().map(|r| r.reasoning_quality()),
        ),
        complexity_distribution: Distribution::from_values(
            records.iter().map(|r| r.thought_complexity()),
        ),
        agent_performance,
    }
}

pub fn derive_insights(records: &[ThoughtRecord]) -> Insights {
    let high_confidence_insights: Vec<HighConfidenceInsight> = records
        .iter()
        .filter(|r| r.confidence() > HIGH_CONFIDENCE)
        .map(|r| HighConfidenceInsight {
            thought: truncate_text(r.thought(), INSIGHT_TEXT_LIMIT),
            confidence: r.confidence(),
            quality: r.reasoning_quality(),
            agent_id: r.agent_id().to_string(),
        })
        .collect();

    let low_confidence_warnings: Vec<LowConfidenceWarning> = records
        .iter()
        .filter(|r| r.confidence() < LOW_CONFIDENCE)
        .map(|r| LowConfidenceWarning {
            thought: truncate_text(r.thought(), INSIGHT_TEXT_LIMIT),
            confidence: r.confidence(),
            quality: r.reasoning_quality(),
            agent_id: r.agent_id().to_string(),
            recommendation: LOW_CONFIDENCE_ADVICE.to_string(),
        })
        .collect();

    let average_quality = mean(records.iter().map(|r| r.reasoning_quality()));
    let quality_trends = QualityTrends {
        trend: quality_trend(average_quality),
        average_quality,
    };

    let mut recommendations = Vec::new();
    if !records.is_empty() {
        let low_ratio = low_confidence_warnings.len() as f64 / records.len() as f64;
        if low_ratio > LOW_CONFIDENCE_RATIO {
            recommendations.push(Recommendation {
                priority: Priority::High,
                category: "confidence".to_string(),
                message: format!(
                    "{:.0}% of thoughts fell below {LOW_CONFIDENCE} confidence; review the inputs these agents are reasoning from",
                    low_ratio * 100.0
                ),
            });
        }
        if average_quality < LOW_QUALITY_MEAN {
            recommendations.push(Recommendation {
                priority: Priority::Medium,
                category: "reasoning".to_string(),
                message: format!(
                    "Average reasoning quality is {average_quality:.2}; add intermediate verification steps"
                ),
            });
        }
    }

    Insights {
        high_confidence_insights,
        low_confidence_warnings,
        quality_trends,
        recommendations,
    }
}

/// Run the full engine over one batch.
pub fn analyze(records: &[ThoughtRecord]) -> Analysis {
    Analysis {
        patterns: analyze_patterns(records),
        insights: derive_insights(records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::rec;

    #[test]
    fn bucket_edges() {
        assert_eq!(bucket(0.71), Bucket::High);
        assert_eq!(bucket(0.7), Bucket::Medium);
        assert_eq!(bucket(0.4), Bucket::Medium);
        assert_eq!(bucket(0.39), Bucket::Low);
        assert_eq!(bucket(0.0), Bucket::Low);
        assert_eq!(bucket(1.0), Bucket::High);
    }

    #[test]
    fn distributions_sum_to_batch_size() {
        let records: Vec<_> = [0.0, 0.1, 0.39, 0.4, 0.55, 0.7, 0.71, 0.9, 1.0]
            .iter()
            .enumerate()
            .map(|(i, &v)| rec(if i % 2 == 0 { "A" } else { "B" }, v, 1.0 - v, v / 2.0))
            .collect();
        let patterns = analyze_patterns(&records);
        for dist in [
            patterns.confidence_distribution,
            patterns.quality_distribution,
            patterns.complexity_distribution,
        ] {
            assert_eq!(dist.total(), records.len());
        }
        assert_eq!(
            patterns.confidence_distribution,
            Distribution { high: 3, medium: 3, low: 3 }
        );
    }

    #[test]
    fn agent_performance_means() {
        let records = vec![
            rec("A", 0.9, 0.8, 0.2),
            rec("A", 0.5, 0.4, 0.6),
            rec("B", 0.2, 0.3, 0.9),
        ];
        let patterns = analyze_patterns(&records);
        let a = patterns.agent_performance["A"];
        assert!((a.average_confidence - 0.7).abs() < 1e-9);
        assert!((a.average_quality - 0.6).abs() < 1e-9);
        assert!((a.average_complexity - 0.4).abs() < 1e-9);
        assert_eq!(a.thought_count, 2);
        assert_eq!(patterns.agent_performance["B"].thought_count, 1);
    }

    #[test]
    fn insights_split_by_confidence() {
        let records = vec![
            rec("A", 0.9, 0.8, 0.5),
            rec("A", 0.8, 0.8, 0.5),
            rec("B", 0.2, 0.3, 0.5),
            rec("B", 0.3, 0.3, 0.5),
        ];
        let insights = derive_insights(&records);
        assert_eq!(insights.high_confidence_insights.len(), 1);
        assert_eq!(insights.high_confidence_insights[0].agent_id, "A");
        assert_eq!(insights.low_confidence_warnings.len(), 1);
        assert_eq!(insights.low_confidence_warnings[0].agent_id, "B");
        assert_eq!(
            insights.low_confidence_warnings[0].recommendation,
            LOW_CONFIDENCE_ADVICE
        );
    }

    #[test]
    fn quality_trend_thresholds() {
        assert_eq!(quality_trend(0.61), QualityTrend::Improving);
        assert_eq!(quality_trend(0.6), QualityTrend::Stable);
        assert_eq!(quality_trend(0.4), QualityTrend::Stable);
        assert_eq!(quality_trend(0.39), QualityTrend::Declining);
    }

    #[test]
    fn recommendations_fire_on_thresholds() {
        // 1 of 5 low (20%) is not above the ratio; quality mean 0.6.
        let calm: Vec<_> = (0..4)
            .map(|_| rec("A", 0.6, 0.6, 0.5))
            .chain(std::iter::once(rec("A", 0.1, 0.6, 0.5)))
            .collect();
        assert!(derive_insights(&calm).recommendations.is_empty());

        // 2 of 5 low, and mean quality 0.3.
        let rough: Vec<_> = (0..3)
            .map(|_| rec("A", 0.6, 0.3, 0.5))
            .chain((0..2).map(|_| rec("B", 0.1, 0.3, 0.5)))
            .collect();
        let recs = derive_insights(&rough).recommendations;
        let priorities: Vec<_> = recs.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![Priority::High, Priority::Medium]);
    }

    #[test]
    fn empty_batch_is_quiet() {
        let analysis = analyze(&[]);
        assert_eq!(analysis.patterns.confidence_distribution.total(), 0);
        assert!(analysis.insights.recommendations.is_empty());
        assert_eq!(analysis.insights.quality_trends.trend, QualityTrend::Declining);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("ééééé", 2), "éé...");
    }

    #[test]
    fn serialized_shape_is_camel_case() {
        let analysis = analyze(&[rec("A", 0.9, 0.2, 0.5)]);
        let v = serde_json::to_value(&analysis.insights).unwrap();
        assert!(v["highConfidenceInsights"].is_array());
        assert_eq!(v["qualityTrends"]["trend"], "declining");
        assert_eq!(v["recommendations"][0]["priority"], "medium");
        let p = serde_json::to_value(&analysis.patterns).unwrap();
        assert_eq!(p["confidenceDistribution"]["high"], 1);
        assert_eq!(p["agentPerformance"]["A"]["thoughtCount"], 1);
    }
}
