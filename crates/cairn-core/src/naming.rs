use crate::error::{CairnError, Result};
use crate::time_fmt::iso_date;
use time::Date;

/// Aggregate summaries live here.
pub const MAIN_BRANCH: &str = "main";

/// Bucketed distributions and insights, one file per batch.
pub const ANALYSIS_PATTERNS_BRANCH: &str = "analysis/patterns";

/// Reserved for cross-batch learning; nothing writes to it yet.
pub const ANALYSIS_LEARNING_BRANCH: &str = "analysis/learning";

pub const DEFAULT_BRANCH_PREFIX: &str = "thoughts";

/// Longest agent id we accept; keeps branch and tag names sane.
pub const MAX_AGENT_ID_LEN: usize = 128;

/// `{prefix}/agent-{agent_id}`
pub fn agent_branch(prefix: &str, agent_id: &str) -> String {
    format!("{prefix}/agent-{agent_id}")
}

/// `agent-{agent_id}-{YYYY-MM-DD}`
pub fn agent_tag(agent_id: &str, date: Date) -> String {
    format!("agent-{agent_id}-{}", iso_date(date))
}

/// One `/`-separated piece of a ref name, checked against the component
/// rules of `git check-ref-format`.
pub fn validate_ref_component(field: &str, component: &str) -> Result<()> {
    let invalid = |why: &str| -> Result<()> {
        Err(CairnError::validation(
            field,
            format!("{component:?} is not a valid ref component: {why}"),
        ))
    };
    if component.is_empty() {
        return invalid("empty");
    }
    if component.starts_with('.') {
        return invalid("starts with '.'");
    }
    if component.ends_with('.') {
        return invalid("ends with '.'");
    }
    if component.ends_with(".lock") {
        return invalid("ends with \".lock\"");
    }
    if component.contains("..") {
        return invalid("contains \"..\"");
    }
    if component.contains("@{") || component == "@" {
        return invalid("uses '@' reflog syntax");
    }
    if let Some(bad) = component
        .chars()
        .find(|c| c.is_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\' | '/'))
    {
        return invalid(&format!("contains {bad:?}"));
    }
    Ok(())
}

/// Agent ids end up in ref names, so only a conservative character set passes.
pub fn validate_agent_id(agent_id: &str) -> Result<()> {
    if agent_id.trim().is_empty() {
        return Err(CairnError::validation("agentId", "must not be empty"));
    }
    if agent_id.len() > MAX_AGENT_ID_LEN {
        return Err(CairnError::validation(
            "agentId",
            format!("longer than {MAX_AGENT_ID_LEN} bytes"),
        ));
    }
    if agent_id.starts_with('-') {
        return Err(CairnError::validation(
            "agentId",
            format!("{agent_id:?} must not start with '-'"),
        ));
    }
    if let Some(bad) = agent_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(CairnError::validation(
            "agentId",
            format!("{agent_id:?} contains disallowed character {bad:?}"),
        ));
    }
    validate_ref_component("agentId", agent_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn branch_and_tag_names() {
        assert_eq!(agent_branch("thoughts", "A"), "thoughts/agent-A");
        assert_eq!(agent_branch("minds", "planner-1"), "minds/agent-planner-1");
        assert_eq!(agent_tag("A", date!(2026 - 10 - 05)), "agent-A-2026-10-05");
    }

    #[test]
    fn accepts_plain_ids() {
        for id in ["A", "planner-1", "agent_7", "v1.2"] {
            assert!(validate_agent_id(id).is_ok(), "{id}");
        }
    }

    #[test]
    fn rejects_ref_hostile_ids() {
        for id in [
            "", "  ", "-x", ".hidden", "a b", "a/b", "a..b", "x.lock", "a~1", "ä", "planner.",
            "a.",
        ] {
            assert!(validate_agent_id(id).is_err(), "{id:?}");
        }
    }

    #[test]
    fn ref_component_rules() {
        for ok in ["thoughts", "team-1", "v1.2", "a_b"] {
            assert!(validate_ref_component("x", ok).is_ok(), "{ok}");
        }
        for bad in [
            "", ".x", "x.", "x.lock", "a..b", "@", "a@{1}", "a b", "a~", "a^", "a:b", "a?",
            "a*", "a[", "a\\b", "a\tb",
        ] {
            assert!(validate_ref_component("x", bad).is_err(), "{bad:?}");
        }
    }
}
