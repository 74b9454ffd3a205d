use std::collections::BTreeMap;

use crate::types::ThoughtRecord;

/// Records grouped by agent, keyed in sorted agent order so every walk over
/// the groups is deterministic.
pub type AgentGroups<'a> = BTreeMap<&'a str, Vec<&'a ThoughtRecord>>;

/// Group records by `agent_id`, keeping each agent's records in input order.
/// Every record lands in exactly one group; no group is empty.
pub fn partition_by_agent(records: &[ThoughtRecord]) -> AgentGroups<'_> {
    let mut groups: AgentGroups<'_> = BTreeMap::new();
    for record in records {
        groups.entry(record.agent_id()).or_default().push(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThoughtMetadata;

    fn rec(agent: &str, thought: &str) -> ThoughtRecord {
        ThoughtRecord::new(agent, thought, 0.5, ThoughtMetadata::new(0.5, 0.5)).unwrap()
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(partition_by_agent(&[]).is_empty());
    }

    #[test]
    fn groups_preserve_per_agent_order() {
        let records = vec![
            rec("B", "b1"),
            rec("A", "a1"),
            rec("B", "b2"),
            rec("A", "a2"),
            rec("C", "c1"),
        ];
        let groups = partition_by_agent(&records);

        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), ["A", "B", "C"]);
        let a: Vec<&str> = groups["A"].iter().map(|r| r.thought()).collect();
        let b: Vec<&str> = groups["B"].iter().map(|r| r.thought()).collect();
        assert_eq!(a, ["a1", "a2"]);
        assert_eq!(b, ["b1", "b2"]);

        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, records.len());
    }
}
