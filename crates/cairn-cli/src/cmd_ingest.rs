use anyhow::Context;
use cairn_core::ThoughtRecord;
use cairn_ledger::{CommitReport, ThoughtHistory};
use std::io::BufRead;
use std::path::Path;

use crate::session;

#[derive(Debug, Default, PartialEq, Eq)]
struct IngestCounts {
    accepted: usize,
    rejected: usize,
}

/// Feed every JSON line in `input` into `history`. Malformed or invalid
/// records are reported and skipped; a failed flush stops ingestion.
fn feed(
    history: &mut ThoughtHistory,
    input: impl BufRead,
    mut on_commit: impl FnMut(&CommitReport) -> anyhow::Result<()>,
) -> anyhow::Result<IngestCounts> {
    let mut counts = IngestCounts::default();
    for (i, line) in input.lines().enumerate() {
        let line = line.context("reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ThoughtRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("line {}: rejected: {e}", i + 1);
                counts.rejected += 1;
                continue;
            }
        };
        if let Some(report) = history.add_thought(record)? {
            on_commit(&report)?;
        }
        counts.accepted += 1;
    }
    Ok(counts)
}

/// `cairn ingest [FILE] [--shutdown]`
pub fn execute(
    repo_root: &Path,
    config_path: Option<&Path>,
    file: Option<&Path>,
    shutdown: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut history = session::open(repo_root, config_path)?;
    let print = |r: &CommitReport| session::print_report(r, json);

    let fed = match file.filter(|p| *p != Path::new("-")) {
        Some(path) => std::fs::File::open(path)
            .with_context(|| format!("opening {}", path.display()))
            .and_then(|f| feed(&mut history, std::io::BufReader::new(f), print)),
        None => feed(&mut history, std::io::stdin().lock(), print),
    };

    if shutdown {
        let report = history.shutdown()?;
        if let Some(commit) = &report.final_commit {
            session::print_report(commit, json)?;
        }
        if report.spilled > 0 {
            eprintln!("{} thought(s) kept for the next session", report.spilled);
        }
    } else {
        let pending = history.close()?;
        if pending > 0 && !json {
            println!("{pending} thought(s) buffered until the next flush");
        }
    }

    let counts = fed?;
    if !json {
        println!("Accepted {} thought(s), rejected {}", counts.accepted, counts.rejected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_ledger::Config;

    #[test]
    fn feed_skips_bad_lines_and_commits() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            commit_interval: 0,
            author_name: "Test".into(),
            author_email: "test@test.com".into(),
            ..Config::new(tmp.path().join("history"))
        };
        let mut history = ThoughtHistory::new(config);
        history.initialize().unwrap();

        let input = concat!(
            r#"{"agentId":"A","thought":"ok","confidence":0.9,"metadata":{"reasoningQuality":0.7,"thoughtComplexity":0.4}}"#,
            "\n\n",
            r#"{"agentId":"A","thought":"bad","confidence":2.0,"metadata":{"reasoningQuality":0.7,"thoughtComplexity":0.4}}"#,
            "\n",
            "not json\n",
        );
        let mut commits = 0;
        let counts = feed(&mut history, input.as_bytes(), |_| {
            commits += 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(
            counts,
            IngestCounts {
                accepted: 1,
                rejected: 2
            }
        );
        assert_eq!(commits, 1);
        assert_eq!(history.pending_len(), 0);
        history.close().unwrap();
    }
}
