use anyhow::Context;
use cairn_ledger::{CairnPaths, CommitReport, Config, ThoughtHistory};
use std::path::Path;

/// Resolve the config for `repo_root`: an explicit file wins, then the
/// repository's own `config.json`, then defaults. The repo path always
/// comes from the command line.
pub fn load_config(repo_root: &Path, config_path: Option<&Path>) -> anyhow::Result<Config> {
    let repo_config = CairnPaths::discover(repo_root).config_json;
    let file = config_path.or_else(|| repo_config.exists().then_some(repo_config.as_path()));
    let mut config = match file {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => Config::default(),
    };
    config.repo_path = repo_root.to_path_buf();
    Ok(config)
}

/// Open and initialize the history at `repo_root`.
pub fn open(repo_root: &Path, config_path: Option<&Path>) -> anyhow::Result<ThoughtHistory> {
    let config = load_config(repo_root, config_path)?;
    let mut history = ThoughtHistory::new(config);
    history.initialize()?;
    Ok(history)
}

pub fn print_report(report: &CommitReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    let resumed = if report.resumed { " (resumed)" } else { "" };
    println!(
        "Committed {} {} from {} agent(s) as {}{resumed}",
        report.thought_count,
        if report.thought_count == 1 { "thought" } else { "thoughts" },
        report.agents.len(),
        report.batch_id
    );
    for commit in &report.commits {
        println!("  {}: {}", commit.branch, commit.message);
    }
    for tag in &report.tags {
        println!("  tag {tag}");
    }
    Ok(())
}
