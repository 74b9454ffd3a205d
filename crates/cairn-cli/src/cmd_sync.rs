use cairn_ledger::SyncOutcome;
use std::path::Path;

use crate::session;

pub fn push(repo_root: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut history = session::open(repo_root, config_path)?;
    let outcome = history.push_to_remote();
    history.close()?;
    report(outcome?, "Pushed to")
}

pub fn pull(repo_root: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut history = session::open(repo_root, config_path)?;
    let outcome = history.pull_from_remote();
    history.close()?;
    report(outcome?, "Pulled from")
}

fn report(outcome: SyncOutcome, verb: &str) -> anyhow::Result<()> {
    match outcome {
        SyncOutcome::Skipped => println!("No remote configured (set remoteUrl with `cairn config set`)"),
        SyncOutcome::Pushed | SyncOutcome::Pulled => println!("{verb} remote"),
    }
    Ok(())
}
