use std::path::Path;

use crate::session;

/// `cairn flush [--force]`
pub fn flush(repo_root: &Path, config_path: Option<&Path>, force: bool, json: bool) -> anyhow::Result<()> {
    let mut history = session::open(repo_root, config_path)?;
    let result = if force {
        history.force_flush()
    } else {
        history.flush()
    };
    let pending = history.pending_len();
    history.close()?;

    match result? {
        Some(report) => session::print_report(&report, json)?,
        None if pending == 0 => println!("Nothing to commit"),
        None => println!("{pending} thought(s) pending; not due yet or daily quota reached"),
    }
    Ok(())
}

/// `cairn shutdown`
pub fn shutdown(repo_root: &Path, config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let mut history = session::open(repo_root, config_path)?;
    let report = history.shutdown()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if let Some(commit) = &report.final_commit {
        session::print_report(commit, false)?;
    }
    if report.spilled > 0 {
        println!("{} thought(s) kept for the next session (daily quota reached)", report.spilled);
    }
    if report.pushed {
        println!("Pushed to remote");
    }
    if let Some(e) = &report.remote_error {
        eprintln!("warning: {e}");
    }
    Ok(())
}
