use std::path::Path;

use crate::session;

pub fn execute(repo_root: &Path, config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let mut history = session::open(repo_root, config_path)?;
    let status = history.get_status()?;
    history.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    println!("On branch {}", status.current_branch);
    println!("Pending thoughts: {}", status.pending_thoughts);
    if let Some(batch) = &status.in_flight_batch {
        println!("Unfinished batch: {batch}");
    }
    println!("Last commit: {}", status.last_commit_display());
    println!("Commits today: {}", status.daily_commit_count);
    println!("Branches ({}):", status.branches.len());
    for b in &status.branches {
        println!("  {b}");
    }
    println!("Tags ({}):", status.tags.len());
    for t in &status.tags {
        println!("  {t}");
    }
    if status.has_changes {
        println!("Working tree has uncommitted changes");
    }
    Ok(())
}
