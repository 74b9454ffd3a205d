use std::path::Path;

use crate::session;

pub fn execute(repo_root: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut history = session::open(repo_root, config_path)?;
    let status = history.get_status()?;
    println!("Thought history ready at {}", repo_root.display());
    println!("  branches: {}", status.branches.join(", "));
    if status.pending_thoughts > 0 {
        println!("  pending thoughts from last session: {}", status.pending_thoughts);
    }
    history.close()?;
    Ok(())
}
