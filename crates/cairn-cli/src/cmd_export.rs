use cairn_ledger::ExportFormat;
use std::path::Path;

use crate::session;

pub fn execute(repo_root: &Path, config_path: Option<&Path>, format: &str) -> anyhow::Result<()> {
    let format: ExportFormat = format.parse()?;
    let mut history = session::open(repo_root, config_path)?;
    let outcome = history.export_repository(format);
    history.close()?;
    let outcome = outcome?;

    println!("Exported to {}", outcome.path.display());
    for w in &outcome.warnings {
        eprintln!("warning: skipped {w}");
    }
    Ok(())
}
