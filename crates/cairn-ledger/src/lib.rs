pub mod config;
pub mod export;
pub mod history;
pub mod paths;
pub mod protocol;
pub mod scheduler;

pub use config::Config;
pub use export::{ExportFormat, ExportOutcome, Snapshot, SyncOutcome};
pub use history::{LifecycleState, ShutdownReport, StatusReport, ThoughtHistory};
pub use paths::CairnPaths;
pub use protocol::{BatchProgress, CommitRef, CommitReport};
pub use scheduler::{CommitScheduler, SchedulerState};
