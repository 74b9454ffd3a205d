pub mod error;
pub mod naming;
pub mod partition;
pub mod time_fmt;
pub mod types;

pub use error::{CairnError, Result};
pub use partition::{partition_by_agent, AgentGroups};
pub use types::*;
