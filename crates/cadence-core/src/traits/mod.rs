//! Collaborator seams. The scheduler and executors only see these traits.

pub mod provider;
pub mod runner;
pub mod store;

pub use provider::{ChatProvider, NoTools, ToolHost};
pub use runner::{AgentRunner, Clock, SystemClock};
pub use store::{AgentStore, RunRecorder, SettingsSource, WorkspaceDirectory};
