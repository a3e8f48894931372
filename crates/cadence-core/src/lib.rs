//! # Cadence Core
//!
//! Shared vocabulary for the Cadence crates: configuration, the error type,
//! agent/run/workspace types and the collaborator traits the scheduler and
//! executors are wired through.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{FileSettings, Settings};
pub use error::{CadenceError, Result};
pub use types::{
    Agent, AgentParameter, AgentRun, AgentRunStatus, AgentRunTrigger, AgentSource, AgentStep,
    ModelSelector, WorkspaceHeader,
};
