//! Execution seam and wall clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Agent, AgentRun, AgentRunTrigger};

/// Runs one agent and returns its recorded outcome.
///
/// Ordinary execution failures come back as `Ok` with an error-status run.
/// `Err` is reserved for contract violations.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_agent(
        &self,
        workspace_id: &str,
        agent: &Agent,
        trigger: AgentRunTrigger,
        prompt: &str,
        run_id: Option<String>,
    ) -> Result<AgentRun>;
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
