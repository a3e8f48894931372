//! Persistence collaborators: workspaces, agents, runs, settings.

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::Result;
use crate::types::{Agent, AgentRun, WorkspaceHeader};

/// Enumerates tenant workspaces.
#[async_trait]
pub trait WorkspaceDirectory: Send + Sync {
    async fn list_workspaces(&self) -> Result<Vec<WorkspaceHeader>>;
}

/// Loads the persisted agents of a workspace. Called fresh on every tick.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn load_agents(&self, workspace_id: &str) -> Result<Vec<Agent>>;

    async fn save_agent(&self, agent: &Agent) -> Result<()>;
}

/// Persists run outcomes. Executors call this, the scheduler never does.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Insert or replace a run by id.
    async fn save_agent_run(&self, run: &AgentRun) -> Result<()>;

    /// Most recent runs first.
    async fn list_agent_runs(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentRun>>;
}

/// Global settings, re-read on every tick.
pub trait SettingsSource: Send + Sync {
    fn load_settings(&self) -> Result<Settings>;
}
