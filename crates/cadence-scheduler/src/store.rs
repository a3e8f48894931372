//! File-based workspace and agent store.
//! One directory per workspace, one JSON file per agent. Human-readable, git-friendly.
//!
//! ```text
//! <data_dir>/workspaces/<uuid>/workspace.json
//! <data_dir>/workspaces/<uuid>/agents/<agent-id>.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::{AgentStore, WorkspaceDirectory};
use cadence_core::types::{Agent, WorkspaceHeader};

const WORKSPACE_FILE: &str = "workspace.json";

/// Directory-backed store. Reads disk on every call, so edits apply on the next tick.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `<data_dir>/workspaces`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("workspaces"),
        }
    }

    fn workspace_dir(&self, workspace_id: &str) -> PathBuf {
        self.root.join(workspace_id)
    }

    fn agents_dir(&self, workspace_id: &str) -> PathBuf {
        self.workspace_dir(workspace_id).join("agents")
    }

    /// Create a workspace with a fresh uuid.
    pub async fn create_workspace(&self, name: &str) -> Result<WorkspaceHeader> {
        let header = WorkspaceHeader {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        let dir = self.workspace_dir(&header.uuid);
        tokio::fs::create_dir_all(dir.join("agents")).await?;
        let json = serde_json::to_string_pretty(&header)?;
        tokio::fs::write(dir.join(WORKSPACE_FILE), json).await?;
        tracing::info!("📁 Created workspace {} ({})", header.name, header.uuid);
        Ok(header)
    }

    async fn read_header(&self, dir: &Path) -> Result<WorkspaceHeader> {
        let json = tokio::fs::read_to_string(dir.join(WORKSPACE_FILE)).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl WorkspaceDirectory for FileStore {
    async fn list_workspaces(&self) -> Result<Vec<WorkspaceHeader>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut workspaces = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            if !dir.join(WORKSPACE_FILE).exists() {
                continue;
            }
            match self.read_header(&dir).await {
                Ok(header) => workspaces.push(header),
                Err(e) => tracing::warn!("⚠️ Skipping workspace {}: {e}", dir.display()),
            }
        }

        workspaces.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(workspaces)
    }
}

#[async_trait]
impl AgentStore for FileStore {
    async fn load_agents(&self, workspace_id: &str) -> Result<Vec<Agent>> {
        let dir = self.agents_dir(workspace_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut agents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .map_err(CadenceError::from)
                .and_then(|json| serde_json::from_str::<Agent>(&json).map_err(CadenceError::from));
            match parsed {
                Ok(mut agent) => {
                    if agent.workspace_id.is_empty() {
                        agent.workspace_id = workspace_id.to_string();
                    }
                    agents.push(agent);
                }
                Err(e) => tracing::warn!("⚠️ Failed to load agent {}: {e}", path.display()),
            }
        }

        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        if agent.workspace_id.is_empty() {
            return Err(CadenceError::Store(format!(
                "agent '{}' has no workspace",
                agent.id
            )));
        }
        if agent.id.is_empty() || agent.id.contains(['/', '\\']) || agent.id.starts_with('.') {
            return Err(CadenceError::Store(format!("invalid agent id '{}'", agent.id)));
        }

        let dir = self.agents_dir(&agent.workspace_id);
        tokio::fs::create_dir_all(&dir).await?;
        let file = dir.join(format!("{}.json", agent.id));
        let json = serde_json::to_string_pretty(agent)?;
        tokio::fs::write(&file, json).await?;
        tracing::debug!("💾 Saved agent {} to {}", agent.name, file.display());
        Ok(())
    }
}
