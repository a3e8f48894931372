//! Webhook tokens — short random strings that let an HTTP caller trigger one agent.

use std::collections::HashSet;

use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::{AgentStore, WorkspaceDirectory};
use cadence_core::types::Agent;
use rand::Rng;

const TOKEN_LEN: usize = 8;
const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_ATTEMPTS: usize = 1000;

/// Generate a token unique across every workspace.
/// The agent's own current token does not count as taken.
pub async fn generate_webhook_token(
    workspaces: &dyn WorkspaceDirectory,
    agents: &dyn AgentStore,
    workspace_id: &str,
    agent_id: &str,
) -> Result<String> {
    let mut taken = HashSet::new();
    for ws in workspaces.list_workspaces().await? {
        for agent in agents.load_agents(&ws.uuid).await? {
            if ws.uuid == workspace_id && agent.id == agent_id {
                continue;
            }
            if let Some(token) = agent.webhook_token {
                taken.insert(token);
            }
        }
    }

    (0..MAX_ATTEMPTS)
        .map(|_| random_token())
        .find(|token| !taken.contains(token))
        .ok_or_else(|| {
            CadenceError::Store(format!(
                "no unique webhook token after {MAX_ATTEMPTS} attempts"
            ))
        })
}

/// Find the agent owning `token`, with its workspace id.
pub async fn find_agent_by_webhook_token(
    workspaces: &dyn WorkspaceDirectory,
    agents: &dyn AgentStore,
    token: &str,
) -> Result<Option<(Agent, String)>> {
    if token.is_empty() {
        return Ok(None);
    }
    for ws in workspaces.list_workspaces().await? {
        let found = agents
            .load_agents(&ws.uuid)
            .await?
            .into_iter()
            .find(|a| a.webhook_token.as_deref() == Some(token));
        if let Some(agent) = found {
            return Ok(Some((agent, ws.uuid)));
        }
    }
    Ok(None)
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;

    #[test]
    fn test_token_shape() {
        let token = random_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_generate_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let ws = store.create_workspace("W").await.unwrap();

        let mut existing = Agent::new("other", "Other").with_step("x");
        existing.workspace_id = ws.uuid.clone();
        existing.webhook_token = Some("taken000".into());
        store.save_agent(&existing).await.unwrap();

        let mut agent = Agent::new("hooked", "Hooked").with_step("x");
        agent.workspace_id = ws.uuid.clone();
        let token = generate_webhook_token(&store, &store, &ws.uuid, &agent.id)
            .await
            .unwrap();
        assert_ne!(token, "taken000");

        agent.webhook_token = Some(token.clone());
        store.save_agent(&agent).await.unwrap();

        let (found, ws_id) = find_agent_by_webhook_token(&store, &store, &token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "hooked");
        assert_eq!(ws_id, ws.uuid);

        assert!(find_agent_by_webhook_token(&store, &store, "missing1")
            .await
            .unwrap()
            .is_none());
        assert!(find_agent_by_webhook_token(&store, &store, "")
            .await
            .unwrap()
            .is_none());
    }
}
