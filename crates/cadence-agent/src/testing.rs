//! Mock collaborators shared by the executor tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::{ChatProvider, RunRecorder, ToolHost};
use cadence_core::types::{AgentRun, AgentRunStatus, ChatMessage, ChatResponse, ToolDefinition};

/// Replays scripted responses and records every request.
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<ChatResponse>>>,
    requests: Mutex<Vec<(String, Vec<ChatMessage>, usize)>>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(responses: Vec<Result<ChatResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(vec![]),
            delay: None,
        }
    }

    /// Answer every request only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().iter().map(|r| r.1.clone()).collect()
    }

    pub fn models(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.0.clone()).collect()
    }

    /// Number of tools offered on each request.
    pub fn tool_counts(&self) -> Vec<usize> {
        self.requests.lock().unwrap().iter().map(|r| r.2).collect()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), messages.to_vec(), tools.len()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CadenceError::execution("no scripted response left")))
    }
}

/// Keeps every saved run snapshot in order.
#[derive(Default)]
pub struct MockRecorder {
    saved: Mutex<Vec<AgentRun>>,
    fail: bool,
}

impl MockRecorder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn statuses(&self, run_id: &str) -> Vec<AgentRunStatus> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.id == run_id)
            .map(|r| r.status)
            .collect()
    }
}

#[async_trait]
impl RunRecorder for MockRecorder {
    async fn save_agent_run(&self, run: &AgentRun) -> Result<()> {
        if self.fail {
            return Err(CadenceError::Database("disk full".into()));
        }
        self.saved.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn list_agent_runs(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentRun>> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.workspace_id == workspace_id)
            .filter(|r| agent_id.is_none_or(|id| r.agent_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Named tools that echo their name back.
pub struct MockTools {
    names: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockTools {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolHost for MockTools {
    fn tools(&self) -> Vec<ToolDefinition> {
        self.names
            .iter()
            .map(|n| ToolDefinition {
                name: n.clone(),
                description: format!("{n} tool"),
                parameters: serde_json::json!({"type": "object"}),
            })
            .collect()
    }

    async fn call_tool(&self, name: &str, _arguments: serde_json::Value) -> Result<String> {
        self.calls.lock().unwrap().push(name.to_string());
        Ok(format!("{name} result"))
    }
}
