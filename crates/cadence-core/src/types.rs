//! Domain types: agents, runs, workspaces and the chat messages executors exchange.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

/// A tenant workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceHeader {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
}

/// Which executor variant runs the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    /// Workflow agent driven by the local LLM client.
    #[default]
    Local,
    /// Remote peer reached over the A2A protocol.
    A2a,
}

/// Engine + model used for LLM calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelector {
    pub engine: String,
    pub model: String,
}

/// A declared template parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Option<String>,
}

/// One workflow step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStep {
    /// Prompt template with `{{name}}` placeholders.
    pub prompt: String,
    /// Tools this step may call. Empty means every tool the host offers.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentStep {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            tools: vec![],
        }
    }
}

/// A user-defined, schedulable LLM-driven task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Owning workspace. Filled in by the store when absent on disk.
    #[serde(default)]
    pub workspace_id: String,
    /// Cron expression. None means manual/trigger-only.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub invocation_values: HashMap<String, String>,
    #[serde(default)]
    pub parameters: Vec<AgentParameter>,
    #[serde(default)]
    pub source: AgentSource,
    #[serde(default)]
    pub model: Option<ModelSelector>,
    /// System instructions for workflow agents.
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub steps: Vec<AgentStep>,
    /// Peer endpoint for A2A agents.
    #[serde(default)]
    pub a2a_url: Option<String>,
    #[serde(default)]
    pub webhook_token: Option<String>,
}

fn default_locale() -> String { "en-US".into() }

impl Agent {
    /// Create a workflow agent with no schedule and no steps.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            workspace_id: String::new(),
            schedule: None,
            locale: default_locale(),
            invocation_values: HashMap::new(),
            parameters: vec![],
            source: AgentSource::Local,
            model: None,
            instructions: String::new(),
            steps: vec![],
            a2a_url: None,
            webhook_token: None,
        }
    }

    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.schedule = Some(schedule.to_string());
        self
    }

    pub fn with_step(mut self, prompt: &str) -> Self {
        self.steps.push(AgentStep::new(prompt));
        self
    }

    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.invocation_values
            .insert(name.to_string(), value.to_string());
        self
    }

    /// The cron expression, if the agent is scheduled at all.
    pub fn cron_schedule(&self) -> Option<&str> {
        self.schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Render the prompt of step `variant_index`, substituting `{{name}}` placeholders.
    ///
    /// Lookup order: `values`, then the parameter default, then the built-ins
    /// `{{date}}` / `{{time}}`. An unresolved placeholder is an error.
    pub fn build_prompt(
        &self,
        variant_index: usize,
        values: &HashMap<String, String>,
    ) -> Result<String> {
        let step = self.steps.get(variant_index).ok_or_else(|| {
            CadenceError::PromptBuild(format!(
                "agent '{}' has no step {} ({} defined)",
                self.name,
                variant_index,
                self.steps.len()
            ))
        })?;

        let template = step.prompt.as_str();
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(CadenceError::PromptBuild(format!(
                    "unclosed placeholder in step {variant_index} of '{}'",
                    self.name
                )));
            };
            let key = after[..end].trim();
            out.push_str(&self.resolve(key, values)?);
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        Ok(out)
    }

    fn resolve(&self, key: &str, values: &HashMap<String, String>) -> Result<String> {
        if let Some(v) = values.get(key) {
            return Ok(v.clone());
        }
        if let Some(default) = self
            .parameters
            .iter()
            .find(|p| p.name == key)
            .and_then(|p| p.default.clone())
        {
            return Ok(default);
        }
        match key {
            "date" => Ok(Utc::now().format("%Y-%m-%d").to_string()),
            "time" => Ok(Utc::now().format("%H:%M").to_string()),
            _ => Err(CadenceError::PromptBuild(format!(
                "missing value for '{key}' in agent '{}'",
                self.name
            ))),
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRunTrigger {
    Manual,
    Schedule,
    Webhook,
    Workflow,
}

impl AgentRunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
            Self::Workflow => "workflow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "schedule" => Some(Self::Schedule),
            "webhook" => Some(Self::Webhook),
            "workflow" => Some(Self::Workflow),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentRunTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRunStatus {
    Running,
    Success,
    Error,
    Canceled,
}

impl AgentRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: String,
    pub agent_id: String,
    pub workspace_id: String,
    pub trigger: AgentRunTrigger,
    pub status: AgentRunStatus,
    pub prompt: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRun {
    /// Start a run. `run_id` is reused when supplied (resumption), generated otherwise.
    pub fn start(
        workspace_id: &str,
        agent: &Agent,
        trigger: AgentRunTrigger,
        prompt: &str,
        run_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            agent_id: agent.id.clone(),
            workspace_id: workspace_id.to_string(),
            trigger,
            status: AgentRunStatus::Running,
            prompt: prompt.to_string(),
            output: None,
            error: None,
            model: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn succeed(&mut self, output: String) {
        self.status = AgentRunStatus::Success;
        self.output = Some(output);
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl std::fmt::Display) {
        self.status = AgentRunStatus::Error;
        self.error = Some(error.to_string());
        self.updated_at = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        self.status != AgentRunStatus::Running
    }
}

// ─── Chat ──────────────────────────────────────────────────

/// A chat message exchanged with the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role("assistant", content)
    }

    pub fn tool(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::with_role("tool", content)
        }
    }

    fn with_role(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }
}

/// A tool the LLM may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments.
    pub arguments: String,
}

/// One LLM completion.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_agent() -> Agent {
        let mut agent = Agent::new("a1", "Daily Report Agent")
            .with_schedule("0 9 * * *")
            .with_step("Generate daily report in {{format}} format for {{ team }}");
        agent.parameters.push(AgentParameter {
            name: "team".into(),
            description: "Team name".into(),
            default: Some("sales".into()),
        });
        agent
    }

    #[test]
    fn test_build_prompt_substitutes_values_and_defaults() {
        let agent = report_agent();
        let mut values = HashMap::new();
        values.insert("format".to_string(), "pdf".to_string());
        let prompt = agent.build_prompt(0, &values).unwrap();
        assert_eq!(prompt, "Generate daily report in pdf format for sales");
    }

    #[test]
    fn test_build_prompt_is_deterministic() {
        let agent = report_agent().with_value("format", "csv");
        let a = agent.build_prompt(0, &agent.invocation_values).unwrap();
        let b = agent.build_prompt(0, &agent.invocation_values).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_prompt_missing_value() {
        let agent = report_agent();
        let err = agent.build_prompt(0, &HashMap::new()).unwrap_err();
        assert!(matches!(err, CadenceError::PromptBuild(_)));
        assert!(err.to_string().contains("format"));
    }

    #[test]
    fn test_build_prompt_bad_index() {
        let agent = Agent::new("a2", "Empty");
        assert!(matches!(
            agent.build_prompt(0, &HashMap::new()),
            Err(CadenceError::PromptBuild(_))
        ));
    }

    #[test]
    fn test_build_prompt_unclosed_placeholder() {
        let agent = Agent::new("a3", "Broken").with_step("Hello {{name");
        assert!(agent.build_prompt(0, &HashMap::new()).is_err());
    }

    #[test]
    fn test_build_prompt_builtin_date() {
        let agent = Agent::new("a4", "Dated").with_step("Today is {{date}}");
        let prompt = agent.build_prompt(0, &HashMap::new()).unwrap();
        assert!(prompt.starts_with("Today is 20"));
    }

    #[test]
    fn test_cron_schedule_blank_is_unscheduled() {
        let agent = Agent::new("a5", "Blank").with_schedule("   ");
        assert!(agent.cron_schedule().is_none());
        assert!(Agent::new("a6", "None").cron_schedule().is_none());
    }

    #[test]
    fn test_agent_json_defaults() {
        let agent: Agent =
            serde_json::from_str(r#"{"id":"x","name":"X","source":"a2a"}"#).unwrap();
        assert_eq!(agent.source, AgentSource::A2a);
        assert_eq!(agent.locale, "en-US");
        assert!(agent.schedule.is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let agent = Agent::new("a1", "A");
        let mut run = AgentRun::start("ws", &agent, AgentRunTrigger::Schedule, "p", None);
        assert_eq!(run.status, AgentRunStatus::Running);
        assert!(!run.is_finished());
        assert_eq!(run.id.len(), 36);
        assert_eq!(&run.id[14..15], "4");

        run.fail("boom");
        assert_eq!(run.status, AgentRunStatus::Error);
        assert_eq!(run.error.as_deref(), Some("boom"));

        let resumed = AgentRun::start("ws", &agent, AgentRunTrigger::Manual, "p", Some("r-1".into()));
        assert_eq!(resumed.id, "r-1");
    }

    #[test]
    fn test_trigger_and_status_strings() {
        for t in [
            AgentRunTrigger::Manual,
            AgentRunTrigger::Schedule,
            AgentRunTrigger::Webhook,
            AgentRunTrigger::Workflow,
        ] {
            assert_eq!(AgentRunTrigger::parse(t.as_str()), Some(t));
        }
        assert_eq!(AgentRunStatus::parse("success"), Some(AgentRunStatus::Success));
        assert_eq!(AgentRunStatus::parse("nope"), None);
    }
}
