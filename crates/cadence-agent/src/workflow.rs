//! Workflow executor — runs an agent's steps against the LLM, one after another.
//!
//! Step 0 uses the prompt the caller built. Every later step is rendered from
//! the agent's values plus `output.N` (the output of step N, 1-based), so a
//! step can build on what the previous ones produced. Each step may run up to
//! [`MAX_TOOL_ROUNDS`] rounds of tool calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::config::Settings;
use cadence_core::error::Result;
use cadence_core::traits::{ChatProvider, RunRecorder, ToolHost};
use cadence_core::types::{Agent, AgentRun, AgentRunTrigger, ChatMessage, ToolDefinition};

use crate::executor::{AgentExecutor, RunOptions, record, with_deadline};

pub const MAX_TOOL_ROUNDS: usize = 3;

/// Executes local (LLM-driven) agents.
pub struct WorkflowExecutor {
    workspace_id: String,
    agent: Agent,
    default_model: String,
    default_locale: String,
    provider: Arc<dyn ChatProvider>,
    tools: Arc<dyn ToolHost>,
    recorder: Arc<dyn RunRecorder>,
}

impl WorkflowExecutor {
    pub fn new(
        workspace_id: &str,
        agent: Agent,
        settings: &Settings,
        provider: Arc<dyn ChatProvider>,
        tools: Arc<dyn ToolHost>,
        recorder: Arc<dyn RunRecorder>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            agent,
            default_model: settings.llm.model.clone(),
            default_locale: settings.general.locale.clone(),
            provider,
            tools,
            recorder,
        }
    }

    fn system_prompt(&self) -> String {
        let locale = if self.agent.locale.is_empty() {
            &self.default_locale
        } else {
            &self.agent.locale
        };
        let language = format!("Always answer in the language of locale {locale}.");
        if self.agent.instructions.trim().is_empty() {
            language
        } else {
            format!("{}\n\n{language}", self.agent.instructions.trim())
        }
    }

    /// Tools offered for step `index`: the step's allow-list, or everything when empty.
    fn step_tools(&self, index: usize) -> Vec<ToolDefinition> {
        let all = self.tools.tools();
        match self.agent.steps.get(index) {
            Some(step) if !step.tools.is_empty() => all
                .into_iter()
                .filter(|t| step.tools.contains(&t.name))
                .collect(),
            _ => all,
        }
    }

    async fn execute(&self, prompt: &str, model: &str) -> Result<String> {
        let step_count = self.agent.steps.len().max(1);
        let mut values: HashMap<String, String> = self.agent.invocation_values.clone();
        let mut output = String::new();

        for index in 0..step_count {
            let step_prompt = if index == 0 {
                prompt.to_string()
            } else {
                self.agent.build_prompt(index, &values)?
            };

            tracing::debug!(
                "📝 Agent {} step {}/{step_count}",
                self.agent.name,
                index + 1
            );
            output = self.run_step(&step_prompt, model, index).await?;
            values.insert(format!("output.{}", index + 1), output.clone());
        }

        Ok(output)
    }

    async fn run_step(&self, prompt: &str, model: &str, index: usize) -> Result<String> {
        let tool_defs = self.step_tools(index);
        let mut messages = vec![
            ChatMessage::system(&self.system_prompt()),
            ChatMessage::user(prompt),
        ];

        for round in 0..=MAX_TOOL_ROUNDS {
            let current_tools: &[ToolDefinition] = if round < MAX_TOOL_ROUNDS {
                &tool_defs
            } else {
                &[]
            };
            let response = self.provider.chat(model, &messages, current_tools).await?;

            if response.tool_calls.is_empty() {
                return Ok(response.content.unwrap_or_default());
            }

            tracing::info!(
                "🔧 Tool round {}/{}: {} tool call(s)",
                round + 1,
                MAX_TOOL_ROUNDS,
                response.tool_calls.len()
            );

            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let arguments = serde_json::from_str(&call.arguments)
                    .unwrap_or_else(|_| serde_json::json!({}));
                let result = match self.tools.call_tool(&call.name, arguments).await {
                    Ok(out) => out,
                    Err(e) => format!("Tool error: {e}"),
                };
                results.push(ChatMessage::tool(&call.id, &result));
            }

            let mut assistant = ChatMessage::assistant(response.content.as_deref().unwrap_or(""));
            assistant.tool_calls = response.tool_calls;
            messages.push(assistant);
            messages.extend(results);
        }

        // a provider that keeps requesting tools after they were withdrawn
        Ok(String::new())
    }
}

#[async_trait]
impl AgentExecutor for WorkflowExecutor {
    async fn run(
        &self,
        trigger: AgentRunTrigger,
        prompt: &str,
        opts: RunOptions,
    ) -> Result<AgentRun> {
        let model = opts
            .model
            .map(|m| m.model)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        let mut run = AgentRun::start(&self.workspace_id, &self.agent, trigger, prompt, opts.run_id);
        run.model = Some(model.clone());
        record(self.recorder.as_ref(), &run).await;

        match with_deadline(opts.timeout_secs, self.execute(prompt, &model)).await {
            Ok(output) => run.succeed(output),
            Err(e) => {
                tracing::warn!("❌ Workflow agent {} failed: {e}", self.agent.name);
                run.fail(e);
            }
        }

        record(self.recorder.as_ref(), &run).await;
        Ok(run)
    }
}
