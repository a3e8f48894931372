//! Executor seam — picks the workflow or A2A executor for an agent and runs it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::config::Settings;
use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::{AgentRunner, ChatProvider, RunRecorder, SettingsSource, ToolHost};
use cadence_core::types::{Agent, AgentRun, AgentRunTrigger, AgentSource, ModelSelector};

use crate::a2a::A2aExecutor;
use crate::workflow::WorkflowExecutor;

/// Per-run options handed to an executor.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Reused when resuming a run; generated otherwise.
    pub run_id: Option<String>,
    pub model: Option<ModelSelector>,
    /// Deadline for the work after the run is first recorded.
    pub timeout_secs: Option<u64>,
}

/// One way of running an agent.
///
/// Execution failures come back as an error-status `AgentRun`.
/// `Err` means the executor could not be used at all.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn run(
        &self,
        trigger: AgentRunTrigger,
        prompt: &str,
        opts: RunOptions,
    ) -> Result<AgentRun>;
}

/// `AgentRunner` that builds the right executor per call.
pub struct ExecutorDispatch {
    settings: Arc<dyn SettingsSource>,
    provider: Arc<dyn ChatProvider>,
    tools: Arc<dyn ToolHost>,
    recorder: Arc<dyn RunRecorder>,
    http: reqwest::Client,
}

impl ExecutorDispatch {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        provider: Arc<dyn ChatProvider>,
        tools: Arc<dyn ToolHost>,
        recorder: Arc<dyn RunRecorder>,
    ) -> Self {
        Self {
            settings,
            provider,
            tools,
            recorder,
            http: reqwest::Client::new(),
        }
    }

    fn executor_for(
        &self,
        workspace_id: &str,
        agent: &Agent,
        settings: &Settings,
    ) -> Box<dyn AgentExecutor> {
        match agent.source {
            AgentSource::A2a => Box::new(A2aExecutor::new(
                workspace_id,
                agent.clone(),
                self.recorder.clone(),
                self.http.clone(),
            )),
            AgentSource::Local => Box::new(WorkflowExecutor::new(
                workspace_id,
                agent.clone(),
                settings,
                self.provider.clone(),
                self.tools.clone(),
                self.recorder.clone(),
            )),
        }
    }
}

#[async_trait]
impl AgentRunner for ExecutorDispatch {
    async fn run_agent(
        &self,
        workspace_id: &str,
        agent: &Agent,
        trigger: AgentRunTrigger,
        prompt: &str,
        run_id: Option<String>,
    ) -> Result<AgentRun> {
        tracing::debug!(
            "🚀 Dispatching agent {} ({:?}) trigger={trigger}",
            agent.name,
            agent.source
        );
        let settings = self.settings.load_settings().unwrap_or_else(|e| {
            tracing::warn!("⚠️ Failed to load settings, using defaults: {e}");
            Settings::default()
        });
        let opts = RunOptions {
            run_id,
            model: agent.model.clone(),
            timeout_secs: settings.scheduler.run_timeout_secs,
        };
        self.executor_for(workspace_id, agent, &settings)
            .run(trigger, prompt, opts)
            .await
    }
}

/// Await `work`, giving up with `CadenceError::Timeout` once `timeout_secs` elapse.
pub(crate) async fn with_deadline<T>(
    timeout_secs: Option<u64>,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), work)
            .await
            .unwrap_or(Err(CadenceError::Timeout(secs))),
        None => work.await,
    }
}

/// Persist a run, logging instead of failing.
pub(crate) async fn record(recorder: &dyn RunRecorder, run: &AgentRun) {
    if let Err(e) = recorder.save_agent_run(run).await {
        tracing::warn!("⚠️ Failed to record run {} ({}): {e}", run.id, run.status);
    }
}
