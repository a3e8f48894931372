//! # Cadence Agent
//! Executors that actually run an agent once the scheduler decides it is due.
//!
//! - **Workflow**: multi-step LLM runs, up to 3 rounds of tool calls per step
//! - **A2A**: forwards the prompt to a remote peer over JSON-RPC `message/send`
//! - **Dispatch**: `ExecutorDispatch` implements `AgentRunner`, picking by `agent.source`
//!
//! Every run is recorded twice through the `RunRecorder`: when it starts and
//! when it finishes.

pub mod a2a;
pub mod executor;
pub mod provider;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use a2a::A2aExecutor;
pub use executor::{AgentExecutor, ExecutorDispatch, RunOptions};
pub use provider::OpenAiCompatibleProvider;
pub use workflow::WorkflowExecutor;
