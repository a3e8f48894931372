//! # Cadence Scheduler
//!
//! Minute-aligned scheduler that fires persisted agents on their cron schedules.
//!
//! ## Design
//! - One pending tokio timer at most, aligned to the next minute boundary
//! - Agents, workspaces and settings re-read on every tick
//! - A failure in one agent never stops the others or the loop
//! - File-based agent store, SQLite run history
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio timer, :00 of every minute)
//!   ├── SettingsSource → features.agents?
//!   ├── WorkspaceDirectory → [ws1, ws2, ...]
//!   │     └── AgentStore → agents with a schedule
//!   │           └── CronEvaluator: next(now - 30s) within ±30s → due
//!   └── due → build_prompt → AgentRunner (workflow | a2a) → RunRecorder
//! ```

pub mod cron;
pub mod engine;
pub mod persistence;
pub mod store;
pub mod webhook;

pub use cron::{CronEvaluator, StandardCron};
pub use engine::{Scheduler, SchedulerDeps, TickReport};
pub use persistence::RunDb;
pub use store::FileStore;
pub use webhook::{find_agent_by_webhook_token, generate_webhook_token};
