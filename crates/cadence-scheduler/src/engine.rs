//! Scheduler Engine — the minute-aligned loop that decides which agents are due.
//!
//! Two states: idle (no pending timer) and armed (one pending timer).
//! Every tick re-arms for the next minute boundary, recomputing the delay from
//! the wall clock so drift never accumulates.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cadence_core::config::{SchedulerConfig, Settings};
use cadence_core::error::{CadenceError, Result};
use cadence_core::traits::{AgentRunner, AgentStore, Clock, SettingsSource, WorkspaceDirectory};
use cadence_core::types::{Agent, AgentRun, AgentRunStatus, AgentRunTrigger};
use chrono::{DateTime, Timelike, Utc};
use tokio::task::JoinHandle;

use crate::cron::CronEvaluator;
use crate::webhook;

/// Collaborators the scheduler is wired to.
pub struct SchedulerDeps {
    pub settings: Arc<dyn SettingsSource>,
    pub workspaces: Arc<dyn WorkspaceDirectory>,
    pub agents: Arc<dyn AgentStore>,
    pub runner: Arc<dyn AgentRunner>,
    pub cron: Arc<dyn CronEvaluator>,
    pub clock: Arc<dyn Clock>,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub workspaces: usize,
    /// Agents carrying a schedule.
    pub scheduled: usize,
    /// Agents handed to the runner.
    pub dispatched: usize,
    /// Due occurrences skipped because they already fired.
    pub duplicates: usize,
    /// Recovered failures (cron, prompt, runner, store).
    pub failures: usize,
}

/// A pending timer and the arm generation it belongs to.
struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// The scheduler. One instance per application, constructed explicitly.
pub struct Scheduler {
    deps: SchedulerDeps,
    timer: Mutex<Option<PendingTimer>>,
    arm_count: AtomicU64,
    stop_epoch: AtomicU64,
    /// Last fired occurrence per (workspace, agent). Only used with `dedupe_occurrences`.
    last_fired: tokio::sync::Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(deps: SchedulerDeps) -> Arc<Self> {
        Arc::new(Self {
            deps,
            timer: Mutex::new(None),
            arm_count: AtomicU64::new(0),
            stop_epoch: AtomicU64::new(0),
            last_fired: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Arm a one-shot timer for the next minute boundary. Any pending timer is
    /// cancelled first, so at most one exists. Returns the delay.
    pub fn start(self: &Arc<Self>) -> Duration {
        let mut slot = self.timer_slot();
        self.arm(&mut slot)
    }

    /// Spawn the timer and store it while the caller holds the slot, so a
    /// short delay cannot fire against the previous generation.
    fn arm(self: &Arc<Self>, slot: &mut Option<PendingTimer>) -> Duration {
        let delay = next_tick_delay(self.deps.clock.now());
        let generation = self.arm_count.fetch_add(1, Ordering::SeqCst) + 1;

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(scheduler) = weak.upgrade() {
                scheduler.fire(generation).await;
            }
        });
        if let Some(previous) = slot.replace(PendingTimer { generation, handle }) {
            previous.handle.abort();
        }

        tracing::debug!("⏰ Scheduler armed, next check in {}ms", delay.as_millis());
        delay
    }

    /// Cancel the pending timer. An in-flight check runs to completion but does not re-arm.
    pub fn stop(&self) {
        let mut slot = self.timer_slot();
        self.stop_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = slot.take() {
            pending.handle.abort();
            tracing::info!("⏹️ Scheduler stopped");
        }
    }

    /// Whether a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.timer_slot().is_some()
    }

    /// How many times the timer has been armed since construction.
    pub fn arm_count(&self) -> u64 {
        self.arm_count.load(Ordering::SeqCst)
    }

    async fn fire(self: &Arc<Self>, generation: u64) {
        let epoch = {
            let mut slot = self.timer_slot();
            match slot.as_ref() {
                Some(pending) if pending.generation == generation => {
                    slot.take();
                }
                // superseded by a later start() or cleared by stop()
                _ => return,
            }
            self.stop_epoch.load(Ordering::SeqCst)
        };
        self.check_and_rearm(epoch).await;
    }

    /// Run one tick over every workspace, then re-arm.
    pub async fn check(self: &Arc<Self>) -> TickReport {
        let epoch = self.stop_epoch.load(Ordering::SeqCst);
        self.check_and_rearm(epoch).await
    }

    /// Re-arms only if no `stop()` happened since `epoch` was read.
    async fn check_and_rearm(self: &Arc<Self>, epoch: u64) -> TickReport {
        let report = self.tick().await;

        tracing::debug!(
            "🔁 Tick done: {} workspace(s), {} scheduled, {} dispatched, {} failure(s)",
            report.workspaces,
            report.scheduled,
            report.dispatched,
            report.failures
        );

        let mut slot = self.timer_slot();
        if self.stop_epoch.load(Ordering::SeqCst) == epoch {
            self.arm(&mut slot);
        } else {
            tracing::debug!("Scheduler stopped during tick, not re-arming");
        }
        drop(slot);
        report
    }

    async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let now = self.deps.clock.now();

        let settings = self.deps.settings.load_settings().unwrap_or_else(|e| {
            tracing::warn!("⚠️ Failed to load settings, using defaults: {e}");
            Settings::default()
        });
        if !settings.features.agents {
            tracing::debug!("Agents feature disabled, skipping tick");
            return report;
        }

        let workspaces = match self.deps.workspaces.list_workspaces().await {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("⚠️ Failed to list workspaces: {e}");
                report.failures += 1;
                return report;
            }
        };
        report.workspaces = workspaces.len();

        let mut seen = HashSet::new();
        let mut unreadable = HashSet::new();
        for workspace in &workspaces {
            let agents = match self.deps.agents.load_agents(&workspace.uuid).await {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!("⚠️ Failed to load agents for workspace {}: {e}", workspace.uuid);
                    report.failures += 1;
                    unreadable.insert(workspace.uuid.clone());
                    continue;
                }
            };

            for agent in &agents {
                if agent.cron_schedule().is_some() {
                    seen.insert((workspace.uuid.clone(), agent.id.clone()));
                }
                self.check_agent(&workspace.uuid, agent, now, &settings.scheduler, &mut report)
                    .await;
            }
        }

        // forget agents that were deleted or lost their schedule; keep
        // workspaces that failed to load so a transient error cannot re-fire
        let dedupe = settings.scheduler.dedupe_occurrences;
        self.last_fired
            .lock()
            .await
            .retain(|key, _| dedupe && (seen.contains(key) || unreadable.contains(&key.0)));

        report
    }

    async fn check_agent(
        &self,
        workspace_id: &str,
        agent: &Agent,
        now: DateTime<Utc>,
        config: &SchedulerConfig,
        report: &mut TickReport,
    ) {
        let Some(schedule) = agent.cron_schedule() else {
            return;
        };
        report.scheduled += 1;

        let tolerance = Duration::from_secs(config.tolerance_secs);
        let occurrence = match due_occurrence(self.deps.cron.as_ref(), schedule, now, tolerance) {
            Ok(Some(occurrence)) => occurrence,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("⚠️ Error checking schedule for {}: {e}", agent.name);
                report.failures += 1;
                return;
            }
        };

        let key = (workspace_id.to_string(), agent.id.clone());
        if config.dedupe_occurrences && self.last_fired.lock().await.get(&key) == Some(&occurrence) {
            tracing::debug!("Agent {} already fired for {occurrence}", agent.name);
            report.duplicates += 1;
            return;
        }

        let prompt = match agent.build_prompt(0, &agent.invocation_values) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("⚠️ Error running agent {}: {e}", agent.name);
                report.failures += 1;
                return;
            }
        };

        tracing::info!("🔔 Agent {} is due to run", agent.name);
        report.dispatched += 1;
        match self
            .run_agent(workspace_id, agent, AgentRunTrigger::Schedule, &prompt, None)
            .await
        {
            Ok(run) => {
                if config.dedupe_occurrences {
                    self.last_fired.lock().await.insert(key, occurrence);
                }
                log_run(agent, &run);
            }
            Err(e) => {
                tracing::warn!("⚠️ Error running agent {}: {e}", agent.name);
                report.failures += 1;
            }
        }
    }

    /// Hand an agent to the runner. The runner owns the run record, including
    /// any `scheduler.run_timeout_secs` deadline, so the run is always finalized.
    pub async fn run_agent(
        &self,
        workspace_id: &str,
        agent: &Agent,
        trigger: AgentRunTrigger,
        prompt: &str,
        run_id: Option<String>,
    ) -> Result<AgentRun> {
        self.deps
            .runner
            .run_agent(workspace_id, agent, trigger, prompt, run_id)
            .await
    }

    /// Run the agent owning `token`, overlaying `values` on its invocation values.
    pub async fn run_webhook(
        &self,
        token: &str,
        values: HashMap<String, String>,
    ) -> Result<AgentRun> {
        let (agent, workspace_id) = webhook::find_agent_by_webhook_token(
            self.deps.workspaces.as_ref(),
            self.deps.agents.as_ref(),
            token,
        )
        .await?
        .ok_or_else(|| CadenceError::AgentNotFound(format!("webhook token {token}")))?;

        tracing::info!("🌐 Webhook triggered agent {}", agent.name);
        self.run_with_values(&workspace_id, &agent, AgentRunTrigger::Webhook, values)
            .await
    }

    /// Run an agent by id right now.
    pub async fn run_manual(
        &self,
        workspace_id: &str,
        agent_id: &str,
        values: HashMap<String, String>,
    ) -> Result<AgentRun> {
        let agent = self
            .deps
            .agents
            .load_agents(workspace_id)
            .await?
            .into_iter()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| CadenceError::AgentNotFound(agent_id.to_string()))?;

        tracing::info!("▶️ Manual run of agent {}", agent.name);
        self.run_with_values(workspace_id, &agent, AgentRunTrigger::Manual, values)
            .await
    }

    async fn run_with_values(
        &self,
        workspace_id: &str,
        agent: &Agent,
        trigger: AgentRunTrigger,
        values: HashMap<String, String>,
    ) -> Result<AgentRun> {
        let mut merged = agent.invocation_values.clone();
        merged.extend(values);
        let prompt = agent.build_prompt(0, &merged)?;
        let run = self
            .run_agent(workspace_id, agent, trigger, &prompt, None)
            .await?;
        log_run(agent, &run);
        Ok(run)
    }

    fn timer_slot(&self) -> MutexGuard<'_, Option<PendingTimer>> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.timer_slot().take() {
            pending.handle.abort();
        }
    }
}

fn log_run(agent: &Agent, run: &AgentRun) {
    match run.status {
        AgentRunStatus::Error => tracing::warn!(
            "❌ Agent {} run {} failed: {}",
            agent.name,
            run.id,
            run.error.as_deref().unwrap_or("unknown error")
        ),
        status => tracing::info!("✅ Agent {} run {} finished: {status}", agent.name, run.id),
    }
}

/// Milliseconds until the next minute boundary: `(60 - second) * 1000 - millisecond`.
pub fn next_tick_delay(now: DateTime<Utc>) -> Duration {
    let second = u64::from(now.second());
    // nanosecond() exceeds 1e9 during a leap second
    let millis = u64::from((now.nanosecond() / 1_000_000).min(999));
    Duration::from_millis((60 - second) * 1000 - millis)
}

/// The occurrence an agent is due for at `now`, if any.
///
/// Asks for the next occurrence after `now - tolerance` and treats it as due
/// when it lies strictly within `tolerance` of `now`.
pub fn due_occurrence(
    cron: &dyn CronEvaluator,
    schedule: &str,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> Result<Option<DateTime<Utc>>> {
    let out_of_range =
        || CadenceError::Config(format!("tolerance of {}s is out of range", tolerance.as_secs()));
    let tolerance_ms = i64::try_from(tolerance.as_millis()).map_err(|_| out_of_range())?;
    let reference = chrono::Duration::try_milliseconds(tolerance_ms)
        .and_then(|backoff| now.checked_sub_signed(backoff))
        .ok_or_else(out_of_range)?;
    let next = cron.next_occurrence(schedule, reference)?;
    let drift = next.signed_duration_since(now).num_milliseconds().abs();
    Ok((drift < tolerance_ms).then_some(next))
}
