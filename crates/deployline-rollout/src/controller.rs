//! Canary controller — shifts alias traffic step by step under an alarm.
//!
//! Each rollout runs as its own background task:
//!
//! ```text
//! Pending ─▶ Shifting ─┬─▶ Completed   (every step held without breach)
//!                      └─▶ RolledBack  (alarm breach or operator cancel)
//! ```
//!
//! While a step holds, the task evaluates the alarm once per alarm period
//! and reverts on the first `Breached` verdict. The verdict is checked once
//! more at every step boundary before the weight advances. Terminal states
//! are final; a rollout reverts at most once.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use deployline_core::{AlarmSpec, AutoRollbackConfig, CanaryPlan, VersionId};
use deployline_metrics::{MetricSource, epoch_secs};

use crate::alias::AliasRegistry;
use crate::error::{RolloutError, RolloutResult};
use crate::rollback::{PeriodOutcome, RollbackManager, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutState {
    Pending,
    Shifting,
    Completed,
    RolledBack,
}

impl RolloutState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RolloutState::Completed | RolloutState::RolledBack)
    }
}

/// Something that happened during a rollout, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RolloutEvent {
    Started,
    WeightShifted { step: usize, weight: u8 },
    /// A period could not be measured.
    MetricGap { reason: String },
    AlarmBreached { value: f64, consecutive: u32 },
    RollbackTriggered { reason: String },
    Completed,
    Cancelled { reason: String },
}

/// Snapshot of one rollout.
#[derive(Debug, Clone, Serialize)]
pub struct RolloutStatus {
    pub id: String,
    pub alias: String,
    pub old_version: VersionId,
    pub new_version: VersionId,
    pub state: RolloutState,
    /// Current weight of the new version.
    pub weight: u8,
    /// Index of the current step.
    pub step: usize,
    pub total_steps: usize,
    /// Every weight the new version was given, in order.
    pub weight_history: Vec<u8>,
    pub events: Vec<RolloutEvent>,
    pub auto_rollback: bool,
    pub started_at: u64,
}

/// Caller's handle on a running rollout.
#[derive(Clone)]
pub struct RolloutHandle {
    id: String,
    alias: String,
    status: watch::Receiver<RolloutStatus>,
    cancel: Arc<watch::Sender<Option<String>>>,
}

impl RolloutHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn status(&self) -> RolloutStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RolloutStatus> {
        self.status.clone()
    }

    /// Ask the rollout to revert. Returns false if it already finished.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        if self.status.borrow().state.is_terminal() {
            return false;
        }
        let reason = reason.into();
        info!(rollout = %self.id, alias = %self.alias, %reason, "rollout cancel requested");
        self.cancel.send_replace(Some(reason));
        true
    }

    /// Resolve once the rollout reaches a terminal state.
    pub async fn wait(&self) -> RolloutStatus {
        let mut rx = self.status.clone();
        let done = rx
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|status| status.clone());
        match done {
            Ok(status) => status,
            Err(_) => rx.borrow().clone(),
        }
    }
}

impl std::fmt::Debug for RolloutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloutHandle")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("state", &self.status.borrow().state)
            .finish()
    }
}

/// Latest rollout on an alias.
struct RolloutSlot {
    handle: RolloutHandle,
    task: AbortHandle,
    /// Finalizes the rollout if its task dies; taken by `stop_all`.
    watcher: Option<JoinHandle<()>>,
}

impl RolloutSlot {
    fn is_active(&self) -> bool {
        let settled = self.watcher.as_ref().is_none_or(|w| w.is_finished());
        !self.handle.status().state.is_terminal() && !settled
    }
}

/// Starts and tracks canary rollouts, at most one active per alias.
#[derive(Clone)]
pub struct CanaryController {
    aliases: AliasRegistry,
    metrics: Arc<dyn MetricSource>,
    /// alias → latest rollout (active or finished).
    rollouts: Arc<RwLock<HashMap<String, RolloutSlot>>>,
}

impl CanaryController {
    pub fn new(aliases: AliasRegistry, metrics: Arc<dyn MetricSource>) -> Self {
        Self {
            aliases,
            metrics,
            rollouts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    /// Start shifting `alias` to `new_version`, reverting on alarm breach.
    pub async fn start_rollout(
        &self,
        alias: &str,
        new_version: VersionId,
        plan: CanaryPlan,
        alarm: AlarmSpec,
    ) -> RolloutResult<RolloutHandle> {
        self.start_rollout_with(alias, new_version, plan, alarm, AutoRollbackConfig::default())
            .await
    }

    pub async fn start_rollout_with(
        &self,
        alias: &str,
        new_version: VersionId,
        plan: CanaryPlan,
        alarm: AlarmSpec,
        auto_rollback: AutoRollbackConfig,
    ) -> RolloutResult<RolloutHandle> {
        plan.validate()?;
        alarm.validate()?;

        let mut rollouts = self.rollouts.write().await;
        if let Some(slot) = rollouts.get(alias) {
            if slot.is_active() {
                return Err(RolloutError::RolloutInProgress {
                    alias: alias.to_string(),
                    id: slot.handle.id.clone(),
                });
            }
        }

        let current = self
            .aliases
            .get(alias)
            .await
            .ok_or_else(|| RolloutError::UnknownAlias(alias.to_string()))?;
        if current.live == new_version {
            return Err(RolloutError::Validation(format!(
                "{new_version} is already live on {alias}"
            )));
        }

        let id = Uuid::new_v4().to_string();
        let status = RolloutStatus {
            id: id.clone(),
            alias: alias.to_string(),
            old_version: current.live,
            new_version,
            state: RolloutState::Pending,
            weight: 0,
            step: 0,
            total_steps: plan.steps.len(),
            weight_history: Vec::new(),
            events: Vec::new(),
            auto_rollback: auto_rollback.deployment_in_alarm,
            started_at: epoch_secs(),
        };
        let (status_tx, status_rx) = watch::channel(status);
        let status_tx = Arc::new(status_tx);
        let (cancel_tx, cancel_rx) = watch::channel(None);
        let cancel_tx = Arc::new(cancel_tx);

        let run = RolloutRun {
            alias: alias.to_string(),
            plan,
            manager: RollbackManager::new(alarm),
            auto_rollback: auto_rollback.deployment_in_alarm,
            aliases: self.aliases.clone(),
            metrics: self.metrics.clone(),
            status: status_tx.clone(),
            cancel: cancel_rx,
            _cancel_keepalive: cancel_tx.clone(),
        };
        let task = tokio::spawn(run.drive());
        let abort = task.abort_handle();
        let watcher = tokio::spawn(settle_if_lost(
            task,
            alias.to_string(),
            self.aliases.clone(),
            status_tx,
        ));

        let handle = RolloutHandle {
            id: id.clone(),
            alias: alias.to_string(),
            status: status_rx,
            cancel: cancel_tx,
        };
        rollouts.insert(
            alias.to_string(),
            RolloutSlot {
                handle: handle.clone(),
                task: abort,
                watcher: Some(watcher),
            },
        );
        info!(rollout = %id, %alias, "rollout registered");
        Ok(handle)
    }

    /// Handle on the non-terminal rollout for `alias`, if any.
    pub async fn active_rollout(&self, alias: &str) -> Option<RolloutHandle> {
        let rollouts = self.rollouts.read().await;
        rollouts
            .get(alias)
            .filter(|slot| slot.is_active())
            .map(|slot| slot.handle.clone())
    }

    /// Latest rollout status for `alias`, active or finished.
    pub async fn rollout(&self, alias: &str) -> Option<RolloutStatus> {
        let rollouts = self.rollouts.read().await;
        rollouts.get(alias).map(|slot| slot.handle.status())
    }

    /// Latest rollout per alias, sorted by alias.
    pub async fn rollouts(&self) -> Vec<RolloutStatus> {
        let rollouts = self.rollouts.read().await;
        let mut statuses: Vec<RolloutStatus> =
            rollouts.values().map(|slot| slot.handle.status()).collect();
        statuses.sort_by(|a, b| a.alias.cmp(&b.alias));
        statuses
    }

    /// Cancel the active rollout on `alias`.
    pub async fn cancel(&self, alias: &str, reason: &str) -> RolloutResult<RolloutHandle> {
        let handle = self
            .active_rollout(alias)
            .await
            .ok_or_else(|| RolloutError::NoActiveRollout(alias.to_string()))?;
        if !handle.cancel(reason) {
            return Err(RolloutError::NoActiveRollout(alias.to_string()));
        }
        Ok(handle)
    }

    /// Abort every rollout task (for shutdown). Unfinished rollouts are
    /// reverted and marked `RolledBack` before this returns.
    pub async fn stop_all(&self) {
        let mut rollouts = self.rollouts.write().await;
        for (alias, slot) in rollouts.iter() {
            if !slot.task.is_finished() {
                slot.task.abort();
                debug!(%alias, rollout = %slot.handle.id, "rollout task aborted");
            }
        }
        for (alias, slot) in rollouts.iter_mut() {
            if let Some(watcher) = slot.watcher.take() {
                if let Err(e) = watcher.await {
                    warn!(%alias, error = %e, "rollout watcher failed");
                }
            }
        }
    }
}

/// Wait for a rollout task; if it panicked or was aborted before reaching a
/// terminal state, drop the canary and record the rollback.
async fn settle_if_lost(
    task: JoinHandle<()>,
    alias: String,
    aliases: AliasRegistry,
    status: Arc<watch::Sender<RolloutStatus>>,
) {
    let Err(e) = task.await else {
        return;
    };
    if status.borrow().state.is_terminal() {
        return;
    }
    let reason = if e.is_panic() {
        "rollout task panicked".to_string()
    } else {
        "rollout task stopped".to_string()
    };
    warn!(%alias, %reason, "rollout lost, reverting");
    if let Err(err) = aliases.revert(&alias).await {
        warn!(%alias, error = %err, "failed to revert alias");
    }
    status.send_modify(|s| {
        s.events.push(RolloutEvent::RollbackTriggered { reason });
        s.state = RolloutState::RolledBack;
        s.weight = 0;
    });
}

/// State owned by one rollout's background task.
struct RolloutRun {
    alias: String,
    plan: CanaryPlan,
    manager: RollbackManager,
    auto_rollback: bool,
    aliases: AliasRegistry,
    metrics: Arc<dyn MetricSource>,
    status: Arc<watch::Sender<RolloutStatus>>,
    cancel: watch::Receiver<Option<String>>,
    _cancel_keepalive: Arc<watch::Sender<Option<String>>>,
}

enum Halt {
    Breached,
    Cancelled(String),
}

impl RolloutRun {
    async fn drive(mut self) {
        let (id, new_version) = {
            let status = self.status.borrow();
            (status.id.clone(), status.new_version.clone())
        };
        info!(
            rollout = %id,
            alias = %self.alias,
            version = %new_version,
            steps = self.plan.steps.len(),
            auto_rollback = self.auto_rollback,
            "rollout started"
        );
        self.push(|s| {
            s.state = RolloutState::Shifting;
            s.events.push(RolloutEvent::Started);
        });

        let halt = self.shift(&new_version).await;

        let result = match halt {
            None => {
                let promoted = self.aliases.promote(&self.alias, &new_version).await;
                self.push(|s| {
                    s.state = RolloutState::Completed;
                    s.weight = 100;
                    s.events.push(RolloutEvent::Completed);
                });
                info!(rollout = %id, alias = %self.alias, "rollout completed");
                promoted
            }
            Some(halt) => {
                let reverted = self.aliases.revert(&self.alias).await;
                let reason = match &halt {
                    Halt::Breached => format!("alarm {} in breach", self.manager.alarm().metric),
                    Halt::Cancelled(reason) => reason.clone(),
                };
                warn!(rollout = %id, alias = %self.alias, %reason, "rolling back");
                self.push(|s| {
                    if let Halt::Cancelled(reason) = &halt {
                        s.events.push(RolloutEvent::Cancelled {
                            reason: reason.clone(),
                        });
                    }
                    s.events.push(RolloutEvent::RollbackTriggered { reason });
                    s.state = RolloutState::RolledBack;
                    s.weight = 0;
                });
                reverted
            }
        };
        if let Err(e) = result {
            warn!(rollout = %id, alias = %self.alias, error = %e, "failed to publish final routing");
        }
        self.manager.reset();
    }

    /// Walk the plan. Returns why it stopped early, if it did.
    async fn shift(&mut self, new_version: &VersionId) -> Option<Halt> {
        let period = self.manager.alarm().period;
        let clock = RolloutClock::start();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let steps = self.plan.steps.clone();
        for (index, step) in steps.iter().enumerate() {
            if let Some(halt) = self.check_boundary() {
                return Some(halt);
            }

            if let Err(e) = self.aliases.shift(&self.alias, new_version, step.weight).await {
                warn!(alias = %self.alias, error = %e, "alias disappeared mid-rollout");
                return Some(Halt::Cancelled(e.to_string()));
            }
            self.push(|s| {
                s.step = index;
                s.weight = step.weight;
                s.weight_history.push(step.weight);
                s.events.push(RolloutEvent::WeightShifted {
                    step: index,
                    weight: step.weight,
                });
            });
            info!(alias = %self.alias, step = index, weight = step.weight, hold = ?step.hold, "weight shifted");

            let deadline = Instant::now() + step.hold;
            loop {
                tokio::select! {
                    biased;
                    changed = self.cancel.changed() => {
                        if changed.is_ok() {
                            if let Some(reason) = self.cancel.borrow_and_update().clone() {
                                return Some(Halt::Cancelled(reason));
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        if let Some(halt) = self.poll(clock.now()).await {
                            return Some(halt);
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
        }

        self.check_boundary()
    }

    /// Verdict gate between steps.
    fn check_boundary(&mut self) -> Option<Halt> {
        if let Some(reason) = self.cancel.borrow_and_update().clone() {
            return Some(Halt::Cancelled(reason));
        }
        if self.auto_rollback && self.manager.verdict() == Verdict::Breached {
            return Some(Halt::Breached);
        }
        None
    }

    /// Evaluate one alarm period.
    async fn poll(&mut self, now: u64) -> Option<Halt> {
        let before = self.manager.verdict();
        let verdict = self.manager.evaluate(self.metrics.as_ref(), now).await;

        match self.manager.last_outcome().cloned() {
            Some(PeriodOutcome::Inconclusive { reason }) => {
                self.push(|s| s.events.push(RolloutEvent::MetricGap { reason }));
            }
            Some(PeriodOutcome::Violated { value }) if before != verdict => {
                let consecutive = self.manager.consecutive_violations();
                self.push(|s| {
                    s.events
                        .push(RolloutEvent::AlarmBreached { value, consecutive })
                });
                if !self.auto_rollback {
                    warn!(alias = %self.alias, value, "alarm breached, auto rollback disabled; continuing");
                }
            }
            _ => {}
        }

        (self.auto_rollback && verdict == Verdict::Breached).then_some(Halt::Breached)
    }

    fn push(&self, f: impl FnOnce(&mut RolloutStatus)) {
        self.status.send_modify(f);
    }
}

/// Wall-clock seconds that advance with tokio time.
struct RolloutClock {
    epoch: u64,
    started: Instant,
}

impl RolloutClock {
    fn start() -> Self {
        Self {
            epoch: epoch_secs(),
            started: Instant::now(),
        }
    }

    fn now(&self) -> u64 {
        self.epoch + self.started.elapsed().as_secs()
    }
}
