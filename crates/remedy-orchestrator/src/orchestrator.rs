//! The detect → decide → act → learn cycle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use remedy_events::{EventBus, TOPIC_ISSUE_DETECTED, TOPIC_ISSUE_RESOLVED};
use remedy_policy::{
    ActionSelector, EngineConfig, Learner, RewardShaper, SelectionDecision, StateAbstractor,
    SymptomRecord, ValueStore,
};

use crate::executor::{ActionExecutor, ExecutionContext, ExecutionOutcome};

/// Completed remediation cycles kept for dashboards.
const RECENT_OUTCOME_CAP: usize = 100;

/// One completed remediation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub issue: SymptomRecord,
    pub state: String,
    pub action: String,
    pub decision: SelectionDecision,
    pub success: bool,
    pub execution_seconds: f64,
    pub message: String,
    pub reward: f64,
    pub estimate: f64,
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionReport {
    /// Payload published on `issue.resolved`.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "issue": self.issue.to_payload(),
            "action_taken": self.action,
            "result": {
                "success": self.success,
                "execution_time": self.execution_seconds,
                "message": self.message,
            },
            "reward": self.reward,
            "execution_time": self.execution_seconds,
        })
    }
}

/// Aggregate counters over all cycles handled by this orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunMetrics {
    pub issues_handled: u64,
    pub successful_resolutions: u64,
    pub success_rate: f64,
    pub average_recent_reward: f64,
}

/// Drives the remediation cycle for each detected issue.
///
/// Cycles for different issues run concurrently as independently spawned
/// tasks; once accepted, a cycle always runs to completion. No value-store
/// lock is held while the external executor runs.
pub struct Orchestrator {
    abstractor: StateAbstractor,
    selector: ActionSelector,
    shaper: RewardShaper,
    learner: Learner,
    store: Arc<ValueStore>,
    executor: Arc<dyn ActionExecutor>,
    bus: Arc<EventBus>,
    recent: Mutex<VecDeque<ResolutionReport>>,
    issues_handled: AtomicU64,
    successful_resolutions: AtomicU64,
}

impl Orchestrator {
    /// Assembles the cycle components from an engine config.
    pub fn new(
        config: &EngineConfig,
        store: Arc<ValueStore>,
        executor: Arc<dyn ActionExecutor>,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        Self::build(config, store, executor, bus, None)
    }

    /// Like [`Orchestrator::new`] but with a seeded selector for
    /// reproducible runs.
    pub fn with_seed(
        config: &EngineConfig,
        store: Arc<ValueStore>,
        executor: Arc<dyn ActionExecutor>,
        bus: Arc<EventBus>,
        seed: u64,
    ) -> Result<Self> {
        Self::build(config, store, executor, bus, Some(seed))
    }

    fn build(
        config: &EngineConfig,
        store: Arc<ValueStore>,
        executor: Arc<dyn ActionExecutor>,
        bus: Arc<EventBus>,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(config.catalog());
        let selector = match seed {
            Some(seed) => ActionSelector::with_seed(
                catalog.clone(),
                store.clone(),
                config.epsilon,
                config.exploration,
                seed,
            ),
            None => ActionSelector::new(
                catalog.clone(),
                store.clone(),
                config.epsilon,
                config.exploration,
            ),
        };
        let learner = Learner::new(store.clone(), catalog, config.alpha, config.gamma)?;

        Ok(Self {
            abstractor: StateAbstractor::default(),
            selector,
            shaper: RewardShaper::new(config.reward.clone()),
            learner,
            store,
            executor,
            bus,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_OUTCOME_CAP)),
            issues_handled: AtomicU64::new(0),
            successful_resolutions: AtomicU64::new(0),
        })
    }

    /// Subscribes to `issue.detected`, spawning one task per delivery so
    /// cycles for different issues proceed concurrently.
    pub fn attach(self: &Arc<Self>, handle: tokio::runtime::Handle) {
        let orchestrator = self.clone();
        self.bus.subscribe(TOPIC_ISSUE_DETECTED, move |payload| {
            let orchestrator = orchestrator.clone();
            let payload = payload.clone();
            handle.spawn(async move {
                orchestrator.handle_issue(&payload).await;
            });
        });
    }

    /// Runs one full remediation cycle for a detected issue.
    ///
    /// The cycle always completes: executor failures and unreachable
    /// executors become failed outcomes, and a persistence failure after the
    /// in-memory update is logged rather than aborting.
    pub async fn handle_issue(&self, payload: &Value) -> ResolutionReport {
        let record = SymptomRecord::from_payload(payload);
        let sequence = self.issues_handled.fetch_add(1, Ordering::SeqCst) + 1;

        let state = self.abstractor.state_for(&record);
        let selection = self.selector.select(&state);
        tracing::info!(
            sequence,
            state = %state,
            action = %selection.action,
            decision = ?selection.decision,
            service = %record.service,
            severity = record.severity.as_str(),
            "remediation selected"
        );

        let context = ExecutionContext::for_record(&record);
        let started = Instant::now();
        let outcome = match self.executor.execute(&selection.action, &context).await {
            Ok(outcome) => outcome,
            Err(error) => {
                // An unreachable executor is a failed outcome, not an abort.
                tracing::warn!(
                    state = %state,
                    action = %selection.action,
                    %error,
                    "executor unreachable; treating as failure"
                );
                ExecutionOutcome::failure(started.elapsed(), format!("executor error: {error}"))
            }
        };

        let reward = self.shaper.shape(
            &record,
            &selection.action,
            outcome.success,
            outcome.execution_time,
        );
        let estimate = match self.learner.update(&state, &selection.action, reward) {
            Ok(update) => update.new_estimate,
            Err(error) => {
                // The in-memory estimate already moved; report and continue.
                tracing::error!(
                    state = %state,
                    action = %selection.action,
                    %error,
                    "value store persistence failed"
                );
                self.store.get(&state, &selection.action).estimate
            }
        };

        if outcome.success {
            self.successful_resolutions.fetch_add(1, Ordering::SeqCst);
        }

        let report = ResolutionReport {
            issue: record,
            state,
            action: selection.action,
            decision: selection.decision,
            success: outcome.success,
            execution_seconds: outcome.execution_time.as_secs_f64(),
            message: outcome.message,
            reward,
            estimate,
            resolved_at: Utc::now(),
        };
        tracing::info!(
            sequence,
            state = %report.state,
            action = %report.action,
            success = report.success,
            reward = report.reward,
            estimate = report.estimate,
            "remediation cycle completed"
        );

        self.push_recent(report.clone());
        self.bus.publish(TOPIC_ISSUE_RESOLVED, &report.to_payload());
        report
    }

    fn push_recent(&self, report: ResolutionReport) {
        let mut recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if recent.len() == RECENT_OUTCOME_CAP {
            recent.pop_front();
        }
        recent.push_back(report);
    }

    /// Most recent completed cycles, oldest first, capped at 100.
    pub fn recent_outcomes(&self) -> Vec<ResolutionReport> {
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Aggregate run counters for operator dashboards.
    pub fn metrics(&self) -> RunMetrics {
        let issues_handled = self.issues_handled.load(Ordering::SeqCst);
        let successful_resolutions = self.successful_resolutions.load(Ordering::SeqCst);
        let success_rate = if issues_handled == 0 {
            0.0
        } else {
            successful_resolutions as f64 / issues_handled as f64
        };

        let recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let average_recent_reward = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|report| report.reward).sum::<f64>() / recent.len() as f64
        };

        RunMetrics {
            issues_handled,
            successful_resolutions,
            success_rate,
            average_recent_reward,
        }
    }

    /// Read-only view of the full learned policy.
    pub fn policy_snapshot(&self) -> Vec<remedy_policy::ValueRecord> {
        self.store.snapshot()
    }
}
