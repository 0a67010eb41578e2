//! End-to-end remediation cycle scenarios across the bus, orchestrator,
//! policy store, and a scripted executor.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use remedy_events::{EventBus, TOPIC_ISSUE_DETECTED, TOPIC_ISSUE_RESOLVED};
use remedy_orchestrator::{ActionExecutor, ExecutionContext, ExecutionOutcome, Orchestrator};
use remedy_policy::{EngineConfig, SqlitePolicyStore, ValueStore};

/// Executor that replays a scripted sequence of outcomes.
struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ExecutionOutcome>>,
}

impl ScriptedExecutor {
    fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::from(outcomes)),
        }
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _action: &str,
        _context: &ExecutionContext,
    ) -> Result<ExecutionOutcome> {
        Ok(self
            .outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or_else(|| ExecutionOutcome::failure(Duration::from_secs(1), "script done")))
    }
}

fn deterministic_config() -> EngineConfig {
    EngineConfig {
        epsilon: 0.0,
        ..EngineConfig::default()
    }
}

fn critical_gateway_payload() -> Value {
    json!({
        "error_kind": "service_down",
        "service": "api_gateway",
        "severity": "critical",
        "user_impact": "high",
        "details": {"status": "unreachable"},
    })
}

#[tokio::test]
async fn critical_outage_selects_first_candidate_deterministically() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(ValueStore::ephemeral());
    let orchestrator = Orchestrator::with_seed(
        &deterministic_config(),
        store,
        Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::success(
            Duration::from_millis(2_500),
            "restarted",
        )])),
        bus,
        5,
    )
    .expect("orchestrator");

    let report = orchestrator.handle_issue(&critical_gateway_payload()).await;
    assert_eq!(report.state, "service_down_critical");
    assert_eq!(report.action, "restart_service_graceful");
}

#[tokio::test]
async fn shaped_reward_for_fast_critical_success_is_positive_and_bounded() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(ValueStore::ephemeral());
    let orchestrator = Orchestrator::with_seed(
        &deterministic_config(),
        store,
        Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::success(
            Duration::from_millis(2_500),
            "restarted",
        )])),
        bus,
        5,
    )
    .expect("orchestrator");

    let report = orchestrator.handle_issue(&critical_gateway_payload()).await;
    // 1.0 * 2.0 * 2.0 * 1.0 - 0.25 for the graceful restart.
    assert!(report.reward > 0.0);
    assert!(report.reward < 4.0);
    assert!((report.reward - 3.75).abs() < 1e-12);
}

#[tokio::test]
async fn alternating_outcomes_blend_into_an_intermediate_estimate() {
    let config = deterministic_config();

    // Single-update references from fresh stores.
    let gain_only = {
        let store = Arc::new(ValueStore::ephemeral());
        let orchestrator = Orchestrator::with_seed(
            &config,
            store.clone(),
            Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::success(
                Duration::from_secs(2),
                "ok",
            )])),
            Arc::new(EventBus::new()),
            5,
        )
        .expect("orchestrator");
        orchestrator.handle_issue(&critical_gateway_payload()).await;
        store
            .get("service_down_critical", "restart_service_graceful")
            .estimate
    };
    let loss_only = {
        let store = Arc::new(ValueStore::ephemeral());
        let orchestrator = Orchestrator::with_seed(
            &config,
            store.clone(),
            Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::failure(
                Duration::from_secs(2),
                "failed",
            )])),
            Arc::new(EventBus::new()),
            5,
        )
        .expect("orchestrator");
        orchestrator.handle_issue(&critical_gateway_payload()).await;
        store
            .get("service_down_critical", "restart_service_graceful")
            .estimate
    };

    // Success then failure against the same pair.
    let store = Arc::new(ValueStore::ephemeral());
    let orchestrator = Orchestrator::with_seed(
        &config,
        store.clone(),
        Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::success(
            Duration::from_secs(2),
            "ok",
        )])),
        Arc::new(EventBus::new()),
        5,
    )
    .expect("orchestrator");
    orchestrator.handle_issue(&critical_gateway_payload()).await;

    // Second cycle runs greedy so the same pair is re-selected (UCB would
    // jump to the next unvisited candidate instead).
    let blended = {
        let mut greedy = deterministic_config();
        greedy.exploration = remedy_policy::ExplorationStrategy::EpsilonGreedy;
        let orchestrator = Orchestrator::with_seed(
            &greedy,
            store.clone(),
            Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::failure(
                Duration::from_secs(2),
                "failed",
            )])),
            Arc::new(EventBus::new()),
            5,
        )
        .expect("orchestrator");
        let report = orchestrator.handle_issue(&critical_gateway_payload()).await;
        assert_eq!(report.action, "restart_service_graceful");
        store
            .get("service_down_critical", "restart_service_graceful")
            .estimate
    };

    let (low, high) = if gain_only < loss_only {
        (gain_only, loss_only)
    } else {
        (loss_only, gain_only)
    };
    assert!(
        blended > low && blended < high,
        "blended {blended} not strictly between {low} and {high}"
    );
}

#[tokio::test]
async fn policy_survives_restart_through_sqlite() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let db_path = tempdir.path().join("policy.db");

    {
        let store = Arc::new(
            ValueStore::open(Box::new(
                SqlitePolicyStore::new(&db_path).expect("create backend"),
            ))
            .expect("open store"),
        );
        let orchestrator = Orchestrator::with_seed(
            &deterministic_config(),
            store,
            Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::success(
                Duration::from_secs(1),
                "ok",
            )])),
            Arc::new(EventBus::new()),
            5,
        )
        .expect("orchestrator");
        orchestrator.handle_issue(&critical_gateway_payload()).await;
    }

    let reloaded = ValueStore::open(Box::new(
        SqlitePolicyStore::new(&db_path).expect("reopen backend"),
    ))
    .expect("reload store");
    let entry = reloaded.get("service_down_critical", "restart_service_graceful");
    assert_eq!(entry.visit_count, 1);
    assert!(entry.estimate > 0.0);
}

#[tokio::test]
async fn concurrent_detections_all_learn_without_lost_updates() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(ValueStore::ephemeral());
    let mut greedy = deterministic_config();
    greedy.exploration = remedy_policy::ExplorationStrategy::EpsilonGreedy;

    struct AlwaysSucceeds;
    #[async_trait]
    impl ActionExecutor for AlwaysSucceeds {
        async fn execute(
            &self,
            _action: &str,
            _context: &ExecutionContext,
        ) -> Result<ExecutionOutcome> {
            Ok(ExecutionOutcome::success(Duration::from_millis(100), "ok"))
        }
    }

    let orchestrator = Arc::new(
        Orchestrator::with_seed(&greedy, store.clone(), Arc::new(AlwaysSucceeds), bus, 5)
            .expect("orchestrator"),
    );

    let mut handles = Vec::new();
    for _ in 0..16 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .handle_issue(&critical_gateway_payload())
                .await;
        }));
    }
    for handle in handles {
        handle.await.expect("join");
    }

    // Greedy + all-positive rewards keeps every cycle on the first
    // candidate; all 16 increments must land.
    assert_eq!(
        store
            .get("service_down_critical", "restart_service_graceful")
            .visit_count,
        16
    );
    assert_eq!(orchestrator.metrics().issues_handled, 16);
}

#[tokio::test]
async fn bus_wiring_publishes_resolutions_for_detections() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(ValueStore::ephemeral());
    let resolutions = Arc::new(Mutex::new(Vec::new()));
    {
        let resolutions = resolutions.clone();
        bus.subscribe(TOPIC_ISSUE_RESOLVED, move |payload| {
            resolutions
                .lock()
                .expect("resolutions lock")
                .push(payload.clone());
        });
    }

    let orchestrator = Arc::new(
        Orchestrator::with_seed(
            &deterministic_config(),
            store,
            Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::success(
                Duration::from_secs(1),
                "ok",
            )])),
            bus.clone(),
            5,
        )
        .expect("orchestrator"),
    );
    orchestrator.attach(tokio::runtime::Handle::current());

    bus.publish(TOPIC_ISSUE_DETECTED, &critical_gateway_payload());

    for _ in 0..100 {
        if !resolutions.lock().expect("resolutions lock").is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let resolutions = resolutions.lock().expect("resolutions lock");
    assert_eq!(resolutions.len(), 1);
    let payload = &resolutions[0];
    assert_eq!(
        payload.get("action_taken").and_then(Value::as_str),
        Some("restart_service_graceful")
    );
    assert!(payload.pointer("/result/success").is_some());
    assert!(payload.get("reward").and_then(Value::as_f64).is_some());
    assert!(payload.get("execution_time").and_then(Value::as_f64).is_some());
}
