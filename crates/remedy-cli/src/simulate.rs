//! Synthetic failure scenarios and the simulated executor used by
//! `remedy simulate`.
//!
//! Real deployments wire an executor that owns actual side effects; the
//! simulator stands in for it with per-action success and latency profiles
//! so the learning loop can be exercised end to end.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use remedy_orchestrator::{ActionExecutor, ExecutionContext, ExecutionOutcome};

/// Failure scenarios cycled through by the simulation driver.
pub fn scenario_payloads() -> Vec<Value> {
    vec![
        json!({
            "error_kind": "service_down",
            "service": "api_gateway",
            "severity": "critical",
            "user_impact": "high",
            "details": {"status": "unreachable", "error": "connection refused"},
        }),
        json!({
            "error_kind": "service_down",
            "service": "checkout",
            "severity": "high",
            "user_impact": "medium",
            "details": {"response_time_ms": 4800, "error_rate": 0.31},
        }),
        json!({
            "error_kind": "database_connection_lost",
            "service": "orders_db",
            "severity": "critical",
            "user_impact": "high",
            "details": {"connection_pool": "exhausted", "query_timeout": true},
        }),
        json!({
            "error_kind": "resource_exhaustion",
            "service": "batch_worker",
            "severity": "high",
            "user_impact": "low",
            "details": {"memory_percentage": 97, "swap_usage": "high"},
        }),
        json!({
            "error_kind": "resource_exhaustion",
            "service": "render_farm",
            "severity": "high",
            "user_impact": "medium",
            "details": {"cpu_percentage": 99, "load_average": 41.5},
        }),
        json!({
            "error_kind": "network_partition",
            "service": "mesh_gateway",
            "severity": "critical",
            "user_impact": "high",
            "details": {"packet_loss": 0.42},
        }),
        json!({
            "error_kind": "deployment_rollout_stuck",
            "service": "billing",
            "severity": "critical",
            "user_impact": "medium",
            "details": {"deployment_stage": "canary", "rollback_available": true},
        }),
        json!({
            "error_kind": "service_timeout",
            "service": "payment_service",
            "severity": "high",
            "user_impact": "high",
            "details": {"timeout_ms": 30000},
        }),
    ]
}

struct ActionProfile {
    success_rate: f64,
    latency_range_ms: (u64, u64),
}

fn profile_for(action: &str) -> ActionProfile {
    if action.contains("graceful") || action.starts_with("clear_") {
        ActionProfile {
            success_rate: 0.9,
            latency_range_ms: (400, 1_500),
        }
    } else if action.contains("force") || action.starts_with("restart_") {
        ActionProfile {
            success_rate: 0.8,
            latency_range_ms: (200, 1_000),
        }
    } else if action.contains("rollback") || action.contains("revert") {
        ActionProfile {
            success_rate: 0.85,
            latency_range_ms: (1_500, 4_000),
        }
    } else if action.contains("scale") || action.contains("failover") {
        ActionProfile {
            success_rate: 0.75,
            latency_range_ms: (2_000, 6_000),
        }
    } else if action.contains("manual") || action.contains("investigate") || action.contains("contact") {
        ActionProfile {
            success_rate: 0.5,
            latency_range_ms: (3_000, 9_000),
        }
    } else {
        ActionProfile {
            success_rate: 0.7,
            latency_range_ms: (500, 2_500),
        }
    }
}

/// Executor with per-action success and latency profiles.
pub struct SimulatedExecutor {
    rng: Mutex<StdRng>,
}

impl SimulatedExecutor {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

#[async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn execute(&self, action: &str, context: &ExecutionContext) -> Result<ExecutionOutcome> {
        let profile = profile_for(action);
        let (success, latency_ms) = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let success = rng.gen::<f64>() < profile.success_rate;
            let (low, high) = profile.latency_range_ms;
            (success, rng.gen_range(low..=high))
        };

        let execution_time = Duration::from_millis(latency_ms);
        let message = if success {
            format!("{action} applied to {}", context.service)
        } else {
            format!("{action} failed on {}", context.service)
        };
        Ok(if success {
            ExecutionOutcome::success(execution_time, message)
        } else {
            ExecutionOutcome::failure(execution_time, message)
        })
    }
}
