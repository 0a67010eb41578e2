//! Contract between the policy core and external action executors.
//!
//! Executors own all side effects (service restarts, container operations,
//! rollback scripts) and bound their own execution time; the core only
//! measures elapsed time and folds the result into a reward.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use remedy_policy::{Severity, SymptomRecord};

/// Incident context handed to an executor alongside the chosen action.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub service: String,
    pub severity: Severity,
    pub issue: SymptomRecord,
}

impl ExecutionContext {
    pub fn for_record(record: &SymptomRecord) -> Self {
        Self {
            service: record.service.clone(),
            severity: record.severity,
            issue: record.clone(),
        }
    }
}

/// Result reported by an executor.
///
/// Any error or non-conforming response from the executor side is folded
/// into `failure` by the orchestrator; a failed remediation is a normal
/// outcome, not an exception.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(serialize_with = "serialize_seconds")]
    pub execution_time: Duration,
    pub message: String,
}

impl ExecutionOutcome {
    pub fn success(execution_time: Duration, message: impl Into<String>) -> Self {
        Self {
            success: true,
            execution_time,
            message: message.into(),
        }
    }

    pub fn failure(execution_time: Duration, message: impl Into<String>) -> Self {
        Self {
            success: false,
            execution_time,
            message: message.into(),
        }
    }
}

fn serialize_seconds<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Async contract implemented by external remediation executors.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &str, context: &ExecutionContext) -> Result<ExecutionOutcome>;
}
