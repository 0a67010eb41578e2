//! Per-state remediation action candidates and the manual fallback.

use std::collections::BTreeMap;

/// Ordered candidate actions per state symbol, read-only after construction.
///
/// States missing from the table (or mapped to an empty list) resolve to the
/// designated manual-fallback action instead of an error, so every state is
/// actionable.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCatalog {
    actions: BTreeMap<String, Vec<String>>,
    fallback_action: String,
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::new(default_action_table(), DEFAULT_FALLBACK_ACTION)
    }
}

/// Action used when no candidates are cataloged for a state.
pub const DEFAULT_FALLBACK_ACTION: &str = "investigate_manual";

impl ActionCatalog {
    pub fn new(actions: BTreeMap<String, Vec<String>>, fallback_action: impl Into<String>) -> Self {
        Self {
            actions,
            fallback_action: fallback_action.into(),
        }
    }

    /// Candidate actions for `state` in first-seen order; empty when unmapped.
    pub fn candidates(&self, state: &str) -> &[String] {
        self.actions
            .get(state)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn fallback_action(&self) -> &str {
        &self.fallback_action
    }

    /// Cataloged state symbols in sorted order.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn table(&self) -> &BTreeMap<String, Vec<String>> {
        &self.actions
    }
}

/// The built-in candidate table covering the default state symbols.
pub fn default_action_table() -> BTreeMap<String, Vec<String>> {
    let entries: [(&str, &[&str]); 7] = [
        (
            "service_down_critical",
            &[
                "restart_service_graceful",
                "restart_service_force",
                "failover_to_backup",
                "scale_horizontal",
                "rollback_deployment",
            ],
        ),
        (
            "service_degraded_performance",
            &[
                "optimize_queries",
                "clear_cache",
                "restart_service_graceful",
                "scale_vertical",
                "enable_circuit_breaker",
            ],
        ),
        (
            "database_connection_lost",
            &[
                "restart_database_service",
                "reset_connection_pool",
                "failover_to_replica",
                "increase_connection_timeout",
                "restart_application",
            ],
        ),
        (
            "resource_exhaustion_memory",
            &[
                "restart_high_memory_processes",
                "clear_application_cache",
                "scale_vertical",
                "enable_memory_limits",
                "garbage_collection_force",
            ],
        ),
        (
            "resource_exhaustion_cpu",
            &[
                "scale_horizontal",
                "optimize_cpu_intensive_tasks",
                "restart_cpu_heavy_processes",
                "enable_cpu_throttling",
                "load_balance_redistribute",
            ],
        ),
        (
            "network_connectivity_lost",
            &[
                "restart_network_service",
                "switch_network_interface",
                "reset_network_stack",
                "failover_to_backup_network",
                "contact_network_team",
            ],
        ),
        (
            "deployment_failure",
            &[
                "rollback_to_previous_version",
                "retry_deployment",
                "manual_deployment_fix",
                "revert_configuration",
                "emergency_maintenance_mode",
            ],
        ),
    ];

    entries
        .into_iter()
        .map(|(state, actions)| {
            (
                state.to_string(),
                actions.iter().map(|action| action.to_string()).collect(),
            )
        })
        .collect()
}
