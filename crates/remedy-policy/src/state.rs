//! Symptom-to-state inference via an ordered predicate rule table.
//!
//! Rules are plain data evaluated top-down; the first match wins. Outage
//! conditions are listed before resource conditions because a record can
//! satisfy both, and policy lookups depend on the ordering staying fixed
//! across runs.

use serde::{Deserialize, Serialize};

use crate::record::{Severity, SymptomRecord};

/// State symbol synthesized for records no rule recognizes.
pub const UNKNOWN_STATE_PREFIX: &str = "unknown_";

/// A single predicate in the inference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RulePredicate {
    /// Exact error-kind match, optionally narrowed to one severity.
    KindIs {
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<Severity>,
    },
    /// Case-insensitive substring match against the error kind.
    KindContains { needle: String },
    /// Case-insensitive substring match against the detail attributes.
    DetailsContain { needle: String },
}

impl RulePredicate {
    fn matches(&self, record: &SymptomRecord) -> bool {
        match self {
            Self::KindIs { kind, severity } => {
                record.error_kind == *kind
                    && severity.map_or(true, |expected| record.severity == expected)
            }
            Self::KindContains { needle } => record
                .error_kind
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            Self::DetailsContain { needle } => record
                .details_text()
                .contains(&needle.to_ascii_lowercase()),
        }
    }
}

/// One row of the inference table: predicate → state symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRule {
    pub symbol: String,
    pub predicate: RulePredicate,
}

impl StateRule {
    pub fn new(symbol: impl Into<String>, predicate: RulePredicate) -> Self {
        Self {
            symbol: symbol.into(),
            predicate,
        }
    }
}

/// Maps symptom records to discrete state symbols.
///
/// Total and deterministic: unmatched records yield `unknown_<error_kind>`
/// rather than an error, so every record is actionable.
#[derive(Debug, Clone)]
pub struct StateAbstractor {
    rules: Vec<StateRule>,
}

impl Default for StateAbstractor {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl StateAbstractor {
    pub fn new(rules: Vec<StateRule>) -> Self {
        Self { rules }
    }

    /// Returns the state symbol for `record` by first-match rule evaluation.
    pub fn state_for(&self, record: &SymptomRecord) -> String {
        for rule in &self.rules {
            if rule.predicate.matches(record) {
                return rule.symbol.clone();
            }
        }
        format!("{UNKNOWN_STATE_PREFIX}{}", record.error_kind)
    }

    pub fn rules(&self) -> &[StateRule] {
        &self.rules
    }
}

/// The built-in inference table. Order is part of the contract.
pub fn default_rules() -> Vec<StateRule> {
    vec![
        StateRule::new(
            "service_down_critical",
            RulePredicate::KindIs {
                kind: "service_down".to_string(),
                severity: Some(Severity::Critical),
            },
        ),
        StateRule::new(
            "service_degraded_performance",
            RulePredicate::KindIs {
                kind: "service_down".to_string(),
                severity: None,
            },
        ),
        StateRule::new(
            "database_connection_lost",
            RulePredicate::KindContains {
                needle: "database".to_string(),
            },
        ),
        StateRule::new(
            "resource_exhaustion_memory",
            RulePredicate::DetailsContain {
                needle: "memory".to_string(),
            },
        ),
        StateRule::new(
            "resource_exhaustion_cpu",
            RulePredicate::DetailsContain {
                needle: "cpu".to_string(),
            },
        ),
        StateRule::new(
            "network_connectivity_lost",
            RulePredicate::KindContains {
                needle: "network".to_string(),
            },
        ),
        StateRule::new(
            "deployment_failure",
            RulePredicate::KindContains {
                needle: "deployment".to_string(),
            },
        ),
    ]
}
