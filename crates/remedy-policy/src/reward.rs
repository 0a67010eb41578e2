//! Outcome-to-reward shaping.
//!
//! Converts a raw success/failure signal into a scalar weighted by incident
//! severity, user impact, action disruptiveness, and elapsed execution time.
//! Pure and deterministic: identical inputs always shape to the identical
//! reward.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::record::{Impact, Severity, SymptomRecord};

/// Severity multipliers applied to the base reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 2.0,
            high: 1.5,
            medium: 1.0,
            low: 0.5,
        }
    }
}

impl SeverityWeights {
    pub fn for_severity(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// User-impact multipliers applied to the base reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ImpactWeights {
    fn default() -> Self {
        Self {
            high: 2.0,
            medium: 1.0,
            low: 0.5,
        }
    }
}

impl ImpactWeights {
    pub fn for_impact(&self, impact: Impact) -> f64 {
        match impact {
            Impact::High => self.high,
            Impact::Medium => self.medium,
            Impact::Low => self.low,
        }
    }
}

/// All reward-shaping knobs with their production defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Base term on success.
    pub success_bonus: f64,
    /// Base term on failure.
    pub failure_penalty: f64,
    /// Penalty per second of execution time.
    pub time_penalty_per_second: f64,
    /// Ceiling on the total time penalty.
    pub time_penalty_cap: f64,
    /// Floor on the final shaped reward; bounds a single bad update.
    pub reward_floor: f64,
    pub severity_weights: SeverityWeights,
    pub impact_weights: ImpactWeights,
    /// Per-action disruptiveness weight; graceful operations near 1.0,
    /// forceful or rollback operations lower.
    pub action_efficiency: BTreeMap<String, f64>,
    /// Efficiency for actions missing from the table.
    pub default_action_efficiency: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        let action_efficiency = [
            ("restart_service_graceful", 1.0),
            ("restart_service_force", 0.8),
            ("rollback_deployment", 0.6),
            ("rollback_to_previous_version", 0.6),
            ("manual_intervention", 0.4),
            ("investigate_manual", 0.4),
        ]
        .into_iter()
        .map(|(action, weight)| (action.to_string(), weight))
        .collect();

        Self {
            success_bonus: 1.0,
            failure_penalty: -1.0,
            time_penalty_per_second: 0.1,
            time_penalty_cap: 1.0,
            reward_floor: -2.0,
            severity_weights: SeverityWeights::default(),
            impact_weights: ImpactWeights::default(),
            action_efficiency,
            default_action_efficiency: 0.7,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("success_bonus", self.success_bonus),
            ("failure_penalty", self.failure_penalty),
            ("time_penalty_per_second", self.time_penalty_per_second),
            ("time_penalty_cap", self.time_penalty_cap),
            ("reward_floor", self.reward_floor),
            ("default_action_efficiency", self.default_action_efficiency),
            ("severity_weights.critical", self.severity_weights.critical),
            ("severity_weights.high", self.severity_weights.high),
            ("severity_weights.medium", self.severity_weights.medium),
            ("severity_weights.low", self.severity_weights.low),
            ("impact_weights.high", self.impact_weights.high),
            ("impact_weights.medium", self.impact_weights.medium),
            ("impact_weights.low", self.impact_weights.low),
        ];
        for (label, value) in named {
            if !value.is_finite() {
                bail!("reward config field '{label}' must be finite");
            }
        }
        for (action, weight) in &self.action_efficiency {
            if !weight.is_finite() {
                bail!("reward config efficiency for '{action}' must be finite");
            }
        }
        if self.time_penalty_per_second < 0.0 || self.time_penalty_cap < 0.0 {
            bail!("reward config time penalty terms must be non-negative");
        }
        Ok(())
    }
}

/// Shapes execution outcomes into bounded scalar rewards.
#[derive(Debug, Clone, Default)]
pub struct RewardShaper {
    config: RewardConfig,
}

impl RewardShaper {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Shaped reward for executing `action` against the incident in
    /// `record` with the given outcome and elapsed execution time.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub fn shape(
        &self,
        record: &SymptomRecord,
        action: &str,
        success: bool,
        elapsed: Duration,
    ) -> f64 {
        let base = if success {
            self.config.success_bonus
        } else {
            self.config.failure_penalty
        };
        let severity_weight = self.config.severity_weights.for_severity(record.severity);
        let impact_weight = self.config.impact_weights.for_impact(record.user_impact);
        let efficiency = self.action_efficiency(action);
        let time_penalty = (elapsed.as_secs_f64() * self.config.time_penalty_per_second)
            .min(self.config.time_penalty_cap);

        let shaped = base * severity_weight * impact_weight * efficiency - time_penalty;
        shaped.max(self.config.reward_floor)
    }

    fn action_efficiency(&self, action: &str) -> f64 {
        self.config
            .action_efficiency
            .get(action)
            .copied()
            .unwrap_or(self.config.default_action_efficiency)
    }
}
