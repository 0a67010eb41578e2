//! Engine configuration: learning parameters, exploration, reward weights,
//! and per-state action lists.
//!
//! Stored as JSON next to the policy database. A missing file materializes
//! the defaults atomically on first run so later runs start from the same
//! recorded configuration.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use remedy_core::write_text_atomic;

use crate::catalog::{default_action_table, ActionCatalog, DEFAULT_FALLBACK_ACTION};
use crate::reward::RewardConfig;
use crate::selector::ExplorationStrategy;

/// Full engine configuration with production defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Learning rate α ∈ (0, 1].
    pub alpha: f64,
    /// Discount factor γ ∈ [0, 1).
    pub gamma: f64,
    /// Exploration rate ε ∈ [0, 1].
    pub epsilon: f64,
    pub exploration: ExplorationStrategy,
    pub reward: RewardConfig,
    /// Per-state candidate actions in first-seen order.
    pub actions: BTreeMap<String, Vec<String>>,
    pub fallback_action: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.95,
            epsilon: 0.1,
            exploration: ExplorationStrategy::Ucb,
            reward: RewardConfig::default(),
            actions: default_action_table(),
            fallback_action: DEFAULT_FALLBACK_ACTION.to_string(),
        }
    }
}

impl EngineConfig {
    /// Loads the config from `path`, or materializes and persists the
    /// defaults when the file does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: Self = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            config.validate()?;
            return Ok(config);
        }

        let config = Self::default();
        let rendered =
            serde_json::to_string_pretty(&config).context("failed to render default config")?;
        write_text_atomic(path, &rendered)
            .with_context(|| format!("failed to materialize config {}", path.display()))?;
        tracing::info!(path = %path.display(), "materialized default engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.alpha.is_finite() || self.alpha <= 0.0 || self.alpha > 1.0 {
            bail!("config field 'alpha' must lie in (0.0, 1.0], got {}", self.alpha);
        }
        if !self.gamma.is_finite() || !(0.0..1.0).contains(&self.gamma) {
            bail!("config field 'gamma' must lie in [0.0, 1.0), got {}", self.gamma);
        }
        if !self.epsilon.is_finite() || !(0.0..=1.0).contains(&self.epsilon) {
            bail!("config field 'epsilon' must lie in [0.0, 1.0], got {}", self.epsilon);
        }
        if self.fallback_action.trim().is_empty() {
            bail!("config field 'fallback_action' must not be empty");
        }
        self.reward.validate()?;
        Ok(())
    }

    /// Builds the read-only action catalog from the configured table.
    pub fn catalog(&self) -> ActionCatalog {
        ActionCatalog::new(self.actions.clone(), self.fallback_action.clone())
    }
}
