//! Bounded temporal-difference updates into the value store.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use serde::Serialize;

use crate::catalog::ActionCatalog;
use crate::store::{StoreResult, ValueStore};

/// Outcome of one committed learning step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueUpdate {
    pub state: String,
    pub action: String,
    pub reward: f64,
    pub previous_estimate: f64,
    pub new_estimate: f64,
    pub visit_count: u64,
}

/// Applies the TD step `Q ← Q + α·(r + γ·maxQ − Q)` to the value store.
///
/// Each incident is treated as a one-step episode: the bootstrap term is the
/// best estimate among the *same* state's cataloged actions, not a successor
/// state. A private mutex serializes the read-modify-write against the
/// store, so concurrent updates to the same pair never lose an increment.
pub struct Learner {
    store: Arc<ValueStore>,
    catalog: Arc<ActionCatalog>,
    alpha: f64,
    gamma: f64,
    update_guard: Mutex<()>,
}

impl Learner {
    /// Creates a learner with fixed learning parameters.
    ///
    /// `alpha` must lie in (0, 1] and `gamma` in [0, 1).
    pub fn new(
        store: Arc<ValueStore>,
        catalog: Arc<ActionCatalog>,
        alpha: f64,
        gamma: f64,
    ) -> Result<Self> {
        if !alpha.is_finite() || alpha <= 0.0 || alpha > 1.0 {
            bail!("learning rate alpha must lie in (0.0, 1.0], got {alpha}");
        }
        if !gamma.is_finite() || !(0.0..1.0).contains(&gamma) {
            bail!("discount factor gamma must lie in [0.0, 1.0), got {gamma}");
        }
        Ok(Self {
            store,
            catalog,
            alpha,
            gamma,
            update_guard: Mutex::new(()),
        })
    }

    /// Folds an observed execution reward into the estimate for
    /// `(state, action)` and persists the updated row before returning.
    ///
    /// A persistence failure is recoverable: the in-memory estimate has
    /// already moved and stays visible to subsequent selections.
    pub fn update(&self, state: &str, action: &str, reward: f64) -> StoreResult<ValueUpdate> {
        self.apply_step(state, action, reward)
    }

    /// Human-feedback entry point: the supplied value substitutes for the
    /// reward through the identical step path, so operator corrections and
    /// automatic outcomes stay commensurable in the same store.
    pub fn apply_feedback(
        &self,
        state: &str,
        action: &str,
        feedback: f64,
    ) -> StoreResult<ValueUpdate> {
        self.apply_step(state, action, feedback)
    }

    fn apply_step(&self, state: &str, action: &str, signal: f64) -> StoreResult<ValueUpdate> {
        let _guard = self
            .update_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous_estimate = self.store.get(state, action).estimate;
        let candidates = self.catalog.candidates(state);
        // Zero candidates (manual-fallback path) bootstrap from 0.
        let bootstrap = self.store.best_estimate(state, candidates);
        let target = signal + self.gamma * bootstrap;
        let new_estimate = previous_estimate + self.alpha * (target - previous_estimate);

        let committed = self.store.commit(state, action, new_estimate)?;
        tracing::debug!(
            state,
            action,
            reward = signal,
            previous = previous_estimate,
            updated = new_estimate,
            visits = committed.visit_count,
            "value update committed"
        );
        Ok(ValueUpdate {
            state: state.to_string(),
            action: action.to_string(),
            reward: signal,
            previous_estimate,
            new_estimate,
            visit_count: committed.visit_count,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}
