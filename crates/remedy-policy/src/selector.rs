//! Exploration/exploitation action selection over the value store.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::catalog::ActionCatalog;
use crate::store::ValueStore;

/// How non-exploratory candidates are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationStrategy {
    /// Score by estimate alone.
    EpsilonGreedy,
    /// Score by estimate plus an upper-confidence bonus; unvisited actions
    /// rank above every visited one.
    Ucb,
}

/// Why a particular action was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionDecision {
    /// No cataloged candidates; the manual fallback was used.
    Fallback,
    /// ε-exploration picked a uniformly random candidate.
    Explore,
    /// Greedy scoring picked the best estimate.
    Greedy,
    /// UCB scoring picked the best confidence-adjusted estimate.
    Ucb,
}

/// A selected action together with the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub action: String,
    pub decision: SelectionDecision,
}

/// Chooses remediation actions for state symbols.
///
/// Selection is read-only with respect to the value store: visit counters
/// move only when the learner records an outcome.
pub struct ActionSelector {
    catalog: Arc<ActionCatalog>,
    store: Arc<ValueStore>,
    epsilon: f64,
    strategy: ExplorationStrategy,
    rng: Mutex<StdRng>,
}

impl ActionSelector {
    pub fn new(
        catalog: Arc<ActionCatalog>,
        store: Arc<ValueStore>,
        epsilon: f64,
        strategy: ExplorationStrategy,
    ) -> Self {
        Self::with_rng(catalog, store, epsilon, strategy, StdRng::from_entropy())
    }

    /// Selector with a fixed seed for reproducible runs.
    pub fn with_seed(
        catalog: Arc<ActionCatalog>,
        store: Arc<ValueStore>,
        epsilon: f64,
        strategy: ExplorationStrategy,
        seed: u64,
    ) -> Self {
        Self::with_rng(catalog, store, epsilon, strategy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        catalog: Arc<ActionCatalog>,
        store: Arc<ValueStore>,
        epsilon: f64,
        strategy: ExplorationStrategy,
        rng: StdRng,
    ) -> Self {
        Self {
            catalog,
            store,
            epsilon,
            strategy,
            rng: Mutex::new(rng),
        }
    }

    /// Chooses an action for `state` from its cataloged candidates.
    ///
    /// Ties resolve to the candidate seen first in the catalog, so repeated
    /// selections over an untrained table are deterministic.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn select(&self, state: &str) -> Selection {
        let candidates = self.catalog.candidates(state);
        if candidates.is_empty() {
            tracing::debug!(state, "no cataloged candidates; using manual fallback");
            return Selection {
                action: self.catalog.fallback_action().to_string(),
                decision: SelectionDecision::Fallback,
            };
        }

        if self.epsilon > 0.0 {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if rng.gen::<f64>() < self.epsilon {
                let index = rng.gen_range(0..candidates.len());
                return Selection {
                    action: candidates[index].clone(),
                    decision: SelectionDecision::Explore,
                };
            }
        }

        match self.strategy {
            ExplorationStrategy::EpsilonGreedy => Selection {
                action: self.best_by(state, candidates, |estimate, _| estimate),
                decision: SelectionDecision::Greedy,
            },
            ExplorationStrategy::Ucb => {
                let total_visits = self.store.total_visits(state, candidates);
                Selection {
                    action: self.best_by(state, candidates, |estimate, visits| {
                        ucb_score(estimate, visits, total_visits)
                    }),
                    decision: SelectionDecision::Ucb,
                }
            }
        }
    }

    fn best_by(
        &self,
        state: &str,
        candidates: &[String],
        score: impl Fn(f64, u64) -> f64,
    ) -> String {
        let mut best_action = &candidates[0];
        let mut best_score = f64::NEG_INFINITY;
        for action in candidates {
            let entry = self.store.get(state, action);
            let candidate_score = score(entry.estimate, entry.visit_count);
            // Strict comparison keeps the first-seen candidate on ties.
            if candidate_score > best_score {
                best_score = candidate_score;
                best_action = action;
            }
        }
        best_action.clone()
    }
}

/// UCB1 score: the estimate plus a confidence bonus that shrinks with
/// visits. Unvisited actions score infinite so each is tried at least once
/// before estimates are trusted.
fn ucb_score(estimate: f64, visits: u64, total_visits: u64) -> f64 {
    if visits == 0 {
        return f64::INFINITY;
    }
    let confidence = (2.0 * ((total_visits + 1) as f64).ln() / visits as f64).sqrt();
    estimate + confidence
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::catalog::ActionCatalog;
    use crate::store::ValueStore;

    use super::{ucb_score, ActionSelector, ExplorationStrategy, SelectionDecision};

    fn fixture(epsilon: f64, strategy: ExplorationStrategy) -> (Arc<ValueStore>, ActionSelector) {
        let catalog = Arc::new(ActionCatalog::default());
        let store = Arc::new(ValueStore::ephemeral());
        let selector = ActionSelector::with_seed(catalog, store.clone(), epsilon, strategy, 7);
        (store, selector)
    }

    #[test]
    fn untrained_state_selects_first_candidate_deterministically() {
        let (_store, selector) = fixture(0.0, ExplorationStrategy::EpsilonGreedy);
        for _ in 0..5 {
            let selection = selector.select("service_down_critical");
            assert_eq!(selection.action, "restart_service_graceful");
            assert_eq!(selection.decision, SelectionDecision::Greedy);
        }
    }

    #[test]
    fn greedy_selection_tracks_the_best_estimate() {
        let (store, selector) = fixture(0.0, ExplorationStrategy::EpsilonGreedy);
        store
            .commit("service_down_critical", "failover_to_backup", 2.0)
            .expect("commit");
        store
            .commit("service_down_critical", "restart_service_graceful", 1.0)
            .expect("commit");

        let selection = selector.select("service_down_critical");
        assert_eq!(selection.action, "failover_to_backup");
    }

    #[test]
    fn ucb_prefers_unvisited_actions_over_any_visited_one() {
        let (store, selector) = fixture(0.0, ExplorationStrategy::Ucb);
        // Make the first candidate both visited and highly valued.
        store
            .commit("service_down_critical", "restart_service_graceful", 10.0)
            .expect("commit");

        let selection = selector.select("service_down_critical");
        assert_eq!(selection.decision, SelectionDecision::Ucb);
        // Second candidate is unvisited and must win regardless of estimates.
        assert_eq!(selection.action, "restart_service_force");
    }

    #[test]
    fn ucb_falls_back_to_estimates_once_all_are_visited() {
        let (store, selector) = fixture(0.0, ExplorationStrategy::Ucb);
        for action in [
            "restart_service_graceful",
            "restart_service_force",
            "failover_to_backup",
            "scale_horizontal",
            "rollback_deployment",
        ] {
            store
                .commit("service_down_critical", action, 0.0)
                .expect("commit");
        }
        store
            .commit("service_down_critical", "failover_to_backup", 5.0)
            .expect("commit");

        let selection = selector.select("service_down_critical");
        assert_eq!(selection.action, "failover_to_backup");
    }

    #[test]
    fn empty_catalog_routes_to_manual_fallback() {
        let catalog = Arc::new(ActionCatalog::new(
            BTreeMap::new(),
            "investigate_manual",
        ));
        let store = Arc::new(ValueStore::ephemeral());
        let selector =
            ActionSelector::with_seed(catalog, store, 0.0, ExplorationStrategy::Ucb, 1);

        let selection = selector.select("unknown_disk_failure");
        assert_eq!(selection.action, "investigate_manual");
        assert_eq!(selection.decision, SelectionDecision::Fallback);
    }

    #[test]
    fn selection_never_leaves_the_catalog() {
        let (_store, selector) = fixture(1.0, ExplorationStrategy::Ucb);
        let catalog = ActionCatalog::default();
        for _ in 0..50 {
            let selection = selector.select("deployment_failure");
            assert!(
                catalog
                    .candidates("deployment_failure")
                    .contains(&selection.action),
                "out-of-catalog action {}",
                selection.action
            );
            assert_eq!(selection.decision, SelectionDecision::Explore);
        }
    }

    #[test]
    fn selection_is_read_only() {
        let (store, selector) = fixture(0.5, ExplorationStrategy::Ucb);
        for _ in 0..20 {
            selector.select("service_down_critical");
        }
        assert!(store.is_empty());
    }

    #[test]
    fn ucb_score_matches_formula() {
        let expected = 0.4 + (2.0_f64 * 11.0_f64.ln() / 3.0).sqrt();
        assert!((ucb_score(0.4, 3, 10) - expected).abs() < 1e-12);
        assert!(ucb_score(99.0, 0, 10).is_infinite());
    }
}
