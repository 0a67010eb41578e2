//! Adaptive remediation policy engine.
//!
//! Maps symptom records to discrete state symbols, selects remediation
//! actions from a learned value table with ε-greedy/UCB exploration, shapes
//! execution outcomes into scalar rewards, and folds them back into the
//! table with a bounded temporal-difference step backed by durable storage.

mod catalog;
mod config;
mod learner;
mod record;
mod reward;
mod selector;
mod sqlite;
mod state;
mod store;

pub use catalog::{default_action_table, ActionCatalog, DEFAULT_FALLBACK_ACTION};
pub use config::EngineConfig;
pub use learner::{Learner, ValueUpdate};
pub use record::{Impact, Severity, SymptomRecord};
pub use reward::{ImpactWeights, RewardConfig, RewardShaper, SeverityWeights};
pub use selector::{ActionSelector, ExplorationStrategy, Selection, SelectionDecision};
pub use sqlite::SqlitePolicyStore;
pub use state::{default_rules, RulePredicate, StateAbstractor, StateRule};
pub use store::{
    InMemoryPersistence, PolicyPersistence, PolicyStoreError, StoreResult, ValueEntry, ValueRecord,
    ValueStore,
};
