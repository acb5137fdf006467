use lazy_static::lazy_static;

use crate::{
    workflow::{StateBehavior, StateId},
    Result,
};

lazy_static! {
    static ref STATE_REGISTRY: StateRegistry = StateRegistry::new();
}

/// Maps each state id to its behavior. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    behaviors: [StateBehavior; 4],
}

impl StateRegistry {
    pub fn new() -> Self {
        Self {
            behaviors: StateId::ALL.map(StateBehavior::for_state),
        }
    }

    /// The process-wide registry, initialised on first use.
    pub fn global() -> &'static StateRegistry {
        &STATE_REGISTRY
    }

    pub fn behavior(&self, state: StateId) -> StateBehavior {
        self.behaviors[state.index()]
    }

    /// Lookup by raw id; anything outside 1..=4 is an error, never a default.
    pub fn resolve(&self, id: i64) -> Result<StateBehavior> {
        StateId::try_from(id).map(|state| self.behavior(state))
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
