use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    metrics::{self, Outcome},
    store::{Lead, Store, StoreTransaction},
    workflow::{transition, Capability, StateBehavior, StateId, StateRegistry, Transition},
    Error, Result,
};

/// Drives one lead through the workflow.
///
/// The engine snapshots the lead's state id when it is built and never
/// re-reads the store afterwards. Two engines over copies of the same stored
/// lead do not see each other's changes; whichever commits last wins.
///
/// Every operation stages its changes on a copy of the lead. The bound lead
/// and the cached state id are only updated once the store has committed, so
/// after any error both still describe the last committed state.
pub struct TransitionEngine<'a> {
    store: Arc<dyn Store>,
    registry: &'static StateRegistry,
    lead: &'a mut Lead,
    state_id: StateId,
}

impl<'a> TransitionEngine<'a> {
    pub fn new(store: Arc<dyn Store>, lead: &'a mut Lead) -> Self {
        let state_id = lead.state_id();
        Self {
            store,
            registry: StateRegistry::global(),
            lead,
            state_id,
        }
    }

    /// The cached state id.
    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    pub fn lead(&self) -> &Lead {
        &*self.lead
    }

    pub fn behavior(&self) -> StateBehavior {
        self.registry.behavior(self.state_id)
    }

    /// Moves the lead straight to state `value`, bypassing the transition
    /// rules, and persists it immediately.
    pub async fn apply_and_persist(&mut self, value: i64) -> Result<()> {
        let state_id = match StateId::try_from(value) {
            Ok(id) => id,
            Err(e) => {
                warn!("Rejected state assignment {} for lead {}", value, self.lead.id);
                metrics::record_state_assignment(Outcome::Rejected);
                return Err(e);
            }
        };

        let mut staged = self.lead.clone();
        if let Err(e) = self.write_state(&mut staged, state_id).await {
            warn!("Failed to assign state {} to lead {}: {}", state_id, self.lead.id, e);
            metrics::record_state_assignment(Outcome::RolledBack);
            return Err(e);
        }

        info!(
            "Lead {} assigned state {} (was {})",
            self.lead.id, state_id, self.state_id
        );
        *self.lead = staged;
        self.state_id = state_id;
        metrics::record_state_assignment(Outcome::Committed);
        Ok(())
    }

    async fn write_state(&self, lead: &mut Lead, state_id: StateId) -> Result<()> {
        lead.state = self.store.get_state(state_id).await?;
        lead.updated_at = Utc::now();
        self.store.persist(lead).await
    }

    /// Runs the current state's `forward` rule and steps the lead onward.
    pub async fn forward(&mut self) -> Result<Transition> {
        self.run(Capability::Forward).await
    }

    /// Runs the current state's `switch` rule and toggles the lead between
    /// IN_PROGRESS and POSTPONED.
    pub async fn switch(&mut self) -> Result<Transition> {
        self.run(Capability::Switch).await
    }

    async fn run(&mut self, capability: Capability) -> Result<Transition> {
        let from = self.state_id;
        let behavior = self.registry.behavior(from);

        let target = match behavior.target(capability) {
            Ok(target) => target,
            Err(e) => {
                warn!("Lead {}: {}", self.lead.id, e);
                metrics::record_transition(capability, Outcome::Unsupported);
                return Err(e);
            }
        };

        let successor = transition::successor(from, capability);
        if successor != target {
            metrics::record_transition(capability, Outcome::Rejected);
            return Err(Error::TransitionMismatch {
                capability,
                state: from,
                table: target,
                successor,
            });
        }

        let mut staged = self.lead.clone();
        let mut tx = self.store.begin().await?;
        let staged_result = stage(behavior, capability, successor, &mut staged, tx.as_mut()).await;

        let taken = match settle(tx, staged_result).await {
            Ok(taken) => taken,
            Err(e) => {
                warn!(
                    "Rolled back {} of lead {} from {}: {}",
                    capability, self.lead.id, from, e
                );
                metrics::record_transition(capability, Outcome::RolledBack);
                return Err(e);
            }
        };

        info!(
            "Lead {} {}: {} ({})",
            self.lead.id,
            capability,
            taken,
            taken.label()
        );
        *self.lead = staged;
        self.state_id = successor;
        metrics::record_transition(capability, Outcome::Committed);
        Ok(taken)
    }
}

/// Both writes of one transition: the behavior's label write, then the state move.
async fn stage(
    behavior: StateBehavior,
    capability: Capability,
    successor: StateId,
    lead: &mut Lead,
    tx: &mut dyn StoreTransaction,
) -> Result<Transition> {
    let taken = behavior.invoke(capability, lead, tx).await?;
    lead.state = tx.get_state(successor).await?;
    lead.updated_at = Utc::now();
    tx.persist(lead).await?;
    Ok(taken)
}

/// Commits on success, rolls back on failure. The staging error wins over a
/// failed rollback.
async fn settle<T>(tx: Box<dyn StoreTransaction>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}
