use chrono::Utc;
use tracing::debug;

use crate::{
    store::{Lead, StoreTransaction},
    workflow::{transition, Capability, StateId, Transition},
    Error, Result,
};

/// Business rules attached to one workflow state.
///
/// Legality and destinations come from [`transition::TRANSITIONS`]; a variant
/// only decides what happens to the lead when one of its transitions runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBehavior {
    New,
    InProgress,
    Postponed,
    Done,
}

impl StateBehavior {
    pub fn for_state(state: StateId) -> Self {
        match state {
            StateId::New => StateBehavior::New,
            StateId::InProgress => StateBehavior::InProgress,
            StateId::Postponed => StateBehavior::Postponed,
            StateId::Done => StateBehavior::Done,
        }
    }

    pub fn state(self) -> StateId {
        match self {
            StateBehavior::New => StateId::New,
            StateBehavior::InProgress => StateId::InProgress,
            StateBehavior::Postponed => StateId::Postponed,
            StateBehavior::Done => StateId::Done,
        }
    }

    pub fn supports(self, capability: Capability) -> bool {
        transition::destination(self.state(), capability).is_some()
    }

    /// Destination of `capability`, or [`Error::UnsupportedTransition`].
    /// Touches nothing.
    pub fn target(self, capability: Capability) -> Result<StateId> {
        transition::destination(self.state(), capability).ok_or(Error::UnsupportedTransition {
            capability,
            state: self.state(),
        })
    }

    pub async fn forward(
        self,
        lead: &mut Lead,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Transition> {
        self.invoke(Capability::Forward, lead, tx).await
    }

    pub async fn switch(
        self,
        lead: &mut Lead,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Transition> {
        self.invoke(Capability::Switch, lead, tx).await
    }

    /// Records the transit label on `lead` and persists it through `tx`.
    ///
    /// The origin is the lead's state as stored on the entity, not the
    /// behavior's own state. The lead's state reference is left alone.
    pub async fn invoke(
        self,
        capability: Capability,
        lead: &mut Lead,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Transition> {
        let to = self.target(capability)?;
        let transition = Transition::new(lead.state_id(), to);

        match (self, capability) {
            (StateBehavior::InProgress, Capability::Switch) => {
                debug!("Postponing lead {}", lead.id);
            }
            (StateBehavior::Postponed, Capability::Switch) => {
                debug!("Resuming lead {}", lead.id);
            }
            (_, Capability::Forward) if to.is_terminal() => {
                debug!("Closing lead {}", lead.id);
            }
            _ => {
                debug!("Starting work on lead {}", lead.id);
            }
        }

        lead.transit = Some(transition.label());
        lead.updated_at = Utc::now();
        tx.persist(lead).await?;

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};

    #[test]
    fn test_capability_matrix() {
        let matrix: Vec<_> = StateId::ALL
            .iter()
            .map(|s| {
                let b = StateBehavior::for_state(*s);
                (b.supports(Capability::Forward), b.supports(Capability::Switch))
            })
            .collect();
        assert_eq!(
            matrix,
            vec![(true, false), (true, true), (true, true), (false, false)]
        );
    }

    #[test]
    fn test_for_state_round_trips() {
        for state in StateId::ALL {
            assert_eq!(StateBehavior::for_state(state).state(), state);
        }
    }

    #[tokio::test]
    async fn test_invoke_writes_label_only_when_staged() {
        let store = MemoryStore::new();
        store.init().await.unwrap();
        let mut lead = store.create_lead("Behavior").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let transition = StateBehavior::New.forward(&mut lead, tx.as_mut()).await.unwrap();
        assert_eq!(transition.label(), "1->2");
        assert_eq!(lead.transit.as_deref(), Some("1->2"));
        // the behavior never moves the state reference
        assert_eq!(lead.state_id(), StateId::New);
        tx.rollback().await.unwrap();

        let stored = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.transit, None);
    }

    #[tokio::test]
    async fn test_unsupported_leaves_lead_untouched() {
        let store = MemoryStore::new();
        store.init().await.unwrap();
        let mut lead = store.create_lead("Done").await.unwrap();
        let before = lead.clone();

        let mut tx = store.begin().await.unwrap();
        let err = StateBehavior::Done
            .switch(&mut lead, tx.as_mut())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedTransition {
                capability: Capability::Switch,
                state: StateId::Done
            }
        ));
        assert_eq!(lead, before);
    }
}
