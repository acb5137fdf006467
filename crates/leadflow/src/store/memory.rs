use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    store::{validate_name, Lead, Store, StoreTransaction, WorkflowState},
    workflow::StateId,
    Error, Result,
};

#[derive(Debug, Default)]
struct Tables {
    states: BTreeMap<StateId, WorkflowState>,
    leads: BTreeMap<i64, Lead>,
    next_lead_id: i64,
}

/// In-process store. Transactions stage their writes and publish them on commit.
///
/// Clones share the same tables, so a clone handed to a test can inspect what
/// an engine wrote through another clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    // Persists allowed before every further persist fails; `None` disables injection.
    fail_after: Arc<Mutex<Option<usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `allowed` more persists through, then fails every later one with
    /// [`Error::Persistence`] until [`MemoryStore::clear_faults`] is called.
    pub fn fail_persist_after(&self, allowed: usize) {
        if let Ok(mut guard) = self.fail_after.lock() {
            *guard = Some(allowed);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut guard) = self.fail_after.lock() {
            *guard = None;
        }
    }

    fn check_fault(&self, lead_id: i64) -> Result<()> {
        let mut guard = self
            .fail_after
            .lock()
            .map_err(|_| Error::Internal("fault injection lock poisoned".into()))?;
        match guard.as_mut() {
            Some(0) => {
                warn!("Injected persistence failure for lead {}", lead_id);
                Err(Error::Persistence(format!(
                    "injected failure persisting lead {}",
                    lead_id
                )))
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Validates a write the way the SQL schema would.
    fn check_row(tables: &Tables, lead: &Lead) -> Result<()> {
        lead.validate()?;
        if !tables.states.contains_key(&lead.state.id) {
            return Err(Error::Persistence(format!(
                "lead {} references missing state {}",
                lead.id,
                lead.state.id.as_i64()
            )));
        }
        Ok(())
    }

    fn lookup_state(tables: &Tables, id: StateId) -> Result<WorkflowState> {
        tables
            .states
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("workflow state {}", id.as_i64())))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn init(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        for state in WorkflowState::defaults() {
            tables.states.entry(state.id).or_insert(state);
        }
        info!("Seeded {} workflow states in memory", tables.states.len());
        Ok(())
    }

    async fn get_state(&self, id: StateId) -> Result<WorkflowState> {
        let tables = self.tables.read().await;
        Self::lookup_state(&tables, id)
    }

    async fn list_states(&self) -> Result<Vec<WorkflowState>> {
        let tables = self.tables.read().await;
        Ok(tables.states.values().cloned().collect())
    }

    async fn create_lead(&self, name: &str) -> Result<Lead> {
        validate_name(name)?;
        let mut tables = self.tables.write().await;
        let state = Self::lookup_state(&tables, StateId::New)?;

        tables.next_lead_id += 1;
        let now = Utc::now();
        let lead = Lead {
            id: tables.next_lead_id,
            name: name.to_string(),
            transit: None,
            state,
            created_at: now,
            updated_at: now,
        };
        debug!("Creating lead {} ({})", lead.id, lead.name);
        tables.leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn get_lead(&self, id: i64) -> Result<Option<Lead>> {
        let tables = self.tables.read().await;
        Ok(tables.leads.get(&id).cloned())
    }

    async fn find_lead_by_name(&self, name: &str) -> Result<Option<Lead>> {
        let tables = self.tables.read().await;
        Ok(tables.leads.values().find(|lead| lead.name == name).cloned())
    }

    async fn list_leads(&self, limit: i64, offset: i64) -> Result<Vec<Lead>> {
        let tables = self.tables.read().await;
        Ok(tables
            .leads
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn persist(&self, lead: &Lead) -> Result<()> {
        self.check_fault(lead.id)?;
        let mut tables = self.tables.write().await;
        Self::check_row(&tables, lead)?;
        debug!("Persisting lead {}", lead.id);
        tables.next_lead_id = tables.next_lead_id.max(lead.id);
        tables.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: BTreeMap::new(),
        }))
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    staged: BTreeMap<i64, Lead>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_state(&mut self, id: StateId) -> Result<WorkflowState> {
        self.store.get_state(id).await
    }

    async fn persist(&mut self, lead: &Lead) -> Result<()> {
        self.store.check_fault(lead.id)?;
        let tables = self.store.tables.read().await;
        MemoryStore::check_row(&tables, lead)?;
        self.staged.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { store, staged } = *self;
        let mut tables = store.tables.write().await;
        for (id, lead) in staged {
            tables.next_lead_id = tables.next_lead_id.max(id);
            tables.leads.insert(id, lead);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!("Discarding {} staged lead writes", self.staged.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_init_seeds_four_states() {
        let store = seeded().await;
        let states = store.list_states().await.unwrap();
        assert_eq!(states, WorkflowState::defaults());
        // idempotent
        store.init().await.unwrap();
        assert_eq!(store.list_states().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_get_state_before_init_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_state(StateId::Done).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_lead_defaults_to_new() {
        let store = seeded().await;
        let lead = store.create_lead("First lead").await.unwrap();
        assert_eq!(lead.state_id(), StateId::New);
        assert_eq!(lead.transit, None);

        let found = store.find_lead_by_name("First lead").await.unwrap().unwrap();
        assert_eq!(found, lead);
        assert!(store.create_lead("").await.is_err());
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_invisible() {
        let store = seeded().await;
        let mut lead = store.create_lead("Staged").await.unwrap();
        lead.transit = Some("1->2".into());

        let mut tx = store.begin().await.unwrap();
        tx.persist(&lead).await.unwrap();
        assert_eq!(store.get_lead(lead.id).await.unwrap().unwrap().transit, None);
        tx.rollback().await.unwrap();
        assert_eq!(store.get_lead(lead.id).await.unwrap().unwrap().transit, None);

        let mut tx = store.begin().await.unwrap();
        tx.persist(&lead).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            store.get_lead(lead.id).await.unwrap().unwrap().transit.as_deref(),
            Some("1->2")
        );
    }

    #[tokio::test]
    async fn test_fault_injection_fails_after_allowance() {
        let store = seeded().await;
        let lead = store.create_lead("Faulty").await.unwrap();

        store.fail_persist_after(1);
        assert!(store.persist(&lead).await.is_ok());
        let err = store.persist(&lead).await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert!(store.persist(&lead).await.is_err());

        store.clear_faults();
        assert!(store.persist(&lead).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_leads_paginates_by_id() {
        let store = seeded().await;
        for name in ["a", "b", "c"] {
            store.create_lead(name).await.unwrap();
        }
        let page: Vec<_> = store
            .list_leads(2, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(page, vec!["b", "c"]);
    }
}
