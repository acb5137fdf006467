mod config;
mod factory;
mod memory;
mod models;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::create_store;
pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::workflow::StateId;

/// Durable storage for leads and workflow state definitions.
#[async_trait]
pub trait Store: Send + Sync {
    // Initialize schema and seed the workflow states
    async fn init(&self) -> crate::Result<()>;

    // Workflow state operations
    async fn get_state(&self, id: StateId) -> crate::Result<WorkflowState>;
    async fn list_states(&self) -> crate::Result<Vec<WorkflowState>>;

    // Lead operations
    async fn create_lead(&self, name: &str) -> crate::Result<Lead>;
    async fn get_lead(&self, id: i64) -> crate::Result<Option<Lead>>;
    async fn find_lead_by_name(&self, name: &str) -> crate::Result<Option<Lead>>;
    async fn list_leads(&self, limit: i64, offset: i64) -> crate::Result<Vec<Lead>>;
    async fn persist(&self, lead: &Lead) -> crate::Result<()>;

    // Open an atomic unit of work
    async fn begin(&self) -> crate::Result<Box<dyn StoreTransaction>>;
}

/// A scoped unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_state(&mut self, id: StateId) -> crate::Result<WorkflowState>;
    async fn persist(&mut self, lead: &Lead) -> crate::Result<()>;
    async fn commit(self: Box<Self>) -> crate::Result<()>;
    async fn rollback(self: Box<Self>) -> crate::Result<()>;
}
