use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{path::Path, str::FromStr, time::Duration};
use tracing::{debug, error, info};

use crate::{
    store::{validate_name, Lead, Store, StoreTransaction, WorkflowState},
    workflow::StateId,
    Error, Result,
};

const MEMORY_PATH: &str = ":memory:";

const SELECT_LEAD: &str = r#"
    SELECT l.id, l.name, l.transit, l.state_id, s.name AS state_name,
           l.created_at, l.updated_at
    FROM leads l
    JOIN lead_states s ON s.id = l.state_id
"#;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_path: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to SQLite database: {}", database_path);

        let in_memory = database_path == MEMORY_PATH;
        if !in_memory {
            if let Some(parent) = Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_path)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if in_memory {
            // the database disappears with its last connection
            pool_options = pool_options
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            error!("Failed to connect to SQLite: {}", e);
            Error::Sqlx(e)
        })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    async fn get_state(&self, id: StateId) -> Result<WorkflowState> {
        let mut conn = self.pool.acquire().await?;
        fetch_state(&mut conn, id).await
    }

    async fn list_states(&self) -> Result<Vec<WorkflowState>> {
        debug!("Listing workflow states");

        let rows = sqlx::query("SELECT id, name FROM lead_states ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| -> Result<WorkflowState> {
                Ok(WorkflowState {
                    id: StateId::try_from(r.try_get::<i64, _>("id")?)?,
                    name: r.try_get("name")?,
                })
            })
            .collect()
    }

    async fn create_lead(&self, name: &str) -> Result<Lead> {
        validate_name(name)?;
        debug!("Creating lead: {}", name);

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO leads (name, transit, state_id, created_at, updated_at)
            VALUES (?1, NULL, ?2, ?3, ?3)
            "#,
        )
        .bind(name)
        .bind(StateId::New.as_i64())
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_lead(result.last_insert_rowid())
            .await?
            .ok_or_else(|| Error::Internal(format!("Lead {} vanished after insert", name)))
    }

    async fn get_lead(&self, id: i64) -> Result<Option<Lead>> {
        debug!("Getting lead: {}", id);

        let row = sqlx::query(&format!("{} WHERE l.id = ?1", SELECT_LEAD))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(lead_from_row).transpose()
    }

    async fn find_lead_by_name(&self, name: &str) -> Result<Option<Lead>> {
        debug!("Getting lead by name: {}", name);

        let row = sqlx::query(&format!("{} WHERE l.name = ?1 ORDER BY l.id LIMIT 1", SELECT_LEAD))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(lead_from_row).transpose()
    }

    async fn list_leads(&self, limit: i64, offset: i64) -> Result<Vec<Lead>> {
        let rows = sqlx::query(&format!("{} ORDER BY l.id LIMIT ?1 OFFSET ?2", SELECT_LEAD))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(lead_from_row).collect()
    }

    async fn persist(&self, lead: &Lead) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_lead(&mut conn, lead).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// Wraps a `sqlx` transaction; dropping it unfinished rolls back.
struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn get_state(&mut self, id: StateId) -> Result<WorkflowState> {
        fetch_state(&mut self.tx, id).await
    }

    async fn persist(&mut self, lead: &Lead) -> Result<()> {
        upsert_lead(&mut self.tx, lead).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn fetch_state(conn: &mut SqliteConnection, id: StateId) -> Result<WorkflowState> {
    debug!("Getting workflow state: {}", id.as_i64());

    let row = sqlx::query("SELECT id, name FROM lead_states WHERE id = ?1")
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(r) => Ok(WorkflowState {
            id,
            name: r.try_get("name")?,
        }),
        None => Err(Error::NotFound(format!("workflow state {}", id.as_i64()))),
    }
}

async fn upsert_lead(conn: &mut SqliteConnection, lead: &Lead) -> Result<()> {
    lead.validate()?;
    debug!("Persisting lead: {}", lead.id);

    sqlx::query(
        r#"
        INSERT INTO leads (id, name, transit, state_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            transit = excluded.transit,
            state_id = excluded.state_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(lead.id)
    .bind(&lead.name)
    .bind(&lead.transit)
    .bind(lead.state.id.as_i64())
    .bind(lead.created_at)
    .bind(lead.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn lead_from_row(r: &SqliteRow) -> Result<Lead> {
    Ok(Lead {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        transit: r.try_get("transit")?,
        state: WorkflowState {
            id: StateId::try_from(r.try_get::<i64, _>("state_id")?)?,
            name: r.try_get("state_name")?,
        },
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        let store = SqliteStore::new(MEMORY_PATH, 1).await.unwrap();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_migration_seeds_states() {
        let store = store().await;
        assert_eq!(store.list_states().await.unwrap(), WorkflowState::defaults());
        assert_eq!(
            store.get_state(StateId::Postponed).await.unwrap().name,
            "POSTPONED"
        );
    }

    #[tokio::test]
    async fn test_create_and_fetch_lead() {
        let store = store().await;
        let lead = store.create_lead("First lead").await.unwrap();
        assert_eq!(lead.state, WorkflowState::seeded(StateId::New));
        assert_eq!(lead.transit, None);

        let by_name = store.find_lead_by_name("First lead").await.unwrap().unwrap();
        assert_eq!(by_name.id, lead.id);
        assert!(store.get_lead(lead.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = store().await;
        let mut lead = store.create_lead("Rollback").await.unwrap();
        lead.transit = Some("1->2".into());

        {
            let mut tx = store.begin().await.unwrap();
            tx.persist(&lead).await.unwrap();
        }

        let stored = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.transit, None);
    }

    #[tokio::test]
    async fn test_committed_transaction_updates_row() {
        let store = store().await;
        let mut lead = store.create_lead("Commit").await.unwrap();
        lead.transit = Some("1->2".into());

        let mut tx = store.begin().await.unwrap();
        lead.state = tx.get_state(StateId::InProgress).await.unwrap();
        tx.persist(&lead).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.transit.as_deref(), Some("1->2"));
        assert_eq!(stored.state_id(), StateId::InProgress);
    }
}
