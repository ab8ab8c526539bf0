use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{HistoryStore, NewTransition, Result, StateTransition};

/// PostgreSQL-backed history store implementation.
#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Creates a new PostgreSQL history store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_transition(row: PgRow) -> Result<StateTransition> {
        Ok(StateTransition {
            id: row.try_get("id")?,
            file_id: row.try_get("file_id")?,
            order_id: row.try_get("order_id")?,
            distributor_id: row.try_get("distributor_id")?,
            previous_state: row.try_get("previous_state")?,
            current_state: row.try_get("current_state")?,
            source_service: row.try_get("source_service")?,
            event_time: row.try_get("event_time")?,
        })
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn save(&self, transition: NewTransition) -> Result<StateTransition> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_state_history
                (file_id, order_id, distributor_id, previous_state,
                 current_state, source_service, event_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&transition.file_id)
        .bind(&transition.order_id)
        .bind(transition.distributor_id)
        .bind(&transition.previous_state)
        .bind(&transition.current_state)
        .bind(&transition.source_service)
        .bind(transition.event_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(transition.into_persisted(id))
    }

    async fn find_latest_by_file_id(&self, file_id: &str) -> Result<Option<StateTransition>> {
        let row = sqlx::query(
            r#"
            SELECT id, file_id, order_id, distributor_id, previous_state,
                   current_state, source_service, event_time
            FROM order_state_history
            WHERE file_id = $1
            ORDER BY event_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transition).transpose()
    }

    async fn find_latest_by_order_and_distributor(
        &self,
        order_id: &str,
        distributor_id: i32,
    ) -> Result<Option<StateTransition>> {
        let row = sqlx::query(
            r#"
            SELECT id, file_id, order_id, distributor_id, previous_state,
                   current_state, source_service, event_time
            FROM order_state_history
            WHERE order_id = $1 AND distributor_id = $2
            ORDER BY event_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .bind(distributor_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transition).transpose()
    }

    async fn find_latest_by_order(&self, order_id: &str) -> Result<Option<StateTransition>> {
        let row = sqlx::query(
            r#"
            SELECT id, file_id, order_id, distributor_id, previous_state,
                   current_state, source_service, event_time
            FROM order_state_history
            WHERE order_id = $1
            ORDER BY event_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transition).transpose()
    }

    async fn exists_by_file_id(&self, file_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM order_state_history WHERE file_id = $1)",
        )
        .bind(file_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
