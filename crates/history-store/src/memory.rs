use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{HistoryStore, NewTransition, Result, StateTransition};

/// In-memory history store implementation for testing.
///
/// Mirrors the ordering semantics of the PostgreSQL implementation:
/// "latest" is decided by `event_time` (then id), not by insertion
/// order.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<StateTransition>,
    next_id: i64,
}

impl InMemoryHistoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of transitions stored.
    pub async fn transition_count(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    /// Returns all stored transitions in insertion order.
    pub async fn all(&self) -> Vec<StateTransition> {
        self.inner.read().await.rows.clone()
    }

    fn latest<'a, F>(rows: &'a [StateTransition], predicate: F) -> Option<&'a StateTransition>
    where
        F: Fn(&StateTransition) -> bool,
    {
        rows.iter()
            .filter(|row| predicate(row))
            .max_by_key(|row| (row.event_time, row.id))
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn save(&self, transition: NewTransition) -> Result<StateTransition> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let persisted = transition.into_persisted(inner.next_id);
        inner.rows.push(persisted.clone());
        Ok(persisted)
    }

    async fn find_latest_by_file_id(&self, file_id: &str) -> Result<Option<StateTransition>> {
        let inner = self.inner.read().await;
        Ok(Self::latest(&inner.rows, |row| row.file_id.as_deref() == Some(file_id)).cloned())
    }

    async fn find_latest_by_order_and_distributor(
        &self,
        order_id: &str,
        distributor_id: i32,
    ) -> Result<Option<StateTransition>> {
        let inner = self.inner.read().await;
        Ok(Self::latest(&inner.rows, |row| {
            row.order_id.as_deref() == Some(order_id) && row.distributor_id == Some(distributor_id)
        })
        .cloned())
    }

    async fn find_latest_by_order(&self, order_id: &str) -> Result<Option<StateTransition>> {
        let inner = self.inner.read().await;
        Ok(Self::latest(&inner.rows, |row| row.order_id.as_deref() == Some(order_id)).cloned())
    }

    async fn exists_by_file_id(&self, file_id: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .any(|row| row.file_id.as_deref() == Some(file_id)))
    }
}
