use async_trait::async_trait;

use crate::{NewTransition, Result, StateTransition};

/// Core trait for history store implementations.
///
/// "Latest" always means greatest `event_time`, ties broken by the
/// store-assigned id. All implementations must be thread-safe
/// (Send + Sync); the consumer and the HTTP query surface share one
/// store handle.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends a transition and returns the persisted row.
    async fn save(&self, transition: NewTransition) -> Result<StateTransition>;

    /// Most recent transition recorded for a batch file.
    async fn find_latest_by_file_id(&self, file_id: &str) -> Result<Option<StateTransition>>;

    /// Most recent transition for an order on a specific distribution
    /// channel.
    async fn find_latest_by_order_and_distributor(
        &self,
        order_id: &str,
        distributor_id: i32,
    ) -> Result<Option<StateTransition>>;

    /// Most recent transition for an order across all channels.
    async fn find_latest_by_order(&self, order_id: &str) -> Result<Option<StateTransition>>;

    /// Whether any transition has been recorded for a batch file.
    async fn exists_by_file_id(&self, file_id: &str) -> Result<bool>;
}
