//! Previous-state resolution.
//!
//! The persisted `previous_state` is established by store lookup, not
//! by trusting the incoming payload. The fallback chain goes most
//! specific first: batch file, then order + distribution channel,
//! then order alone.

use history_store::{HistoryStore, HistoryStoreError};

/// Returns the most recent known state for the identifier combination,
/// or `None` for a brand-new order.
pub async fn resolve_previous_state<S: HistoryStore>(
    store: &S,
    file_id: Option<&str>,
    order_id: Option<&str>,
    distributor_id: Option<i32>,
) -> Result<Option<String>, HistoryStoreError> {
    let latest = if let Some(file_id) = file_id {
        store.find_latest_by_file_id(file_id).await?
    } else if let (Some(order_id), Some(distributor_id)) = (order_id, distributor_id) {
        match store
            .find_latest_by_order_and_distributor(order_id, distributor_id)
            .await?
        {
            Some(row) => Some(row),
            None => store.find_latest_by_order(order_id).await?,
        }
    } else if let Some(order_id) = order_id {
        store.find_latest_by_order(order_id).await?
    } else {
        None
    };

    Ok(latest.map(|row| row.current_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use history_store::{InMemoryHistoryStore, NewTransition};

    async fn seed(
        store: &InMemoryHistoryStore,
        file_id: Option<&str>,
        order_id: Option<&str>,
        distributor_id: Option<i32>,
        state: &str,
        millis: i64,
    ) {
        store
            .save(NewTransition {
                file_id: file_id.map(String::from),
                order_id: order_id.map(String::from),
                distributor_id,
                previous_state: None,
                current_state: state.to_string(),
                source_service: "trade-capture".to_string(),
                event_time: Utc.timestamp_millis_opt(millis).unwrap(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fresh_order_has_no_previous_state() {
        let store = InMemoryHistoryStore::new();
        let previous = resolve_previous_state(&store, None, Some("o1"), None)
            .await
            .unwrap();
        assert_eq!(previous, None);
    }

    #[tokio::test]
    async fn no_identifiers_is_not_an_error() {
        let store = InMemoryHistoryStore::new();
        let previous = resolve_previous_state(&store, None, None, None).await.unwrap();
        assert_eq!(previous, None);
    }

    #[tokio::test]
    async fn file_id_takes_precedence() {
        let store = InMemoryHistoryStore::new();
        seed(&store, Some("f1"), Some("o1"), None, "FROM_FILE", 100).await;
        seed(&store, None, Some("o1"), Some(7), "FROM_ORDER", 200).await;

        let previous = resolve_previous_state(&store, Some("f1"), Some("o1"), Some(7))
            .await
            .unwrap();
        assert_eq!(previous, Some("FROM_FILE".to_string()));
    }

    #[tokio::test]
    async fn order_and_distributor_pair_is_tried_before_order_alone() {
        let store = InMemoryHistoryStore::new();
        seed(&store, None, Some("o1"), Some(7), "ON_CHANNEL", 100).await;
        seed(&store, None, Some("o1"), None, "OFF_CHANNEL", 200).await;

        let previous = resolve_previous_state(&store, None, Some("o1"), Some(7))
            .await
            .unwrap();
        assert_eq!(previous, Some("ON_CHANNEL".to_string()));
    }

    #[tokio::test]
    async fn missing_pair_falls_back_to_order_alone() {
        let store = InMemoryHistoryStore::new();
        seed(&store, None, Some("o1"), None, "ANY_CHANNEL", 100).await;

        let previous = resolve_previous_state(&store, None, Some("o1"), Some(99))
            .await
            .unwrap();
        assert_eq!(previous, Some("ANY_CHANNEL".to_string()));
    }

    #[tokio::test]
    async fn order_alone_uses_newest_event_time() {
        let store = InMemoryHistoryStore::new();
        seed(&store, None, Some("o1"), None, "NEW", 100).await;
        seed(&store, None, Some("o1"), None, "FILLED", 200).await;

        let previous = resolve_previous_state(&store, None, Some("o1"), None)
            .await
            .unwrap();
        assert_eq!(previous, Some("FILLED".to_string()));
    }
}
