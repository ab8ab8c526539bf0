use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::RecordId;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::broker::{StreamBroker, StreamRecord};
use crate::error::BrokerError;

/// In-memory stream broker implementation for testing.
///
/// Models the consumer-group contract the Redis implementation
/// provides: groups are created at the stream tail, records read
/// through a group become pending until acknowledged, and pending
/// records are redelivered on later reads with an incremented
/// delivery count.
#[derive(Clone, Default)]
pub struct InMemoryStreamBroker {
    inner: Arc<RwLock<HashMap<String, StreamState>>>,
}

#[derive(Default)]
struct StreamState {
    entries: BTreeMap<RecordId, HashMap<String, Value>>,
    next_sequence: u64,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
struct GroupState {
    last_delivered: Option<RecordId>,
    pending: BTreeMap<RecordId, u64>,
}

impl InMemoryStreamBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records currently in a stream.
    pub async fn stream_len(&self, stream: &str) -> usize {
        self.inner
            .read()
            .await
            .get(stream)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Returns a stream's records in stream order.
    pub async fn entries(&self, stream: &str) -> Vec<(RecordId, HashMap<String, Value>)> {
        self.inner
            .read()
            .await
            .get(stream)
            .map(|s| s.entries.iter().map(|(id, f)| (*id, f.clone())).collect())
            .unwrap_or_default()
    }

    /// Returns the pending record ids for a group, with delivery
    /// counts.
    pub async fn pending(&self, stream: &str, group: &str) -> Vec<(RecordId, u64)> {
        self.inner
            .read()
            .await
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.iter().map(|(id, n)| (*id, *n)).collect())
            .unwrap_or_default()
    }

    /// Appends a record with a structured (non-string) payload value,
    /// which the Redis transport cannot carry but tests use to cover
    /// the mapping-shaped payload branch.
    pub async fn append_raw(
        &self,
        stream: &str,
        fields: HashMap<String, Value>,
    ) -> Result<RecordId, BrokerError> {
        let mut inner = self.inner.write().await;
        let state = inner.entry(stream.to_string()).or_default();
        let id = Self::next_id(state);
        state.entries.insert(id, fields);
        Ok(id)
    }

    fn next_id(state: &mut StreamState) -> RecordId {
        state.next_sequence += 1;
        RecordId::new(Utc::now().timestamp_millis(), state.next_sequence)
    }
}

#[async_trait]
impl StreamBroker for InMemoryStreamBroker {
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), BrokerError> {
        let mut inner = self.inner.write().await;
        let state = inner.entry(stream.to_string()).or_default();
        let tail = state.entries.keys().next_back().copied();
        state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                last_delivered: tail,
                pending: BTreeMap::new(),
            });
        Ok(())
    }

    async fn read_batch(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        count: usize,
        _block: Duration,
    ) -> Result<Vec<StreamRecord>, BrokerError> {
        let mut inner = self.inner.write().await;
        let Some(state) = inner.get_mut(stream) else {
            return Ok(Vec::new());
        };

        // Split borrows: collect candidate ids before touching the group.
        let all_ids: Vec<RecordId> = state.entries.keys().copied().collect();
        let Some(group_state) = state.groups.get_mut(group) else {
            return Ok(Vec::new());
        };

        let mut delivered: Vec<(RecordId, u64)> = Vec::new();

        // Unacknowledged records first, as a redelivery cycle.
        for (&id, delivery_count) in group_state.pending.iter_mut() {
            if delivered.len() >= count {
                break;
            }
            *delivery_count += 1;
            delivered.push((id, *delivery_count));
        }

        // Then records past the group's cursor.
        for id in all_ids {
            if delivered.len() >= count {
                break;
            }
            let past_cursor = group_state.last_delivered.is_none_or(|last| id > last);
            if past_cursor && !group_state.pending.contains_key(&id) {
                group_state.pending.insert(id, 1);
                group_state.last_delivered = Some(id);
                delivered.push((id, 1));
            }
        }

        delivered.sort_by_key(|(id, _)| *id);
        Ok(delivered
            .into_iter()
            .filter_map(|(id, delivery_count)| {
                state.entries.get(&id).map(|fields| StreamRecord {
                    id,
                    fields: fields.clone(),
                    delivery_count,
                })
            })
            .collect())
    }

    async fn ack_and_delete(
        &self,
        stream: &str,
        group: &str,
        id: RecordId,
    ) -> Result<(), BrokerError> {
        let mut inner = self.inner.write().await;
        if let Some(state) = inner.get_mut(stream) {
            if let Some(group_state) = state.groups.get_mut(group) {
                group_state.pending.remove(&id);
            }
            state.entries.remove(&id);
        }
        Ok(())
    }

    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<RecordId, BrokerError> {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.append_raw(stream, fields).await
    }
}
