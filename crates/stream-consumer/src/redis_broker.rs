use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::RecordId;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamReadOptions, StreamReadReply,
};
use serde_json::Value;

use crate::broker::{StreamBroker, StreamRecord};
use crate::error::BrokerError;

/// Redis Streams broker implementation.
///
/// All group coordination rides on Redis primitives: XGROUP CREATE for
/// registration, XREADGROUP for claiming, XAUTOCLAIM for picking up
/// deliveries abandoned by crashed consumers, and the pending entries
/// list for delivery counts.
#[derive(Clone)]
pub struct RedisStreamBroker {
    connection: ConnectionManager,
    claim_min_idle: Duration,
}

const DEFAULT_CLAIM_MIN_IDLE: Duration = Duration::from_secs(60);

impl RedisStreamBroker {
    /// Connects to Redis at the given URL.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            claim_min_idle: DEFAULT_CLAIM_MIN_IDLE,
        })
    }

    /// Sets how long another consumer's delivery must sit idle before
    /// this consumer reclaims it. Must exceed the worst-case
    /// processing time of a batch, or two consumers will fight over
    /// in-flight records.
    pub fn with_claim_min_idle(mut self, claim_min_idle: Duration) -> Self {
        self.claim_min_idle = claim_min_idle;
        self
    }

    fn entry_to_record(entry: StreamId) -> Result<StreamRecord, BrokerError> {
        let id = RecordId::parse(&entry.id)?;
        let fields = entry
            .map
            .into_iter()
            .map(|(key, value)| (key, Value::String(value_to_string(&value))))
            .collect();
        Ok(StreamRecord {
            id,
            fields,
            delivery_count: 1,
        })
    }

    /// Looks up delivery counts for the given records from the
    /// group's pending entries list and stamps them on.
    ///
    /// Scoped to this consumer: every record handed back by
    /// `read_batch` was just claimed by it, and pending entries owned
    /// by other consumers inside the id range would otherwise eat the
    /// count quota and leave records at the default.
    async fn attach_delivery_counts(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        records: &mut [StreamRecord],
    ) -> Result<(), BrokerError> {
        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Ok(());
        };
        let (start, end) = (first.id.to_string(), last.id.to_string());

        let mut con = self.connection.clone();
        let pending: StreamPendingCountReply = con
            .xpending_consumer_count(stream, group, &start, &end, records.len(), consumer)
            .await?;

        apply_delivery_counts(records, pending);
        Ok(())
    }
}

fn apply_delivery_counts(records: &mut [StreamRecord], pending: StreamPendingCountReply) {
    let counts: HashMap<String, u64> = pending
        .ids
        .into_iter()
        .map(|entry| (entry.id, entry.times_delivered as u64))
        .collect();
    for record in records {
        if let Some(count) = counts.get(&record.id.to_string()) {
            record.delivery_count = *count;
        }
    }
}

fn value_to_string(value: &redis::Value) -> String {
    redis::from_redis_value::<String>(value).unwrap_or_else(|_| format!("{value:?}"))
}

#[async_trait]
impl StreamBroker for RedisStreamBroker {
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), BrokerError> {
        let mut con = self.connection.clone();
        let result: redis::RedisResult<()> = con.xgroup_create_mkstream(stream, group, "$").await;
        match result {
            Ok(()) => {
                tracing::info!(stream, group, "consumer group created");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => {
                tracing::debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamRecord>, BrokerError> {
        let mut con = self.connection.clone();

        // Reclaim deliveries abandoned long enough by other consumers;
        // claiming advances their delivery counts.
        let claim: StreamAutoClaimReply = con
            .xautoclaim_options(
                stream,
                group,
                consumer,
                self.claim_min_idle.as_millis() as usize,
                "0-0",
                StreamAutoClaimOptions::default().count(count),
            )
            .await?;

        let mut entries: Vec<StreamId> = claim.claimed;

        if entries.len() < count {
            let options = StreamReadOptions::default()
                .group(group, consumer)
                .count(count - entries.len())
                .block(block.as_millis() as usize);
            let reply: StreamReadReply = con.xread_options(&[stream], &[">"], &options).await?;
            entries.extend(reply.keys.into_iter().flat_map(|key| key.ids));
        }

        let mut records = entries
            .into_iter()
            .map(Self::entry_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|record| record.id);

        self.attach_delivery_counts(stream, group, consumer, &mut records)
            .await?;
        Ok(records)
    }

    async fn ack_and_delete(
        &self,
        stream: &str,
        group: &str,
        id: RecordId,
    ) -> Result<(), BrokerError> {
        let mut con = self.connection.clone();
        let id = id.to_string();
        let _acked: i64 = con.xack(stream, group, &[&id]).await?;
        let _deleted: i64 = con.xdel(stream, &[&id]).await?;
        Ok(())
    }

    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<RecordId, BrokerError> {
        let mut con = self.connection.clone();
        let id: String = con.xadd(stream, "*", fields).await?;
        Ok(RecordId::parse(&id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::streams::StreamPendingId;

    fn record(id: &str) -> StreamRecord {
        StreamRecord {
            id: RecordId::parse(id).unwrap(),
            fields: HashMap::new(),
            delivery_count: 1,
        }
    }

    fn pending_entry(id: &str, consumer: &str, times_delivered: usize) -> StreamPendingId {
        StreamPendingId {
            id: id.to_string(),
            consumer: consumer.to_string(),
            last_delivered_ms: 0,
            times_delivered,
        }
    }

    #[test]
    fn pending_counts_are_stamped_onto_matching_records() {
        let mut records = vec![record("1700000000000-0"), record("1700000000000-1")];
        let pending = StreamPendingCountReply {
            ids: vec![
                pending_entry("1700000000000-0", "c1", 4),
                pending_entry("1700000000000-1", "c1", 1),
            ],
        };

        apply_delivery_counts(&mut records, pending);
        assert_eq!(records[0].delivery_count, 4);
        assert_eq!(records[1].delivery_count, 1);
    }

    #[test]
    fn records_without_a_pending_entry_keep_the_default_count() {
        let mut records = vec![record("1700000000000-0"), record("1700000000000-1")];
        let pending = StreamPendingCountReply {
            ids: vec![pending_entry("1700000000000-1", "c1", 3)],
        };

        apply_delivery_counts(&mut records, pending);
        assert_eq!(records[0].delivery_count, 1);
        assert_eq!(records[1].delivery_count, 3);
    }
}
