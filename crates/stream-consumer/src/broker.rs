use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::RecordId;
use serde_json::Value;

use crate::error::BrokerError;

/// Stream field under which producers publish the event payload.
pub const PAYLOAD_FIELD: &str = "payload";

/// A record read from the stream through a consumer group.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    /// Broker-assigned identifier, also the source of the event time.
    pub id: RecordId,

    /// Raw field/value pairs of the stream entry. The Redis broker
    /// delivers every value as a string; in-memory producers may
    /// publish structured objects directly.
    pub fields: HashMap<String, Value>,

    /// How many times the group has delivered this record, as tracked
    /// by the broker's pending-entries bookkeeping.
    pub delivery_count: u64,
}

impl StreamRecord {
    /// Returns the opaque payload field, if present.
    pub fn payload(&self) -> Option<&Value> {
        self.fields.get(PAYLOAD_FIELD)
    }
}

/// Connection to a stream broker supporting competing consumer groups.
///
/// Who owns which record and how often it has been redelivered are the
/// broker's responsibility; implementations must not require shared
/// in-process state between consumer instances.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Creates the consumer group at the stream tail, creating the
    /// stream if needed. Succeeds silently when the group already
    /// exists.
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), BrokerError>;

    /// One blocking batched read of records not yet claimed by this
    /// consumer, in stream order. Blocks up to `block`, returns up to
    /// `count` records, possibly none.
    async fn read_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamRecord>, BrokerError>;

    /// Marks the record consumed for the group and removes it from the
    /// stream's backing log. Always done together: the projector is
    /// the stream's only retention policy.
    async fn ack_and_delete(&self, stream: &str, group: &str, id: RecordId)
    -> Result<(), BrokerError>;

    /// Appends a new record and returns its broker-assigned id. Used
    /// for the dead-letter stream.
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<RecordId, BrokerError>;
}
