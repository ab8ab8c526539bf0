//! Bounded-retry envelope and dead-letter routing.
//!
//! Retries are immediate, with no backoff: failures are expected to be
//! transient validation races resolved within milliseconds by a
//! concurrently-processed origin-service record, and the poll loop is
//! single-threaded, so waiting here would stall the whole consumer.

use std::collections::HashMap;

use common::RecordId;
use history_store::{HistoryStore, StateTransition};
use serde_json::Value;

use crate::broker::{StreamBroker, StreamRecord};
use crate::error::{BrokerError, PipelineError};
use crate::pipeline::TransitionProcessor;

/// Bounds for the retry envelope.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum pipeline executions per delivery.
    pub max_attempts: u32,

    /// Maximum broker redelivery cycles before a record is considered
    /// delivery-exhausted.
    pub max_deliveries: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_deliveries: 5,
        }
    }
}

/// Terminal result of routing one record.
#[derive(Debug)]
pub enum Outcome {
    /// The transition was persisted and the record removed from the
    /// stream.
    Persisted(StateTransition),

    /// Retries were exhausted; a diagnostic record went to the
    /// dead-letter stream and the original was removed.
    DeadLettered,
}

/// Diagnostic record appended to the dead-letter stream on exhaustion.
///
/// Write-once; consumed by an out-of-band remediation process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRecord {
    pub failed_record_id: RecordId,
    pub reason: String,
    pub attempts: u64,
    pub stream_payload: String,
}

impl DeadLetterRecord {
    /// Builds a dead-letter record from the record in hand, carrying
    /// its original fields serialized to a string.
    pub fn from_record(record: &StreamRecord, attempts: u64, reason: impl Into<String>) -> Self {
        let stream_payload = serde_json::to_string(&record.fields)
            .unwrap_or_else(|_| format!("{:?}", record.fields));
        Self {
            failed_record_id: record.id,
            reason: reason.into(),
            attempts,
            stream_payload,
        }
    }

    /// Flattens into the field pairs appended to the dead-letter
    /// stream.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (
                "failed_record_id".to_string(),
                self.failed_record_id.to_string(),
            ),
            ("reason".to_string(), self.reason.clone()),
            ("attempts".to_string(), self.attempts.to_string()),
            ("stream_payload".to_string(), self.stream_payload.clone()),
        ]
    }

    /// Reads a dead-letter record back from stream fields.
    pub fn from_fields(fields: &HashMap<String, Value>) -> Option<Self> {
        let text = |key: &str| match fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        Some(Self {
            failed_record_id: RecordId::parse(&text("failed_record_id")?).ok()?,
            reason: text("reason")?,
            attempts: text("attempts")?.parse().ok()?,
            stream_payload: text("stream_payload")?,
        })
    }
}

/// Wraps a record's end-to-end processing in a bounded-retry envelope
/// and routes exhausted records to the dead-letter stream.
pub struct RetryRouter<B, S> {
    broker: B,
    processor: TransitionProcessor<S>,
    stream: String,
    dlq_stream: String,
    group: String,
    policy: RetryPolicy,
}

impl<B: StreamBroker, S: HistoryStore> RetryRouter<B, S> {
    pub fn new(
        broker: B,
        processor: TransitionProcessor<S>,
        stream: impl Into<String>,
        dlq_stream: impl Into<String>,
        group: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            processor,
            stream: stream.into(),
            dlq_stream: dlq_stream.into(),
            group: group.into(),
            policy,
        }
    }

    /// Processes one record to completion.
    ///
    /// Every record leaves the source stream exactly once: either
    /// after a successful persist or after dead-letter routing. Only
    /// broker failures propagate; they leave the record pending for
    /// redelivery.
    #[tracing::instrument(skip(self, record), fields(record_id = %record.id))]
    pub async fn handle(&self, record: &StreamRecord) -> Result<Outcome, BrokerError> {
        if record.delivery_count > self.policy.max_deliveries {
            tracing::warn!(
                delivery_count = record.delivery_count,
                "record exhausted its delivery budget, dead-lettering"
            );
            self.dead_letter(
                record,
                record.delivery_count,
                format!(
                    "delivery count {} exceeded bound {}",
                    record.delivery_count, self.policy.max_deliveries
                ),
            )
            .await?;
            return Ok(Outcome::DeadLettered);
        }

        let mut last_error: Option<PipelineError> = None;
        for attempt in 1..=self.policy.max_attempts {
            match self.processor.process(record).await {
                Ok(transition) => {
                    self.broker
                        .ack_and_delete(&self.stream, &self.group, record.id)
                        .await?;
                    tracing::debug!(attempt, "record acknowledged and removed");
                    return Ok(Outcome::Persisted(transition));
                }
                Err(err) => {
                    metrics::counter!("record_attempts_failed").increment(1);
                    tracing::warn!(attempt, error = %err, "processing attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown failure".to_string());
        tracing::error!(
            attempts = self.policy.max_attempts,
            %reason,
            "retries exhausted, moving record to dead-letter stream"
        );
        self.dead_letter(record, u64::from(self.policy.max_attempts), reason)
            .await?;
        Ok(Outcome::DeadLettered)
    }

    /// Appends the diagnostic record, then removes the original from
    /// the source stream regardless of the append result. A failed
    /// dead-letter write is logged, never retried; one poison record
    /// must not block the loop.
    async fn dead_letter(
        &self,
        record: &StreamRecord,
        attempts: u64,
        reason: String,
    ) -> Result<(), BrokerError> {
        let dead_letter = DeadLetterRecord::from_record(record, attempts, reason);
        match self
            .broker
            .append(&self.dlq_stream, &dead_letter.to_fields())
            .await
        {
            Ok(id) => {
                metrics::counter!("records_dead_lettered").increment(1);
                tracing::info!(dead_letter_id = %id, "dead-letter record appended");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to append dead-letter record");
            }
        }

        self.broker
            .ack_and_delete(&self.stream, &self.group, record.id)
            .await
    }
}
