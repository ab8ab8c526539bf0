use common::{RecordId, RecordIdError};
use history_store::HistoryStoreError;
use thiserror::Error;

/// Errors raised while processing a single stream record.
///
/// All three variants are treated the same way by the retry envelope:
/// transient, retried up to the attempt bound. Most validation
/// failures are races with a concurrently-processed origin-service
/// record and resolve within milliseconds.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The record payload could not be turned into a usable mapping.
    #[error("unusable payload for record {record_id}: {reason}")]
    Parse { record_id: RecordId, reason: String },

    /// Identifiers are missing or referentially implausible for the
    /// originating service.
    #[error("validation failed for record {record_id}: {reason}")]
    Validation { record_id: RecordId, reason: String },

    /// A history store write or lookup failed.
    #[error("History store error: {0}")]
    Persistence(#[from] HistoryStoreError),
}

/// Errors raised by stream broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The underlying Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The broker returned a record id the core cannot interpret.
    #[error(transparent)]
    InvalidRecordId(#[from] RecordIdError),
}
