use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted state transition for an order.
///
/// Rows are immutable once written; history only ever grows by
/// appending new transitions. `event_time` carries the broker-assigned
/// record timestamp, so the per-order ordering is stable across
/// reprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Store-assigned surrogate id, monotonically increasing.
    pub id: i64,

    /// Correlation key grouping orders processed from one batch file.
    pub file_id: Option<String>,

    /// Business key identifying the order.
    pub order_id: Option<String>,

    /// Downstream distribution channel.
    pub distributor_id: Option<i32>,

    /// State observed immediately before this transition, absent for
    /// the first known transition of an order.
    pub previous_state: Option<String>,

    /// The new status being recorded.
    pub current_state: String,

    /// Upstream service that emitted the event.
    pub source_service: String,

    /// Event time derived from the stream record id.
    pub event_time: DateTime<Utc>,
}

/// A state transition that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransition {
    pub file_id: Option<String>,
    pub order_id: Option<String>,
    pub distributor_id: Option<i32>,
    pub previous_state: Option<String>,
    pub current_state: String,
    pub source_service: String,
    pub event_time: DateTime<Utc>,
}

impl NewTransition {
    /// Attaches the store-assigned id, producing the persisted form.
    pub fn into_persisted(self, id: i64) -> StateTransition {
        StateTransition {
            id,
            file_id: self.file_id,
            order_id: self.order_id,
            distributor_id: self.distributor_id,
            previous_state: self.previous_state,
            current_state: self.current_state,
            source_service: self.source_service,
            event_time: self.event_time,
        }
    }
}
