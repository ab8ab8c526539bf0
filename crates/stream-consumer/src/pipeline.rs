//! End-to-end processing of one stream record into a persisted
//! transition.

use std::collections::HashSet;

use history_store::{HistoryStore, NewTransition, StateTransition};

use crate::error::PipelineError;
use crate::{broker::StreamRecord, fields, payload, previous, validate};

/// Processes stream records through parse → resolve → validate →
/// previous-state lookup → persist.
///
/// Holds no mutable state; any number of processors may run against
/// the same store from competing consumer instances.
pub struct TransitionProcessor<S> {
    store: S,
    origin_services: HashSet<String>,
}

impl<S: HistoryStore> TransitionProcessor<S> {
    /// Creates a processor over the given store. `origin_services`
    /// names the producers allowed to originate orders, matched
    /// case-insensitively.
    pub fn new(store: S, origin_services: impl IntoIterator<Item = String>) -> Self {
        Self {
            store,
            origin_services: origin_services
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    /// Returns a reference to the underlying history store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one record through the full pipeline. Any failure leaves
    /// the store untouched; the persist is the last step.
    #[tracing::instrument(skip(self, record), fields(record_id = %record.id))]
    pub async fn process(&self, record: &StreamRecord) -> Result<StateTransition, PipelineError> {
        let payload = payload::parse_payload(record.id, record.payload())?;

        let source_service = fields::resolve_string(&payload, fields::SOURCE_SERVICE);
        let status = fields::resolve_string(&payload, fields::STATUS);
        let (Some(source_service), Some(status)) = (source_service, status) else {
            return Err(PipelineError::Validation {
                record_id: record.id,
                reason: "missing status or sourceService".to_string(),
            });
        };

        let file_id = fields::resolve_string(&payload, fields::FILE_ID);
        let order_id = fields::resolve_string(&payload, fields::ORDER_ID);
        let distributor_id = fields::resolve_int(&payload, fields::DISTRIBUTOR_ID);

        validate::validate_identifiers(
            &self.store,
            &self.origin_services,
            record.id,
            &source_service,
            file_id.as_deref(),
            order_id.as_deref(),
            distributor_id,
        )
        .await?;

        let previous_state = previous::resolve_previous_state(
            &self.store,
            file_id.as_deref(),
            order_id.as_deref(),
            distributor_id,
        )
        .await?;

        let saved = self
            .store
            .save(NewTransition {
                file_id,
                order_id,
                distributor_id,
                previous_state,
                current_state: status,
                source_service,
                event_time: record.id.event_time(),
            })
            .await?;

        metrics::counter!("transitions_persisted").increment(1);
        tracing::info!(
            order_id = saved.order_id.as_deref().unwrap_or("-"),
            file_id = saved.file_id.as_deref().unwrap_or("-"),
            previous_state = saved.previous_state.as_deref().unwrap_or("-"),
            current_state = %saved.current_state,
            source_service = %saved.source_service,
            "transition persisted"
        );

        Ok(saved)
    }
}
