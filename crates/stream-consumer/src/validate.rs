//! Identifier and referential-plausibility validation.
//!
//! Origin services (the producers authoritative for first-seen
//! orders) only need to carry an identifier. Every other service must
//! reference an order or batch file the history already knows about;
//! a non-origin service may not originate an order.

use std::collections::HashSet;

use common::RecordId;
use history_store::HistoryStore;

use crate::error::PipelineError;

/// Decides whether the resolved identifiers are acceptable for the
/// originating service.
///
/// Failures are [`PipelineError::Validation`] and count toward the
/// retry budget; an order not visible yet is usually a race with a
/// concurrently-processed origin-service record.
pub async fn validate_identifiers<S: HistoryStore>(
    store: &S,
    origin_services: &HashSet<String>,
    record_id: RecordId,
    source_service: &str,
    file_id: Option<&str>,
    order_id: Option<&str>,
    distributor_id: Option<i32>,
) -> Result<(), PipelineError> {
    let reject = |reason: String| PipelineError::Validation { record_id, reason };

    if origin_services.contains(&source_service.to_lowercase()) {
        if file_id.is_none() && order_id.is_none() {
            return Err(reject(format!(
                "origin service {source_service} requires orderId or fileId"
            )));
        }
        return Ok(());
    }

    let (Some(order_id), Some(_)) = (order_id, distributor_id) else {
        return Err(reject(format!(
            "orderId and distributorId are required for service {source_service}"
        )));
    };

    match file_id {
        None => {
            if store.find_latest_by_order(order_id).await?.is_none() {
                return Err(reject(format!(
                    "orderId {order_id} not seen yet from an origin service"
                )));
            }
        }
        Some(file_id) => {
            if !store.exists_by_file_id(file_id).await? {
                return Err(reject(format!(
                    "fileId {file_id} not found yet for order {order_id}"
                )));
            }
        }
    }

    Ok(())
}
