//! Persistence gateway for order state-transition history.
//!
//! The store is append-only: transitions are inserted during stream
//! consumption and never updated or deleted. Reads are the point
//! lookups the validator, the previous-state resolver, and the HTTP
//! query surface need.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{HistoryStoreError, Result};
pub use memory::InMemoryHistoryStore;
pub use postgres::PostgresHistoryStore;
pub use record::{NewTransition, StateTransition};
pub use store::HistoryStore;
