//! Stream-consumption pipeline for order-status events.
//!
//! One stream record flows through: parse payload → resolve fields →
//! validate against prior history → resolve previous state → persist.
//! The [`RetryRouter`] wraps that pipeline in a bounded-retry envelope
//! with dead-letter routing, and the [`StreamConsumer`] drives batched
//! blocking reads through a named consumer group.
//!
//! Group membership and delivery-count tracking live in the broker
//! behind [`StreamBroker`]; the core keeps no coordination state of
//! its own, so any number of instances can run in the same group.

pub mod broker;
pub mod config;
pub mod error;
pub mod fields;
pub mod memory;
pub mod payload;
pub mod pipeline;
pub mod poll;
pub mod previous;
pub mod redis_broker;
pub mod router;
pub mod validate;

pub use broker::{PAYLOAD_FIELD, StreamBroker, StreamRecord};
pub use config::ConsumerConfig;
pub use error::{BrokerError, PipelineError};
pub use memory::InMemoryStreamBroker;
pub use pipeline::TransitionProcessor;
pub use poll::StreamConsumer;
pub use redis_broker::RedisStreamBroker;
pub use router::{DeadLetterRecord, Outcome, RetryPolicy, RetryRouter};
