//! Consumer-group poll loop.
//!
//! Strictly sequential: one blocking batched read, then per-record
//! dispatch in stream order, then back to idle. Scaling out means
//! running more instances in the same group, never parallel dispatch
//! within one.

use history_store::HistoryStore;
use tokio::time::MissedTickBehavior;

use crate::broker::StreamBroker;
use crate::config::ConsumerConfig;
use crate::error::BrokerError;
use crate::pipeline::TransitionProcessor;
use crate::router::{RetryPolicy, RetryRouter};

/// Owns the connection to the stream and drives records through the
/// retry router on a fixed cadence.
pub struct StreamConsumer<B, S> {
    broker: B,
    router: RetryRouter<B, S>,
    config: ConsumerConfig,
}

impl<B, S> StreamConsumer<B, S>
where
    B: StreamBroker + Clone,
    S: HistoryStore,
{
    /// Creates a consumer over the given broker and processor.
    pub fn new(broker: B, processor: TransitionProcessor<S>, config: ConsumerConfig) -> Self {
        let router = RetryRouter::new(
            broker.clone(),
            processor,
            config.stream.clone(),
            config.dlq_stream.clone(),
            config.group.clone(),
            RetryPolicy {
                max_attempts: config.max_attempts,
                max_deliveries: config.max_deliveries,
            },
        );
        Self {
            broker,
            router,
            config,
        }
    }

    /// Creates the consumer group at the stream tail. Already-existing
    /// groups are expected steady-state across restarts and succeed
    /// silently.
    pub async fn init_group(&self) -> Result<(), BrokerError> {
        self.broker
            .create_group(&self.config.stream, &self.config.group)
            .await
    }

    /// One loop iteration: a single blocking batched read, then
    /// sequential dispatch. Returns the number of records handled.
    #[tracing::instrument(skip(self), fields(stream = %self.config.stream, group = %self.config.group))]
    pub async fn poll_once(&self) -> Result<usize, BrokerError> {
        let records = self
            .broker
            .read_batch(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer_name,
                self.config.read_count,
                self.config.block,
            )
            .await?;

        if records.is_empty() {
            return Ok(0);
        }

        metrics::counter!("stream_records_read").increment(records.len() as u64);
        let handled = records.len();
        for record in &records {
            self.router.handle(record).await?;
        }
        Ok(handled)
    }

    /// Runs the poll loop until the process shuts down. In-flight
    /// records are safe to abandon: the broker's delivery tracking
    /// redelivers them to another instance.
    pub async fn run(self) {
        if let Err(err) = self.init_group().await {
            tracing::error!(error = %err, "failed to create consumer group");
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer_name,
            "consumer loop started"
        );

        loop {
            interval.tick().await;
            match self.poll_once().await {
                Ok(0) => tracing::trace!("no new records to process"),
                Ok(handled) => tracing::debug!(handled, "batch processed"),
                Err(err) => tracing::error!(error = %err, "error while reading stream"),
            }
        }
    }
}
