//! End-to-end tests: broker → poll loop → pipeline → history store,
//! with dead-letter routing on the failure paths.

use std::time::Duration;

use history_store::{HistoryStore, InMemoryHistoryStore};
use serde_json::json;
use stream_consumer::{
    ConsumerConfig, DeadLetterRecord, InMemoryStreamBroker, PAYLOAD_FIELD, StreamBroker,
    StreamConsumer, TransitionProcessor,
};

const STREAM: &str = "order-status-events";
const DLQ: &str = "order-status-dlq";
const GROUP: &str = "status-projector";

fn build(
    broker: &InMemoryStreamBroker,
    store: &InMemoryHistoryStore,
) -> StreamConsumer<InMemoryStreamBroker, InMemoryHistoryStore> {
    let config = ConsumerConfig {
        stream: STREAM.to_string(),
        dlq_stream: DLQ.to_string(),
        group: GROUP.to_string(),
        ..ConsumerConfig::default()
    };
    let processor = TransitionProcessor::new(store.clone(), config.origin_services.clone());
    StreamConsumer::new(broker.clone(), processor, config)
}

async fn publish(broker: &InMemoryStreamBroker, payload: serde_json::Value) {
    broker
        .append(STREAM, &[(PAYLOAD_FIELD.to_string(), payload.to_string())])
        .await
        .unwrap();
}

#[tokio::test]
async fn mixed_batch_persists_good_records_and_dead_letters_bad_ones() {
    let broker = InMemoryStreamBroker::new();
    let store = InMemoryHistoryStore::new();
    let consumer = build(&broker, &store);
    consumer.init_group().await.unwrap();

    // Origin record establishing the order, as a JSON string payload.
    publish(
        &broker,
        json!({"sourceService": "trade-capture", "status": "NEW", "orderId": "o1"}),
    )
    .await;
    // Follow-up from another service, informal payload shape.
    broker
        .append(
            STREAM,
            &[(
                PAYLOAD_FIELD.to_string(),
                "{source_service: settlement, status: SETTLED, order_id: o1, distributor_id: 7}"
                    .to_string(),
            )],
        )
        .await
        .unwrap();
    // Non-origin record for an order nobody has seen: exhausts retries.
    publish(
        &broker,
        json!({
            "sourceService": "settlement",
            "status": "B",
            "orderId": "ghost",
            "distributorId": "9"
        }),
    )
    .await;

    assert_eq!(consumer.poll_once().await.unwrap(), 3);

    // Two rows persisted, chained by lookup.
    let rows = store.all().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].current_state, "NEW");
    assert_eq!(rows[0].previous_state, None);
    assert_eq!(rows[1].current_state, "SETTLED");
    assert_eq!(rows[1].previous_state, Some("NEW".to_string()));
    assert_eq!(rows[1].source_service, "settlement");

    // The bad record went to the dead-letter stream with diagnostics.
    let dead = broker.entries(DLQ).await;
    assert_eq!(dead.len(), 1);
    let dead_letter = DeadLetterRecord::from_fields(&dead[0].1).unwrap();
    assert_eq!(dead_letter.attempts, 3);
    assert!(dead_letter.reason.contains("ghost"));

    // The source stream is fully drained either way.
    assert_eq!(broker.stream_len(STREAM).await, 0);
    assert_eq!(consumer.poll_once().await.unwrap(), 0);
}

#[tokio::test]
async fn race_resolved_between_polls_persists_on_redelivery() {
    let broker = InMemoryStreamBroker::new();
    let store = InMemoryHistoryStore::new();
    let consumer = build(&broker, &store);
    consumer.init_group().await.unwrap();

    // The settlement record arrives before its origin record.
    publish(
        &broker,
        json!({
            "sourceService": "settlement",
            "status": "SETTLED",
            "orderId": "o1",
            "distributorId": "7"
        }),
    )
    .await;

    assert_eq!(consumer.poll_once().await.unwrap(), 1);
    // Rejected and dead-lettered; history is still empty.
    assert_eq!(store.transition_count().await, 0);
    assert_eq!(broker.stream_len(DLQ).await, 1);

    // Once the origin record lands, the same payload goes through.
    publish(
        &broker,
        json!({"sourceService": "trade-capture", "status": "NEW", "orderId": "o1"}),
    )
    .await;
    publish(
        &broker,
        json!({
            "sourceService": "settlement",
            "status": "SETTLED",
            "orderId": "o1",
            "distributorId": "7"
        }),
    )
    .await;

    assert_eq!(consumer.poll_once().await.unwrap(), 2);
    let latest = store.find_latest_by_order("o1").await.unwrap().unwrap();
    assert_eq!(latest.current_state, "SETTLED");
    assert_eq!(latest.previous_state, Some("NEW".to_string()));
}

#[tokio::test]
async fn abandoned_deliveries_eventually_exhaust_the_delivery_budget() {
    let broker = InMemoryStreamBroker::new();
    let store = InMemoryHistoryStore::new();
    let consumer = build(&broker, &store);
    consumer.init_group().await.unwrap();

    publish(
        &broker,
        json!({"sourceService": "trade-capture", "status": "NEW", "orderId": "o1"}),
    )
    .await;

    // Five deliveries claimed and abandoned without acknowledgment.
    for _ in 0..5 {
        let records = broker
            .read_batch(STREAM, GROUP, "crashed-consumer", 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    // The sixth delivery exceeds the bound; the record is routed to
    // the dead-letter stream without touching the pipeline.
    assert_eq!(consumer.poll_once().await.unwrap(), 1);
    assert_eq!(store.transition_count().await, 0);

    let dead = broker.entries(DLQ).await;
    assert_eq!(dead.len(), 1);
    let dead_letter = DeadLetterRecord::from_fields(&dead[0].1).unwrap();
    assert_eq!(dead_letter.attempts, 6);
    assert!(dead_letter.reason.contains("delivery count"));
    assert_eq!(broker.stream_len(STREAM).await, 0);
}
