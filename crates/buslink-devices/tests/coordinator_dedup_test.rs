//! Polling dedup across entities sharing a telemetry source.

mod common;

use std::sync::Arc;
use std::time::Duration;

use buslink_core::{ChannelIndex, EventRouter, Feedback, FeedbackEvent};
use buslink_devices::entities::{BillSensor, MonthlyEnergySensor, TemperatureSensor};
use buslink_devices::{CommandDispatcher, CoordinatorRegistry};

use common::{addr, MockBuilder, MockSender};

#[tokio::test]
async fn monthly_and_bill_sensors_share_one_coordinator() {
    common::init_tracing();
    let sender = MockSender::new();
    let router = Arc::new(EventRouter::new());
    let registry = CoordinatorRegistry::new(sender.clone());
    let dispatcher = CommandDispatcher::new(sender.clone());

    let monthly = MonthlyEnergySensor::new(
        "Monthly Energy main meter",
        addr(1),
        ChannelIndex::new(1),
        Arc::new(MockBuilder),
        dispatcher.clone(),
    );
    let bill = BillSensor::new(
        "Bill main meter",
        addr(1),
        ChannelIndex::new(1),
        None,
        Arc::new(MockBuilder),
        dispatcher.clone(),
    );

    monthly.attach(&router, &registry).await;
    bill.attach(&router, &registry).await;

    // Both sensors decode the same physical telemetry: one poller.
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.dependents(&monthly.coordinator_key()), 2);
    assert_eq!(monthly.coordinator_key(), bill.coordinator_key());

    // One event feeds both entities through the router.
    router
        .publish(&FeedbackEvent::new(
            addr(1),
            Feedback::MonthlyEnergyFeedback {
                channel: ChannelIndex::new(1),
                kwh: 42.0,
            },
        ))
        .await;
    assert_eq!(monthly.kwh().await, Some(42.0));
}

#[tokio::test]
async fn different_channels_poll_separately() {
    let sender = MockSender::new();
    let router = Arc::new(EventRouter::new());
    let registry = CoordinatorRegistry::new(sender.clone());
    let dispatcher = CommandDispatcher::new(sender.clone());

    let a = MonthlyEnergySensor::new(
        "meter a",
        addr(1),
        ChannelIndex::new(1),
        Arc::new(MockBuilder),
        dispatcher.clone(),
    );
    let b = MonthlyEnergySensor::new(
        "meter b",
        addr(1),
        ChannelIndex::new(2),
        Arc::new(MockBuilder),
        dispatcher.clone(),
    );
    a.attach(&router, &registry).await;
    b.attach(&router, &registry).await;
    assert_eq!(registry.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shared_coordinator_emits_one_reissue_stream() {
    let sender = MockSender::new();
    let router = Arc::new(EventRouter::new());
    let registry = CoordinatorRegistry::new(sender.clone());
    let dispatcher = CommandDispatcher::new(sender.clone());

    let first = TemperatureSensor::new(
        "temp a",
        addr(2),
        ChannelIndex::new(1),
        Arc::new(MockBuilder),
        dispatcher.clone(),
    );
    let second = TemperatureSensor::new(
        "temp b",
        addr(2),
        ChannelIndex::new(1),
        Arc::new(MockBuilder),
        dispatcher.clone(),
    );
    let id_first = first.attach(&router, &registry).await;
    let _id_second = second.attach(&router, &registry).await;
    tokio::task::yield_now().await;

    // Two attach-time refresh requests have been sent already.
    let baseline = sender.sent_count().await;
    assert_eq!(baseline, 2);

    // One poll interval: exactly one reissue despite two dependents.
    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;
    assert_eq!(sender.sent_count().await, baseline + 1);

    // Releasing one dependent keeps the stream alive.
    first.detach(&router, &registry, id_first);
    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;
    assert_eq!(sender.sent_count().await, baseline + 2);

    // Releasing the last dependent stops it.
    second.detach(&router, &registry, _id_second);
    tokio::time::advance(Duration::from_secs(62)).await;
    tokio::task::yield_now().await;
    assert_eq!(sender.sent_count().await, baseline + 2);
}
