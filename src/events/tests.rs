use super::*;
use crate::error::DesyncReason;

#[tokio::test]
async fn test_event_bus() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();

    bus.emit(SyncEvent::RoundCompleted {
        address: 2,
        offset: 50,
        rounds_completed: 1,
    });

    let event = rx.recv().await.unwrap();
    if let SyncEvent::RoundCompleted {
        address, offset, ..
    } = event
    {
        assert_eq!(address, 2);
        assert_eq!(offset, 50);
    } else {
        panic!("Wrong event type");
    }
}

#[test]
fn test_emit_without_subscribers() {
    let bus = EventBus::new();
    assert_eq!(bus.subscriber_count(), 0);
    bus.emit(SyncEvent::FollowerAbsent { address: 0 });
}

#[test]
fn test_subscriber_count() {
    let bus = EventBus::new();
    let _a = bus.subscribe();
    let _b = bus.clone().subscribe();
    assert_eq!(bus.subscriber_count(), 2);
}

#[tokio::test]
async fn test_event_filter() {
    let bus = EventBus::new();
    let mut filter = EventFilter::presence_events(&bus);

    bus.emit(SyncEvent::CycleCompleted {
        cycle: 1,
        completed: 4,
        failed: 0,
    });
    bus.emit(SyncEvent::FollowerDiscovered { address: 3 });

    let event = filter.recv().await.unwrap();
    assert_eq!(event, SyncEvent::FollowerDiscovered { address: 3 });
}

#[tokio::test]
async fn test_error_filter() {
    let bus = EventBus::new();
    let mut filter = EventFilter::error_events(&bus);

    bus.emit(SyncEvent::RoundCompleted {
        address: 0,
        offset: 0,
        rounds_completed: 1,
    });
    bus.emit(SyncEvent::ProtocolDesync {
        address: 1,
        reason: DesyncReason::UnexpectedPlaceholder,
    });

    let event = filter.recv().await.unwrap();
    assert!(matches!(event, SyncEvent::ProtocolDesync { address: 1, .. }));
}

#[test]
fn test_follower_filter_try_recv() {
    let bus = EventBus::new();
    let mut filter = EventFilter::for_follower(&bus, 2);

    bus.emit(SyncEvent::FollowerDiscovered { address: 1 });
    bus.emit(SyncEvent::FollowerDiscovered { address: 2 });

    assert_eq!(
        filter.try_recv(),
        Some(SyncEvent::FollowerDiscovered { address: 2 })
    );
    assert_eq!(filter.try_recv(), None);
}

#[test]
fn test_event_address() {
    assert_eq!(
        SyncEvent::RoundAbandoned {
            address: 3,
            error: "x".into()
        }
        .address(),
        Some(3)
    );
    assert_eq!(
        SyncEvent::CycleCompleted {
            cycle: 1,
            completed: 0,
            failed: 0
        }
        .address(),
        None
    );
}
