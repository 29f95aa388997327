use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, ManualClock, MonotonicClock};
use crate::types::{TimeUnit, Timestamp};

#[test]
fn test_manual_clock_set_and_advance() {
    let clock = ManualClock::new(TimeUnit::Millisecond, Timestamp::new(100));
    assert_eq!(clock.now(), Timestamp::new(100));

    clock.advance(5);
    assert_eq!(clock.now(), Timestamp::new(105));

    clock.advance_by(Duration::from_millis(10));
    assert_eq!(clock.now(), Timestamp::new(115));

    clock.set(Timestamp::new(200));
    assert_eq!(clock.now(), Timestamp::new(200));
}

#[test]
fn test_manual_clock_never_goes_backwards() {
    let clock = ManualClock::new(TimeUnit::Millisecond, Timestamp::new(100));
    clock.set(Timestamp::new(50));
    assert_eq!(clock.now(), Timestamp::new(100));
}

#[test]
fn test_manual_clock_clones_share_time() {
    let a = ManualClock::new(TimeUnit::Microsecond, Timestamp::new(1));
    let b = a.clone();
    a.advance(9);
    assert_eq!(b.now(), Timestamp::new(10));
    assert_eq!(b.unit(), TimeUnit::Microsecond);
}

#[tokio::test(start_paused = true)]
async fn test_monotonic_clock_follows_runtime_time() {
    let clock = MonotonicClock::starting_at(TimeUnit::Millisecond, Timestamp::new(1_000));
    assert_eq!(clock.now(), Timestamp::new(1_000));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(clock.now(), Timestamp::new(1_250));
}

#[tokio::test(start_paused = true)]
async fn test_monotonic_clock_microseconds() {
    let clock = MonotonicClock::new(TimeUnit::Microsecond);
    tokio::time::sleep(Duration::from_millis(3)).await;
    assert_eq!(clock.now(), Timestamp::new(3_000));
}

#[test]
fn test_arc_clock_delegates() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
        TimeUnit::Millisecond,
        Timestamp::new(77),
    ));
    assert_eq!(clock.now(), Timestamp::new(77));
    assert_eq!(clock.unit(), TimeUnit::Millisecond);
}
