//! Edge latch hand-off between a capturing thread and an async waiter.

use std::sync::Arc;

use busclock::{EdgeLatch, Timestamp};
use tokio_test::task;
use tokio_test::{assert_pending, assert_ready_eq};

#[test]
fn test_waiter_is_woken_by_trigger() {
    let latch = EdgeLatch::new();
    let mut wait = task::spawn(latch.wait_for_trigger());

    assert_pending!(wait.poll());
    assert!(latch.trigger(Timestamp::new(1_000)));
    assert!(wait.is_woken());
    assert_ready_eq!(wait.poll(), Timestamp::new(1_000));
}

#[test]
fn test_each_capture_is_read_once() {
    let latch = EdgeLatch::new();
    latch.trigger(Timestamp::new(5));

    {
        let mut first = task::spawn(latch.wait_for_trigger());
        assert_ready_eq!(first.poll(), Timestamp::new(5));
    }

    let mut second = task::spawn(latch.wait_for_trigger());
    assert_pending!(second.poll());
    assert_eq!(latch.try_take(), None);
}

#[test]
fn test_overrun_keeps_first_capture() {
    let latch = EdgeLatch::new();
    assert!(latch.trigger(Timestamp::new(10)));
    assert!(!latch.trigger(Timestamp::new(20)));
    assert_eq!(latch.overruns(), 1);

    let mut wait = task::spawn(latch.wait_for_trigger());
    assert_ready_eq!(wait.poll(), Timestamp::new(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trigger_from_plain_thread() {
    let latch = Arc::new(EdgeLatch::new());

    for round in 1..=50u64 {
        let capture = {
            let latch = Arc::clone(&latch);
            std::thread::spawn(move || latch.trigger(Timestamp::new(round)))
        };
        assert_eq!(latch.wait_for_trigger().await, Timestamp::new(round));
        assert!(capture.join().unwrap());
    }
    assert_eq!(latch.overruns(), 0);
    assert!(!latch.is_pending());
}
