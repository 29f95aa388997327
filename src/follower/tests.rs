use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::FollowerNode;
use crate::clock::{EdgeLatch, ManualClock};
use crate::error::{ConfigError, DesyncReason, SyncError, TransportError};
use crate::events::{EventFilter, SyncEvent};
use crate::protocol::{
    ACK_MARKER, FollowerStep, Report, SessionState, ZERO_FRAME, encode_padded, encode_timestamp,
};
use crate::testing::ScriptedPort;
use crate::types::{FollowerConfig, ProtocolVariant, TimeUnit, Timestamp, report_identifier};

fn clock(start: u64) -> ManualClock {
    ManualClock::new(TimeUnit::Millisecond, Timestamp::new(start))
}

fn config(variant: ProtocolVariant) -> FollowerConfig {
    FollowerConfig {
        protocol_variant: variant,
        ..FollowerConfig::for_address(1)
    }
}

fn ts_frame(ticks: u64) -> Vec<u8> {
    encode_timestamp(Timestamp::new(ticks)).to_vec()
}

fn padded_frame(ticks: u64) -> Vec<u8> {
    let mut frame = vec![0u8; Report::SIZE];
    encode_padded(Timestamp::new(ticks), &mut frame).unwrap();
    frame
}

// ===== Construction =====

#[test]
fn test_clock_unit_must_match_config() {
    let micros = ManualClock::new(TimeUnit::Microsecond, Timestamp::new(9_950_000));
    let result = FollowerNode::new(
        ScriptedPort::new(),
        micros,
        config(ProtocolVariant::Broadcast),
    );
    assert!(matches!(
        result,
        Err(SyncError::Config(ConfigError::Invalid {
            field: "time_unit",
            ..
        }))
    ));
}

#[test]
fn test_invalid_config_is_refused() {
    let config = FollowerConfig {
        max_acceptable_offset: Some(0),
        ..config(ProtocolVariant::Broadcast)
    };
    let result = FollowerNode::new(ScriptedPort::new(), clock(9_950), config);
    assert!(matches!(result, Err(SyncError::Config(_))));
}

// ===== Broadcast =====

#[tokio::test]
async fn test_broadcast_applies_reference() {
    let mut port = ScriptedPort::new();
    port.push_frame(ts_frame(10_000));
    let mut node =
        FollowerNode::new(port, clock(9_950), config(ProtocolVariant::Broadcast)).unwrap();

    let step = node.poll_once().await.unwrap();
    assert!(matches!(step, FollowerStep::Completed(_)));
    assert_eq!(node.model().current_offset(), 50);
    assert_eq!(node.corrected_now(), Timestamp::new(10_000));

    // The reply armed for that exchange was the uncorrected clock.
    let port = node.into_port();
    assert_eq!(port.armed()[0], ts_frame(9_950));
}

#[tokio::test]
async fn test_placeholder_is_ignored() {
    let mut port = ScriptedPort::new();
    port.push_frame(ZERO_FRAME.to_vec());
    let mut node =
        FollowerNode::new(port, clock(9_950), config(ProtocolVariant::Broadcast)).unwrap();

    assert_eq!(node.poll_once().await.unwrap(), FollowerStep::Ignored);
    assert!(!node.model().is_seeded());
}

#[tokio::test]
async fn test_jump_is_rejected_and_reported() {
    let mut port = ScriptedPort::new();
    port.push_frame(ts_frame(10_000));
    port.push_frame(ts_frame(40_000));
    let mut node =
        FollowerNode::new(port, clock(9_950), config(ProtocolVariant::Broadcast)).unwrap();
    let mut events = EventFilter::clock_events(node.events());

    node.poll_once().await.unwrap();
    node.poll_once().await.unwrap();

    assert_eq!(node.model().current_offset(), 50);
    assert_eq!(node.model().rounds_completed(), 1);
    assert_eq!(
        events.try_recv(),
        Some(SyncEvent::RoundCompleted {
            address: 1,
            offset: 50,
            rounds_completed: 1
        })
    );
    assert_eq!(
        events.try_recv(),
        Some(SyncEvent::ClockJumpRejected {
            address: 1,
            raw_diff: 30_050,
            limit: 10_000,
            offset: 50
        })
    );
}

#[tokio::test]
async fn test_latch_supplies_local_time() {
    let latch = Arc::new(EdgeLatch::new());
    latch.trigger(Timestamp::new(9_000));

    let mut port = ScriptedPort::new();
    port.push_frame(ts_frame(9_100));
    let mut node = FollowerNode::new(port, clock(9_950), config(ProtocolVariant::Broadcast))
        .unwrap()
        .with_latch(Arc::clone(&latch));

    node.poll_once().await.unwrap();
    assert_eq!(node.model().current_offset(), 100);
    assert!(!latch.is_pending());
}

#[tokio::test]
async fn test_transport_error_is_returned() {
    let mut port = ScriptedPort::new();
    port.push_fault(TransportError::Fault { code: -5 });
    let mut node =
        FollowerNode::new(port, clock(9_950), config(ProtocolVariant::Broadcast)).unwrap();

    let err = node.poll_once().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
    assert!(!node.model().is_seeded());
}

// ===== Round trip =====

#[tokio::test]
async fn test_round_trip_reports_previous_round() {
    let mut port = ScriptedPort::new();
    port.push_frame(padded_frame(10_000));
    port.push_frame(padded_frame(11_000));
    let clock = clock(9_950);
    let mut node =
        FollowerNode::new(port, clock.clone(), config(ProtocolVariant::RoundTrip)).unwrap();

    node.poll_once().await.unwrap();
    clock.advance(1_000);
    node.poll_once().await.unwrap();

    let port = node.into_port();
    let first = Report::decode_slice(&port.armed()[0]).unwrap();
    let second = Report::decode_slice(&port.armed()[1]).unwrap();

    assert_eq!(first.identifier, report_identifier(1));
    assert_eq!(first.offset, 0);
    assert_eq!(first.corrected_timestamp, Timestamp::new(9_950));

    assert_eq!(second.offset, 50);
    assert_eq!(second.corrected_timestamp, Timestamp::new(11_000));
}

#[tokio::test]
async fn test_custom_identifier() {
    let mut port = ScriptedPort::new();
    port.push_frame(padded_frame(10_000));
    let config = FollowerConfig {
        identifier: Some(0xDEAD_BEEF),
        ..config(ProtocolVariant::RoundTrip)
    };
    let mut node = FollowerNode::new(port, clock(9_950), config).unwrap();

    node.poll_once().await.unwrap();
    let port = node.into_port();
    assert_eq!(
        Report::decode_slice(&port.armed()[0]).unwrap().identifier,
        0xDEAD_BEEF
    );
}

// ===== Full handshake =====

#[tokio::test]
async fn test_full_handshake() {
    let mut port = ScriptedPort::new();
    port.push_frame(ts_frame(10_000));
    port.push_frame(ZERO_FRAME.to_vec());
    port.push_frame(ts_frame(10_020));
    port.push_frame(vec![0x00]);
    let clock = clock(9_900);
    let mut node =
        FollowerNode::new(port, clock.clone(), config(ProtocolVariant::FullHandshake)).unwrap();

    assert_eq!(node.poll_once().await.unwrap(), FollowerStep::Advanced);
    assert_eq!(
        node.session().state(),
        SessionState::RespondWithLocalTimestamp
    );
    clock.advance(10);
    assert_eq!(node.poll_once().await.unwrap(), FollowerStep::Advanced);
    assert_eq!(node.poll_once().await.unwrap(), FollowerStep::Advanced);
    assert!(!node.model().is_seeded());

    let FollowerStep::Completed(sample) = node.poll_once().await.unwrap() else {
        panic!("round did not complete");
    };
    assert_eq!(sample.reference, Timestamp::new(10_000));
    assert_eq!(sample.local, Timestamp::new(9_900));
    assert_eq!(sample.round_trip, Some(10));
    assert_eq!(node.model().current_offset(), 100);
    assert_eq!(node.session().state(), SessionState::Idle);

    let port = node.into_port();
    let armed = port.armed();
    assert_eq!(armed[1], ts_frame(9_910));
    assert_eq!(armed[3], vec![ACK_MARKER]);
}

#[tokio::test]
async fn test_handshake_fault_drops_round() {
    let mut port = ScriptedPort::new();
    port.push_frame(ts_frame(10_000));
    port.push_fault(TransportError::Fault { code: -5 });
    port.push_frame(ts_frame(12_000));
    let mut node =
        FollowerNode::new(port, clock(9_900), config(ProtocolVariant::FullHandshake)).unwrap();

    node.poll_once().await.unwrap();
    assert!(node.poll_once().await.is_err());
    assert_eq!(node.session().state(), SessionState::Idle);
    assert!(!node.model().is_seeded());

    // The next frame starts a fresh round.
    assert_eq!(node.poll_once().await.unwrap(), FollowerStep::Advanced);
    assert_eq!(
        node.session().state(),
        SessionState::RespondWithLocalTimestamp
    );
}

#[tokio::test]
async fn test_timestamp_in_second_exchange_restarts_round() {
    let mut port = ScriptedPort::new();
    // The source gave up after the first exchange and started over.
    port.push_frame(ts_frame(10_000));
    port.push_frame(ts_frame(11_000));
    port.push_frame(ZERO_FRAME.to_vec());
    port.push_frame(ts_frame(11_020));
    port.push_frame(vec![0x00]);
    let mut node = FollowerNode::new(port, clock(9_900), config(ProtocolVariant::FullHandshake))
        .unwrap();

    for _ in 0..4 {
        assert_eq!(node.poll_once().await.unwrap(), FollowerStep::Advanced);
    }
    let FollowerStep::Completed(sample) = node.poll_once().await.unwrap() else {
        panic!("restarted round did not complete");
    };
    assert_eq!(sample.reference, Timestamp::new(11_000));
    assert_eq!(node.model().current_offset(), 1_100);
    assert_eq!(node.session().state(), SessionState::Idle);
}

#[tokio::test]
async fn test_placeholder_instead_of_final_timestamp() {
    let mut port = ScriptedPort::new();
    port.push_frame(ts_frame(10_000));
    port.push_frame(ZERO_FRAME.to_vec());
    port.push_frame(ZERO_FRAME.to_vec());
    let mut node =
        FollowerNode::new(port, clock(9_900), config(ProtocolVariant::FullHandshake)).unwrap();
    let mut errors = EventFilter::error_events(node.events());

    node.poll_once().await.unwrap();
    node.poll_once().await.unwrap();
    assert_eq!(
        node.poll_once().await.unwrap(),
        FollowerStep::Desync(DesyncReason::UnexpectedPlaceholder)
    );
    assert_eq!(node.session().state(), SessionState::Idle);
    assert_eq!(
        errors.try_recv(),
        Some(SyncEvent::ProtocolDesync {
            address: 1,
            reason: DesyncReason::UnexpectedPlaceholder
        })
    );
}

// ===== Run loop =====

#[tokio::test(start_paused = true)]
async fn test_run_applies_rounds_until_shutdown() {
    let mut port = ScriptedPort::new();
    port.push_frame(ts_frame(10_000));
    port.push_frame(ZERO_FRAME.to_vec());
    port.push_frame(ts_frame(10_060));
    // After the queue runs dry the port reports a disconnect and the
    // node keeps backing off.
    let mut node =
        FollowerNode::new(port, clock(9_950), config(ProtocolVariant::Broadcast)).unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        node.run(rx).await;
        node
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(true).unwrap();
    let node = handle.await.unwrap();

    assert_eq!(node.model().rounds_completed(), 2);
    assert_eq!(node.model().current_offset(), 110);
    let port = node.into_port();
    assert_eq!(port.remaining(), 0);
    // Three frames plus roughly one disconnect per back-off period.
    assert!(port.armed().len() > 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_when_already_shut_down() {
    let port = ScriptedPort::new();
    let mut node =
        FollowerNode::new(port, clock(9_950), config(ProtocolVariant::Broadcast)).unwrap();
    let (_tx, rx) = watch::channel(true);
    node.run(rx).await;
    assert!(node.into_port().armed().is_empty());
}
