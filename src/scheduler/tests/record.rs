use crate::clock::{ClockModelConfig, SampleVerdict};
use crate::error::DesyncReason;
use crate::protocol::{Report, RoundOutcome, SyncSample};
use crate::scheduler::FollowerRecord;
use crate::types::{CorrectionMode, ProtocolVariant, Timestamp};

fn outcome(variant: ProtocolVariant) -> RoundOutcome {
    RoundOutcome {
        address: 0,
        variant,
        reference_sent: Timestamp::new(1_000),
        sample: None,
        report: None,
        desync: None,
    }
}

fn handshake(reference: u64, local: u64) -> RoundOutcome {
    RoundOutcome {
        sample: Some(SyncSample {
            reference: Timestamp::new(reference),
            local: Timestamp::new(local),
            round_trip: None,
        }),
        ..outcome(ProtocolVariant::FullHandshake)
    }
}

#[test]
fn test_new_record() {
    let record = FollowerRecord::new(2, ClockModelConfig::default());
    assert_eq!(record.address(), 2);
    assert!(!record.is_present());
    assert_eq!(record.current_offset(), 0);
    assert_eq!(record.rounds_completed(), 0);
    assert_eq!(record.correction_mode(), CorrectionMode::Step);
    assert!(record.last_report().is_none());
}

#[test]
fn test_broadcast_only_counts_rounds() {
    let mut record = FollowerRecord::new(0, ClockModelConfig::default());
    assert_eq!(record.commit(&outcome(ProtocolVariant::Broadcast)), None);
    assert_eq!(record.rounds_completed(), 1);
    assert!(!record.estimate().is_seeded());
}

#[test]
fn test_handshake_sample_feeds_estimate() {
    let mut record = FollowerRecord::new(0, ClockModelConfig::default());

    let verdict = record.commit(&handshake(5_000, 4_900));
    assert_eq!(verdict, Some(SampleVerdict::Seeded { offset: 100 }));
    assert_eq!(record.current_offset(), 100);

    let verdict = record.commit(&handshake(6_000, 5_880));
    assert_eq!(
        verdict,
        Some(SampleVerdict::Applied {
            offset: 120,
            raw_diff: 120
        })
    );
    assert_eq!(record.rounds_completed(), 2);
}

#[test]
fn test_rejected_sample_still_counts_round() {
    let mut record = FollowerRecord::new(0, ClockModelConfig::default());
    record.commit(&handshake(5_000, 4_900));

    let verdict = record.commit(&handshake(50_000, 20_000));
    assert!(verdict.is_some_and(|v| v.is_rejected()));
    assert_eq!(record.current_offset(), 100);
    assert_eq!(record.rounds_completed(), 2);
}

#[test]
fn test_report_is_adopted() {
    let mut record = FollowerRecord::new(1, ClockModelConfig::default());
    let report = Report::new(0x5359_4E01, -42, Timestamp::new(9_000));

    let verdict = record.commit(&RoundOutcome {
        report: Some(report),
        ..outcome(ProtocolVariant::RoundTrip)
    });

    assert_eq!(verdict, None);
    assert_eq!(record.current_offset(), -42);
    assert_eq!(record.last_report(), Some(&report));
}

#[test]
fn test_desync_is_counted_not_applied() {
    let mut record = FollowerRecord::new(0, ClockModelConfig::default());
    let mut round = handshake(5_000, 4_900);
    round.desync = Some(DesyncReason::AckMismatch {
        expected: 0xAC,
        actual: 0x00,
    });

    assert_eq!(record.commit(&round), None);
    assert_eq!(record.desyncs(), 1);
    assert_eq!(record.rounds_completed(), 1);
    assert!(!record.estimate().is_seeded());
}

#[test]
fn test_failures_and_presence() {
    let mut record = FollowerRecord::new(0, ClockModelConfig::default());
    record.mark_present(true);
    record.record_failure();
    record.record_failure();
    assert!(record.is_present());
    assert_eq!(record.failures(), 2);
    assert_eq!(record.rounds_completed(), 0);
}
