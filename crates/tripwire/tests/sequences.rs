// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for streams and iterators executed through a circuit.

use std::io::{Error, ErrorKind};
use std::time::Duration;

use futures::executor::block_on;
use futures::stream::{self, StreamExt};
use tick::ClockControl;
use tripwire::{Circuit, CircuitOptions, CircuitStatus, FailureClassifier, Registry};

const RECOVERY_TIMEOUT: Duration = Duration::from_secs(10);

fn create_circuit(control: &ClockControl) -> Circuit<Error> {
    CircuitOptions::new("sequences", control.to_clock())
        .failure_threshold(1)
        .recovery_timeout(RECOVERY_TIMEOUT)
        .classifier(FailureClassifier::<Error>::kinds([ErrorKind::ConnectionReset, ErrorKind::TimedOut]))
        .registry(&Registry::new())
        .build()
        .unwrap()
}

fn rows(failing_at: Option<(usize, ErrorKind)>) -> Vec<Result<usize, Error>> {
    (0..4)
        .map(|row| match failing_at {
            Some((at, kind)) if at == row => Err(Error::from(kind)),
            _ => Ok(row),
        })
        .collect()
}

#[test]
fn iterator_failure_mid_sequence_opens_circuit() {
    let circuit = create_circuit(&ClockControl::new());

    let mut guarded = circuit.call_iter(|| rows(Some((2, ErrorKind::ConnectionReset)))).unwrap();

    assert_eq!(guarded.next().unwrap().unwrap(), 0);
    assert_eq!(guarded.next().unwrap().unwrap(), 1);
    assert_eq!(circuit.status(), CircuitStatus::Closed);

    assert_eq!(guarded.next().unwrap().unwrap_err().kind(), ErrorKind::ConnectionReset);
    assert!(guarded.is_resolved());
    assert_eq!(circuit.status(), CircuitStatus::Open);

    assert_eq!(guarded.next().unwrap().unwrap(), 3);
    assert!(guarded.next().is_none());
    assert_eq!(circuit.status(), CircuitStatus::Open);
}

#[test]
fn stream_failure_mid_sequence_opens_circuit() {
    let circuit = create_circuit(&ClockControl::new());

    let guarded = circuit
        .call_stream(|| stream::iter(rows(Some((1, ErrorKind::TimedOut)))))
        .unwrap();
    let items: Vec<_> = block_on(guarded.collect());

    assert_eq!(items.len(), 4);
    assert!(items[1].is_err());
    assert_eq!(circuit.status(), CircuitStatus::Open);
    assert!(circuit.call_stream(|| stream::iter(rows(None))).unwrap_err().remaining() > Duration::ZERO);
}

#[test]
fn exhausted_probe_stream_closes_circuit() {
    let control = ClockControl::new();
    let circuit = create_circuit(&control);
    circuit.trip();
    control.advance(RECOVERY_TIMEOUT);

    let mut guarded = circuit.call_stream(|| stream::iter(rows(None))).unwrap();
    assert_eq!(circuit.status(), CircuitStatus::HalfOpen);

    let total: usize = block_on(async {
        let mut total = 0;
        while let Some(row) = guarded.next().await {
            total += row.unwrap();
        }
        total
    });

    assert_eq!(total, 6);
    assert_eq!(circuit.status(), CircuitStatus::Closed);
}

#[test]
fn unclassified_item_error_releases_probe() {
    let control = ClockControl::new();
    let circuit = create_circuit(&control);
    circuit.trip();
    control.advance(RECOVERY_TIMEOUT);

    let items: Vec<_> = circuit.call_iter(|| rows(Some((0, ErrorKind::NotFound)))).unwrap().collect();

    assert!(items[0].is_err());
    assert_eq!(circuit.status(), CircuitStatus::HalfOpen);
    assert!(!circuit.state().snapshot().probe_in_flight);
}

#[test]
fn abandoned_probe_iterator_releases_claim() {
    let control = ClockControl::new();
    let circuit = create_circuit(&control);
    circuit.trip();
    control.advance(RECOVERY_TIMEOUT);

    let mut guarded = circuit.call_iter(|| rows(None)).unwrap();
    assert_eq!(guarded.next().unwrap().unwrap(), 0);
    assert!(circuit.call_iter(|| rows(None)).unwrap_err().remaining().is_zero());

    drop(guarded);

    let remaining: Vec<_> = circuit.call_iter(|| rows(None)).unwrap().map(Result::unwrap).collect();
    assert_eq!(remaining, [0, 1, 2, 3]);
    assert_eq!(circuit.status(), CircuitStatus::Closed);
}

#[test]
fn iterator_admitted_before_recovery_cannot_reopen_circuit() {
    let control = ClockControl::new();
    let circuit = create_circuit(&control);
    let mut straggler = circuit.call_iter(|| rows(Some((1, ErrorKind::TimedOut)))).unwrap();
    assert_eq!(straggler.next().unwrap().unwrap(), 0);

    let _ = circuit.call(|| Err::<(), _>(Error::from(ErrorKind::TimedOut)));
    assert_eq!(circuit.status(), CircuitStatus::Open);
    control.advance(RECOVERY_TIMEOUT);
    circuit.call(|| Ok(())).unwrap();
    assert_eq!(circuit.status(), CircuitStatus::Closed);

    assert_eq!(straggler.next().unwrap().unwrap_err().kind(), ErrorKind::TimedOut);

    assert_eq!(circuit.status(), CircuitStatus::Closed);
    assert_eq!(circuit.state().failure_count(), 0);
}
