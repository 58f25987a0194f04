// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for circuits shared across threads and tasks.

use std::io::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use tick::ClockControl;
use tokio::sync::{Notify, oneshot};
use tripwire::{Circuit, CircuitOptions, CircuitStatus, Registry};

const RECOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const CALLERS: u32 = 16;

fn create_circuit(control: &ClockControl, failure_threshold: u32) -> Circuit<Error> {
    CircuitOptions::new("concurrency", control.to_clock())
        .failure_threshold(failure_threshold)
        .recovery_timeout(RECOVERY_TIMEOUT)
        .registry(&Registry::new())
        .build()
        .unwrap()
}

fn due_for_probe(control: &ClockControl) -> Circuit<Error> {
    let circuit = create_circuit(control, 1);
    circuit.trip();
    control.advance(RECOVERY_TIMEOUT);
    circuit
}

#[test]
fn concurrent_failures_are_all_counted() {
    let circuit = create_circuit(&ClockControl::new(), 10_000);
    let barrier = Barrier::new(8);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..100 {
                    let _ = circuit.call(|| Err::<(), _>(Error::other("down")));
                }
            });
        }
    });

    assert_eq!(circuit.state().failure_count(), 800);
    assert_eq!(circuit.status(), CircuitStatus::Closed);
}

#[test]
fn racing_failures_open_circuit_once() {
    let control = ClockControl::new();
    let circuit = create_circuit(&control, 5);
    let barrier = Barrier::new(CALLERS as usize);

    thread::scope(|scope| {
        for _ in 0..CALLERS {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..50 {
                    let _ = circuit.call(|| Err::<(), _>(Error::other("down")));
                }
            });
        }
    });

    assert_eq!(circuit.status(), CircuitStatus::Open);
    assert_eq!(circuit.state().failure_count(), 5);
    assert_eq!(circuit.state().opened_at(), Some(control.to_clock().instant()));
}

#[test]
fn racing_threads_admit_single_probe() {
    let circuit = due_for_probe(&ClockControl::new());
    let barrier = Barrier::new(CALLERS as usize);
    let invocations = AtomicU32::new(0);
    let rejections = AtomicU32::new(0);

    thread::scope(|scope| {
        for _ in 0..CALLERS {
            scope.spawn(|| {
                barrier.wait();
                let result = circuit.call(|| {
                    invocations.fetch_add(1, Ordering::SeqCst);

                    // hold the probe until every other caller has been denied
                    let deadline = Instant::now() + Duration::from_secs(5);
                    while rejections.load(Ordering::SeqCst) < CALLERS - 1 && Instant::now() < deadline {
                        thread::yield_now();
                    }
                    Ok(())
                });

                if result.is_err_and(|error| error.is_open()) {
                    rejections.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(rejections.load(Ordering::SeqCst), CALLERS - 1);
    assert_eq!(circuit.status(), CircuitStatus::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_tasks_admit_single_probe() {
    let circuit = due_for_probe(&ClockControl::new());
    let release = Arc::new(Notify::new());
    let invocations = Arc::new(AtomicU32::new(0));
    let rejections = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..CALLERS)
        .map(|_| {
            let circuit = circuit.clone();
            let release = Arc::clone(&release);
            let invocations = Arc::clone(&invocations);
            let rejections = Arc::clone(&rejections);

            tokio::spawn(async move {
                let result = circuit
                    .call_async(|| async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Ok::<_, Error>(())
                    })
                    .await;

                if result.as_ref().is_err_and(|error| error.is_open()) {
                    rejections.fetch_add(1, Ordering::SeqCst);
                }
                result
            })
        })
        .collect();

    while rejections.load(Ordering::SeqCst) < CALLERS - 1 {
        tokio::task::yield_now().await;
    }
    assert_eq!(circuit.status(), CircuitStatus::HalfOpen);
    release.notify_one();

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(circuit.status(), CircuitStatus::Closed);
}

#[tokio::test]
async fn aborted_probe_task_releases_claim() {
    let circuit = due_for_probe(&ClockControl::new());
    let (started_tx, started_rx) = oneshot::channel();

    let probe = {
        let circuit = circuit.clone();
        tokio::spawn(async move {
            circuit
                .call_async(|| async move {
                    let _ = started_tx.send(());
                    std::future::pending::<Result<(), Error>>().await
                })
                .await
        })
    };

    started_rx.await.unwrap();
    assert!(circuit.call(|| Ok(())).unwrap_err().is_open());

    probe.abort();
    assert!(probe.await.unwrap_err().is_cancelled());

    assert_eq!(circuit.status(), CircuitStatus::HalfOpen);
    assert_eq!(circuit.state().failure_count(), 0);
    assert!(circuit.call(|| Ok(())).is_ok());
    assert_eq!(circuit.status(), CircuitStatus::Closed);
}

#[tokio::test]
async fn timed_out_probe_releases_claim() {
    let circuit = due_for_probe(&ClockControl::new());

    let elapsed = tokio::time::timeout(
        Duration::from_millis(10),
        circuit.call_async(std::future::pending::<Result<(), Error>>),
    )
    .await;

    assert!(elapsed.is_err());
    assert_eq!(circuit.status(), CircuitStatus::HalfOpen);
    assert!(!circuit.state().snapshot().probe_in_flight);
}
