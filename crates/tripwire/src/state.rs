// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{Debug, Display};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tick::Clock;

use crate::{CircuitStatus, OpenCircuitError};

/// The shared state machine of one named circuit.
///
/// A `CircuitState` is owned by the [`Circuit`][crate::Circuit] that created it. The
/// [`Registry`][crate::Registry] only keeps a weak tracking reference used for enumeration and
/// health queries, so it never keeps a circuit alive.
///
/// All fields that change over time (`status`, `failure_count`, `opened_at`, the probe claim and
/// `last_failure`) live behind a single lock. Every admission decision and every outcome report
/// is one critical section, so concurrent callers can neither lose counter updates nor both hold
/// the half-open probe.
pub struct CircuitState {
    name: Cow<'static, str>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    clock: Clock,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: State,
    failure_count: u32,
    last_failure: Option<LastFailure>,
    next_probe: u64,
    next_period: u64,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed { period: ClosedPeriod },
    Open { opened_at: Instant },
    HalfOpen { opened_at: Instant, probe: Option<ProbeTicket> },
}

impl State {
    fn status(self) -> CircuitStatus {
        match self {
            Self::Closed { .. } => CircuitStatus::Closed,
            Self::Open { .. } => CircuitStatus::Open,
            Self::HalfOpen { .. } => CircuitStatus::HalfOpen,
        }
    }

    fn opened_at(self) -> Option<Instant> {
        match self {
            Self::Closed { .. } => None,
            Self::Open { opened_at } | Self::HalfOpen { opened_at, .. } => Some(opened_at),
        }
    }
}

/// Identifies one half-open probe claim.
///
/// The ticket lets a late outcome report recognize that its probe was superseded by a manual
/// reset or trip, in which case it must not release somebody else's claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProbeTicket(u64);

/// Identifies one uninterrupted stretch of the closed state.
///
/// Outcomes of executions admitted before the circuit last opened or was reset carry an older
/// period and leave the current failure streak alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClosedPeriod(u64);

/// How an admitted execution relates to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    /// Regular execution in the closed state.
    Normal(ClosedPeriod),

    /// The single trial execution in the half-open state.
    Probe(ProbeTicket),
}

impl ExecutionMode {
    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn status(self) -> CircuitStatus {
        match self {
            Self::Normal(_) => CircuitStatus::Closed,
            Self::Probe(_) => CircuitStatus::HalfOpen,
        }
    }
}

/// Result of asking the circuit for permission to execute.
#[derive(Debug)]
pub(crate) enum Admission {
    Accepted(ExecutionMode),
    Rejected(OpenCircuitError),
}

/// Terminal outcome of an admitted execution.
#[derive(Debug)]
pub(crate) enum Outcome {
    Success,
    Failure(LastFailure),
    Unclassified,
    Cancelled,
}

impl Outcome {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(_) => "failure",
            Self::Unclassified => "unclassified",
            Self::Cancelled => "cancelled",
        }
    }
}

/// State change caused by an outcome report or a manual control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Unchanged,
    Opened { failure_count: u32 },
    Reopened { failure_count: u32 },
    Closed { open_duration: Duration },
    ProbeReleased,
    Tripped,
    Reset,
}

/// The most recent classified failure of a circuit, retained for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastFailure {
    type_name: &'static str,
    description: String,
}

impl LastFailure {
    pub(crate) fn from_error<E: Debug>(error: &E) -> Self {
        Self {
            type_name: std::any::type_name::<E>(),
            description: format!("{error:?}"),
        }
    }

    /// Returns the Rust type name of the failed operation's error.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the `Debug` rendering of the error value.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Display for LastFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

/// A consistent copy of every field of a circuit, taken under one lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CircuitSnapshot {
    /// Name of the circuit.
    pub name: Cow<'static, str>,
    /// Current status.
    pub status: CircuitStatus,
    /// Consecutive classified failures counted so far.
    pub failure_count: u32,
    /// Failures that trip a closed circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a probe.
    pub recovery_timeout: Duration,
    /// When the circuit last opened. `None` while closed.
    pub opened_at: Option<Instant>,
    /// Whether the half-open probe is currently running.
    pub probe_in_flight: bool,
    /// The most recent classified failure.
    pub last_failure: Option<LastFailure>,
}

impl CircuitState {
    pub(crate) fn new(name: Cow<'static, str>, failure_threshold: u32, recovery_timeout: Duration, clock: Clock) -> Self {
        Self {
            name,
            failure_threshold,
            recovery_timeout,
            clock,
            inner: Mutex::new(Inner {
                state: State::Closed { period: ClosedPeriod(0) },
                failure_count: 0,
                last_failure: None,
                next_probe: 0,
                next_period: 1,
            }),
        }
    }

    /// Returns the name of the circuit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_cow(&self) -> &Cow<'static, str> {
        &self.name
    }

    /// Returns the number of consecutive classified failures that trips the closed circuit.
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Returns how long the circuit stays open before it admits a probe.
    #[must_use]
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Returns the current status.
    ///
    /// An open circuit whose recovery timeout has elapsed is still reported as
    /// [`Open`][CircuitStatus::Open] until the next execution attempt moves it to half-open.
    #[must_use]
    pub fn status(&self) -> CircuitStatus {
        self.inner.lock().state.status()
    }

    /// Returns the number of consecutive classified failures.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Returns the most recent classified failure, if any.
    #[must_use]
    pub fn last_failure(&self) -> Option<LastFailure> {
        self.inner.lock().last_failure.clone()
    }

    /// Returns when the circuit last opened, or `None` while closed.
    #[must_use]
    pub fn opened_at(&self) -> Option<Instant> {
        self.inner.lock().state.opened_at()
    }

    /// Returns the instant at which the circuit admits a probe, or `None` while closed.
    ///
    /// Once half-open this is the instant the first probe became due.
    #[must_use]
    pub fn open_until(&self) -> Option<Instant> {
        self.opened_at().and_then(|opened_at| self.probe_due(opened_at))
    }

    /// Returns the time left until the circuit admits a probe, or `None` while closed.
    ///
    /// Returns [`Duration::ZERO`] once the recovery timeout has elapsed.
    #[must_use]
    pub fn open_remaining(&self) -> Option<Duration> {
        let now = self.clock.instant();
        self.open_until().map(|until| until.saturating_duration_since(now))
    }

    /// Returns a consistent copy of all fields.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();

        CircuitSnapshot {
            name: self.name.clone(),
            status: inner.state.status(),
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
            opened_at: inner.state.opened_at(),
            probe_in_flight: matches!(inner.state, State::HalfOpen { probe: Some(_), .. }),
            last_failure: inner.last_failure.clone(),
        }
    }

    /// Decides whether an execution may proceed, claiming the probe when one is due.
    ///
    /// The check and the claim happen in one critical section, so of any number of concurrent
    /// callers that observe an elapsed cooldown exactly one becomes the probe.
    pub(crate) fn enter(&self) -> Admission {
        // read the clock outside the lock
        let now = self.clock.instant();
        let mut inner = self.inner.lock();

        match inner.state {
            State::Closed { period } => Admission::Accepted(ExecutionMode::Normal(period)),
            State::Open { opened_at } => match self.probe_due(opened_at) {
                Some(due) if now >= due => {
                    let ticket = inner.claim_probe();
                    inner.state = State::HalfOpen {
                        opened_at,
                        probe: Some(ticket),
                    };
                    Admission::Accepted(ExecutionMode::Probe(ticket))
                }
                Some(due) => Admission::Rejected(self.rejection(&inner, due.saturating_duration_since(now))),
                None => Admission::Rejected(self.rejection(&inner, self.recovery_timeout)),
            },
            State::HalfOpen { opened_at, probe: None } => {
                let ticket = inner.claim_probe();
                inner.state = State::HalfOpen {
                    opened_at,
                    probe: Some(ticket),
                };
                Admission::Accepted(ExecutionMode::Probe(ticket))
            }
            State::HalfOpen { probe: Some(_), .. } => Admission::Rejected(self.rejection(&inner, Duration::ZERO)),
        }
    }

    /// Feeds the outcome of an admitted execution back into the state machine.
    pub(crate) fn exit(&self, mode: ExecutionMode, outcome: Outcome) -> Transition {
        let now = self.clock.instant();
        let mut inner = self.inner.lock();

        match (mode, inner.state) {
            (ExecutionMode::Normal(admitted), State::Closed { period }) if admitted == period => match outcome {
                Outcome::Success => {
                    inner.failure_count = 0;
                    inner.last_failure = None;
                    Transition::Unchanged
                }
                Outcome::Failure(failure) => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    inner.last_failure = Some(failure);

                    if inner.failure_count >= self.failure_threshold {
                        inner.state = State::Open { opened_at: now };
                        Transition::Opened {
                            failure_count: inner.failure_count,
                        }
                    } else {
                        Transition::Unchanged
                    }
                }
                Outcome::Unclassified | Outcome::Cancelled => Transition::Unchanged,
            },
            (ExecutionMode::Probe(ticket), State::HalfOpen { opened_at, probe }) if probe == Some(ticket) => match outcome {
                Outcome::Success => {
                    let period = inner.begin_closed_period();
                    inner.state = State::Closed { period };
                    inner.failure_count = 0;
                    inner.last_failure = None;
                    Transition::Closed {
                        open_duration: now.saturating_duration_since(opened_at),
                    }
                }
                Outcome::Failure(failure) => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    inner.last_failure = Some(failure);
                    inner.state = State::Open { opened_at: now };
                    Transition::Reopened {
                        failure_count: inner.failure_count,
                    }
                }
                Outcome::Unclassified | Outcome::Cancelled => {
                    inner.state = State::HalfOpen { opened_at, probe: None };
                    Transition::ProbeReleased
                }
            },
            // Outcomes of executions admitted before the circuit opened, closed again or was
            // reset, and of superseded probes, do not affect the current state.
            _ => Transition::Unchanged,
        }
    }

    /// Forces the circuit open, restarting the cooldown from now.
    pub(crate) fn trip(&self) -> Transition {
        let now = self.clock.instant();
        self.inner.lock().state = State::Open { opened_at: now };
        Transition::Tripped
    }

    /// Forces the circuit closed and clears the failure history.
    pub(crate) fn reset(&self) -> Transition {
        let mut inner = self.inner.lock();
        let period = inner.begin_closed_period();
        inner.state = State::Closed { period };
        inner.failure_count = 0;
        inner.last_failure = None;
        Transition::Reset
    }

    // `None` when the deadline is not representable; such a circuit only closes through `reset`.
    fn probe_due(&self, opened_at: Instant) -> Option<Instant> {
        opened_at.checked_add(self.recovery_timeout)
    }

    fn rejection(&self, inner: &Inner, remaining: Duration) -> OpenCircuitError {
        OpenCircuitError {
            name: self.name.clone(),
            remaining,
            failure_count: inner.failure_count,
            last_failure: inner.last_failure.as_ref().map(|failure| failure.description.clone()),
        }
    }
}

impl Inner {
    fn claim_probe(&mut self) -> ProbeTicket {
        let ticket = ProbeTicket(self.next_probe);
        self.next_probe = self.next_probe.wrapping_add(1);
        ticket
    }

    fn begin_closed_period(&mut self) -> ClosedPeriod {
        let period = ClosedPeriod(self.next_period);
        self.next_period = self.next_period.wrapping_add(1);
        period
    }
}

impl Debug for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();

        f.debug_struct("CircuitState")
            .field("name", &self.name)
            .field("status", &inner.state.status())
            .field("failure_count", &inner.failure_count)
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .finish_non_exhaustive()
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
