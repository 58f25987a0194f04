// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

#[cfg(any(feature = "metrics", test))]
use opentelemetry::KeyValue;
#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::{Counter, Gauge, Meter};

#[cfg(any(feature = "metrics", feature = "logs", test))]
use crate::CircuitStatus;
use crate::OpenCircuitError;
use crate::state::{ExecutionMode, Transition};
#[cfg(any(feature = "metrics", test))]
use crate::telemetry::metrics::{create_execution_counter, create_resilience_event_counter, create_state_gauge};
#[cfg(any(feature = "metrics", test))]
use crate::telemetry::{CIRCUIT_EXECUTION_RESULT, CIRCUIT_NAME, CIRCUIT_PROBE_RESULT, CIRCUIT_STATE, EVENT_NAME, STRATEGY_NAME, STRATEGY_VALUE};
#[cfg(any(feature = "metrics", test))]
use crate::telemetry::events;

/// Reports the admissions, outcomes and transitions of one circuit.
///
/// Both sinks are off by default. When neither the `logs` nor the `metrics` feature is enabled the
/// reporter carries no data and every method compiles down to nothing.
#[derive(Debug, Clone)]
pub(crate) struct CircuitTelemetry {
    #[cfg(any(feature = "metrics", feature = "logs", test))]
    name: Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    event_reporter: Option<Counter<u64>>,
    #[cfg(any(feature = "metrics", test))]
    execution_reporter: Option<Counter<u64>>,
    #[cfg(any(feature = "metrics", test))]
    state_reporter: Option<Gauge<f64>>,
    #[cfg(any(feature = "logs", test))]
    logs_enabled: bool,
}

impl CircuitTelemetry {
    #[cfg_attr(
        not(any(feature = "metrics", feature = "logs", test)),
        expect(unused_variables, reason = "unused when logs nor metrics are used")
    )]
    pub(crate) fn new(name: Cow<'static, str>) -> Self {
        Self {
            #[cfg(any(feature = "metrics", feature = "logs", test))]
            name,
            #[cfg(any(feature = "metrics", test))]
            event_reporter: None,
            #[cfg(any(feature = "metrics", test))]
            execution_reporter: None,
            #[cfg(any(feature = "metrics", test))]
            state_reporter: None,
            #[cfg(any(feature = "logs", test))]
            logs_enabled: false,
        }
    }

    #[cfg(any(feature = "logs", test))]
    pub(crate) fn with_logs(self, logs_enabled: bool) -> Self {
        Self { logs_enabled, ..self }
    }

    /// Attaches the metric instruments and reports the initial closed state.
    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn with_meter(self, meter: &Meter) -> Self {
        let telemetry = Self {
            event_reporter: Some(create_resilience_event_counter(meter)),
            execution_reporter: Some(create_execution_counter(meter)),
            state_reporter: Some(create_state_gauge(meter)),
            ..self
        };

        telemetry.report_state(CircuitStatus::Closed);
        telemetry
    }

    pub(crate) fn admitted(&self, mode: ExecutionMode) {
        #[cfg(any(feature = "metrics", test))]
        if matches!(mode, ExecutionMode::Probe(_)) {
            self.report_state(CircuitStatus::HalfOpen);
        }

        _ = mode;
    }

    pub(crate) fn rejected(&self, error: &OpenCircuitError) {
        #[cfg(any(feature = "metrics", test))]
        self.report_event(events::REJECTED, CircuitStatus::Open, None);

        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            tracing::event!(
                name: "tripwire.circuit.rejected",
                tracing::Level::WARN,
                circuit.name = %self.name,
                circuit.state = CircuitStatus::Open.as_str(),
                circuit.failure_count = error.failure_count(),
                circuit.open.remaining = error.remaining().as_secs_f64(),
            );
        }

        _ = error;
    }

    /// Reports the outcome of an admitted execution and the transition it caused.
    pub(crate) fn exited(&self, mode: ExecutionMode, result: &'static str, transition: Transition) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(reporter) = &self.execution_reporter {
            reporter.add(
                1,
                &[
                    KeyValue::new(CIRCUIT_NAME, self.name.clone()),
                    KeyValue::new(CIRCUIT_STATE, mode.status().as_str()),
                    KeyValue::new(CIRCUIT_EXECUTION_RESULT, result),
                ],
            );
        }

        if matches!(mode, ExecutionMode::Probe(_)) {
            #[cfg(any(feature = "metrics", test))]
            self.report_event(events::PROBE, CircuitStatus::HalfOpen, Some((CIRCUIT_PROBE_RESULT, result)));

            #[cfg(any(feature = "logs", test))]
            if self.logs_enabled {
                tracing::event!(
                    name: "tripwire.circuit.probe",
                    tracing::Level::INFO,
                    circuit.name = %self.name,
                    circuit.state = CircuitStatus::HalfOpen.as_str(),
                    circuit.probe.result = result,
                );
            }
        }

        _ = result;
        self.transitioned(transition);
    }

    pub(crate) fn transitioned(&self, transition: Transition) {
        match transition {
            Transition::Opened { failure_count } => {
                #[cfg(any(feature = "metrics", test))]
                self.report_event(events::OPENED, CircuitStatus::Open, None);
                #[cfg(any(feature = "metrics", test))]
                self.report_state(CircuitStatus::Open);

                #[cfg(any(feature = "logs", test))]
                if self.logs_enabled {
                    tracing::event!(
                        name: "tripwire.circuit.opened",
                        tracing::Level::WARN,
                        circuit.name = %self.name,
                        circuit.state = CircuitStatus::Open.as_str(),
                        circuit.failure_count = failure_count,
                    );
                }

                _ = failure_count;
            }
            Transition::Reopened { failure_count } => {
                #[cfg(any(feature = "metrics", test))]
                self.report_event(events::REOPENED, CircuitStatus::Open, None);
                #[cfg(any(feature = "metrics", test))]
                self.report_state(CircuitStatus::Open);

                #[cfg(any(feature = "logs", test))]
                if self.logs_enabled {
                    tracing::event!(
                        name: "tripwire.circuit.reopened",
                        tracing::Level::WARN,
                        circuit.name = %self.name,
                        circuit.state = CircuitStatus::Open.as_str(),
                        circuit.failure_count = failure_count,
                    );
                }

                _ = failure_count;
            }
            Transition::Closed { open_duration } => {
                #[cfg(any(feature = "metrics", test))]
                self.report_event(events::CLOSED, CircuitStatus::Closed, None);
                #[cfg(any(feature = "metrics", test))]
                self.report_state(CircuitStatus::Closed);

                #[cfg(any(feature = "logs", test))]
                if self.logs_enabled {
                    tracing::event!(
                        name: "tripwire.circuit.closed",
                        tracing::Level::INFO,
                        circuit.name = %self.name,
                        circuit.state = CircuitStatus::Closed.as_str(),
                        circuit.open.duration = open_duration.as_secs(),
                    );
                }

                _ = open_duration;
            }
            Transition::Tripped => {
                #[cfg(any(feature = "metrics", test))]
                self.report_event(events::TRIPPED, CircuitStatus::Open, None);
                #[cfg(any(feature = "metrics", test))]
                self.report_state(CircuitStatus::Open);

                #[cfg(any(feature = "logs", test))]
                if self.logs_enabled {
                    tracing::event!(
                        name: "tripwire.circuit.tripped",
                        tracing::Level::INFO,
                        circuit.name = %self.name,
                        circuit.state = CircuitStatus::Open.as_str(),
                    );
                }
            }
            Transition::Reset => {
                #[cfg(any(feature = "metrics", test))]
                self.report_event(events::RESET, CircuitStatus::Closed, None);
                #[cfg(any(feature = "metrics", test))]
                self.report_state(CircuitStatus::Closed);

                #[cfg(any(feature = "logs", test))]
                if self.logs_enabled {
                    tracing::event!(
                        name: "tripwire.circuit.reset",
                        tracing::Level::INFO,
                        circuit.name = %self.name,
                        circuit.state = CircuitStatus::Closed.as_str(),
                    );
                }
            }
            // a released probe is already reported by the probe event
            Transition::Unchanged | Transition::ProbeReleased => {}
        }
    }

    #[cfg(any(feature = "metrics", test))]
    fn report_event(&self, event: &'static str, state: CircuitStatus, extra: Option<(&'static str, &'static str)>) {
        let Some(reporter) = &self.event_reporter else {
            return;
        };

        let mut attributes = vec![
            KeyValue::new(STRATEGY_NAME, STRATEGY_VALUE),
            KeyValue::new(EVENT_NAME, event),
            KeyValue::new(CIRCUIT_NAME, self.name.clone()),
            KeyValue::new(CIRCUIT_STATE, state.as_str()),
        ];
        attributes.extend(extra.map(|(key, value)| KeyValue::new(key, value)));

        reporter.add(1, &attributes);
    }

    #[cfg(any(feature = "metrics", test))]
    fn report_state(&self, status: CircuitStatus) {
        if let Some(reporter) = &self.state_reporter {
            reporter.record(state_value(status), &[KeyValue::new(CIRCUIT_NAME, self.name.clone())]);
        }
    }
}

#[cfg(any(feature = "metrics", test))]
fn state_value(status: CircuitStatus) -> f64 {
    match status {
        CircuitStatus::Closed => 0.0,
        CircuitStatus::HalfOpen => 0.5,
        CircuitStatus::Open => 1.0,
    }
}
