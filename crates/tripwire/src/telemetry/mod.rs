// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Telemetry keys and the reporter that turns circuit transitions into logs and metrics.
//!
//! Names follow the [OpenTelemetry naming guidelines](https://opentelemetry.io/docs/specs/semconv/general/naming/#general-naming-considerations):
//! keys are dot-separated and values are short `snake_case` strings.
//!
//! # Metrics
//!
//! | Instrument | Kind | Attributes |
//! |---|---|---|
//! | `resilience.event` | `u64` counter | [`STRATEGY_NAME`], [`EVENT_NAME`], [`CIRCUIT_NAME`], [`CIRCUIT_STATE`], [`CIRCUIT_PROBE_RESULT`] (probes only) |
//! | `circuit.execution` | `u64` counter | [`CIRCUIT_NAME`], [`CIRCUIT_STATE`], [`CIRCUIT_EXECUTION_RESULT`] |
//! | `circuit.state` | `f64` gauge | [`CIRCUIT_NAME`] |
//!
//! The `circuit.state` gauge is `0` while closed, `0.5` while half-open and `1` while open.

#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;

mod reporter;
pub(crate) use reporter::CircuitTelemetry;

/// Key used to annotate the name of a resilience strategy. Circuits always report `circuit`.
pub const STRATEGY_NAME: &str = "resilience.strategy.name";

/// Key used to annotate the specific resilience event being emitted.
///
/// Examples: `circuit_opened`, `circuit_rejected`, `circuit_probe`.
pub const EVENT_NAME: &str = "resilience.event.name";

/// Key used to annotate the name of the circuit.
pub const CIRCUIT_NAME: &str = "circuit.name";

/// Key used to annotate the circuit status an event or execution relates to.
///
/// Values: `closed`, `open`, `half_open`.
pub const CIRCUIT_STATE: &str = "circuit.state";

/// Key used to annotate the outcome of a half-open probe.
pub const CIRCUIT_PROBE_RESULT: &str = "circuit.probe.result";

/// Key used to annotate the outcome of an admitted execution.
///
/// Values: `success`, `failure`, `unclassified`, `cancelled`.
pub const CIRCUIT_EXECUTION_RESULT: &str = "circuit.execution.result";

#[cfg(any(feature = "metrics", test))]
pub(crate) const STRATEGY_VALUE: &str = "circuit";

#[cfg(any(feature = "metrics", test))]
pub(crate) mod events {
    pub(crate) const OPENED: &str = "circuit_opened";
    pub(crate) const REOPENED: &str = "circuit_reopened";
    pub(crate) const CLOSED: &str = "circuit_closed";
    pub(crate) const REJECTED: &str = "circuit_rejected";
    pub(crate) const PROBE: &str = "circuit_probe";
    pub(crate) const TRIPPED: &str = "circuit_tripped";
    pub(crate) const RESET: &str = "circuit_reset";
}
