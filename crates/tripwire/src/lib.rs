// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Circuit breakers that stop calling an operation once it has demonstrated sustained failure.
//!
//! A circuit wraps an arbitrary unit of work (a closure, a future, a stream or an iterator) and
//! decides before each execution whether to run it, deny it or divert it to a fallback. After a
//! configurable number of consecutive classified failures the circuit opens. Once the recovery
//! timeout has elapsed it admits exactly one probe, whose outcome either closes the circuit or
//! opens it again.
//!
//! The crate does not retry, back off or shed load. It only gates executions on their recent
//! failure history.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tick::Clock;
//! use tripwire::{CircuitOptions, CircuitStatus, Registry};
//!
//! # fn fetch_quote(symbol: &str) -> Result<f64, std::io::Error> { Ok(42.0) }
//! let clock = Clock::new_frozen();
//!
//! let quotes = CircuitOptions::<std::io::Error>::new("quotes", &clock)
//!     .failure_threshold(3)
//!     .recovery_timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! match quotes.call(|| fetch_quote("MSFT")) {
//!     Ok(price) => println!("price: {price}"),
//!     Err(error) if error.is_open() => println!("quotes are unavailable: {error}"),
//!     Err(error) => println!("quote lookup failed: {error}"),
//! }
//!
//! assert_eq!(quotes.status(), CircuitStatus::Closed);
//! assert!(Registry::global().get("quotes").is_some());
//! # Ok::<(), tripwire::ConfigError>(())
//! ```
//!
//! > **Note**: Circuits read time from a [`Clock`][tick::Clock] of the [`tick`] crate. Tests drive
//! > the recovery timeout deterministically with `tick::ClockControl`.
//!
//! # Core Types
//!
//! - [`CircuitOptions`]: Validated configuration, named [`CircuitPreset`]s and the serializable
//!   [`CircuitConfig`].
//! - [`Circuit`]: The execution guard, with one method per call shape and `_or_else` variants that
//!   divert to a fallback.
//! - [`Protected`]: An operation bound to a circuit, optionally with a fallback of the same shape.
//! - [`FailureClassifier`]: Decides which errors count as failures.
//! - [`CircuitState`]: The state machine shared by all clones of a circuit.
//! - [`Registry`]: Named circuits for health checks and dashboards.
//!
//! # Errors
//!
//! The operation's own errors are never altered. [`CircuitError`] keeps them apart from the
//! [`OpenCircuitError`] synthesized when a circuit denies an execution. Invalid configuration is
//! reported by [`CircuitOptions::build`] as [`ConfigError`] and never at call time.
//!
//! # Concurrency
//!
//! All state changes of a circuit happen under a single lock, one critical section per admission
//! and per outcome. Any number of threads or tasks can share a circuit: no failure is lost, and of
//! all callers that observe an elapsed recovery timeout exactly one runs the probe. The probe claim
//! is held across the suspension points of futures and streams and is released when they are
//! dropped.
//!
//! # Features
//!
//! - `logs`: Structured `tracing` events, enabled per circuit with `CircuitOptions::enable_logs`.
//! - `metrics`: OpenTelemetry counters and a state gauge, enabled per circuit with `CircuitOptions::enable_metrics`.
//!   See [`telemetry`] for the reported attributes.
//! - `serde`: `Serialize` and `Deserialize` for [`CircuitConfig`], [`CircuitPreset`] and
//!   [`CircuitStatus`].

mod circuit;
mod classifier;
mod constants;
mod error;
mod options;
mod permit;
mod protected;
mod registry;
mod shapes;
mod state;
mod status;
pub mod telemetry;
mod utils;

pub use circuit::Circuit;
pub use classifier::{BoxError, FailureClassifier, HasErrorKind};
pub use error::{CircuitError, ConfigError, OpenCircuitError};
pub use options::{CircuitConfig, CircuitOptions, CircuitPreset};
pub use protected::{NoFallback, Protected, WithFallback};
pub use registry::{Circuits, Registry};
pub use shapes::{GuardedIter, GuardedStream, Route};
pub use state::{CircuitSnapshot, CircuitState, LastFailure};
pub use status::CircuitStatus;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
