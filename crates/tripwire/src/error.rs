// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

/// Error returned by a guarded execution.
///
/// The two variants keep "the breaker denied the call" apart from "the operation itself failed".
/// Errors produced by the wrapped operation are never altered: they come back as
/// [`Inner`][CircuitError::Inner] exactly as the operation returned them, whether or not they were
/// classified as failures.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit denied the execution and no fallback was configured.
    #[error(transparent)]
    Open(#[from] OpenCircuitError),

    /// The wrapped operation (or the fallback) returned this error.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    /// Returns `true` if the execution was denied by the circuit.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Returns the operation's own error, if this is one.
    #[must_use]
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open(_) => None,
        }
    }

    /// Consumes the error and returns the operation's own error, if this is one.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open(_) => None,
        }
    }

    /// Returns the open-circuit details, if the execution was denied.
    #[must_use]
    pub fn as_open(&self) -> Option<&OpenCircuitError> {
        match self {
            Self::Open(e) => Some(e),
            Self::Inner(_) => None,
        }
    }
}

/// Synthesized when a circuit denies an execution.
///
/// Never originates from the wrapped operation. Carries the circuit name and the time remaining
/// until the next probe is admitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "circuit \"{name}\" is OPEN ({failure_count} failures, {:.0} sec remaining){}",
    .remaining.as_secs_f64(),
    last_failure_suffix(.last_failure.as_deref())
)]
pub struct OpenCircuitError {
    pub(crate) name: Cow<'static, str>,
    pub(crate) remaining: Duration,
    pub(crate) failure_count: u32,
    pub(crate) last_failure: Option<String>,
}

impl OpenCircuitError {
    /// Returns the name of the circuit that denied the execution.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the time remaining until the circuit admits a probe.
    ///
    /// This is [`Duration::ZERO`] when the cooldown has elapsed but another caller holds the probe.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Returns the failure count recorded when the execution was denied.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Returns the description of the most recent classified failure, if any.
    #[must_use]
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }
}

fn last_failure_suffix(last_failure: Option<&str>) -> String {
    last_failure.map_or_else(String::new, |failure| format!(" (last failure: {failure})"))
}

/// Invalid circuit configuration.
///
/// Returned by [`CircuitOptions::build`][crate::CircuitOptions::build]. A circuit that was built
/// successfully never produces this error at call time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The circuit name is empty.
    #[error("circuit name must not be empty")]
    EmptyName,

    /// The failure threshold is zero.
    #[error("failure threshold of circuit \"{0}\" must be positive")]
    ZeroFailureThreshold(Cow<'static, str>),

    /// The recovery timeout is zero.
    #[error("recovery timeout of circuit \"{0}\" must be positive")]
    ZeroRecoveryTimeout(Cow<'static, str>),

    /// The classifier was built from an empty set of error kinds and would never match.
    #[error("classifier of circuit \"{0}\" was given an empty set of error kinds")]
    EmptyKindSet(Cow<'static, str>),
}
