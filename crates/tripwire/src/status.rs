// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

/// The state a circuit is in.
///
/// A circuit is in exactly one of these states at any instant. The only way to change it is
/// through the transitions driven by [`Circuit`][crate::Circuit] executions or the manual
/// [`trip`][crate::Circuit::trip] and [`reset`][crate::Circuit::reset] controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(any(feature = "serde", test), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(any(feature = "serde", test), serde(rename_all = "snake_case"))]
pub enum CircuitStatus {
    /// Normal operation. Executions pass through and failures are counted.
    Closed,

    /// Tripped. Executions are denied until the recovery timeout elapses.
    Open,

    /// Probing. A single trial execution decides whether the circuit closes or re-opens.
    HalfOpen,
}

impl CircuitStatus {
    /// Returns the `snake_case` label used in telemetry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Returns `true` if the circuit currently admits unrestricted traffic.
    #[must_use]
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }

    /// Returns `true` if the circuit restricts traffic.
    ///
    /// A half-open circuit admits at most one probe, so it is reported as open here. This is the
    /// policy the [`Registry`][crate::Registry] uses for [`open`][crate::Registry::open].
    #[must_use]
    pub fn is_open(self) -> bool {
        !self.is_closed()
    }
}

impl Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
