// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of consecutive classified failures that trips a closed circuit.
pub(crate) const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time an open circuit waits before it admits a probe.
pub(crate) const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Name given to a circuit that was built without one.
pub(crate) const UNNAMED_CIRCUIT: &str = "unnamed_circuit";
