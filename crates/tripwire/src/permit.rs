// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use crate::circuit::Shared;
use crate::state::{ExecutionMode, LastFailure, Outcome};

/// Permission to run one execution, handed out when a circuit admits it.
///
/// A permit resolves exactly once. Dropping it unresolved (a cancelled future, an abandoned
/// stream or iterator, a panicking operation) reports the execution as cancelled, which never
/// moves counters but always releases a held probe claim.
pub(crate) struct Permit<E> {
    shared: Arc<Shared<E>>,
    mode: Option<ExecutionMode>,
}

impl<E> Permit<E> {
    pub(crate) fn new(shared: Arc<Shared<E>>, mode: ExecutionMode) -> Self {
        Self { shared, mode: Some(mode) }
    }

    pub(crate) fn success(mut self) {
        self.resolve(Outcome::Success);
    }

    fn resolve(&mut self, outcome: Outcome) {
        let Some(mode) = self.mode.take() else {
            return;
        };

        let result = outcome.as_str();
        let transition = self.shared.state.exit(mode, outcome);
        self.shared.telemetry.exited(mode, result, transition);
    }
}

impl<E: Debug> Permit<E> {
    pub(crate) fn error(mut self, error: &E) {
        let outcome = if self.shared.classifier.is_failure(error) {
            Outcome::Failure(LastFailure::from_error(error))
        } else {
            Outcome::Unclassified
        };

        self.resolve(outcome);
    }

    /// Reports the result of the execution and hands it back unchanged.
    pub(crate) fn observe<T>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.success(),
            Err(error) => self.error(error),
        }

        result
    }
}

impl<E> Drop for Permit<E> {
    fn drop(&mut self) {
        self.resolve(Outcome::Cancelled);
    }
}

impl<E> Debug for Permit<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("circuit", &self.shared.state.name())
            .field("mode", &self.mode)
            .finish()
    }
}
