// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use futures_core::Stream;

use crate::permit::Permit;
use crate::shapes::{GuardedIter, GuardedStream, Route};
use crate::state::Admission;
use crate::telemetry::CircuitTelemetry;
use crate::{CircuitError, CircuitState, CircuitStatus, FailureClassifier, OpenCircuitError, Protected};

/// A named circuit breaker guarding executions that fail with `E`.
///
/// Every execution first asks the circuit for permission. A closed circuit runs the operation and
/// counts its classified failures; once the failure threshold is reached the circuit opens and
/// denies executions without invoking the operation. After the recovery timeout elapses exactly
/// one execution is admitted as a probe: its success closes the circuit and its failure re-opens
/// it for another full recovery timeout.
///
/// The operation's own errors are always returned unchanged. A denied execution either fails with
/// [`CircuitError::Open`] or, for the `_or_else` variants, runs the supplied fallback instead.
///
/// `Circuit` is cheap to clone. Clones share the same state, classifier and telemetry.
///
/// # Call shapes
///
/// | Method | Operation | Outcome observed when |
/// |---|---|---|
/// | [`call`][Self::call] | `FnOnce() -> Result<T, E>` | the closure returns |
/// | [`call_async`][Self::call_async] | `FnOnce() -> impl Future<Output = Result<T, E>>` | the future completes |
/// | [`call_stream`][Self::call_stream] | `FnOnce() -> impl Stream<Item = Result<T, E>>` | the first `Err` item or the end of the stream |
/// | [`call_iter`][Self::call_iter] | `FnOnce() -> impl Iterator<Item = Result<T, E>>` | the first `Err` item or the end of the iterator |
///
/// Dropping a future, stream or iterator before its outcome is observed counts as cancellation:
/// counters are left alone and a held probe claim is released.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use tick::Clock;
/// use tripwire::{CircuitError, CircuitOptions, CircuitStatus, Registry};
///
/// let circuit = CircuitOptions::<std::io::Error>::new("inventory", Clock::new_frozen())
///     .failure_threshold(2)
///     .recovery_timeout(Duration::from_secs(10))
///     .registry(&Registry::new())
///     .build()?;
///
/// for _ in 0..2 {
///     let result = circuit.call(|| Err::<u32, _>(std::io::Error::other("unavailable")));
///     assert!(matches!(result, Err(CircuitError::Inner(_))));
/// }
///
/// assert_eq!(circuit.status(), CircuitStatus::Open);
/// assert!(circuit.call(|| Ok(1)).unwrap_err().is_open());
/// # Ok::<(), tripwire::ConfigError>(())
/// ```
pub struct Circuit<E> {
    shared: Arc<Shared<E>>,
}

pub(crate) struct Shared<E> {
    pub(crate) state: Arc<CircuitState>,
    pub(crate) classifier: FailureClassifier<E>,
    pub(crate) telemetry: CircuitTelemetry,
}

impl<E> Circuit<E> {
    pub(crate) fn new(state: Arc<CircuitState>, classifier: FailureClassifier<E>, telemetry: CircuitTelemetry) -> Self {
        Self {
            shared: Arc::new(Shared {
                state,
                classifier,
                telemetry,
            }),
        }
    }

    /// Returns the name of the circuit.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.state.name()
    }

    /// Returns the shared state machine, for introspection.
    #[must_use]
    pub fn state(&self) -> &CircuitState {
        &self.shared.state
    }

    pub(crate) fn state_arc(&self) -> &Arc<CircuitState> {
        &self.shared.state
    }

    /// Returns the current status. Shorthand for `self.state().status()`.
    #[must_use]
    pub fn status(&self) -> CircuitStatus {
        self.shared.state.status()
    }

    /// Forces the circuit open. The recovery timeout restarts from now.
    ///
    /// A probe that is in flight is superseded: its outcome no longer affects the circuit.
    pub fn trip(&self) {
        let transition = self.shared.state.trip();
        self.shared.telemetry.transitioned(transition);
    }

    /// Forces the circuit closed and clears the failure count and the last failure.
    pub fn reset(&self) {
        let transition = self.shared.state.reset();
        self.shared.telemetry.transitioned(transition);
    }

    /// Binds `operation` to this circuit, producing a reusable protected callable.
    ///
    /// See [`Protected`] for the supported operation shapes and for attaching a fallback.
    #[must_use]
    pub fn protect<F>(&self, operation: F) -> Protected<F, E> {
        Protected::new(self.clone(), operation)
    }

    pub(crate) fn admit(&self) -> Result<Permit<E>, OpenCircuitError> {
        match self.shared.state.enter() {
            Admission::Accepted(mode) => {
                self.shared.telemetry.admitted(mode);
                Ok(Permit::new(Arc::clone(&self.shared), mode))
            }
            Admission::Rejected(error) => {
                self.shared.telemetry.rejected(&error);
                Err(error)
            }
        }
    }
}

impl<E: Debug> Circuit<E> {
    /// Runs `operation` if the circuit admits it.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::Open`] without invoking `operation` when the circuit denies the
    /// execution, and [`CircuitError::Inner`] with the operation's own error otherwise.
    pub fn call<T>(&self, operation: impl FnOnce() -> Result<T, E>) -> Result<T, CircuitError<E>> {
        let permit = self.admit()?;
        permit.observe(operation()).map_err(CircuitError::Inner)
    }

    /// Runs `operation` if the circuit admits it, otherwise runs `fallback`.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever of the two ran.
    pub fn call_or_else<T>(&self, operation: impl FnOnce() -> Result<T, E>, fallback: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        match self.admit() {
            Ok(permit) => permit.observe(operation()),
            Err(_) => fallback(),
        }
    }

    /// Creates and awaits the future returned by `operation` if the circuit admits it.
    ///
    /// The admission, including a half-open probe claim, is held across every suspension point
    /// of the future. Dropping the returned future before it completes releases it.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::Open`] without invoking `operation` when the circuit denies the
    /// execution, and [`CircuitError::Inner`] with the operation's own error otherwise.
    pub async fn call_async<T, Fut>(&self, operation: impl FnOnce() -> Fut) -> Result<T, CircuitError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit()?;
        permit.observe(operation().await).map_err(CircuitError::Inner)
    }

    /// Like [`call_async`][Self::call_async], but awaits the future returned by `fallback`
    /// instead of failing when the circuit denies the execution.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever of the two ran.
    pub async fn call_async_or_else<T, Fut, FutB>(&self, operation: impl FnOnce() -> Fut, fallback: impl FnOnce() -> FutB) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        FutB: Future<Output = Result<T, E>>,
    {
        match self.admit() {
            Ok(permit) => permit.observe(operation().await),
            Err(_) => fallback().await,
        }
    }

    /// Opens the stream returned by `operation` if the circuit admits it.
    ///
    /// The first `Err` item is the outcome of the execution. Items after it pass through
    /// untouched. A stream that ends without an `Err` item is a success.
    ///
    /// # Errors
    ///
    /// Returns [`OpenCircuitError`] without invoking `operation` when the circuit denies the
    /// execution. Errors of the stream itself are yielded as items.
    pub fn call_stream<T, S>(&self, operation: impl FnOnce() -> S) -> Result<GuardedStream<S, E>, OpenCircuitError>
    where
        S: Stream<Item = Result<T, E>>,
    {
        let permit = self.admit()?;
        Ok(GuardedStream::new(operation(), permit))
    }

    /// Like [`call_stream`][Self::call_stream], but yields the stream returned by `fallback`
    /// when the circuit denies the execution.
    pub fn call_stream_or_else<T, S, SB>(&self, operation: impl FnOnce() -> S, fallback: impl FnOnce() -> SB) -> Route<GuardedStream<S, E>, SB>
    where
        S: Stream<Item = Result<T, E>>,
        SB: Stream<Item = Result<T, E>>,
    {
        match self.admit() {
            Ok(permit) => Route::Primary {
                inner: GuardedStream::new(operation(), permit),
            },
            Err(_) => Route::Fallback { inner: fallback() },
        }
    }

    /// Opens the iterator returned by `operation` if the circuit admits it.
    ///
    /// Outcomes are observed the same way as for [`call_stream`][Self::call_stream].
    ///
    /// # Errors
    ///
    /// Returns [`OpenCircuitError`] without invoking `operation` when the circuit denies the
    /// execution. Errors of the iterator itself are yielded as items.
    pub fn call_iter<T, I>(&self, operation: impl FnOnce() -> I) -> Result<GuardedIter<I::IntoIter, E>, OpenCircuitError>
    where
        I: IntoIterator<Item = Result<T, E>>,
    {
        let permit = self.admit()?;
        Ok(GuardedIter::new(operation().into_iter(), permit))
    }

    /// Like [`call_iter`][Self::call_iter], but yields the iterator returned by `fallback`
    /// when the circuit denies the execution.
    pub fn call_iter_or_else<T, I, IB>(
        &self,
        operation: impl FnOnce() -> I,
        fallback: impl FnOnce() -> IB,
    ) -> Route<GuardedIter<I::IntoIter, E>, IB::IntoIter>
    where
        I: IntoIterator<Item = Result<T, E>>,
        IB: IntoIterator<Item = Result<T, E>>,
    {
        match self.admit() {
            Ok(permit) => Route::Primary {
                inner: GuardedIter::new(operation().into_iter(), permit),
            },
            Err(_) => Route::Fallback {
                inner: fallback().into_iter(),
            },
        }
    }
}

impl<E> Clone for Circuit<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> Debug for Circuit<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("state", &self.shared.state)
            .field("classifier", &self.shared.classifier)
            .finish_non_exhaustive()
    }
}

impl<E> Display for Circuit<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn derive_name<F>(name: Option<Cow<'static, str>>) -> Cow<'static, str> {
    name.unwrap_or(Cow::Borrowed(std::any::type_name::<F>()))
}
