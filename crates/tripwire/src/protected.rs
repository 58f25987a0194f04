// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use futures_core::Stream;

use crate::shapes::{GuardedIter, GuardedStream, Route};
use crate::{Circuit, CircuitError, OpenCircuitError};

/// Marker for a [`Protected`] operation without a fallback.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct NoFallback;

/// Marker for a [`Protected`] operation with a fallback of type `FB`.
#[derive(Debug, Clone)]
pub struct WithFallback<FB>(FB);

/// An operation bound to a circuit.
///
/// Created by [`Circuit::protect`] or [`CircuitOptions::protect`][crate::CircuitOptions::protect].
/// The operation is any `Fn(In) -> R`, where the shape of `R` selects the method to call:
///
/// | `R` | Method |
/// |---|---|
/// | `Result<T, E>` | [`call`][Self::call] |
/// | `impl Future<Output = Result<T, E>>` | [`call_async`][Self::call_async] |
/// | `impl Stream<Item = Result<T, E>>` | [`call_stream`][Self::call_stream] |
/// | `impl IntoIterator<Item = Result<T, E>>` | [`call_iter`][Self::call_iter] |
///
/// [`with_fallback`][Self::with_fallback] attaches a fallback of the same shape. When the circuit
/// denies an execution the fallback is invoked with the same input and its result is returned in
/// place of [`CircuitError::Open`].
///
/// # Examples
///
/// ```rust
/// use tick::Clock;
/// use tripwire::{CircuitOptions, Registry};
///
/// fn lookup(id: u32) -> Result<String, std::io::Error> {
///     Ok(format!("user-{id}"))
/// }
///
/// let lookup = CircuitOptions::<std::io::Error>::new("users", Clock::new_frozen())
///     .registry(&Registry::new())
///     .protect(lookup)?
///     .with_fallback(|id: u32| Ok(format!("cached-{id}")));
///
/// assert_eq!(lookup.call(7)?, "user-7");
///
/// lookup.circuit().trip();
/// assert_eq!(lookup.call(7)?, "cached-7");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Protected<F, E, FB = NoFallback> {
    circuit: Circuit<E>,
    operation: F,
    fallback: FB,
}

impl<F, E> Protected<F, E> {
    pub(crate) fn new(circuit: Circuit<E>, operation: F) -> Self {
        Self {
            circuit,
            operation,
            fallback: NoFallback,
        }
    }

    /// Attaches a fallback that runs with the same input whenever the circuit denies an execution.
    #[must_use]
    pub fn with_fallback<FB>(self, fallback: FB) -> Protected<F, E, WithFallback<FB>> {
        Protected {
            circuit: self.circuit,
            operation: self.operation,
            fallback: WithFallback(fallback),
        }
    }
}

impl<F, E, FB> Protected<F, E, FB> {
    /// Returns the circuit guarding the operation.
    #[must_use]
    pub fn circuit(&self) -> &Circuit<E> {
        &self.circuit
    }
}

impl<F, E: Debug> Protected<F, E> {
    /// Invokes the operation with `input` if the circuit admits it.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::Open`] without invoking the operation when the circuit denies the
    /// execution, and [`CircuitError::Inner`] with the operation's own error otherwise.
    pub fn call<In, T>(&self, input: In) -> Result<T, CircuitError<E>>
    where
        F: Fn(In) -> Result<T, E>,
    {
        self.circuit.call(|| (self.operation)(input))
    }

    /// Invokes the operation with `input` and awaits its future if the circuit admits it.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitError::Open`] without invoking the operation when the circuit denies the
    /// execution, and [`CircuitError::Inner`] with the operation's own error otherwise.
    pub async fn call_async<In, T, Fut>(&self, input: In) -> Result<T, CircuitError<E>>
    where
        F: Fn(In) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.circuit.call_async(|| (self.operation)(input)).await
    }

    /// Invokes the operation with `input` and opens its stream if the circuit admits it.
    ///
    /// # Errors
    ///
    /// Returns [`OpenCircuitError`] without invoking the operation when the circuit denies the
    /// execution.
    pub fn call_stream<In, T, S>(&self, input: In) -> Result<GuardedStream<S, E>, OpenCircuitError>
    where
        F: Fn(In) -> S,
        S: Stream<Item = Result<T, E>>,
    {
        self.circuit.call_stream(|| (self.operation)(input))
    }

    /// Invokes the operation with `input` and opens its iterator if the circuit admits it.
    ///
    /// # Errors
    ///
    /// Returns [`OpenCircuitError`] without invoking the operation when the circuit denies the
    /// execution.
    pub fn call_iter<In, T, I>(&self, input: In) -> Result<GuardedIter<I::IntoIter, E>, OpenCircuitError>
    where
        F: Fn(In) -> I,
        I: IntoIterator<Item = Result<T, E>>,
    {
        self.circuit.call_iter(|| (self.operation)(input))
    }
}

impl<F, E: Debug, FB> Protected<F, E, WithFallback<FB>> {
    /// Invokes the operation with `input` if the circuit admits it, otherwise the fallback.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever of the two ran.
    pub fn call<In, T>(&self, input: In) -> Result<T, E>
    where
        F: Fn(In) -> Result<T, E>,
        FB: Fn(In) -> Result<T, E>,
    {
        match self.circuit.admit() {
            Ok(permit) => permit.observe((self.operation)(input)),
            Err(_) => (self.fallback.0)(input),
        }
    }

    /// Invokes the operation with `input` and awaits its future if the circuit admits it,
    /// otherwise awaits the fallback's future.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever of the two ran.
    pub async fn call_async<In, T, Fut, FutB>(&self, input: In) -> Result<T, E>
    where
        F: Fn(In) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: Fn(In) -> FutB,
        FutB: Future<Output = Result<T, E>>,
    {
        match self.circuit.admit() {
            Ok(permit) => permit.observe((self.operation)(input).await),
            Err(_) => (self.fallback.0)(input).await,
        }
    }

    /// Invokes the operation with `input` and opens its stream if the circuit admits it,
    /// otherwise opens the fallback's stream.
    pub fn call_stream<In, T, S, SB>(&self, input: In) -> Route<GuardedStream<S, E>, SB>
    where
        F: Fn(In) -> S,
        S: Stream<Item = Result<T, E>>,
        FB: Fn(In) -> SB,
        SB: Stream<Item = Result<T, E>>,
    {
        match self.circuit.admit() {
            Ok(permit) => Route::Primary {
                inner: GuardedStream::new((self.operation)(input), permit),
            },
            Err(_) => Route::Fallback {
                inner: (self.fallback.0)(input),
            },
        }
    }

    /// Invokes the operation with `input` and opens its iterator if the circuit admits it,
    /// otherwise opens the fallback's iterator.
    pub fn call_iter<In, T, I, IB>(&self, input: In) -> Route<GuardedIter<I::IntoIter, E>, IB::IntoIter>
    where
        F: Fn(In) -> I,
        I: IntoIterator<Item = Result<T, E>>,
        FB: Fn(In) -> IB,
        IB: IntoIterator<Item = Result<T, E>>,
    {
        match self.circuit.admit() {
            Ok(permit) => Route::Primary {
                inner: GuardedIter::new((self.operation)(input).into_iter(), permit),
            },
            Err(_) => Route::Fallback {
                inner: (self.fallback.0)(input).into_iter(),
            },
        }
    }
}

impl<F: Clone, E, FB: Clone> Clone for Protected<F, E, FB> {
    fn clone(&self) -> Self {
        Self {
            circuit: self.circuit.clone(),
            operation: self.operation.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<F, E, FB> Debug for Protected<F, E, FB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protected")
            .field("circuit", &self.circuit)
            .field("operation", &std::any::type_name::<F>())
            .field("fallback", &std::any::type_name::<FB>())
            .finish()
    }
}
