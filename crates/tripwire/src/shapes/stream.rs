// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::permit::Permit;

pin_project! {
    /// A stream admitted by a circuit.
    ///
    /// Yields the items of the inner stream unchanged. The first `Err` item, or the end of the
    /// stream, is reported to the circuit as the outcome of the execution. Dropping the stream
    /// before either happens counts as cancellation.
    ///
    /// Returned by [`Circuit::call_stream`][crate::Circuit::call_stream].
    pub struct GuardedStream<S, E> {
        #[pin]
        inner: S,
        permit: Option<Permit<E>>,
    }
}

impl<S, E> GuardedStream<S, E> {
    pub(crate) fn new(inner: S, permit: Permit<E>) -> Self {
        Self {
            inner,
            permit: Some(permit),
        }
    }

    /// Returns `true` once the outcome has been reported to the circuit.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.permit.is_none()
    }
}

impl<S, T, E> Stream for GuardedStream<S, E>
where
    S: Stream<Item = Result<T, E>>,
    E: Debug,
{
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Err(error))) => {
                if let Some(permit) = this.permit.take() {
                    permit.error(&error);
                }
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                if let Some(permit) = this.permit.take() {
                    permit.success();
                }
                Poll::Ready(None)
            }
            poll => poll,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S, E> Debug for GuardedStream<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedStream").field("permit", &self.permit).finish_non_exhaustive()
    }
}
