// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::iter::FusedIterator;

use crate::permit::Permit;

/// An iterator admitted by a circuit.
///
/// Yields the items of the inner iterator unchanged. The first `Err` item, or the end of the
/// iterator, is reported to the circuit as the outcome of the execution. Dropping the iterator
/// before either happens counts as cancellation.
///
/// Returned by [`Circuit::call_iter`][crate::Circuit::call_iter].
pub struct GuardedIter<I, E> {
    inner: I,
    permit: Option<Permit<E>>,
}

impl<I, E> GuardedIter<I, E> {
    pub(crate) fn new(inner: I, permit: Permit<E>) -> Self {
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

impl<I, T, E> Iterator for GuardedIter<I, E>
where
    I: Iterator<Item = Result<T, E>>,
    E: Debug,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(Err(error)) => {
                if let Some(permit) = self.permit.take() {
                    permit.error(&error);
                }
                Some(Err(error))
            }
            None => {
                if let Some(permit) = self.permit.take() {
                    permit.success();
                }
                None
            }
            item => item,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<I, T, E> FusedIterator for GuardedIter<I, E>
where
    I: FusedIterator<Item = Result<T, E>>,
    E: Debug,
{
}

impl<I, E> Debug for GuardedIter<I, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedIter").field("permit", &self.permit).finish_non_exhaustive()
    }
}
