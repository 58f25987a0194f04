// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;

pin_project! {
    /// The sequence produced by an execution that has a fallback: either the admitted operation's
    /// sequence or the fallback's.
    ///
    /// Implements [`Iterator`] and [`Stream`] when both sides do, with the same item type.
    #[project = RouteProj]
    #[derive(Debug)]
    pub enum Route<A, B> {
        /// The circuit admitted the execution.
        Primary {
            #[pin]
            inner: A,
        },
        /// The circuit denied the execution and the fallback ran instead.
        Fallback {
            #[pin]
            inner: B,
        },
    }
}

impl<A, B> Route<A, B> {
    /// Returns `true` if the fallback ran.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

impl<A, B> Iterator for Route<A, B>
where
    A: Iterator,
    B: Iterator<Item = A::Item>,
{
    type Item = A::Item;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Primary { inner } => inner.next(),
            Self::Fallback { inner } => inner.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Primary { inner } => inner.size_hint(),
            Self::Fallback { inner } => inner.size_hint(),
        }
    }
}

impl<A, B> Stream for Route<A, B>
where
    A: Stream,
    B: Stream<Item = A::Item>,
{
    type Item = A::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.project() {
            RouteProj::Primary { inner } => inner.poll_next(cx),
            RouteProj::Fallback { inner } => inner.poll_next(cx),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Primary { inner } => inner.size_hint(),
            Self::Fallback { inner } => inner.size_hint(),
        }
    }
}
