// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

use crate::utils::define_fn_wrapper;

define_fn_wrapper!(IsFailure<E>(Fn(error: &E) -> bool));

/// Boxed, type-erased error, as commonly returned by application code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that expose a coarse "kind" the classifier can match on.
///
/// Implement this for your own error types to use [`FailureClassifier::kind`],
/// [`FailureClassifier::kinds`] and [`FailureClassifier::kind_predicate`].
pub trait HasErrorKind {
    /// The kind discriminator, typically a fieldless enum.
    type Kind: PartialEq + Debug + Send + Sync + 'static;

    /// Returns the kind of this error.
    fn error_kind(&self) -> Self::Kind;
}

impl HasErrorKind for std::io::Error {
    type Kind = std::io::ErrorKind;

    fn error_kind(&self) -> Self::Kind {
        self.kind()
    }
}

/// Decides whether an error returned by the wrapped operation counts as a circuit failure.
///
/// Only classified failures move the state machine. Every other error passes through to the caller
/// without touching counters or state. The default classifies every error as a failure.
///
/// # Examples
///
/// ```rust
/// use std::io::{Error, ErrorKind};
///
/// use tripwire::FailureClassifier;
///
/// let classifier = FailureClassifier::<Error>::kinds([ErrorKind::TimedOut, ErrorKind::ConnectionRefused]);
///
/// assert!(classifier.is_failure(&Error::from(ErrorKind::TimedOut)));
/// assert!(!classifier.is_failure(&Error::from(ErrorKind::NotFound)));
/// ```
pub struct FailureClassifier<E> {
    is_failure: IsFailure<E>,
    defect: Option<Defect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Defect {
    EmptyKindSet,
}

impl<E> FailureClassifier<E> {
    /// Classifies every error as a failure.
    #[must_use]
    pub fn all() -> Self {
        Self::from_fn(|_| true)
    }

    /// Classifies errors for which `predicate` returns `true`.
    ///
    /// The predicate must be a pure function of the error and must not panic.
    #[must_use]
    pub fn from_fn(predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self {
            is_failure: IsFailure::new(predicate),
            defect: None,
        }
    }

    /// Returns a classifier that matches if either `self` or `other` matches.
    #[must_use]
    pub fn or(self, other: Self) -> Self
    where
        E: 'static,
    {
        let defect = self.defect.or(other.defect);
        let (left, right) = (self.is_failure, other.is_failure);

        Self {
            is_failure: IsFailure::new(move |error| left.call(error) || right.call(error)),
            defect,
        }
    }

    /// Returns `true` if `error` counts as a circuit failure.
    #[must_use]
    pub fn is_failure(&self, error: &E) -> bool {
        self.is_failure.call(error)
    }

    pub(crate) fn defect(&self) -> Option<Defect> {
        self.defect
    }
}

impl<E: HasErrorKind> FailureClassifier<E> {
    /// Classifies errors of a single kind.
    #[must_use]
    pub fn kind(kind: E::Kind) -> Self {
        Self::from_fn(move |error: &E| error.error_kind() == kind)
    }

    /// Classifies errors whose kind is any of `kinds`.
    ///
    /// An empty set is a configuration error reported when the circuit is built.
    #[must_use]
    pub fn kinds(kinds: impl IntoIterator<Item = E::Kind>) -> Self {
        let kinds: Vec<E::Kind> = kinds.into_iter().collect();
        let defect = kinds.is_empty().then_some(Defect::EmptyKindSet);

        Self {
            is_failure: IsFailure::new(move |error: &E| kinds.contains(&error.error_kind())),
            defect,
        }
    }

    /// Classifies errors for which `predicate` over (kind, error) returns `true`.
    #[must_use]
    pub fn kind_predicate(predicate: impl Fn(&E::Kind, &E) -> bool + Send + Sync + 'static) -> Self {
        Self::from_fn(move |error: &E| predicate(&error.error_kind(), error))
    }
}

impl FailureClassifier<BoxError> {
    /// Classifies boxed errors whose concrete type is `T`.
    ///
    /// Combine several types with [`or`][Self::or].
    #[must_use]
    pub fn of_type<T: std::error::Error + 'static>() -> Self {
        Self::from_fn(|error: &BoxError| error.is::<T>())
    }
}

impl<E> Default for FailureClassifier<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E> Clone for FailureClassifier<E> {
    fn clone(&self) -> Self {
        Self {
            is_failure: self.is_failure.clone(),
            defect: self.defect,
        }
    }
}

impl<E> Debug for FailureClassifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureClassifier").field("defect", &self.defect).finish_non_exhaustive()
    }
}
