// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Adapters that observe the outcome of sequence-shaped executions.

mod iter;
mod route;
mod stream;

pub use iter::GuardedIter;
pub use route::Route;
pub use stream::GuardedStream;
