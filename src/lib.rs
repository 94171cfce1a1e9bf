#![allow(clippy::type_complexity)]

//! Combinators for driving heterogeneous asynchronous values to settlement on a single-threaded executor.
//!
//! The central notion is the [`Mixed`] value: a plain value, a [`Deferred`] computation, a nullary
//! producer function, or a [`Coroutine`], all accepted uniformly by the [`resolve`] function and by
//! the four drivers built on top of it:
//!
//! - [`batch`](Batch) settles an ordered collection of mixed values concurrently, with all-settled
//!   semantics and an index-aligned row vector;
//! - [`sequence`](Sequence) pulls values out of a source callback one at a time, optionally feeding
//!   each through a sink;
//! - [`page`](Page) pulls whole pages of mixed values, batches each page, and optionally feeds the
//!   settled rows to a sink;
//! - [`read`](Read) drains an asynchronous reader in chunks through a receiver callback.
//!
//! ## Fundamental Design Choices
//!
//! - Async functions and plain `async` blocks, no poll-based interfaces in the public surface.
//! - The futures involved are `!Send`; everything runs on a single-threaded executor, and the crate
//!   is executor-agnostic (`pollster`, `smol`, a local task set, anything that can block on a
//!   future).
//! - Fail-fast drivers over an all-settled batch: [`Batch`] is the only combinator that keeps going
//!   when user code fails; [`Sequence`], [`Page`] and [`Read`] terminate on the first failure.
//! - Structured errors with stable numeric reason codes, a one-of source/dest context, and
//!   indent-aware multi-line renderings.
//! - Failures distinguish their [`Origin`]: a callable failing outright versus user code
//!   deliberately resolving with a rejected deferred.
//! - At most one source call and one sink call in flight per driver, so back-pressure needs no
//!   extra machinery.
//! - Purely-synchronous iterations yield to the executor between steps, so a long run of plain
//!   values cannot starve sibling tasks.
//!
//! ## Caveats
//!
//! - The futures returned by the drivers are `!Send`; they cannot be run on multi-threaded
//!   executors.
//! - Dropping a driver's future before polling it to completion discards the run's partial state;
//!   nothing is persisted and no partial results escape.
//! - There is no cancellation surface. Once a driver is started it runs to settlement; a timeout
//!   belongs inside a user callback.
//!
//! ## Example
//!
//! ```
//! use settle::prelude::*;
//!
//! pollster::block_on(async {
//!     // Three very different inputs, one settled row vector.
//!     let output = batch(vec![
//!         Mixed::<u32, &str>::value(1),
//!         Mixed::deferred(Deferred::resolved(2)),
//!         Mixed::producer(|| Ok(Mixed::value(3))),
//!     ])
//!     .await
//!     .unwrap();
//!
//!     let values: Vec<u32> = output.data.iter().filter_map(|row| row.value().copied()).collect();
//!     assert_eq!(values, vec![1, 2, 3]);
//! });
//! ```
//!
//! ## Module Overview
//!
//! The [`mixed`], [`deferred`] and [`coroutine`] modules define the inputs; [`resolve`] drives any
//! of them to a single settled outcome. The [`batch`], [`sequence`], [`page`] and [`read`] modules
//! each hold one driver and its output type. The [`errors`] module holds the structured driver
//! errors and their reason codes.

pub mod batch;
pub mod coroutine;
pub mod deferred;
pub mod errors;
pub mod mixed;
pub mod page;
pub mod read;
pub mod resolve;
pub mod sequence;
mod yield_now;

pub use batch::{batch, Batch, BatchOutput, BatchStats, Settled};
pub use coroutine::{from_fn, Coroutine, FromFn, Step};
pub use deferred::{Deferred, Settler};
pub use errors::{
    BatchError, Blame, PageCause, PageError, PageReason, ReadCause, ReadError, SequenceError,
    SequenceReason,
};
pub use mixed::{Kind, Mixed};
pub use page::{page, Page, PageOutput};
pub use read::{read, Read, ReadOutput};
pub use resolve::{resolve, Failure, Origin, Resolution};
pub use sequence::{sequence, Sequence, SequenceOutput};

/// A “prelude” for crates using the `settle` crate.
///
/// The prelude is meant to be imported wholesale:
///
/// use settle::prelude::*;
///
/// It may grow over time.
pub mod prelude {
    pub use crate::{
        batch, page, read, resolve, sequence, Batch, BatchOutput, BatchStats, Coroutine, Deferred,
        Failure, Kind, Mixed, Origin, Page, PageOutput, Read, ReadOutput, Resolution, Sequence,
        SequenceOutput, Settled, Settler, Step,
    };

    pub use crate::errors::{BatchError, Blame, PageError, ReadError, SequenceError};

    pub use either::Either::{self, Left, Right};

    pub use core::convert::Infallible;
}
