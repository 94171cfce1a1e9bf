use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures::channel::oneshot;

/// A deferred computation: a boxed, single-threaded future that settles once
/// with a `Result<T, E>`.
///
/// This is the only representation of "not yet settled" in this crate. It is
/// deliberately `!Send`; a deferred belongs to the executor it was created on
/// and is awaited there.
///
/// There are three ways to obtain one, corresponding to the three classic
/// construction operations:
///
/// - [`Deferred::new`] hands an executor closure a one-shot [`Settler`],
/// - [`Deferred::resolved`] is an already-resolved deferred,
/// - [`Deferred::rejected`] is an already-rejected deferred.
///
/// Any `'static` future with a `Result` output can be adapted via
/// [`Deferred::from_future`].
///
/// ```
/// use settle::Deferred;
///
/// let deferred = Deferred::<u32, &str>::new(|settler| {
///     settler.resolve(17);
/// });
/// assert_eq!(pollster::block_on(deferred), Ok(17));
/// ```
pub struct Deferred<T, E> {
    fut: Pin<Box<dyn Future<Output = Result<T, E>>>>,
}

impl<T: 'static, E: 'static> Deferred<T, E> {
    /// Creates a deferred from an executor closure.
    ///
    /// The closure receives a [`Settler`] and may settle it immediately or
    /// hand it off to settle later. Dropping the settler without settling
    /// leaves the deferred pending forever; a computation that is never
    /// settled is not an error, it is simply never observed.
    pub fn new(executor: impl FnOnce(Settler<T, E>)) -> Self {
        let (sender, receiver) = oneshot::channel();
        executor(Settler { sender });

        Deferred {
            fut: Box::pin(async move {
                match receiver.await {
                    Ok(result) => result,
                    Err(oneshot::Canceled) => futures::future::pending().await,
                }
            }),
        }
    }

    /// An already-resolved deferred.
    pub fn resolved(value: T) -> Self {
        Deferred {
            fut: Box::pin(core::future::ready(Ok(value))),
        }
    }

    /// An already-rejected deferred.
    pub fn rejected(reason: E) -> Self {
        Deferred {
            fut: Box::pin(core::future::ready(Err(reason))),
        }
    }

    /// Adapts any `'static` future that outputs a `Result<T, E>`.
    pub fn from_future(fut: impl Future<Output = Result<T, E>> + 'static) -> Self {
        Deferred { fut: Box::pin(fut) }
    }
}

impl<T, E> Future for Deferred<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().fut.as_mut().poll(cx)
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

/// The one-shot settling handle of a [`Deferred`] created with
/// [`Deferred::new`].
///
/// A settler is consumed by settling; there is no way to settle twice.
pub struct Settler<T, E> {
    sender: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Settler<T, E> {
    /// Settles the deferred with a success value.
    pub fn resolve(self, value: T) {
        let _ = self.sender.send(Ok(value));
    }

    /// Settles the deferred with a failure reason.
    pub fn reject(self, reason: E) {
        let _ = self.sender.send(Err(reason));
    }

    /// Settles the deferred with a ready-made result.
    pub fn settle(self, result: Result<T, E>) {
        let _ = self.sender.send(result);
    }
}

impl<T, E> fmt::Debug for Settler<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler").finish_non_exhaustive()
    }
}
