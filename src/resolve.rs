use crate::coroutine::{Coroutine, Step};
use crate::mixed::Mixed;

/// Where a settlement failure came from.
///
/// The drivers report the two cases differently: a failing callable is a
/// defect in the callback, while a rejected deferred is how user code
/// deliberately signals a failure it has already produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// A producer, coroutine or sink failed outright.
    Thrown,
    /// A deferred settled with a rejection.
    Rejected,
}

/// A settlement failure: the reason, and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure<E> {
    /// The failure reason.
    pub reason: E,
    /// Where the failure came from.
    pub origin: Origin,
}

/// The settled outcome of a [`Mixed`] value.
#[derive(Debug)]
pub struct Resolution<T, E> {
    /// The settled value, or the failure that ended resolution.
    pub outcome: Result<T, Failure<E>>,
    /// Whether settlement required awaiting a deferred at least once.
    ///
    /// The drivers consult this to decide whether to yield to the executor
    /// before their next iteration; a resolution that awaited a deferred has
    /// already passed through the executor.
    pub delayed: bool,
}

/// Drives a [`Mixed`] value to settlement.
///
/// Producers are invoked, deferreds awaited, coroutines pumped to their
/// terminal value; each stage may hand back another mixed value, and
/// resolution loops until a plain value or a failure remains. The
/// [`delayed`](Resolution::delayed) flag is sticky: once any stage awaited a
/// deferred, the whole resolution counts as delayed.
///
/// ```
/// use settle::{resolve, Deferred, Mixed, Origin};
///
/// pollster::block_on(async {
///     let plain = resolve(Mixed::<u32, &str>::value(5)).await;
///     assert_eq!(plain.outcome.unwrap(), 5);
///     assert!(!plain.delayed);
///
///     let awaited = resolve(Mixed::<u32, &str>::deferred(Deferred::resolved(5))).await;
///     assert_eq!(awaited.outcome.unwrap(), 5);
///     assert!(awaited.delayed);
///
///     let rejected = resolve(Mixed::<u32, &str>::deferred(Deferred::rejected("no"))).await;
///     let failure = rejected.outcome.unwrap_err();
///     assert_eq!(failure.reason, "no");
///     assert_eq!(failure.origin, Origin::Rejected);
/// });
/// ```
pub async fn resolve<T: 'static, E: 'static>(mixed: Mixed<T, E>) -> Resolution<T, E> {
    let mut delayed = false;
    let mut current = mixed;

    loop {
        match current {
            Mixed::Value(value) => {
                return Resolution {
                    outcome: Ok(value),
                    delayed,
                }
            }
            Mixed::Producer(produce) => match produce() {
                Ok(next) => current = next,
                Err(reason) => {
                    return Resolution {
                        outcome: Err(Failure {
                            reason,
                            origin: Origin::Thrown,
                        }),
                        delayed,
                    }
                }
            },
            Mixed::Deferred(deferred) => {
                delayed = true;
                match deferred.await {
                    Ok(next) => current = next,
                    Err(reason) => {
                        return Resolution {
                            outcome: Err(Failure {
                                reason,
                                origin: Origin::Rejected,
                            }),
                            delayed,
                        }
                    }
                }
            }
            Mixed::Coroutine(machine) => return pump(machine, delayed).await,
        }
    }
}

/// Pumps a coroutine to its terminal value, resolving every yielded mixed
/// value and feeding the settled value back in. Settlement failures are
/// re-introduced through `throw`; a failure the machine does not recover
/// from propagates with the origin of the failure that was injected, or
/// [`Origin::Thrown`] when the machine itself failed.
async fn pump<T: 'static, E: 'static>(
    mut machine: Box<dyn Coroutine<T, E>>,
    mut delayed: bool,
) -> Resolution<T, E> {
    let mut injected: Option<Origin> = None;
    let mut step = machine.resume(None);

    loop {
        match step {
            Err(reason) => {
                return Resolution {
                    outcome: Err(Failure {
                        reason,
                        origin: injected.unwrap_or(Origin::Thrown),
                    }),
                    delayed,
                }
            }
            Ok(Step::Complete(value)) => {
                return Resolution {
                    outcome: Ok(value),
                    delayed,
                }
            }
            Ok(Step::Yielded(mixed)) => {
                let resolution = Box::pin(resolve(mixed)).await;
                delayed |= resolution.delayed;

                step = match resolution.outcome {
                    Ok(value) => {
                        injected = None;
                        machine.resume(Some(value))
                    }
                    Err(failure) => {
                        injected = Some(failure.origin);
                        machine.throw(failure.reason)
                    }
                };
            }
        }
    }
}
