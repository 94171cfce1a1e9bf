use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;
use std::time::Instant;

use futures::future::join_all;

use crate::errors::BatchError;
use crate::mixed::Mixed;
use crate::resolve::{resolve, Failure, Origin, Resolution};

/// One settled row of a [`Batch`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T, E> {
    /// The settled value or the failure reason.
    pub result: Result<T, E>,
    /// `Some(Origin::Rejected)` exactly when the failure came from a
    /// rejected deferred; successes and thrown failures carry no origin.
    /// The presence of the record is what disambiguates a deliberate
    /// rejection from a thrown error.
    pub origin: Option<Origin>,
}

impl<T, E> Settled<T, E> {
    /// Whether this row settled successfully.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Whether this row settled with a failure.
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }

    /// The settled value, if the row succeeded.
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// The failure reason, if the row failed.
    pub fn reason(&self) -> Option<&E> {
        self.result.as_ref().err()
    }

    fn from_failure(failure: Failure<E>) -> Self {
        let origin = match failure.origin {
            Origin::Rejected => Some(Origin::Rejected),
            Origin::Thrown => None,
        };
        Settled {
            result: Err(failure.reason),
            origin,
        }
    }
}

impl<T, E> From<Resolution<T, E>> for Settled<T, E> {
    fn from(resolution: Resolution<T, E>) -> Self {
        match resolution.outcome {
            Ok(value) => Settled {
                result: Ok(value),
                origin: None,
            },
            Err(failure) => Settled::from_failure(failure),
        }
    }
}

/// Aggregate statistics of a [`Batch`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    /// How many values were batched.
    pub total: usize,
    /// How many rows settled successfully.
    pub succeeded: usize,
    /// How many rows settled with a failure.
    pub failed: usize,
    /// Wall-clock time from the start of the run to settlement.
    pub duration: Duration,
}

/// The successful result of a [`Batch`] run: every row settled, none failed.
#[derive(Debug)]
pub struct BatchOutput<T, E> {
    /// The settled rows, ordered by input index.
    pub data: Vec<Settled<T, E>>,
    /// Wall-clock time from the start of the run to settlement.
    pub duration: Duration,
}

type TrackerFn<T, E> =
    Box<dyn FnMut(u64, &Settled<T, E>, Option<Duration>) -> Result<Mixed<(), E>, E>>;

/// Settles an ordered collection of [`Mixed`] values concurrently, with
/// all-settled semantics.
///
/// Every value is driven to settlement even when a peer fails; the row
/// vector is ordered by input index regardless of the order in which values
/// actually settled. When at least one row failed, the run rejects with a
/// [`BatchError`] carrying every row and the aggregate statistics.
///
/// ```
/// use settle::{Batch, Deferred, Mixed};
///
/// pollster::block_on(async {
///     let values = vec![
///         Mixed::<u32, &str>::value(1),
///         Mixed::producer(|| Ok(Mixed::value(2))),
///         Mixed::deferred(Deferred::resolved(3)),
///     ];
///     let output = Batch::new(values).run().await.unwrap();
///     let settled: Vec<u32> = output.data.iter().filter_map(|row| row.value().copied()).collect();
///     assert_eq!(settled, vec![1, 2, 3]);
/// });
/// ```
#[must_use = "drivers are lazy and do nothing unless run"]
pub struct Batch<T, E> {
    values: Vec<Mixed<T, E>>,
    tracker: Option<TrackerFn<T, E>>,
}

impl<T: 'static, E: 'static> Batch<T, E> {
    /// Creates a batch over an ordered collection of mixed values.
    pub fn new(values: impl IntoIterator<Item = Mixed<T, E>>) -> Self {
        Batch {
            values: values.into_iter().collect(),
            tracker: None,
        }
    }

    /// Installs a tracker callback, invoked once per row as soon as that
    /// row settles, with the row's index, the settled row, and the time
    /// since the previous tracker call started (`None` on the first call).
    ///
    /// The tracker's returned mixed value is resolved before the row is
    /// recorded; a tracker failure does not abort peers, but replaces the
    /// observed row with the tracker's failure.
    pub fn track(
        mut self,
        tracker: impl FnMut(u64, &Settled<T, E>, Option<Duration>) -> Result<Mixed<(), E>, E>
            + 'static,
    ) -> Self {
        self.tracker = Some(Box::new(tracker));
        self
    }

    /// Runs the batch to settlement.
    ///
    /// An empty batch settles on the current turn without yielding.
    pub async fn run(self) -> Result<BatchOutput<T, E>, BatchError<T, E>> {
        let started = Instant::now();

        if self.values.is_empty() {
            return Ok(BatchOutput {
                data: Vec::new(),
                duration: Duration::ZERO,
            });
        }

        let tracker = self.tracker.map(|callback| {
            Rc::new(RefCell::new(TrackerState {
                callback,
                previous: None,
            }))
        });

        let rows = join_all(self.values.into_iter().enumerate().map(|(index, mixed)| {
            let tracker = tracker.clone();
            async move {
                let mut row = Settled::from(resolve(mixed).await);

                if let Some(state) = tracker {
                    // The callback invocation is synchronous and the borrow
                    // ends before any await, so concurrent rows never
                    // overlap inside the tracker.
                    let followup = {
                        let mut state = state.borrow_mut();
                        let now = Instant::now();
                        let delay = state.previous.map(|prev| now.duration_since(prev));
                        state.previous = Some(now);
                        let state = &mut *state;
                        (state.callback)(index as u64, &row, delay)
                    };

                    match followup {
                        Ok(mixed) => {
                            if let Err(failure) = resolve(mixed).await.outcome {
                                row = Settled::from_failure(failure);
                            }
                        }
                        Err(reason) => {
                            row = Settled {
                                result: Err(reason),
                                origin: None,
                            };
                        }
                    }
                }

                row
            }
        }))
        .await;

        let duration = started.elapsed();
        let failed = rows.iter().filter(|row| row.is_failure()).count();
        let stat = BatchStats {
            total: rows.len(),
            succeeded: rows.len() - failed,
            failed,
            duration,
        };

        if failed == 0 {
            Ok(BatchOutput {
                data: rows,
                duration,
            })
        } else {
            Err(BatchError::new(rows, stat))
        }
    }
}

struct TrackerState<T, E> {
    callback: TrackerFn<T, E>,
    previous: Option<Instant>,
}

/// Settles an ordered collection of [`Mixed`] values with all-settled
/// semantics. Shorthand for [`Batch::new`] followed by [`Batch::run`].
pub async fn batch<T: 'static, E: 'static>(
    values: impl IntoIterator<Item = Mixed<T, E>>,
) -> Result<BatchOutput<T, E>, BatchError<T, E>> {
    Batch::new(values).run().await
}
