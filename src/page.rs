use core::time::Duration;
use std::time::Instant;

use crate::batch::{Batch, Settled};
use crate::errors::{Blame, PageCause, PageError, PageReason};
use crate::mixed::Mixed;
use crate::resolve::{resolve, Origin};
use crate::yield_now::yield_now;

/// The successful result of a [`Page`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOutput {
    /// How many pages were pulled and batched.
    pub pages: u64,
    /// How many values were settled across all pages.
    pub total: u64,
    /// Wall-clock time from the start of the run to completion.
    pub duration: Duration,
}

type PageSinkFn<T, E> =
    Box<dyn FnMut(u64, &[Settled<T, E>], Option<Duration>) -> Result<Mixed<(), E>, E>>;

/// Pulls pages of [`Mixed`] values out of a source callback, settles each
/// page through a [`Batch`], and optionally feeds the settled rows to a
/// sink.
///
/// The source is called like a [sequence](crate::Sequence) source, except
/// that the previous data handed back on iteration `i >= 1` is the settled
/// row vector of the previous page, and the returned mixed value resolves to
/// a whole page: `Some` of a vector of mixed values, or `None` to complete
/// the run. A failed batch fails the run; so does a failing source or sink.
///
/// ```
/// use settle::{Mixed, Page};
///
/// pollster::block_on(async {
///     let output = Page::new(|index, _last, _delay| {
///         Ok::<_, &str>(Mixed::value(match index {
///             0 => Some(vec![Mixed::value(1), Mixed::value(2)]),
///             1 => Some(vec![Mixed::value(3)]),
///             _ => None,
///         }))
///     })
///     .run()
///     .await
///     .unwrap();
///
///     assert_eq!(output.pages, 2);
///     assert_eq!(output.total, 3);
/// });
/// ```
#[must_use = "drivers are lazy and do nothing unless run"]
pub struct Page<T, E, S> {
    source: S,
    dest: Option<PageSinkFn<T, E>>,
    limit: u64,
}

impl<T, E, S> Page<T, E, S>
where
    T: 'static,
    E: 'static,
    S: FnMut(
        u64,
        Option<&[Settled<T, E>]>,
        Option<Duration>,
    ) -> Result<Mixed<Option<Vec<Mixed<T, E>>>, E>, E>,
{
    /// Creates a page driver over a source callback.
    pub fn new(source: S) -> Self {
        Page {
            source,
            dest: None,
            limit: 0,
        }
    }

    /// Installs a sink, called with each page's settled rows before the next
    /// source call, with its own inter-call delay measurement.
    pub fn dest(
        mut self,
        sink: impl FnMut(u64, &[Settled<T, E>], Option<Duration>) -> Result<Mixed<(), E>, E>
            + 'static,
    ) -> Self {
        self.dest = Some(Box::new(sink));
        self
    }

    /// Caps the number of pages. Zero, the default, means unlimited.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Runs the driver to completion or to its first failure.
    pub async fn run(mut self) -> Result<PageOutput, PageError<T, E>> {
        let started = Instant::now();
        let mut index: u64 = 0;
        let mut total: u64 = 0;
        let mut previous: Option<Vec<Settled<T, E>>> = None;
        let mut source_prev: Option<Instant> = None;
        let mut sink_prev: Option<Instant> = None;

        loop {
            let now = Instant::now();
            let delay = source_prev.map(|prev| now.duration_since(prev));
            source_prev = Some(now);

            let mixed = match (self.source)(index, previous.as_deref(), delay) {
                Ok(mixed) => mixed,
                Err(reason) => {
                    return Err(PageError::new(
                        PageReason::SourceThrew,
                        PageCause::User(reason),
                        index,
                        started.elapsed(),
                        Some(Blame::Source(previous)),
                    ))
                }
            };

            let resolution = resolve(mixed).await;
            let mut delayed = resolution.delayed;

            let page = match resolution.outcome {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(failure) => {
                    let reason = match failure.origin {
                        Origin::Thrown => PageReason::SourceThrew,
                        Origin::Rejected => PageReason::SourceRejected,
                    };
                    return Err(PageError::new(
                        reason,
                        PageCause::User(failure.reason),
                        index,
                        started.elapsed(),
                        Some(Blame::Source(previous)),
                    ));
                }
            };

            let rows = match Batch::new(page).run().await {
                Ok(output) => output.data,
                Err(error) => {
                    return Err(PageError::new(
                        PageReason::BatchFailed,
                        PageCause::Batch(error),
                        index,
                        started.elapsed(),
                        None,
                    ))
                }
            };

            total += rows.len() as u64;

            if let Some(sink) = self.dest.as_mut() {
                let now = Instant::now();
                let delay = sink_prev.map(|prev| now.duration_since(prev));
                sink_prev = Some(now);

                let mixed = match sink(index, &rows, delay) {
                    Ok(mixed) => mixed,
                    Err(reason) => {
                        return Err(PageError::new(
                            PageReason::SinkThrew,
                            PageCause::User(reason),
                            index,
                            started.elapsed(),
                            Some(Blame::Dest(rows)),
                        ))
                    }
                };

                let resolution = resolve(mixed).await;
                delayed |= resolution.delayed;

                if let Err(failure) = resolution.outcome {
                    let reason = match failure.origin {
                        Origin::Rejected => PageReason::SinkRejected,
                        Origin::Thrown => PageReason::SinkThrew,
                    };
                    return Err(PageError::new(
                        reason,
                        PageCause::User(failure.reason),
                        index,
                        started.elapsed(),
                        Some(Blame::Dest(rows)),
                    ));
                }
            }

            previous = Some(rows);
            index += 1;

            if self.limit > 0 && index == self.limit {
                break;
            }

            if !delayed {
                yield_now().await;
            }
        }

        Ok(PageOutput {
            pages: index,
            total,
            duration: started.elapsed(),
        })
    }
}

/// Pulls and batches pages without a sink or a limit. Shorthand for
/// [`Page::new`] followed by [`Page::run`].
pub async fn page<T, E, S>(source: S) -> Result<PageOutput, PageError<T, E>>
where
    T: 'static,
    E: 'static,
    S: FnMut(
        u64,
        Option<&[Settled<T, E>]>,
        Option<Duration>,
    ) -> Result<Mixed<Option<Vec<Mixed<T, E>>>, E>, E>,
{
    Page::new(source).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::cell::RefCell;
    use std::rc::Rc;

    use crate::deferred::Deferred;

    fn two_pages(
        index: u64,
    ) -> Result<Mixed<Option<Vec<Mixed<u32, &'static str>>>, &'static str>, &'static str> {
        Ok(Mixed::value(match index {
            0 => Some(vec![Mixed::value(1), Mixed::value(2)]),
            1 => Some(vec![Mixed::value(3)]),
            _ => None,
        }))
    }

    #[test]
    fn pages_are_pulled_batched_and_counted() {
        pollster::block_on(async {
            let output = page(|index, _last, _delay| two_pages(index)).await.unwrap();
            assert_eq!(output.pages, 2);
            assert_eq!(output.total, 3);
        });
    }

    #[test]
    fn the_sink_receives_settled_rows_in_order() {
        pollster::block_on(async {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let observed = seen.clone();

            Page::new(|index, _last, _delay| two_pages(index))
                .dest(move |index, rows, delay| {
                    let values: Vec<u32> =
                        rows.iter().filter_map(|row| row.value().copied()).collect();
                    observed.borrow_mut().push((index, values, delay.is_none()));
                    Ok(Mixed::value(()))
                })
                .run()
                .await
                .unwrap();

            assert_eq!(
                *seen.borrow(),
                vec![(0, vec![1, 2], true), (1, vec![3], false)]
            );
        });
    }

    #[test]
    fn the_source_is_handed_the_previous_rows() {
        pollster::block_on(async {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let observed = seen.clone();

            page(move |index, last: Option<&[Settled<u32, &str>]>, _delay| {
                let previous: Option<Vec<u32>> = last.map(|rows| {
                    rows.iter().filter_map(|row| row.value().copied()).collect()
                });
                observed.borrow_mut().push(previous);
                two_pages(index)
            })
            .await
            .unwrap();

            assert_eq!(
                *seen.borrow(),
                vec![None, Some(vec![1, 2]), Some(vec![3])]
            );
        });
    }

    #[test]
    fn a_failed_batch_fails_the_run_with_the_aggregate_error() {
        pollster::block_on(async {
            let error = page(|index, _last, _delay| {
                Ok::<_, &str>(Mixed::value(match index {
                    0 => Some(vec![
                        Mixed::value(1),
                        Mixed::deferred(Deferred::rejected("bad")),
                    ]),
                    _ => None,
                }))
            })
            .await
            .unwrap_err();

            assert_eq!(error.code(), 0);
            assert_eq!(error.reason(), PageReason::BatchFailed);
            assert_eq!(error.index(), 0);
            assert!(error.blame().is_none());

            let batch = error.batch_error().unwrap();
            assert_eq!(batch.stat.failed, 1);
            assert_eq!(*batch.first(), "bad");
        });
    }

    #[test]
    fn source_and_sink_failures_carry_their_codes() {
        pollster::block_on(async {
            let error = page(|_index, _last: Option<&[Settled<u32, &str>]>, _delay| {
                Err::<Mixed<Option<Vec<Mixed<u32, &str>>>, _>, _>("broken source")
            })
            .await
            .unwrap_err();
            assert_eq!(error.code(), 1);
            assert_eq!(error.error(), Some(&"broken source"));

            let error = page(|_index, _last: Option<&[Settled<u32, &str>]>, _delay| {
                Ok::<_, &str>(Mixed::deferred(Deferred::rejected("rejected source")))
            })
            .await
            .unwrap_err();
            assert_eq!(error.code(), 2);

            let error = Page::new(|index, _last, _delay| two_pages(index))
                .dest(|_index, _rows, _delay| {
                    Ok(Mixed::deferred(Deferred::rejected("rejected sink")))
                })
                .run()
                .await
                .unwrap_err();
            assert_eq!(error.code(), 3);
            let blamed = error.blame().unwrap().dest().unwrap();
            assert_eq!(blamed.len(), 2);

            let error = Page::new(|index, _last, _delay| two_pages(index))
                .dest(|_index, _rows, _delay| Err("jammed sink"))
                .run()
                .await
                .unwrap_err();
            assert_eq!(error.code(), 4);
        });
    }

    #[test]
    fn limit_caps_the_pages() {
        pollster::block_on(async {
            let output = Page::new(|_index, _last, _delay| {
                Ok::<_, &str>(Mixed::value(Some(vec![Mixed::<u32, &str>::value(9)])))
            })
            .limit(3)
            .run()
            .await
            .unwrap();

            assert_eq!(output.pages, 3);
            assert_eq!(output.total, 3);
        });
    }
}
