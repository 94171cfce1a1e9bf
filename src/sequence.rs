use core::time::Duration;
use std::time::Instant;

use crate::errors::{Blame, SequenceError, SequenceReason};
use crate::mixed::Mixed;
use crate::resolve::{resolve, Origin};
use crate::yield_now::yield_now;

/// The successful result of a [`Sequence`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOutput<T> {
    /// How many values the sequence produced before completing.
    pub total: u64,
    /// Wall-clock time from the start of the run to completion.
    pub duration: Duration,
    /// The produced values, in order; `Some` exactly when
    /// [tracking](Sequence::track) was requested.
    pub data: Option<Vec<T>>,
}

type SinkFn<T, E> = Box<dyn FnMut(u64, &T, Option<Duration>) -> Result<Mixed<(), E>, E>>;

/// Pulls values out of a source callback one at a time, optionally feeding
/// each through a sink, until the source signals completion or a configured
/// limit is reached.
///
/// On each iteration the source is called with the iteration index, the
/// previously produced value (`None` on the first call), and the wall-clock
/// time since the previous source call started (`None` on the first call).
/// The returned mixed value is resolved; `None` completes the run. Passing
/// the previous value back makes linked sequencing the default; a source
/// that ignores its second argument is a detached sequence.
///
/// At most one source call and at most one sink call is in flight at any
/// moment, so a slow sink back-pressures the source naturally. When an
/// iteration resolved without awaiting any deferred, the driver yields to
/// the executor once before the next iteration, so a long purely-synchronous
/// run cannot starve sibling tasks.
///
/// ```
/// use settle::{Mixed, Sequence};
///
/// pollster::block_on(async {
///     let output = Sequence::new(|index, _last: Option<&u64>, _delay| {
///         Ok::<_, &str>(Mixed::value(if index < 3 { Some(index) } else { None }))
///     })
///     .run()
///     .await
///     .unwrap();
///
///     assert_eq!(output.total, 3);
///     assert_eq!(output.data, None);
/// });
/// ```
#[must_use = "drivers are lazy and do nothing unless run"]
pub struct Sequence<T, E, S> {
    source: S,
    dest: Option<SinkFn<T, E>>,
    limit: u64,
    tracked: Option<(Vec<T>, fn(&T) -> T)>,
}

impl<T, E, S> Sequence<T, E, S>
where
    T: 'static,
    E: 'static,
    S: FnMut(u64, Option<&T>, Option<Duration>) -> Result<Mixed<Option<T>, E>, E>,
{
    /// Creates a sequence over a source callback.
    pub fn new(source: S) -> Self {
        Sequence {
            source,
            dest: None,
            limit: 0,
            tracked: None,
        }
    }

    /// Installs a sink, called with each produced value before the next
    /// source call, with its own inter-call delay measurement. The sink's
    /// returned mixed value is resolved before the run proceeds; anything it
    /// resolves to is ignored.
    pub fn dest(
        mut self,
        sink: impl FnMut(u64, &T, Option<Duration>) -> Result<Mixed<(), E>, E> + 'static,
    ) -> Self {
        self.dest = Some(Box::new(sink));
        self
    }

    /// Caps the number of iterations. Zero, the default, means unlimited.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Collects every produced value into the output.
    pub fn track(mut self) -> Self
    where
        T: Clone,
    {
        self.tracked = Some((Vec::new(), T::clone));
        self
    }

    /// Runs the sequence to completion or to its first failure.
    pub async fn run(mut self) -> Result<SequenceOutput<T>, SequenceError<T, E>> {
        let started = Instant::now();
        let mut index: u64 = 0;
        let mut last: Option<T> = None;
        let mut source_prev: Option<Instant> = None;
        let mut sink_prev: Option<Instant> = None;

        loop {
            let now = Instant::now();
            let delay = source_prev.map(|prev| now.duration_since(prev));
            source_prev = Some(now);

            let mixed = match (self.source)(index, last.as_ref(), delay) {
                Ok(mixed) => mixed,
                Err(reason) => {
                    return Err(SequenceError::new(
                        SequenceReason::SourceThrew,
                        reason,
                        index,
                        started.elapsed(),
                        Blame::Source(last),
                    ))
                }
            };

            let resolution = resolve(mixed).await;
            let mut delayed = resolution.delayed;

            let value = match resolution.outcome {
                Ok(Some(value)) => value,
                Ok(None) => break,
                Err(failure) => {
                    let reason = match failure.origin {
                        Origin::Rejected => SequenceReason::SourceRejected,
                        Origin::Thrown => SequenceReason::SourceThrew,
                    };
                    return Err(SequenceError::new(
                        reason,
                        failure.reason,
                        index,
                        started.elapsed(),
                        Blame::Source(last),
                    ));
                }
            };

            if let Some((items, clone)) = self.tracked.as_mut() {
                items.push(clone(&value));
            }

            if let Some(sink) = self.dest.as_mut() {
                let now = Instant::now();
                let delay = sink_prev.map(|prev| now.duration_since(prev));
                sink_prev = Some(now);

                let mixed = match sink(index, &value, delay) {
                    Ok(mixed) => mixed,
                    Err(reason) => {
                        return Err(SequenceError::new(
                            SequenceReason::SinkThrew,
                            reason,
                            index,
                            started.elapsed(),
                            Blame::Dest(value),
                        ))
                    }
                };

                let resolution = resolve(mixed).await;
                delayed |= resolution.delayed;

                if let Err(failure) = resolution.outcome {
                    let reason = match failure.origin {
                        Origin::Rejected => SequenceReason::SinkRejected,
                        Origin::Thrown => SequenceReason::SinkThrew,
                    };
                    return Err(SequenceError::new(
                        reason,
                        failure.reason,
                        index,
                        started.elapsed(),
                        Blame::Dest(value),
                    ));
                }
            }

            last = Some(value);
            index += 1;

            if self.limit > 0 && index == self.limit {
                break;
            }

            if !delayed {
                yield_now().await;
            }
        }

        Ok(SequenceOutput {
            total: index,
            duration: started.elapsed(),
            data: self.tracked.map(|(items, _)| items),
        })
    }
}

/// Pulls a source to completion without a sink, a limit, or tracking.
/// Shorthand for [`Sequence::new`] followed by [`Sequence::run`].
pub async fn sequence<T, E, S>(source: S) -> Result<SequenceOutput<T>, SequenceError<T, E>>
where
    T: 'static,
    E: 'static,
    S: FnMut(u64, Option<&T>, Option<Duration>) -> Result<Mixed<Option<T>, E>, E>,
{
    Sequence::new(source).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::cell::RefCell;
    use std::rc::Rc;

    use futures::task::LocalSpawnExt;

    use crate::deferred::Deferred;

    fn counting_source(
        until: u64,
    ) -> impl FnMut(u64, Option<&u64>, Option<Duration>) -> Result<Mixed<Option<u64>, &'static str>, &'static str>
    {
        move |index, _last, _delay| {
            Ok(Mixed::value(if index < until { Some(index) } else { None }))
        }
    }

    #[test]
    fn completes_when_the_source_returns_none() {
        pollster::block_on(async {
            let output = sequence(counting_source(3)).await.unwrap();
            assert_eq!(output.total, 3);
            assert_eq!(output.data, None);
        });
    }

    #[test]
    fn tracking_collects_the_values() {
        pollster::block_on(async {
            let output = Sequence::new(counting_source(3)).track().run().await.unwrap();
            assert_eq!(output.total, 3);
            assert_eq!(output.data, Some(vec![0, 1, 2]));
        });
    }

    #[test]
    fn limit_caps_the_source_calls() {
        pollster::block_on(async {
            let calls = Rc::new(RefCell::new(0u64));
            let observed = calls.clone();

            let output = Sequence::new(move |_index, _last: Option<&u64>, _delay| {
                *observed.borrow_mut() += 1;
                Ok::<_, &str>(Mixed::value(Some(1)))
            })
            .limit(5)
            .run()
            .await
            .unwrap();

            assert_eq!(output.total, 5);
            assert_eq!(*calls.borrow(), 5);
        });
    }

    #[test]
    fn indices_increase_without_gaps_and_link_the_previous_value() {
        pollster::block_on(async {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let observed = seen.clone();

            Sequence::new(move |index, last: Option<&u64>, delay| {
                observed
                    .borrow_mut()
                    .push((index, last.copied(), delay.is_none()));
                Ok::<_, &str>(Mixed::value(if index < 3 { Some(index * 10) } else { None }))
            })
            .run()
            .await
            .unwrap();

            assert_eq!(
                *seen.borrow(),
                vec![
                    (0, None, true),
                    (1, Some(0), false),
                    (2, Some(10), false),
                    (3, Some(20), false),
                ]
            );
        });
    }

    #[test]
    fn sink_observes_each_value_with_its_own_delays() {
        pollster::block_on(async {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let observed = seen.clone();

            Sequence::new(counting_source(2))
                .dest(move |index, value, delay| {
                    observed.borrow_mut().push((index, *value, delay.is_none()));
                    Ok(Mixed::value(()))
                })
                .run()
                .await
                .unwrap();

            assert_eq!(*seen.borrow(), vec![(0, 0, true), (1, 1, false)]);
        });
    }

    #[test]
    fn source_failures_carry_the_reason_code_and_context() {
        pollster::block_on(async {
            // A rejection surfaced through a deferred is code 0.
            let error = sequence(|index, _last: Option<&u64>, _delay| {
                Ok::<_, &str>(if index == 0 {
                    Mixed::value(Some(7))
                } else {
                    Mixed::deferred(Deferred::rejected("worn out"))
                })
            })
            .await
            .unwrap_err();

            assert_eq!(error.code(), 0);
            assert_eq!(error.reason(), SequenceReason::SourceRejected);
            assert_eq!(error.index(), 1);
            assert_eq!(*error.error(), "worn out");
            assert_eq!(error.blame().source(), Some(Some(&7)));

            // A source failing outright is code 1.
            let error = sequence(|_index, _last: Option<&u64>, _delay| {
                Err::<Mixed<Option<u64>, _>, _>("dead on arrival")
            })
            .await
            .unwrap_err();

            assert_eq!(error.code(), 1);
            assert_eq!(error.blame().source(), Some(None));
        });
    }

    #[test]
    fn sink_failures_carry_the_reason_code_and_value() {
        pollster::block_on(async {
            let error = Sequence::new(counting_source(3))
                .dest(|_index, _value, _delay| {
                    Ok(Mixed::deferred(Deferred::rejected("full")))
                })
                .run()
                .await
                .unwrap_err();

            assert_eq!(error.code(), 2);
            assert_eq!(error.blame().dest(), Some(&0));

            let error = Sequence::new(counting_source(3))
                .dest(|_index, _value, _delay| Err("jammed"))
                .run()
                .await
                .unwrap_err();

            assert_eq!(error.code(), 3);
            assert_eq!(error.index(), 0);
        });
    }

    #[test]
    fn delays_reflect_wall_clock_time() {
        smol::block_on(async {
            let delays = Rc::new(RefCell::new(Vec::new()));
            let observed = delays.clone();

            Sequence::new(move |index, _last: Option<&u64>, delay| {
                observed.borrow_mut().push(delay);
                Ok::<_, &str>(if index < 2 {
                    Mixed::future(async move {
                        smol::Timer::after(Duration::from_millis(5)).await;
                        Ok(Some(index))
                    })
                } else {
                    Mixed::value(None)
                })
            })
            .run()
            .await
            .unwrap();

            let delays = delays.borrow();
            assert_eq!(delays[0], None);
            assert!(delays[1].unwrap() >= Duration::from_millis(5));
            assert!(delays[2].unwrap() >= Duration::from_millis(5));
        });
    }

    #[test]
    fn a_long_synchronous_run_stays_iterative() {
        pollster::block_on(async {
            let output = Sequence::new(|_index, _last: Option<&u64>, _delay| {
                Ok::<_, &str>(Mixed::value(Some(1)))
            })
            .limit(1_000_000)
            .run()
            .await
            .unwrap();

            assert_eq!(output.total, 1_000_000);
        });
    }

    #[test]
    fn synchronous_iterations_yield_to_sibling_tasks() {
        let mut pool = futures::executor::LocalPool::new();
        let spawner = pool.spawner();

        let ticks = Rc::new(RefCell::new(0u64));

        let observed = ticks.clone();
        spawner
            .spawn_local(async move {
                for _ in 0..16 {
                    *observed.borrow_mut() += 1;
                    yield_now().await;
                }
            })
            .unwrap();

        let interleavings = Rc::new(RefCell::new(0u64));
        let seen = ticks.clone();
        let counted = interleavings.clone();
        spawner
            .spawn_local(async move {
                let mut previous = 0;
                Sequence::new(move |index, _last: Option<&u64>, _delay| {
                    let ticks = *seen.borrow();
                    if ticks > previous {
                        *counted.borrow_mut() += 1;
                        previous = ticks;
                    }
                    Ok::<_, &str>(Mixed::value(if index < 64 { Some(1) } else { None }))
                })
                .run()
                .await
                .unwrap();
            })
            .unwrap();

        pool.run();

        // The sibling task made progress while the purely-synchronous
        // sequence was running, which is only possible if the driver
        // yielded between iterations.
        assert!(*interleavings.borrow() > 0);
    }
}
