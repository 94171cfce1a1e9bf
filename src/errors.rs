use core::error::Error;
use core::fmt::{self, Debug, Display};
use core::time::Duration;

use crate::batch::{BatchStats, Settled};
use crate::resolve::{Failure, Origin};

/// What actually failed inside a failed [read](crate::Read) run.
#[derive(Debug)]
pub enum ReadCause<E> {
    /// The reader failed while chunks were being collected.
    Reader(std::io::Error),
    /// The receiver failed, outright or by resolving with a rejected
    /// deferred; the carried [`Failure`] records which.
    Receiver(Failure<E>),
}

/// The error of a failed [read](crate::Read) run.
#[derive(Debug)]
pub struct ReadError<E> {
    cause: ReadCause<E>,
    calls: u64,
    reads: u64,
    duration: Duration,
}

impl<E> ReadError<E> {
    pub(crate) fn new(cause: ReadCause<E>, calls: u64, reads: u64, duration: Duration) -> Self {
        ReadError {
            cause,
            calls,
            reads,
            duration,
        }
    }

    /// What actually failed.
    pub fn cause(&self) -> &ReadCause<E> {
        &self.cause
    }

    /// The underlying receiver failure, unless the reader was at fault.
    pub fn error(&self) -> Option<&E> {
        match &self.cause {
            ReadCause::Receiver(failure) => Some(&failure.reason),
            ReadCause::Reader(_) => None,
        }
    }

    /// The underlying reader failure, unless the receiver was at fault.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match &self.cause {
            ReadCause::Reader(err) => Some(err),
            ReadCause::Receiver(_) => None,
        }
    }

    /// How many receiver calls had been made when the run failed, including
    /// the failing one when the receiver was at fault.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// How many underlying reads had produced data when the run failed.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Wall-clock time from the start of the run to the failure.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn phrase(&self) -> &'static str {
        match &self.cause {
            ReadCause::Reader(_) => "the reader failed",
            ReadCause::Receiver(failure) => match failure.origin {
                Origin::Thrown => "the receiver threw an error",
                Origin::Rejected => "the receiver resolved with a rejected deferred",
            },
        }
    }

    /// A multi-line rendering, indented by four spaces per `level`.
    pub fn indented(&self, level: usize) -> impl Display + '_
    where
        E: Display,
    {
        IndentedRead {
            error: self,
            level,
        }
    }
}

impl<E> Display for ReadError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reading failed: {}", self.phrase())
    }
}

impl<E> Error for ReadError<E>
where
    E: 'static + Error,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            ReadCause::Reader(err) => Some(err),
            ReadCause::Receiver(failure) => Some(&failure.reason),
        }
    }
}

struct IndentedRead<'a, E> {
    error: &'a ReadError<E>,
    level: usize,
}

impl<E: Display> Display for IndentedRead<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        indent(f, self.level)?;
        writeln!(f, "{}", self.error)?;
        indent(f, self.level + 1)?;
        match &self.error.cause {
            ReadCause::Reader(err) => write!(f, "{err}"),
            ReadCause::Receiver(failure) => write!(f, "{}", failure.reason),
        }
    }
}

/// Which collaborator of a driver failed, together with the data that
/// collaborator was handed.
///
/// Storing this as a sum makes "exactly one of source/dest is populated" a
/// structural fact rather than a convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blame<D> {
    /// The source failed. Carries the previous data it was called with,
    /// which is absent on the very first call.
    Source(Option<D>),
    /// The sink failed. Carries the data it was asked to consume.
    Dest(D),
}

impl<D> Blame<D> {
    /// The data context of a failing source, if the source is to blame.
    pub fn source(&self) -> Option<Option<&D>> {
        match self {
            Blame::Source(data) => Some(data.as_ref()),
            Blame::Dest(_) => None,
        }
    }

    /// The data context of a failing sink, if the sink is to blame.
    pub fn dest(&self) -> Option<&D> {
        match self {
            Blame::Source(_) => None,
            Blame::Dest(data) => Some(data),
        }
    }
}

/// Why a [sequence](crate::Sequence) failed. The numeric codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceReason {
    /// The source resolved with a rejected deferred.
    SourceRejected,
    /// The source failed outright.
    SourceThrew,
    /// The sink resolved with a rejected deferred.
    SinkRejected,
    /// The sink failed outright.
    SinkThrew,
}

impl SequenceReason {
    /// The stable numeric code of this reason.
    pub const fn code(self) -> u8 {
        match self {
            SequenceReason::SourceRejected => 0,
            SequenceReason::SourceThrew => 1,
            SequenceReason::SinkRejected => 2,
            SequenceReason::SinkThrew => 3,
        }
    }

    /// The fixed human-readable phrase for this reason.
    pub const fn phrase(self) -> &'static str {
        match self {
            SequenceReason::SourceRejected => "the source resolved with a rejected deferred",
            SequenceReason::SourceThrew => "the source threw an error",
            SequenceReason::SinkRejected => "the sink resolved with a rejected deferred",
            SequenceReason::SinkThrew => "the sink threw an error",
        }
    }
}

impl Display for SequenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

/// Why a [page](crate::Page) run failed. The numeric codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageReason {
    /// Batching the page failed.
    BatchFailed,
    /// The source failed outright.
    SourceThrew,
    /// The source resolved with a rejected deferred.
    SourceRejected,
    /// The sink resolved with a rejected deferred.
    SinkRejected,
    /// The sink failed outright.
    SinkThrew,
}

impl PageReason {
    /// The stable numeric code of this reason.
    pub const fn code(self) -> u8 {
        match self {
            PageReason::BatchFailed => 0,
            PageReason::SourceThrew => 1,
            PageReason::SourceRejected => 2,
            PageReason::SinkRejected => 3,
            PageReason::SinkThrew => 4,
        }
    }

    /// The fixed human-readable phrase for this reason.
    pub const fn phrase(self) -> &'static str {
        match self {
            PageReason::BatchFailed => "the batch for the page failed",
            PageReason::SourceThrew => "the source threw an error",
            PageReason::SourceRejected => "the source resolved with a rejected deferred",
            PageReason::SinkRejected => "the sink resolved with a rejected deferred",
            PageReason::SinkThrew => "the sink threw an error",
        }
    }
}

impl Display for PageReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

/// The aggregate error of a [batch](crate::Batch) run: every row settled,
/// at least one failed.
///
/// The row vector is index-aligned with the batched input, so callers can
/// correlate failures with what they submitted.
#[derive(Debug)]
pub struct BatchError<T, E> {
    /// The settled rows, ordered by input index.
    pub data: Vec<Settled<T, E>>,
    /// Aggregate statistics of the run.
    pub stat: BatchStats,
}

impl<T, E> BatchError<T, E> {
    pub(crate) fn new(data: Vec<Settled<T, E>>, stat: BatchStats) -> Self {
        BatchError { data, stat }
    }

    /// The reason of the first failed row.
    pub fn first(&self) -> &E {
        self.errors()
            .next()
            .expect("a batch error always carries at least one failed row")
    }

    /// The reasons of all failed rows, in input order.
    pub fn errors(&self) -> impl Iterator<Item = &E> {
        self.data.iter().filter_map(|row| row.result.as_ref().err())
    }

    /// A multi-line rendering, indented by four spaces per `level`, listing
    /// every failed row.
    pub fn indented(&self, level: usize) -> impl Display + '_
    where
        E: Display,
    {
        IndentedBatch {
            error: self,
            level,
        }
    }
}

impl<T, E: Display> Display for BatchError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} batched values failed to settle: {}",
            self.stat.failed,
            self.stat.total,
            self.first()
        )
    }
}

impl<T, E> Error for BatchError<T, E>
where
    T: Debug,
    E: 'static + Error,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.first())
    }
}

struct IndentedBatch<'a, T, E> {
    error: &'a BatchError<T, E>,
    level: usize,
}

impl<T, E: Display> Display for IndentedBatch<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        indent(f, self.level)?;
        write!(
            f,
            "batch failed ({} of {} values):",
            self.error.stat.failed, self.error.stat.total
        )?;
        for (index, row) in self.error.data.iter().enumerate() {
            if let Err(reason) = &row.result {
                writeln!(f)?;
                indent(f, self.level + 1)?;
                write!(f, "at index {index}: {reason}")?;
            }
        }
        Ok(())
    }
}

/// The error of a failed [sequence](crate::Sequence) run.
#[derive(Debug)]
pub struct SequenceError<T, E> {
    reason: SequenceReason,
    error: E,
    index: u64,
    duration: Duration,
    blame: Blame<T>,
}

impl<T, E> SequenceError<T, E> {
    pub(crate) fn new(
        reason: SequenceReason,
        error: E,
        index: u64,
        duration: Duration,
        blame: Blame<T>,
    ) -> Self {
        SequenceError {
            reason,
            error,
            index,
            duration,
            blame,
        }
    }

    /// Why the run failed.
    pub fn reason(&self) -> SequenceReason {
        self.reason
    }

    /// The stable numeric code of [`reason`](SequenceError::reason).
    pub fn code(&self) -> u8 {
        self.reason.code()
    }

    /// The underlying failure.
    pub fn error(&self) -> &E {
        &self.error
    }

    /// Consumes the error, returning the underlying failure.
    pub fn into_error(self) -> E {
        self.error
    }

    /// The iteration that failed.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Wall-clock time from the start of the run to the failure.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Which collaborator failed, with its data context.
    pub fn blame(&self) -> &Blame<T> {
        &self.blame
    }

    /// A multi-line rendering, indented by four spaces per `level`.
    pub fn indented(&self, level: usize) -> impl Display + '_
    where
        E: Display,
    {
        IndentedSequence {
            error: self,
            level,
        }
    }
}

impl<T, E: Display> Display for SequenceError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sequence iteration {} failed: {}",
            self.index, self.reason
        )
    }
}

impl<T, E> Error for SequenceError<T, E>
where
    T: Debug,
    E: 'static + Error,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

struct IndentedSequence<'a, T, E> {
    error: &'a SequenceError<T, E>,
    level: usize,
}

impl<T, E: Display> Display for IndentedSequence<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        indent(f, self.level)?;
        writeln!(f, "{}", self.error)?;
        indent(f, self.level + 1)?;
        write!(f, "{}", self.error.error)
    }
}

/// What actually failed inside a failed [page](crate::Page) run.
#[derive(Debug)]
pub enum PageCause<T, E> {
    /// Batching the page failed; the aggregate error has the per-row detail.
    Batch(BatchError<T, E>),
    /// A source or sink failed with a user error.
    User(E),
}

/// The error of a failed [page](crate::Page) run.
#[derive(Debug)]
pub struct PageError<T, E> {
    reason: PageReason,
    cause: PageCause<T, E>,
    index: u64,
    duration: Duration,
    blame: Option<Blame<Vec<Settled<T, E>>>>,
}

impl<T, E> PageError<T, E> {
    pub(crate) fn new(
        reason: PageReason,
        cause: PageCause<T, E>,
        index: u64,
        duration: Duration,
        blame: Option<Blame<Vec<Settled<T, E>>>>,
    ) -> Self {
        PageError {
            reason,
            cause,
            index,
            duration,
            blame,
        }
    }

    /// Why the run failed.
    pub fn reason(&self) -> PageReason {
        self.reason
    }

    /// The stable numeric code of [`reason`](PageError::reason).
    pub fn code(&self) -> u8 {
        self.reason.code()
    }

    /// What actually failed.
    pub fn cause(&self) -> &PageCause<T, E> {
        &self.cause
    }

    /// The underlying user failure, unless the cause was a failed batch.
    pub fn error(&self) -> Option<&E> {
        match &self.cause {
            PageCause::User(error) => Some(error),
            PageCause::Batch(_) => None,
        }
    }

    /// The aggregate batch error, if the cause was a failed batch.
    pub fn batch_error(&self) -> Option<&BatchError<T, E>> {
        match &self.cause {
            PageCause::Batch(error) => Some(error),
            PageCause::User(_) => None,
        }
    }

    /// The page that failed.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Wall-clock time from the start of the run to the failure.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Which collaborator failed, with the rows it was handed. `None` when
    /// the cause was a failed batch, which has its own per-row detail.
    pub fn blame(&self) -> Option<&Blame<Vec<Settled<T, E>>>> {
        self.blame.as_ref()
    }

    /// A multi-line rendering, indented by four spaces per `level`. A batch
    /// cause is rendered recursively one level deeper.
    pub fn indented(&self, level: usize) -> impl Display + '_
    where
        E: Display,
    {
        IndentedPage {
            error: self,
            level,
        }
    }
}

impl<T, E: Display> Display for PageError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} failed: {}", self.index, self.reason)
    }
}

impl<T, E> Error for PageError<T, E>
where
    T: Debug + 'static,
    E: 'static + Error,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            PageCause::Batch(error) => Some(error),
            PageCause::User(error) => Some(error),
        }
    }
}

struct IndentedPage<'a, T, E> {
    error: &'a PageError<T, E>,
    level: usize,
}

impl<T, E: Display> Display for IndentedPage<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        indent(f, self.level)?;
        writeln!(f, "{}", self.error)?;
        match &self.error.cause {
            PageCause::Batch(batch) => write!(f, "{}", batch.indented(self.level + 1)),
            PageCause::User(error) => {
                indent(f, self.level + 1)?;
                write!(f, "{error}")
            }
        }
    }
}

fn indent(f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
    for _ in 0..level {
        f.write_str("    ")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_rows() -> Vec<Settled<u32, &'static str>> {
        vec![
            Settled {
                result: Ok(1),
                origin: None,
            },
            Settled {
                result: Err("bad"),
                origin: Some(Origin::Rejected),
            },
        ]
    }

    fn stats() -> BatchStats {
        BatchStats {
            total: 2,
            succeeded: 1,
            failed: 1,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(SequenceReason::SourceRejected.code(), 0);
        assert_eq!(SequenceReason::SourceThrew.code(), 1);
        assert_eq!(SequenceReason::SinkRejected.code(), 2);
        assert_eq!(SequenceReason::SinkThrew.code(), 3);

        assert_eq!(PageReason::BatchFailed.code(), 0);
        assert_eq!(PageReason::SourceThrew.code(), 1);
        assert_eq!(PageReason::SourceRejected.code(), 2);
        assert_eq!(PageReason::SinkRejected.code(), 3);
        assert_eq!(PageReason::SinkThrew.code(), 4);
    }

    #[test]
    fn batch_error_reports_the_first_failure() {
        let error = BatchError::new(failed_rows(), stats());
        assert_eq!(*error.first(), "bad");
        assert_eq!(error.errors().collect::<Vec<_>>(), vec![&"bad"]);
        assert_eq!(
            error.to_string(),
            "1 of 2 batched values failed to settle: bad"
        );
    }

    #[test]
    fn batch_error_indented_lists_failed_rows() {
        let error = BatchError::new(failed_rows(), stats());
        assert_eq!(
            error.indented(0).to_string(),
            "batch failed (1 of 2 values):\n    at index 1: bad"
        );
        assert_eq!(
            error.indented(1).to_string(),
            "    batch failed (1 of 2 values):\n        at index 1: bad"
        );
    }

    #[test]
    fn sequence_error_renders_with_its_cause() {
        let error = SequenceError::<u32, &str>::new(
            SequenceReason::SinkThrew,
            "boom",
            3,
            Duration::ZERO,
            Blame::Dest(7),
        );
        assert_eq!(
            error.to_string(),
            "sequence iteration 3 failed: the sink threw an error"
        );
        assert_eq!(
            error.indented(0).to_string(),
            "sequence iteration 3 failed: the sink threw an error\n    boom"
        );
        assert_eq!(error.blame().dest(), Some(&7));
        assert_eq!(error.blame().source(), None);
    }

    #[test]
    fn read_error_renders_with_its_cause() {
        let error = ReadError::new(
            ReadCause::Receiver(Failure {
                reason: "refused",
                origin: Origin::Rejected,
            }),
            2,
            5,
            Duration::ZERO,
        );
        assert_eq!(
            error.to_string(),
            "reading failed: the receiver resolved with a rejected deferred"
        );
        assert_eq!(
            error.indented(1).to_string(),
            "    reading failed: the receiver resolved with a rejected deferred\n        refused"
        );
        assert_eq!(error.error(), Some(&"refused"));
        assert!(error.io_error().is_none());
        assert_eq!(error.calls(), 2);
        assert_eq!(error.reads(), 5);
    }

    #[test]
    fn page_error_nests_a_batch_cause() {
        let error = PageError::new(
            PageReason::BatchFailed,
            PageCause::Batch(BatchError::new(failed_rows(), stats())),
            0,
            Duration::ZERO,
            None,
        );
        assert_eq!(
            error.indented(0).to_string(),
            "page 0 failed: the batch for the page failed\n    batch failed (1 of 2 values):\n        at index 1: bad"
        );
        assert!(error.blame().is_none());
        assert!(error.error().is_none());
        assert!(error.batch_error().is_some());
    }
}
