use core::pin::Pin;
use core::task::Poll;
use core::time::Duration;
use std::time::Instant;

use either::Either::{Left, Right};
use futures::io::AsyncBufRead;
use wrapper::Wrapper;

use crate::errors::{ReadCause, ReadError};
use crate::mixed::Mixed;
use crate::resolve::{resolve, Failure, Origin};

/// The successful result of a [`Read`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutput {
    /// How many times the receiver was invoked.
    pub calls: u64,
    /// How many underlying reads produced data.
    pub reads: u64,
    /// How many chunks were handed to the receiver across all calls.
    pub length: u64,
    /// Wall-clock time from the start of the run to completion.
    pub duration: Duration,
}

type ReceiverFn<E> = Box<dyn FnMut(u64, Vec<Vec<u8>>, Option<Duration>) -> Result<Mixed<(), E>, E>>;

/// Drains an asynchronous reader through a receiver callback, honouring
/// asynchronous back-pressure.
///
/// Whatever the reader has buffered is drained greedily, without waiting,
/// into a batch of chunks; each underlying read contributes one chunk,
/// capped at [`read_size`](Read::read_size) bytes when set. The receiver is
/// invoked once per batch with the call index, the chunks, and the time
/// since the previous call started. No reading happens while the receiver's
/// returned mixed value is resolving, so a slow receiver slows the draining
/// down to its own pace. The run completes at the end of the stream and
/// fails on the first reader or receiver failure.
///
/// ```
/// use settle::{Mixed, Read};
///
/// pollster::block_on(async {
///     let reader = futures::io::Cursor::new(b"tofu".to_vec());
///     let output = Read::new(reader, |_index, chunks: Vec<Vec<u8>>, _delay| {
///         assert_eq!(chunks, vec![b"tofu".to_vec()]);
///         Ok::<_, &str>(Mixed::value(()))
///     })
///     .run()
///     .await
///     .unwrap();
///
///     assert_eq!(output.calls, 1);
///     assert_eq!(output.length, 1);
/// });
/// ```
#[must_use = "drivers are lazy and do nothing unless run"]
pub struct Read<R, E> {
    reader: R,
    receiver: ReceiverFn<E>,
    read_size: Option<usize>,
}

impl<R, E> Read<R, E>
where
    R: AsyncBufRead + Unpin,
    E: 'static,
{
    /// Creates a read driver over a reader and a receiver callback.
    pub fn new(
        reader: R,
        receiver: impl FnMut(u64, Vec<Vec<u8>>, Option<Duration>) -> Result<Mixed<(), E>, E>
            + 'static,
    ) -> Self {
        Read {
            reader,
            receiver: Box::new(receiver),
            read_size: None,
        }
    }

    /// Caps each chunk at `read_size` bytes per underlying read. Without a
    /// cap, and for a `read_size` of zero, each read contributes whatever
    /// the reader had buffered.
    pub fn read_size(mut self, read_size: usize) -> Self {
        self.read_size = (read_size > 0).then_some(read_size);
        self
    }

    /// Runs the driver until the end of the stream or its first failure.
    pub async fn run(mut self) -> Result<ReadOutput, ReadError<E>> {
        let started = Instant::now();
        let mut calls: u64 = 0;
        let mut reads: u64 = 0;
        let mut length: u64 = 0;
        let mut receiver_prev: Option<Instant> = None;

        loop {
            let chunks = match fill_chunks(&mut self.reader, self.read_size, &mut reads).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    return Err(ReadError::new(
                        ReadCause::Reader(err),
                        calls,
                        reads,
                        started.elapsed(),
                    ))
                }
            };
            if chunks.is_empty() {
                break;
            }
            length += chunks.len() as u64;

            let now = Instant::now();
            let delay = receiver_prev.map(|prev| now.duration_since(prev));
            receiver_prev = Some(now);

            let index = calls;
            calls += 1;

            let mixed = match (self.receiver)(index, chunks, delay) {
                Ok(mixed) => mixed,
                Err(reason) => {
                    return Err(ReadError::new(
                        ReadCause::Receiver(Failure {
                            reason,
                            origin: Origin::Thrown,
                        }),
                        calls,
                        reads,
                        started.elapsed(),
                    ))
                }
            };

            if let Err(failure) = resolve(mixed).await.outcome {
                return Err(ReadError::new(
                    ReadCause::Receiver(failure),
                    calls,
                    reads,
                    started.elapsed(),
                ));
            }
        }

        Ok(ReadOutput {
            calls,
            reads,
            length,
            duration: started.elapsed(),
        })
    }
}

impl<R, E> Wrapper<R> for Read<R, E> {
    fn into_inner(self) -> R {
        self.reader
    }
}

impl<R, E> AsRef<R> for Read<R, E> {
    fn as_ref(&self) -> &R {
        &self.reader
    }
}

impl<R, E> AsMut<R> for Read<R, E> {
    fn as_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

/// Collects the chunks for one receiver call: everything the reader has
/// buffered right now, or, when nothing is buffered yet, waits for data.
/// Returns an empty vector at the end of the stream.
async fn fill_chunks<R>(
    reader: &mut R,
    read_size: Option<usize>,
    reads: &mut u64,
) -> Result<Vec<Vec<u8>>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut chunks: Vec<Vec<u8>> = Vec::new();

    futures::future::poll_fn(|cx| {
        loop {
            let filled = match Pin::new(&mut *reader).poll_fill_buf(cx) {
                Poll::Pending => {
                    return if chunks.is_empty() {
                        Poll::Pending
                    } else {
                        Poll::Ready(Ok(()))
                    };
                }
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Ready(Ok(buffered)) => {
                    if buffered.is_empty() {
                        Right(())
                    } else {
                        let taken = read_size.map_or(buffered.len(), |cap| cap.min(buffered.len()));
                        Left((buffered[..taken].to_vec(), taken))
                    }
                }
            };

            match filled {
                Left((chunk, taken)) => {
                    chunks.push(chunk);
                    *reads += 1;
                    Pin::new(&mut *reader).consume(taken);
                }
                Right(()) => return Poll::Ready(Ok(())),
            }
        }
    })
    .await?;

    Ok(chunks)
}

/// Drains a reader through a receiver without a chunk size cap. Shorthand
/// for [`Read::new`] followed by [`Read::run`].
pub async fn read<R, E>(
    reader: R,
    receiver: impl FnMut(u64, Vec<Vec<u8>>, Option<Duration>) -> Result<Mixed<(), E>, E> + 'static,
) -> Result<ReadOutput, ReadError<E>>
where
    R: AsyncBufRead + Unpin,
    E: 'static,
{
    Read::new(reader, receiver).run().await
}
