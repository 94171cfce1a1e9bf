use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

// Heavily inspired by https://docs.rs/async-std/latest/src/async_std/task/yield_now.rs.html

/// Yields to the executor exactly once.
///
/// The drivers await this between iterations whose resolutions were purely
/// synchronous, so that an uninterrupted run of synchronous values cannot
/// monopolise a single-threaded executor.
pub(crate) async fn yield_now() {
    YieldNow { yielded: false }.await
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    // Single-threaded executors run their tasks as a FIFO queue, so all this
    // future does is re-schedule itself to the back of the queue, giving room
    // for sibling tasks to progress.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.yielded {
            Poll::Ready(())
        } else {
            this.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
