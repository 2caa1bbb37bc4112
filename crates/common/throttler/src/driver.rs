use crate::ThrottledQueue;
use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::error;

/// The single consumer of a [`ThrottledQueue`].
///
/// Pops items in insertion order and hands them to the dispatch function,
/// sleeping `max(0, next_allowed - now)` between dispatches so that no two
/// items are dispatched within the configured interval.
///
/// A dispatch failure is logged and the driver moves on to the next item.
pub struct QueueDriver<T, F> {
    queue: ThrottledQueue<T>,
    interval: Duration,
    dispatch: F,
}

impl<T, F> QueueDriver<T, F> {
    pub fn new(queue: ThrottledQueue<T>, interval: Duration, dispatch: F) -> QueueDriver<T, F> {
        QueueDriver {
            queue,
            interval,
            dispatch,
        }
    }

    /// Dispatch queued items until the driving task is dropped.
    pub async fn run<E>(mut self)
    where
        F: FnMut(T) -> Result<(), E>,
        E: Display,
    {
        let mut next_allowed = Instant::now();

        loop {
            self.queue.non_empty().await;
            sleep_until(next_allowed).await;

            // The queue may have been cleared while pacing.
            let Some(item) = self.queue.pop() else {
                continue;
            };

            if let Err(err) = (self.dispatch)(item) {
                error!("Failed to dispatch queued item: {err}");
            }
            next_allowed = Instant::now() + self.interval;
        }
    }
}
