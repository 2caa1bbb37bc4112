use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::Notify;

/// An unbounded FIFO shared between producers and one [`crate::QueueDriver`].
///
/// `add` and `clear` may be called from any task. Items wait in insertion
/// order until the driver dispatches them.
#[derive(Debug)]
pub struct ThrottledQueue<T> {
    inner: Arc<QueueInner<T>>,
}

#[derive(Debug)]
struct QueueInner<T> {
    items: Mutex<VecDeque<T>>,
    added: Notify,
}

impl<T> Clone for ThrottledQueue<T> {
    fn clone(&self) -> Self {
        ThrottledQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ThrottledQueue<T> {
    fn default() -> Self {
        ThrottledQueue::new()
    }
}

impl<T> ThrottledQueue<T> {
    pub fn new() -> Self {
        ThrottledQueue {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::new()),
                added: Notify::new(),
            }),
        }
    }

    /// Append an item to the back of the queue.
    pub fn add(&self, item: T) {
        self.items().push_back(item);
        self.inner.added.notify_one();
    }

    /// Discard all pending items, returning how many were dropped.
    ///
    /// A dispatch that was already pacing finds the queue empty afterwards
    /// and dispatches nothing.
    pub fn clear(&self) -> usize {
        let mut items = self.items();
        let dropped = items.len();
        items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Take the item at the front of the queue, bypassing any pacing.
    ///
    /// Normally only the driver pops; tests use this to inspect what was
    /// queued.
    pub fn pop(&self) -> Option<T> {
        self.items().pop_front()
    }

    /// Wait until at least one item is queued.
    pub(crate) async fn non_empty(&self) {
        loop {
            let added = self.inner.added.notified();
            if !self.is_empty() {
                return;
            }
            added.await;
        }
    }

    fn items(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // The lock is only held for push/pop; a poisoned lock means a
        // panicking producer and the queue state is still consistent.
        match self.inner.items.lock() {
            Ok(items) => items,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
