//! A FIFO queue whose items are dispatched with a minimum interval in between.
//!
//! Producers `add` items on a cloneable [`ThrottledQueue`] handle; a single
//! [`QueueDriver`] pops them in insertion order, never dispatching two items
//! closer together than the configured interval. Used to pace writes to peers
//! that tolerate only a limited burst rate.
//!
//! ```
//! use std::time::Duration;
//! use throttler::{QueueDriver, ThrottledQueue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let queue = ThrottledQueue::new();
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let driver = QueueDriver::new(queue.clone(), Duration::from_millis(10), move |item| {
//!     tx.send(item)
//! });
//! tokio::spawn(driver.run());
//!
//! queue.add("first");
//! queue.add("second");
//! assert_eq!(rx.recv().await, Some("first"));
//! assert_eq!(rx.recv().await, Some("second"));
//! # }
//! ```
#![forbid(unsafe_code)]

mod driver;
mod queue;

pub use driver::*;
pub use queue::*;
