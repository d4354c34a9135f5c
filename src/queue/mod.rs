//! Work queues feeding the controller workers.

pub mod rate_limiter;
pub mod workqueue;

pub use rate_limiter::ItemExponentialBackoff;
pub use workqueue::{QueueItem, WorkQueue};
