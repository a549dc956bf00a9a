//! Update/fan-out core: reconcile the live set, publish changes, and keep
//! the refresh timers running.

pub mod publisher;
pub mod reconciler;
pub mod scheduler;

pub use publisher::Publisher;
pub use reconciler::{LiveEvent, Reconciler};
pub use scheduler::{PollConfig, Poller, RetryPolicy, Scheduler};
