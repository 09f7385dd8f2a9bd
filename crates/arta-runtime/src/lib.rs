//! Per-event dispatch pipeline and periodic background tasks.
//!
//! The dispatcher sequences admission control, content safety, cache
//! read-through, downstream computation, reply transmission, and best-effort
//! persistence for every inbound direct message or comment.

mod dispatcher;
mod tasks;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use tasks::{spawn_purge_task, spawn_stats_task, spawn_sweep_task};
