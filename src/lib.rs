//! A minimal runner for periodic background jobs.
//!
//! `periodic` invokes a unit of work on a fixed cadence in a dedicated
//! background thread. It is meant for maintenance jobs living inside a larger
//! process: health checks, flush loops, polling.
//!
//! Features include:
//! - The [`Exec`] trait for the unit of work, and [`TaskFn`] to adapt closures
//! - A [`PeriodicTask`] that owns the background loop and can be stopped
//!   synchronously with [`PeriodicTask::stop`]
//! - An [`ErrorStream`] holding at most one unread execution result, readable
//!   without blocking, by waiting, or as an async `Stream` on any executor
//! - [`background`], a fire-and-forget entry point that treats a zero period as
//!   "disabled"
//!
//! One `PeriodicTask` drives one job. There is no shared scheduler; create a
//! task per periodic job.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use periodic::{PeriodicTask, TaskFn};
//!
//! let (task, mut errors) = PeriodicTask::new(
//!     Duration::from_millis(20),
//!     TaskFn(|| {
//!         // Flush buffers, probe a dependency, ...
//!         Ok::<_, std::io::Error>(())
//!     }),
//! );
//!
//! if let Some(Err(e)) = errors.recv() {
//!     eprintln!("flush failed: {e}");
//! }
//! task.stop();
//! ```

mod error;
pub mod exec;
pub mod periodic;
pub mod stream;

pub use error::TaskError;
pub use exec::{Exec, TaskFn};
pub use periodic::{Builder, PeriodicTask, background};
pub use stream::ErrorStream;
