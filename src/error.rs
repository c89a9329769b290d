use std::io;

use thiserror::Error;

/// Errors returned when a [`PeriodicTask`](crate::PeriodicTask) cannot be started.
///
/// Failures of the executed work are not represented here. They are values of
/// the unit's own [`Exec::Error`](crate::Exec::Error) type and are delivered
/// through the [`ErrorStream`](crate::ErrorStream).
#[derive(Debug, Error)]
pub enum TaskError {
    /// The period was zero.
    #[error("period must be positive")]
    ZeroPeriod,

    /// The operating system refused to start the background thread.
    #[error("failed to spawn periodic task thread: {0}")]
    Spawn(#[from] io::Error),
}
