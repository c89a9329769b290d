//! The unit of work driven by a [`PeriodicTask`](crate::PeriodicTask).
//!
//! Anything that can "run once and report success or failure" implements [`Exec`].
//! Plain closures are adapted with [`TaskFn`].

/// A unit of work that can be executed repeatedly.
///
/// The runner invokes [`exec`](Exec::exec) sequentially from a single background
/// thread, so implementations never see overlapping calls and may keep state
/// between invocations through `&mut self`.
pub trait Exec {
    /// Failure reported by a single execution.
    type Error;

    /// Runs the work once.
    fn exec(&mut self) -> Result<(), Self::Error>;
}

impl<X> Exec for Box<X>
where
    X: Exec + ?Sized,
{
    type Error = X::Error;

    fn exec(&mut self) -> Result<(), Self::Error> {
        (**self).exec()
    }
}

/// Adapter that turns a closure into an [`Exec`] unit.
///
/// # Example
/// ```
/// use periodic::{Exec, TaskFn};
///
/// let mut unit = TaskFn(|| Err::<(), _>("disk full"));
/// assert_eq!(unit.exec(), Err("disk full"));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct TaskFn<F>(pub F);

impl<F, E> Exec for TaskFn<F>
where
    F: FnMut() -> Result<(), E>,
{
    type Error = E;

    fn exec(&mut self) -> Result<(), E> {
        (self.0)()
    }
}
