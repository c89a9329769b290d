//! The periodic task runner.
//!
//! A [`PeriodicTask`] owns one background thread that repeatedly invokes an
//! [`Exec`] unit. Each iteration of the loop:
//!
//! 1. checks, without blocking, whether a stop was requested and exits if so,
//! 2. runs the unit once,
//! 3. offers the result to the single-slot [`ErrorStream`], dropping it if the
//!    slot is still occupied,
//! 4. sleeps for the period.
//!
//! The sleep is not interruptible, so a stop request is observed at the top of
//! the next iteration. [`PeriodicTask::stop`] can therefore block for up to one
//! period plus one execution.
//!
//! Dropping a `PeriodicTask` does not stop the loop: the thread keeps running
//! detached until the process exits. [`background`] relies on this to offer a
//! fire-and-forget entry point.

use std::{
    fmt,
    sync::{
        Mutex, MutexGuard, PoisonError, TryLockError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use futures::{
    FutureExt, StreamExt,
    channel::{mpsc, oneshot},
    executor::block_on,
};
use tracing::{debug, debug_span, error, warn};

use crate::{
    Exec, TaskError,
    stream::{self, ErrorStream, SlotSender},
};

// The loop answers a stop request through the enclosed acknowledgement sender.
type StopRequest = oneshot::Sender<()>;

// State shared by `stop` callers. The lock is held for the whole
// check-and-signal sequence, which serializes concurrent callers against each
// other and against the handshake with the loop.
struct Control {
    stop: mpsc::Sender<StopRequest>,
    handle: Option<JoinHandle<()>>,
}

/// Configures and starts a [`PeriodicTask`].
///
/// Obtained from [`PeriodicTask::builder`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use periodic::{PeriodicTask, TaskFn};
///
/// let (task, _errors) = PeriodicTask::builder(Duration::from_millis(50))
///     .name("cache-flush")
///     .spawn(TaskFn(|| Ok::<_, std::io::Error>(())))
///     .unwrap();
///
/// assert_eq!(task.name(), Some("cache-flush"));
/// task.stop();
/// ```
#[derive(Clone, Debug)]
#[must_use]
pub struct Builder {
    period: Duration,
    name: Option<String>,
}

impl Builder {
    /// Names the task.
    ///
    /// The name is given to the background thread and recorded on the tracing
    /// span the loop runs in.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Starts the task.
    ///
    /// The background loop is running when this returns, and the first
    /// execution happens right away.
    ///
    /// # Errors
    ///
    /// - [`TaskError::ZeroPeriod`] if the period is zero. The period is never
    ///   clamped or replaced with a default.
    /// - [`TaskError::Spawn`] if the background thread could not be started.
    pub fn spawn<X>(
        &self,
        exec: X,
    ) -> Result<(PeriodicTask, ErrorStream<X::Error>), TaskError>
    where
        X: Exec + Send + 'static,
        X::Error: Send + 'static,
    {
        if self.period.is_zero() {
            return Err(TaskError::ZeroPeriod);
        }

        let period = self.period;
        let (results, errors) = stream::slot();
        let (stop_sender, stop_receiver) = mpsc::channel(0);

        let mut thread = thread::Builder::new();
        if let Some(name) = &self.name {
            thread = thread.name(name.clone());
        }
        let span = debug_span!("periodic_task", name = self.name.as_deref(), ?period);
        let handle = thread.spawn(move || {
            let _entered = span.entered();
            run(exec, period, stop_receiver, results);
        })?;

        let task = PeriodicTask {
            period,
            name: self.name.clone(),
            thread: handle.thread().id(),
            running: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            control: Mutex::new(Control {
                stop: stop_sender,
                handle: Some(handle),
            }),
        };
        Ok((task, errors))
    }
}

/// Runs a unit of work on a fixed period in a dedicated background thread.
///
/// Results of every execution are offered to the [`ErrorStream`] returned next
/// to the task. Failures never stop the loop; only [`stop`](Self::stop) does.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use periodic::{PeriodicTask, TaskFn};
///
/// let (task, mut errors) = PeriodicTask::new(
///     Duration::from_millis(10),
///     TaskFn(|| Err::<(), _>("health check failed")),
/// );
///
/// assert_eq!(errors.recv(), Some(Err("health check failed")));
/// task.stop();
/// assert!(!task.is_running());
/// ```
pub struct PeriodicTask {
    period: Duration,
    name: Option<String>,
    thread: ThreadId,
    // Only written while `control` is locked. Read without it, so the unit can
    // query its own task while another caller waits in `stop`.
    running: AtomicBool,
    // Set by the caller performing the handshake, before it waits on the loop.
    stopping: AtomicBool,
    control: Mutex<Control>,
}

impl PeriodicTask {
    /// Starts a task that invokes `exec` every `period`.
    ///
    /// See [`try_new`](Self::try_new) for the non-panicking form.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero, or if the background thread could not be
    /// spawned.
    pub fn new<X>(period: Duration, exec: X) -> (Self, ErrorStream<X::Error>)
    where
        X: Exec + Send + 'static,
        X::Error: Send + 'static,
    {
        match Self::try_new(period, exec) {
            Ok(task) => task,
            Err(e) => panic!("{e}"),
        }
    }

    /// Starts a task that invokes `exec` every `period`.
    ///
    /// # Errors
    ///
    /// Same as [`Builder::spawn`].
    pub fn try_new<X>(
        period: Duration,
        exec: X,
    ) -> Result<(Self, ErrorStream<X::Error>), TaskError>
    where
        X: Exec + Send + 'static,
        X::Error: Send + 'static,
    {
        Self::builder(period).spawn(exec)
    }

    /// Returns a [`Builder`] for a task with the given period.
    pub fn builder(period: Duration) -> Builder {
        Builder { period, name: None }
    }

    /// The fixed delay between the end of one execution and the start of the next.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The name given through [`Builder::name`], if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns `true` until a call to [`stop`](Self::stop) has completed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the task and waits for the background loop to exit.
    ///
    /// After this returns the unit is never invoked again. The loop notices the
    /// request at the top of its next iteration, so the call can block for up to
    /// one period plus the duration of an execution in progress. Callers that need
    /// a bounded wait must add their own timeout around it.
    ///
    /// Calling `stop` on a stopped task returns immediately. Concurrent callers
    /// are serialized: one performs the handshake with the loop, the others return
    /// once it has completed.
    ///
    /// When called from inside the unit itself, `stop` cannot wait for the loop it
    /// is running on. The request is queued and the call returns at once; the unit
    /// is still never invoked again, and the thread exits after its current sleep.
    /// A later call from another thread waits for that exit.
    pub fn stop(&self) {
        if thread::current().id() == self.thread {
            self.stop_from_loop();
            return;
        }

        let mut control = self.lock_control();
        if self.running.load(Ordering::SeqCst) {
            self.stopping.store(true, Ordering::SeqCst);
            let (ack_sender, ack_receiver) = oneshot::channel();
            // Fails only if the loop thread has unwound, in which case the
            // acknowledgement sender is dropped and the wait below returns at once.
            let _ = control.stop.try_send(ack_sender);
            let _ = block_on(ack_receiver);
            self.running.store(false, Ordering::SeqCst);
        }

        // Still present after a stop from inside the unit, whose loop exits
        // once its current sleep ends.
        if let Some(handle) = control.handle.take() {
            if handle.join().is_err() {
                warn!(name = self.name(), "periodic task thread panicked");
            }
        }
    }

    fn stop_from_loop(&self) {
        let mut control = loop {
            match self.control.try_lock() {
                Ok(control) => break control,
                Err(TryLockError::Poisoned(e)) => break e.into_inner(),
                // Another caller is in its handshake, which the loop completes
                // as soon as this execution returns.
                Err(TryLockError::WouldBlock) if self.stopping.load(Ordering::SeqCst) => return,
                Err(TryLockError::WouldBlock) => thread::yield_now(),
            }
        };
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        warn!(
            name = self.name(),
            "periodic task stopped from its own execution, not waiting for the loop to exit"
        );
        let (ack_sender, _) = oneshot::channel();
        let _ = control.stop.try_send(ack_sender);
        self.running.store(false, Ordering::SeqCst);
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("period", &self.period)
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run<X: Exec>(
    mut exec: X,
    period: Duration,
    mut stop: mpsc::Receiver<StopRequest>,
    mut results: SlotSender<X::Error>,
) {
    debug!("periodic task started");
    let mut detached = false;

    loop {
        match stop.next().now_or_never() {
            Some(Some(ack)) => {
                // Closes the error stream before the requester is released.
                drop(results);
                let _ = ack.send(());
                debug!("periodic task stopped");
                return;
            }
            Some(None) if !detached => {
                detached = true;
                debug!("periodic task handle dropped, running detached");
            }
            _ => {}
        }

        let result = exec.exec();
        if result.is_err() {
            debug!("periodic task execution failed");
        }
        results.deliver(result);

        thread::sleep(period);
    }
}

/// Runs `exec` every `period` in the background and returns only its results.
///
/// This is a fire-and-forget form of [`PeriodicTask::new`]: the task cannot be
/// stopped and runs until the process exits.
///
/// Unlike [`PeriodicTask::new`], a zero `period` is not an error here. It
/// returns `None` and starts nothing, so callers can treat a zero period as
/// "disabled". `None` is also returned, and the failure logged, if the
/// background thread could not be spawned.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use periodic::{TaskFn, background};
///
/// let disabled = background(Duration::ZERO, TaskFn(|| Ok::<_, String>(())));
/// assert!(disabled.is_none());
///
/// let mut errors = background(Duration::from_millis(10), TaskFn(|| Ok::<_, String>(())))
///     .expect("period is positive");
/// assert_eq!(errors.recv(), Some(Ok(())));
/// ```
pub fn background<X>(period: Duration, exec: X) -> Option<ErrorStream<X::Error>>
where
    X: Exec + Send + 'static,
    X::Error: Send + 'static,
{
    if period.is_zero() {
        return None;
    }

    match PeriodicTask::try_new(period, exec) {
        Ok((task, errors)) => {
            // The loop outlives the handle.
            drop(task);
            Some(errors)
        }
        Err(e) => {
            error!(error = %e, "failed to start background periodic task");
            None
        }
    }
}
