//! The single-slot mailbox that carries execution results out of the loop.
//!
//! The slot is a `futures` bounded channel with a zero buffer and exactly one
//! sender, which leaves room for one message in flight. The producer never
//! blocks: while an unread result occupies the slot, newer results are dropped
//! and the older one is kept. A burst of failures therefore collapses to "there
//! is an unread result", never a backlog.
//!
//! The stream is closed when the loop exits. A result still sitting in the slot
//! at that moment can be read, after which the stream ends.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    FutureExt, Stream, StreamExt,
    channel::mpsc,
    executor::block_on,
    stream::FusedStream,
};
use pin_project_lite::pin_project;
use tracing::trace;

pub(crate) fn slot<E>() -> (SlotSender<E>, ErrorStream<E>) {
    let (sender, receiver) = mpsc::channel(0);
    (SlotSender { sender }, ErrorStream { receiver })
}

// Producer half, owned by the loop thread. Dropping it closes the stream.
pub(crate) struct SlotSender<E> {
    sender: mpsc::Sender<Result<(), E>>,
}

impl<E> SlotSender<E> {
    // Returns `false` if the result was discarded.
    pub(crate) fn deliver(&mut self, result: Result<(), E>) -> bool {
        match self.sender.try_send(result) {
            Ok(()) => true,
            Err(e) if e.is_full() => {
                trace!("error slot occupied, dropping result");
                false
            }
            // Nobody is listening anymore.
            Err(_) => false,
        }
    }
}

pin_project! {
    /// Receive-only end of a periodic task's error slot.
    ///
    /// Every execution produces a `Result<(), E>`; `Ok(())` is the success marker.
    /// At most one unread result is held at a time. If the task produces more
    /// results before this one is read, they are discarded, so the value read may
    /// be older than the most recent execution.
    ///
    /// Results can be polled with [`try_recv`](Self::try_recv), waited on with
    /// [`recv`](Self::recv), or consumed asynchronously through the [`Stream`]
    /// implementation on any executor. The stream ends once the task has been
    /// stopped and the last pending result has been read.
    ///
    /// `ErrorStream` is `Unpin`.
    #[must_use = "streams do nothing unless polled"]
    pub struct ErrorStream<E> {
        #[pin]
        receiver: mpsc::Receiver<Result<(), E>>,
    }
}

impl<E> ErrorStream<E> {
    /// Takes the pending result without blocking.
    ///
    /// Returns `None` if the slot is empty or the stream has ended.
    pub fn try_recv(&mut self) -> Option<Result<(), E>> {
        self.receiver.next().now_or_never().flatten()
    }

    /// Blocks the current thread until a result is available.
    ///
    /// Returns `None` once the task has stopped and no result is left. Do not call
    /// this from inside an async context, use the [`Stream`] implementation there.
    pub fn recv(&mut self) -> Option<Result<(), E>> {
        block_on(self.receiver.next())
    }
}

impl<E> Stream for ErrorStream<E> {
    type Item = Result<(), E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().receiver.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.receiver.size_hint()
    }
}

impl<E> FusedStream for ErrorStream<E> {
    fn is_terminated(&self) -> bool {
        self.receiver.is_terminated()
    }
}

impl<E> fmt::Debug for ErrorStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorStream")
            .field("terminated", &self.receiver.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_slot_keeps_older_result() {
        let (mut sender, mut errors) = slot::<&str>();

        assert!(sender.deliver(Err("first")));
        assert!(!sender.deliver(Err("second")), "Slot should already be full");
        assert!(!sender.deliver(Ok(())));

        assert_eq!(errors.try_recv(), Some(Err("first")));
        assert_eq!(errors.try_recv(), None, "Dropped results should not queue up");

        assert!(sender.deliver(Ok(())), "Reading should free the slot");
        assert_eq!(errors.try_recv(), Some(Ok(())));
    }

    #[test]
    fn dropping_sender_ends_stream_after_pending_result() {
        let (mut sender, mut errors) = slot::<&str>();

        assert!(sender.deliver(Err("last")));
        drop(sender);

        assert_eq!(errors.recv(), Some(Err("last")));
        assert_eq!(errors.recv(), None);
        assert!(errors.is_terminated());
    }

    #[test]
    fn stream_is_unpin() {
        fn assert_unpin<T: Unpin>() {}
        assert_unpin::<ErrorStream<String>>();

        // `StreamExt::next` needs `Unpin`.
        let (mut sender, mut errors) = slot::<String>();
        assert!(sender.deliver(Ok(())));
        assert_eq!(block_on(errors.next()), Some(Ok(())));
    }

    #[test]
    fn deliver_without_listener_is_dropped() {
        let (mut sender, errors) = slot::<&str>();
        drop(errors);

        assert!(!sender.deliver(Ok(())));
    }
}
