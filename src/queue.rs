//! The per-stream event queue: single-producer/single-consumer, unbounded,
//! `push` never blocks, `next` is async. Backed by `tokio::sync::mpsc` so
//! the ordering and non-blocking-push guarantees are a compile-time
//! property of the channel rather than a convention callers must honor.

use tokio::sync::mpsc;

use crate::types::StreamEvent;

/// Producer half, held by whatever is pushing events (the `AcpClient`
/// callbacks and the prompt-response task).
#[derive(Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSender {
    /// Never blocks; an unbounded channel backs the queue.
    pub fn push(&self, event: StreamEvent) {
        // A closed receiver means the consumer already abandoned iteration;
        // dropping the event here is correct, not an error.
        let _ = self.inner.send(event);
    }

    /// The underlying raw sender, for wiring into `SessionCallbacks` where
    /// the `agent_client::Client` impl pushes events directly.
    pub fn raw(&self) -> mpsc::UnboundedSender<StreamEvent> {
        self.inner.clone()
    }
}

/// Consumer half, owned by the stream the `Provider` hands back.
///
/// If dropped before a terminal `Stop` event has been observed, this is an
/// abandoned iteration — the consumer walked away from the stream rather
/// than draining it — and the registered `cancel_on_drop` action (if any)
/// fires so the in-flight prompt is cancelled on the agent side too.
pub struct EventReceiver {
    inner: mpsc::UnboundedReceiver<StreamEvent>,
    done: bool,
    cancel_on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl EventReceiver {
    /// Awaits the next event, or `None` once the sender side is dropped
    /// (the sentinel case — the stream is done). Marks the stream done on a
    /// terminal `Stop` event or on channel close, disarming `cancel_on_drop`.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        let event = self.inner.recv().await;
        if matches!(event, None | Some(StreamEvent::Stop { .. })) {
            self.done = true;
        }
        event
    }

    /// Registers the action to take if this receiver is dropped before the
    /// stream reaches a terminal `Stop` event — the cancellation trigger
    /// named by the spec: the consumer abandons iteration.
    pub fn cancel_on_drop(&mut self, cancel: impl FnOnce() + Send + 'static) {
        self.cancel_on_drop = Some(Box::new(cancel));
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        if !self.done {
            if let Some(cancel) = self.cancel_on_drop.take() {
                cancel();
            }
        }
    }
}

/// Constructs one queue's two halves.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSender { inner: tx },
        EventReceiver {
            inner: rx,
            done: false,
            cancel_on_drop: None,
        },
    )
}
