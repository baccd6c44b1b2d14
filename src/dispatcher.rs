//! Hand-off between the transport's callback context and the consumer's.
//!
//! Two tokio tasks form two serialized execution contexts. The ingress task
//! consumes transport events in arrival order and runs them through an
//! [`IngressHandler`]; whatever notifications the handler produces are pushed,
//! in order, through a bounded channel to the egress task, which replays them
//! on an [`EgressSink`]. Closing the dispatcher shuts the intake gate
//! synchronously: nothing submitted afterwards is ever processed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::trace;

/// What the ingress loop does after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop intake, run [`IngressHandler::shutdown`] and finish egress.
    Shutdown,
}

pub trait IngressHandler: Send + 'static {
    type Event: Send + 'static;
    type Notification: Send + 'static;

    fn handle(
        &mut self,
        event: Self::Event,
        cx: &mut Context<'_, Self::Event, Self::Notification>,
    ) -> Flow;

    /// Last call on the ingress context. Notifications produced here are
    /// delivered before the egress side finishes.
    fn shutdown(&mut self, cx: &mut Context<'_, Self::Event, Self::Notification>);
}

pub trait EgressSink<N>: Send + 'static {
    fn deliver(&mut self, notification: N);

    /// Called once after the last notification.
    fn finish(&mut self) {}
}

/// Per-event access to the dispatcher from inside the ingress handler.
pub struct Context<'a, E, N> {
    pending: &'a mut Vec<N>,
    sender: &'a IngressSender<E>,
}

impl<'a, E, N> Context<'a, E, N> {
    /// Schedules a notification for the egress context.
    pub fn notify(&mut self, notification: N) {
        self.pending.push(notification);
    }

    /// Sender for follow-up events, e.g. from timers.
    pub fn sender(&self) -> IngressSender<E> {
        self.sender.clone()
    }
}

enum Ingress<E> {
    Event(E),
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

enum Egress<N> {
    Notify(N),
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable intake side of the ingress queue.
pub struct IngressSender<E> {
    tx: mpsc::UnboundedSender<Ingress<E>>,
    accepting: Arc<AtomicBool>,
}

impl<E> Clone for IngressSender<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            accepting: self.accepting.clone(),
        }
    }
}

impl<E> IngressSender<E> {
    /// Enqueues an event. Returns `false` once the dispatcher stopped accepting.
    pub fn submit(&self, event: E) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(Ingress::Event(event)).is_ok()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn close_gate(&self) -> bool {
        self.accepting.swap(false, Ordering::AcqRel)
    }
}

pub struct Dispatcher<E> {
    sender: IngressSender<E>,
    finished: watch::Receiver<bool>,
}

impl<E: Send + 'static> Dispatcher<E> {
    /// Spawns both contexts on `runtime`. `capacity` bounds the egress channel.
    pub fn spawn<H, S>(runtime: &Handle, handler: H, sink: S, capacity: usize) -> Self
    where
        H: IngressHandler<Event = E>,
        S: EgressSink<H::Notification>,
    {
        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (egress_tx, egress_rx) = mpsc::channel(capacity.max(1));
        let (finished_tx, finished) = watch::channel(false);

        let sender = IngressSender {
            tx: ingress_tx,
            accepting: Arc::new(AtomicBool::new(true)),
        };

        runtime.spawn(run_ingress(handler, ingress_rx, sender.clone(), egress_tx));
        runtime.spawn(run_egress(sink, egress_rx, finished_tx));

        Self { sender, finished }
    }

    pub fn sender(&self) -> IngressSender<E> {
        self.sender.clone()
    }

    pub fn submit(&self, event: E) -> bool {
        self.sender.submit(event)
    }

    pub fn is_accepting(&self) -> bool {
        self.sender.is_accepting()
    }

    /// Stops intake. Events already queued are still processed, then the
    /// handler's shutdown runs and egress finishes. Idempotent.
    pub fn close(&self) {
        if self.sender.close_gate() {
            trace!("Dispatcher intake closed");
            let _ = self.sender.tx.send(Ingress::Shutdown);
        }
    }

    /// Waits until everything submitted before this call has been delivered
    /// on the egress context, or until the dispatcher has finished.
    pub async fn drain(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.tx.send(Ingress::Barrier(ack)).is_err() {
            return;
        }
        let _ = done.await;
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Resolves once the egress context delivered its last notification.
    pub async fn finished(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }
}

impl<E> Drop for Dispatcher<E> {
    fn drop(&mut self) {
        // без этого задача ingress держит свой sender и не завершится
        if self.sender.close_gate() {
            let _ = self.sender.tx.send(Ingress::Shutdown);
        }
    }
}

async fn run_ingress<H: IngressHandler>(
    mut handler: H,
    mut rx: mpsc::UnboundedReceiver<Ingress<H::Event>>,
    sender: IngressSender<H::Event>,
    egress: mpsc::Sender<Egress<H::Notification>>,
) {
    let mut pending = Vec::new();

    while let Some(item) = rx.recv().await {
        match item {
            Ingress::Event(event) => {
                let flow = {
                    let mut cx = Context {
                        pending: &mut pending,
                        sender: &sender,
                    };
                    handler.handle(event, &mut cx)
                };
                if !forward(&egress, &mut pending).await {
                    return;
                }
                if flow == Flow::Shutdown {
                    sender.close_gate();
                    break;
                }
            }
            Ingress::Barrier(ack) => {
                if egress.send(Egress::Barrier(ack)).await.is_err() {
                    return;
                }
            }
            Ingress::Shutdown => break,
        }
    }

    sender.close_gate();
    {
        let mut cx = Context {
            pending: &mut pending,
            sender: &sender,
        };
        handler.shutdown(&mut cx);
    }
    if forward(&egress, &mut pending).await {
        let _ = egress.send(Egress::Shutdown).await;
    }
    // leftover barriers resolve as their acks drop with `rx`
}

async fn forward<N>(egress: &mpsc::Sender<Egress<N>>, pending: &mut Vec<N>) -> bool {
    for notification in pending.drain(..) {
        if egress.send(Egress::Notify(notification)).await.is_err() {
            return false;
        }
    }
    true
}

async fn run_egress<N, S: EgressSink<N>>(
    mut sink: S,
    mut rx: mpsc::Receiver<Egress<N>>,
    finished: watch::Sender<bool>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Egress::Notify(notification) => sink.deliver(notification),
            Egress::Barrier(ack) => {
                let _ = ack.send(());
            }
            Egress::Shutdown => break,
        }
    }
    sink.finish();
    let _ = finished.send(true);
}
