#![allow(dead_code)]

use bytes::Bytes;
use call_signaling::{
    CallDelegate, CallEvent, CallId, Candidate, ChannelDelegate, RawConnectionState,
    SessionConfig, SignalingSession, Transport, TransportConfig, TransportError, TransportHandle,
    TransportObserver,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
struct Inner {
    opened: Vec<TransportConfig>,
    live: HashSet<TransportHandle>,
    closed: Vec<TransportHandle>,
    applied: Vec<Candidate>,
    sent: Vec<Bytes>,
    observers: HashMap<TransportHandle, Arc<dyn TransportObserver>>,
}

/// In-memory transport that records every call and lets tests play the
/// transport's side of the conversation.
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    pub fail_open: AtomicBool,
    pub fail_register: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> Vec<TransportConfig> {
        self.inner.lock().opened.clone()
    }

    pub fn closed(&self) -> Vec<TransportHandle> {
        self.inner.lock().closed.clone()
    }

    pub fn applied(&self) -> Vec<Candidate> {
        self.inner.lock().applied.clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.inner.lock().sent.clone()
    }

    /// Observer of the most recently opened connection. Stays reachable after
    /// close so tests can report late callbacks.
    pub fn observer(&self) -> Arc<dyn TransportObserver> {
        let inner = self.inner.lock();
        let handle = TransportHandle(self.next_id.load(Ordering::SeqCst));
        inner
            .observers
            .get(&handle)
            .cloned()
            .expect("no observer registered")
    }

    pub fn emit_states(&self, states: &[RawConnectionState]) {
        let observer = self.observer();
        for state in states {
            observer.on_raw_state_change(*state);
        }
    }

    pub fn emit_candidate(&self, candidate: Candidate) {
        self.observer().on_local_candidate(candidate);
    }

    pub fn emit_data(&self, bytes: impl Into<Bytes>) {
        self.observer().on_data_received(bytes.into());
    }

    fn check_live(&self, inner: &Inner, handle: TransportHandle) -> Result<(), TransportError> {
        if inner.live.contains(&handle) {
            Ok(())
        } else if inner.closed.contains(&handle) {
            Err(TransportError::Closed(handle))
        } else {
            Err(TransportError::UnknownHandle(handle))
        }
    }
}

impl Transport for MockTransport {
    fn open(&self, config: &TransportConfig) -> Result<TransportHandle, TransportError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("open refused".into()));
        }
        let handle = TransportHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut inner = self.inner.lock();
        inner.opened.push(config.clone());
        inner.live.insert(handle);
        Ok(handle)
    }

    fn close(&self, handle: TransportHandle) {
        let mut inner = self.inner.lock();
        if inner.live.remove(&handle) {
            inner.closed.push(handle);
        }
    }

    fn apply_remote_candidate(
        &self,
        handle: TransportHandle,
        candidate: &Candidate,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        self.check_live(&inner, handle)?;
        inner.applied.push(candidate.clone());
        Ok(())
    }

    fn send_data(&self, handle: TransportHandle, bytes: Bytes) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        self.check_live(&inner, handle)?;
        inner.sent.push(bytes);
        Ok(())
    }

    fn register_observer(
        &self,
        handle: TransportHandle,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<(), TransportError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("observer refused".into()));
        }
        let mut inner = self.inner.lock();
        self.check_live(&inner, handle)?;
        inner.observers.insert(handle, observer);
        Ok(())
    }
}

pub const CALL_ID: CallId = CallId(123);

pub fn host(n: u16) -> Candidate {
    Candidate::new(
        Some("0".into()),
        Some(0),
        format!("candidate:{n} 1 udp 2130706431 192.168.1.{n} 5000{n} typ host"),
    )
}

pub fn relay(n: u16) -> Candidate {
    Candidate::new(
        Some("0".into()),
        Some(0),
        format!("candidate:{n} 1 udp 16777215 203.0.113.{n} 6000{n} typ relay raddr 0.0.0.0 rport 0"),
    )
}

pub fn session(
    config: SessionConfig,
    transport: &Arc<MockTransport>,
) -> (SignalingSession, UnboundedReceiver<CallEvent>) {
    let (delegate, rx) = ChannelDelegate::new();
    let transport: Arc<dyn Transport> = transport.clone();
    let delegate: Arc<dyn CallDelegate> = Arc::new(delegate);
    let session = SignalingSession::new(config, transport, delegate).expect("valid config");
    (session, rx)
}

pub fn outgoing(transport: &Arc<MockTransport>) -> (SignalingSession, UnboundedReceiver<CallEvent>) {
    session(SessionConfig::outgoing(CALL_ID), transport)
}

pub fn incoming(transport: &Arc<MockTransport>) -> (SignalingSession, UnboundedReceiver<CallEvent>) {
    session(SessionConfig::incoming(CALL_ID), transport)
}

/// Everything delivered so far.
pub fn delivered(rx: &mut UnboundedReceiver<CallEvent>) -> Vec<CallEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
