//! One call's signaling session.
//!
//! A session owns the transport connection, the connectivity state machine,
//! the candidate pipeline and the dispatcher that bridges transport callbacks
//! to the [`CallDelegate`]. Phases run `Idle → Active → Terminating →
//! Terminated`; `Terminated` is reached once the egress context delivered its
//! last notification.

use crate::config::SessionConfig;
use crate::delegate::{CallDelegate, CallEvent};
use crate::dispatcher::{Context, Dispatcher, EgressSink, Flow, IngressHandler, IngressSender};
use crate::error::{CandidateError, Result, SignalingError};
use crate::logger::{analyze_candidates, dump_payload};
use crate::message::ControlMessage;
use crate::peer::ice::CandidatePipeline;
use crate::peer::state::{ConnectionStateMachine, ConnectivityState, RawConnectionState};
use crate::peer::types::{CallDirection, CallId, Candidate};
use crate::transport::{Transport, TransportHandle, TransportObserver};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    Terminating,
    Terminated,
}

struct Lifecycle {
    phase: SessionPhase,
    handle: Option<TransportHandle>,
    started_at: Option<DateTime<Utc>>,
}

enum Teardown {
    /// Never started; now terminated.
    Idle,
    Started(TransportHandle),
    AlreadyStopping,
}

/// State shared between the caller-facing session and its two contexts.
struct Shared {
    call_id: CallId,
    lifecycle: Mutex<Lifecycle>,
    candidates: Mutex<CandidatePipeline>,
    connectivity: watch::Sender<ConnectivityState>,
}

impl Shared {
    fn phase(&self) -> SessionPhase {
        self.lifecycle.lock().phase
    }

    fn begin_teardown(&self) -> Teardown {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.phase {
            SessionPhase::Idle => {
                lifecycle.phase = SessionPhase::Terminated;
                self.connectivity.send_replace(ConnectivityState::Terminated);
                Teardown::Idle
            }
            SessionPhase::Active => {
                lifecycle.phase = SessionPhase::Terminating;
                match lifecycle.handle.take() {
                    Some(handle) => Teardown::Started(handle),
                    None => Teardown::AlreadyStopping,
                }
            }
            SessionPhase::Terminating | SessionPhase::Terminated => Teardown::AlreadyStopping,
        }
    }
}

/// Events accepted on the ingress context.
#[derive(Debug)]
pub(crate) enum IngressEvent {
    RawState(RawConnectionState),
    LocalCandidate(Candidate),
    Data(Bytes),
    LocalVideoTrack(bool),
    RemoteVideoTrack(bool),
    GraceExpired(u64),
}

/// Registered with the transport; turns callbacks into ingress events.
struct IngressObserver {
    call_id: CallId,
    sender: IngressSender<IngressEvent>,
}

impl IngressObserver {
    fn submit(&self, event: IngressEvent) {
        if !self.sender.submit(event) {
            trace!(call_id = %self.call_id, "session no longer accepting transport events, dropped");
        }
    }
}

impl TransportObserver for IngressObserver {
    fn on_raw_state_change(&self, state: RawConnectionState) {
        self.submit(IngressEvent::RawState(state));
    }

    fn on_local_candidate(&self, candidate: Candidate) {
        self.submit(IngressEvent::LocalCandidate(candidate));
    }

    fn on_data_received(&self, bytes: Bytes) {
        self.submit(IngressEvent::Data(bytes));
    }

    fn on_local_video_track(&self, present: bool) {
        self.submit(IngressEvent::LocalVideoTrack(present));
    }

    fn on_remote_video_track(&self, present: bool) {
        self.submit(IngressEvent::RemoteVideoTrack(present));
    }
}

/// Runs on the ingress context; the only place connectivity state changes.
struct CallHandler {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    machine: ConnectionStateMachine,
    relay_only: bool,
    grace: Option<Duration>,
    grace_timer: Option<JoinHandle<()>>,
    grace_epoch: u64,
}

impl CallHandler {
    fn observe(
        &mut self,
        raw: RawConnectionState,
        cx: &mut Context<'_, IngressEvent, CallEvent>,
    ) {
        let before = self.machine.current();
        let surfaced = self.machine.observe_transport_state(raw);
        if self.machine.current() != before {
            self.shared.connectivity.send_replace(self.machine.current());
        }

        let Some(state) = surfaced else {
            trace!(call_id = %self.shared.call_id, %raw, "raw state produced no transition");
            return;
        };

        info!(call_id = %self.shared.call_id, %raw, %state, "connectivity changed");
        if state == ConnectivityState::Disconnected {
            self.arm_grace(cx);
        } else {
            self.disarm_grace();
        }
        cx.notify(CallEvent::ConnectivityChanged(state));
    }

    // отложенная проверка: не восстановились за grace period → Failed
    fn arm_grace(&mut self, cx: &mut Context<'_, IngressEvent, CallEvent>) {
        let Some(grace) = self.grace else {
            return;
        };
        self.disarm_grace();
        self.grace_epoch += 1;

        let epoch = self.grace_epoch;
        let sender = cx.sender();
        debug!(call_id = %self.shared.call_id, "Grace period started, waiting {} ms", grace.as_millis());
        self.grace_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            sender.submit(IngressEvent::GraceExpired(epoch));
        }));
    }

    fn disarm_grace(&mut self) {
        if let Some(handle) = self.grace_timer.take() {
            debug!(call_id = %self.shared.call_id, "Aborting pending grace timer");
            handle.abort();
        }
    }

    fn on_data(&mut self, bytes: Bytes, cx: &mut Context<'_, IngressEvent, CallEvent>) -> Flow {
        dump_payload("INBOUND", &bytes);

        let message = match ControlMessage::decode(&bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(call_id = %self.shared.call_id, "Rejected inbound control message: {err}");
                cx.notify(CallEvent::ControlMessageRejected(err));
                return Flow::Continue;
            }
        };

        if let Some(call_id) = message.call_id() {
            if call_id != self.shared.call_id {
                warn!(
                    call_id = %self.shared.call_id,
                    "Ignoring {:?} addressed to call {}", message, call_id
                );
                return Flow::Continue;
            }
        }

        debug!(call_id = %self.shared.call_id, "Received control message {:?}", message);
        cx.notify(CallEvent::ControlMessageReceived(message));

        if let ControlMessage::Hangup { .. } = message {
            info!(call_id = %self.shared.call_id, "Remote hung up, tearing session down");
            if let Teardown::Started(handle) = self.shared.begin_teardown() {
                self.transport.close(handle);
            }
            return Flow::Shutdown;
        }
        Flow::Continue
    }
}

impl IngressHandler for CallHandler {
    type Event = IngressEvent;
    type Notification = CallEvent;

    fn handle(&mut self, event: IngressEvent, cx: &mut Context<'_, IngressEvent, CallEvent>) -> Flow {
        match event {
            IngressEvent::RawState(raw) => self.observe(raw, cx),
            IngressEvent::LocalCandidate(candidate) => {
                let candidate = self
                    .shared
                    .candidates
                    .lock()
                    .on_local_candidate_generated(candidate);
                cx.notify(CallEvent::LocalCandidateReady(candidate));
            }
            IngressEvent::Data(bytes) => return self.on_data(bytes, cx),
            IngressEvent::LocalVideoTrack(present) => {
                cx.notify(CallEvent::LocalVideoTrackChanged(present));
            }
            IngressEvent::RemoteVideoTrack(present) => {
                cx.notify(CallEvent::RemoteVideoTrackChanged(present));
            }
            IngressEvent::GraceExpired(epoch) => {
                // тихий Checking не считается восстановлением
                if epoch == self.grace_epoch
                    && self.machine.last_surfaced() == ConnectivityState::Disconnected
                    && self.machine.current() != ConnectivityState::Connected
                {
                    self.grace_timer = None;
                    warn!(call_id = %self.shared.call_id, "No recovery within grace period");
                    self.observe(RawConnectionState::Failed, cx);
                }
            }
        }
        Flow::Continue
    }

    fn shutdown(&mut self, cx: &mut Context<'_, IngressEvent, CallEvent>) {
        self.disarm_grace();
        if let Some(state) = self.machine.terminate() {
            self.shared.connectivity.send_replace(state);
            // неудачный старт сообщается только через Err
            if self.shared.phase() != SessionPhase::Terminated {
                cx.notify(CallEvent::ConnectivityChanged(state));
            }
        }
        analyze_candidates(
            self.shared.candidates.lock().local_candidates(),
            self.relay_only,
        );
    }
}

/// Runs on the egress context.
struct DelegateSink {
    shared: Arc<Shared>,
    delegate: Arc<dyn CallDelegate>,
}

impl EgressSink<CallEvent> for DelegateSink {
    fn deliver(&mut self, event: CallEvent) {
        event.deliver_to(self.delegate.as_ref());
    }

    fn finish(&mut self) {
        let started_at = {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.phase = SessionPhase::Terminated;
            lifecycle.handle = None;
            lifecycle.started_at
        };
        match started_at {
            Some(start) => info!(
                call_id = %self.shared.call_id,
                duration_secs = (Utc::now() - start).num_seconds(),
                "Session terminated"
            ),
            None => info!(call_id = %self.shared.call_id, "Session terminated"),
        }
    }
}

pub struct SignalingSession {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    delegate: Arc<dyn CallDelegate>,
    shared: Arc<Shared>,
    dispatcher: OnceCell<Dispatcher<IngressEvent>>,
}

impl SignalingSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        delegate: Arc<dyn CallDelegate>,
    ) -> Result<Self> {
        config.validate()?;
        let (connectivity, _) = watch::channel(ConnectivityState::New);
        let shared = Arc::new(Shared {
            call_id: config.call_id,
            lifecycle: Mutex::new(Lifecycle {
                phase: SessionPhase::Idle,
                handle: None,
                started_at: None,
            }),
            candidates: Mutex::new(CandidatePipeline::new()),
            connectivity,
        });

        debug!(call_id = %config.call_id, direction = %config.direction, "Session created");
        Ok(Self {
            config,
            transport,
            delegate,
            shared,
            dispatcher: OnceCell::new(),
        })
    }

    pub fn call_id(&self) -> CallId {
        self.config.call_id
    }

    pub fn direction(&self) -> CallDirection {
        self.config.direction
    }

    pub fn use_relay_only(&self) -> bool {
        self.config.use_relay_only
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        *self.shared.connectivity.borrow()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.shared.connectivity.subscribe()
    }

    /// Local candidates in generation order.
    pub fn local_candidates(&self) -> Vec<Candidate> {
        self.shared.candidates.lock().local_candidates().to_vec()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.shared.lifecycle.lock().started_at
    }

    pub fn transport_handle(&self) -> Option<TransportHandle> {
        self.shared.lifecycle.lock().handle
    }

    /// Starts an outgoing call.
    pub fn initiate(&self) -> Result<()> {
        self.activate(CallDirection::Outgoing)
    }

    /// Starts an accepted incoming call.
    pub fn accept(&self) -> Result<()> {
        self.activate(CallDirection::Incoming)
    }

    fn activate(&self, expected: CallDirection) -> Result<()> {
        if self.config.direction != expected {
            return Err(SignalingError::DirectionMismatch {
                expected,
                actual: self.config.direction,
            });
        }
        let runtime = Handle::try_current().map_err(|_| SignalingError::NoRuntime)?;

        let mut lifecycle = self.shared.lifecycle.lock();
        match lifecycle.phase {
            SessionPhase::Idle => {}
            SessionPhase::Active => return Err(SignalingError::AlreadyStarted(lifecycle.phase)),
            SessionPhase::Terminating | SessionPhase::Terminated => {
                debug!(call_id = %self.call_id(), "Ignoring start of a torn down session");
                return Ok(());
            }
        }

        let transport_config = self.config.transport_config();
        let handle = self.transport.open(&transport_config)?;

        let handler = CallHandler {
            shared: self.shared.clone(),
            transport: self.transport.clone(),
            machine: ConnectionStateMachine::new(),
            relay_only: self.config.use_relay_only,
            grace: self.config.disconnect_grace(),
            grace_timer: None,
            grace_epoch: 0,
        };
        let sink = DelegateSink {
            shared: self.shared.clone(),
            delegate: self.delegate.clone(),
        };
        let dispatcher = Dispatcher::spawn(&runtime, handler, sink, self.config.egress_capacity);
        let observer = Arc::new(IngressObserver {
            call_id: self.call_id(),
            sender: dispatcher.sender(),
        });
        let registered = self.transport.register_observer(handle, observer);

        lifecycle.handle = Some(handle);
        lifecycle.started_at = Some(Utc::now());
        if let Err(err) = registered {
            warn!(call_id = %self.call_id(), "Observer registration failed, tearing down: {err}");
            lifecycle.phase = SessionPhase::Terminated;
            lifecycle.handle = None;
            dispatcher.close();
            let _ = self.dispatcher.set(dispatcher);
            drop(lifecycle);
            self.transport.close(handle);
            return Err(err.into());
        }

        lifecycle.phase = SessionPhase::Active;
        let _ = self.dispatcher.set(dispatcher);

        // применяем кандидаты, полученные до открытия транспорта
        let mut candidates = self.shared.candidates.lock();
        for candidate in candidates.take_pending_remote() {
            if let Err(err) =
                candidates.on_remote_candidate_received(self.transport.as_ref(), handle, &candidate)
            {
                warn!(call_id = %self.call_id(), "Failed to apply pending candidate: {err}");
            }
        }
        drop(candidates);
        drop(lifecycle);

        info!(
            call_id = %self.call_id(),
            direction = %self.config.direction,
            relay_only = self.config.use_relay_only,
            %handle,
            "Session active"
        );
        Ok(())
    }

    /// Applies a remote candidate, or buffers it if the session has not started.
    ///
    /// Failures never change connectivity state.
    pub fn on_remote_candidate_received(
        &self,
        candidate: Candidate,
    ) -> std::result::Result<(), CandidateError> {
        let lifecycle = self.shared.lifecycle.lock();
        match (lifecycle.phase, lifecycle.handle) {
            (SessionPhase::Idle, _) => self.shared.candidates.lock().buffer_remote(candidate),
            (SessionPhase::Active, Some(handle)) => {
                drop(lifecycle);
                self.shared.candidates.lock().on_remote_candidate_received(
                    self.transport.as_ref(),
                    handle,
                    &candidate,
                )
            }
            _ => Err(CandidateError::TransportClosed),
        }
    }

    /// Encodes and sends a control message. A no-op unless the session is active.
    pub fn send_control(&self, message: ControlMessage) -> Result<()> {
        let handle = {
            let lifecycle = self.shared.lifecycle.lock();
            match (lifecycle.phase, lifecycle.handle) {
                (SessionPhase::Active, Some(handle)) => handle,
                (phase, _) => {
                    debug!(call_id = %self.call_id(), ?phase, "Dropping outbound {:?}", message);
                    return Ok(());
                }
            }
        };

        let bytes = message.encode();
        dump_payload("OUTBOUND", &bytes);
        self.transport.send_data(handle, bytes)?;
        Ok(())
    }

    pub fn send_connected(&self) -> Result<()> {
        self.send_control(ControlMessage::Connected)
    }

    /// Tells the remote side we hung up. Does not terminate this session.
    pub fn send_hangup(&self) -> Result<()> {
        self.send_control(ControlMessage::Hangup {
            call_id: self.call_id(),
        })
    }

    pub fn send_busy(&self) -> Result<()> {
        self.send_control(ControlMessage::Busy {
            call_id: self.call_id(),
        })
    }

    pub fn set_local_video_enabled(&self, enabled: bool) -> Result<()> {
        self.send_control(ControlMessage::VideoStreamingStatus {
            call_id: self.call_id(),
            enabled,
        })
    }

    /// Tears the session down. Idempotent.
    ///
    /// Closes the transport before returning. Events already queued on the
    /// ingress context are still delivered, followed by `Terminated`; nothing
    /// the transport reports afterwards is.
    pub fn terminate(&self) {
        match self.shared.begin_teardown() {
            Teardown::Idle => {
                info!(call_id = %self.call_id(), "Session terminated before start");
            }
            Teardown::Started(handle) => {
                info!(call_id = %self.call_id(), "Terminating session");
                if let Some(dispatcher) = self.dispatcher.get() {
                    dispatcher.close();
                }
                self.transport.close(handle);
            }
            Teardown::AlreadyStopping => {
                debug!(call_id = %self.call_id(), "Session already terminating");
            }
        }
    }

    /// Waits until every event accepted so far has reached the delegate.
    pub async fn drain(&self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.drain().await;
        }
    }

    /// Resolves once the session reached `Terminated`.
    pub async fn terminated(&self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.finished().await;
        }
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        self.terminate();
    }
}
