use crate::error::TransportError;
use crate::logger::dump_selected_pair;
use crate::peer::data_channel::attach_dc;
use crate::peer::ice::{candidate_from_init, candidate_init, rtc_ice_servers};
use crate::peer::state::RawConnectionState;
use crate::peer::types::Candidate;
use crate::transport::{Transport, TransportConfig, TransportHandle, TransportObserver};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

pub(crate) type ObserverSlot = Arc<Mutex<Option<Arc<dyn TransportObserver>>>>;
type ChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

/// Calls the registered observer, if any. The lock is not held during the call.
pub(crate) fn notify(slot: &ObserverSlot, f: impl FnOnce(&dyn TransportObserver)) {
    let observer = slot.lock().clone();
    if let Some(observer) = observer {
        f(observer.as_ref());
    }
}

enum Command {
    ApplyCandidate(Candidate),
    Send(Bytes),
    FlushPending,
    Close,
}

struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    observer: ObserverSlot,
    peer: Arc<OnceCell<Arc<RTCPeerConnection>>>,
}

/// [`Transport`] over `webrtc`'s peer connection.
///
/// Each open connection is driven by its own task; calls into the transport
/// only enqueue commands for it. SDP offer/answer is left to the embedding
/// application through [`peer_connection`](Self::peer_connection).
pub struct WebRtcTransport {
    runtime: Handle,
    next_id: AtomicU64,
    connections: Mutex<HashMap<TransportHandle, Connection>>,
}

impl WebRtcTransport {
    /// Binds to the tokio runtime of the calling context.
    pub fn new() -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying peer connection, once it has been created.
    pub fn peer_connection(&self, handle: TransportHandle) -> Option<Arc<RTCPeerConnection>> {
        self.connections
            .lock()
            .get(&handle)
            .and_then(|conn| conn.peer.get().cloned())
    }

    /// Applies remote candidates held back until the remote description was set.
    pub fn flush_pending_candidates(&self, handle: TransportHandle) -> Result<(), TransportError> {
        self.command(handle, Command::FlushPending)
    }

    fn command(&self, handle: TransportHandle, command: Command) -> Result<(), TransportError> {
        let connections = self.connections.lock();
        match connections.get(&handle) {
            Some(conn) => conn
                .commands
                .send(command)
                .map_err(|_| TransportError::Closed(handle)),
            None => Err(self.missing(handle)),
        }
    }

    // handles are never reused, so a known id that is gone has been closed
    fn missing(&self, handle: TransportHandle) -> TransportError {
        if handle.0 != 0 && handle.0 <= self.next_id.load(Ordering::Acquire) {
            TransportError::Closed(handle)
        } else {
            TransportError::UnknownHandle(handle)
        }
    }
}

impl Transport for WebRtcTransport {
    fn open(&self, config: &TransportConfig) -> Result<TransportHandle, TransportError> {
        let handle = TransportHandle(self.next_id.fetch_add(1, Ordering::AcqRel) + 1);
        let (commands, rx) = mpsc::unbounded_channel();
        let observer: ObserverSlot = Arc::new(Mutex::new(None));
        let peer = Arc::new(OnceCell::new());

        self.runtime.spawn(run_connection(
            handle,
            config.clone(),
            rx,
            observer.clone(),
            peer.clone(),
        ));
        self.connections.lock().insert(
            handle,
            Connection {
                commands,
                observer,
                peer,
            },
        );

        info!(%handle, initiator = config.initiator, relay_only = config.relay_only, "Opening peer connection");
        Ok(handle)
    }

    fn close(&self, handle: TransportHandle) {
        let Some(conn) = self.connections.lock().remove(&handle) else {
            debug!(%handle, "Close of unknown or already closed connection");
            return;
        };
        // после close наблюдатель больше ничего не получает
        conn.observer.lock().take();
        let _ = conn.commands.send(Command::Close);
    }

    fn apply_remote_candidate(
        &self,
        handle: TransportHandle,
        candidate: &Candidate,
    ) -> Result<(), TransportError> {
        self.command(handle, Command::ApplyCandidate(candidate.clone()))
    }

    fn send_data(&self, handle: TransportHandle, bytes: Bytes) -> Result<(), TransportError> {
        self.command(handle, Command::Send(bytes))
    }

    fn register_observer(
        &self,
        handle: TransportHandle,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<(), TransportError> {
        let connections = self.connections.lock();
        let conn = connections.get(&handle).ok_or_else(|| self.missing(handle))?;
        *conn.observer.lock() = Some(observer);
        Ok(())
    }
}

fn raw_state(state: RTCIceConnectionState) -> Option<RawConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(RawConnectionState::New),
        RTCIceConnectionState::Checking => Some(RawConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(RawConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(RawConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(RawConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(RawConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(RawConnectionState::Closed),
        RTCIceConnectionState::Unspecified => None,
    }
}

/// создаём Peer; если `initiator`, то сами делаем data-channel
async fn new_peer(
    handle: TransportHandle,
    config: &TransportConfig,
    observer: &ObserverSlot,
    channel: &ChannelSlot,
) -> Result<Arc<RTCPeerConnection>, webrtc::Error> {
    let mut media = MediaEngine::default();
    media.register_default_codecs()?;
    let api = APIBuilder::new().with_media_engine(media).build();

    let rtc_config = RTCConfiguration {
        ice_servers: rtc_ice_servers(&config.ice_servers),
        ice_transport_policy: if config.relay_only {
            RTCIceTransportPolicy::Relay
        } else {
            RTCIceTransportPolicy::All
        },
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    };
    let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

    pc.on_ice_connection_state_change(Box::new({
        let observer = observer.clone();
        move |state: RTCIceConnectionState| {
            debug!(%handle, "ICE connection state changed to: {:?}", state);
            if let Some(raw) = raw_state(state) {
                notify(&observer, |o| o.on_raw_state_change(raw));
            }
            Box::pin(async {})
        }
    }));

    // снимок выбранной пары, когда соединение деградирует
    let weak = Arc::downgrade(&pc);
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        debug!(%handle, "Peer connection state changed to: {:?}", state);
        let degraded = matches!(
            state,
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed
        );
        let pc = if degraded { weak.upgrade() } else { None };
        Box::pin(async move {
            if let Some(pc) = pc {
                dump_selected_pair(&pc, "BEFORE-FAIL").await;
            }
        })
    }));

    pc.on_ice_candidate(Box::new({
        let observer = observer.clone();
        move |candidate: Option<RTCIceCandidate>| {
            match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => {
                        let candidate = candidate_from_init(init);
                        notify(&observer, |o| o.on_local_candidate(candidate));
                    }
                    Err(err) => warn!(%handle, "Failed to serialize local candidate: {err}"),
                },
                // None означает конец сбора
                None => debug!(%handle, "ICE candidate gathering completed"),
            }
            Box::pin(async {})
        }
    }));

    pc.on_track(Box::new({
        let observer = observer.clone();
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            if track.kind() == RTPCodecType::Video {
                debug!(%handle, "Remote video track {}", track.id());
                notify(&observer, |o| o.on_remote_video_track(true));
            }
            Box::pin(async {})
        }
    }));

    if config.initiator {
        let dc = pc
            .create_data_channel(&config.data_channel_label, Some(RTCDataChannelInit::default()))
            .await?;
        attach_dc(handle, &dc, observer.clone());
        *channel.lock() = Some(dc);
    } else {
        let observer = observer.clone();
        let channel = channel.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            attach_dc(handle, &dc, observer.clone());
            *channel.lock() = Some(dc);
            Box::pin(async {})
        }));
    }

    Ok(pc)
}

async fn add_candidate(handle: TransportHandle, pc: &RTCPeerConnection, candidate: &Candidate) {
    if let Err(err) = pc.add_ice_candidate(candidate_init(candidate)).await {
        warn!(%handle, "Failed to add remote candidate: {err}");
    }
}

async fn run_connection(
    handle: TransportHandle,
    config: TransportConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    observer: ObserverSlot,
    peer: Arc<OnceCell<Arc<RTCPeerConnection>>>,
) {
    let channel: ChannelSlot = Arc::new(Mutex::new(None));
    let pc = match new_peer(handle, &config, &observer, &channel).await {
        Ok(pc) => pc,
        Err(err) => {
            error!(%handle, "Failed to create peer connection: {err}");
            notify(&observer, |o| o.on_raw_state_change(RawConnectionState::Failed));
            return;
        }
    };
    let _ = peer.set(pc.clone());

    // кандидаты, пришедшие до remote description
    let mut pending: Vec<Candidate> = Vec::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::ApplyCandidate(candidate) => {
                if pc.remote_description().await.is_none() {
                    debug!(%handle, "Remote description not set, queuing candidate");
                    pending.push(candidate);
                } else {
                    add_candidate(handle, &pc, &candidate).await;
                }
            }
            Command::FlushPending => {
                if pc.remote_description().await.is_none() {
                    debug!(%handle, "Flush requested without remote description");
                    continue;
                }
                debug!(%handle, "Applying {} pending remote candidates", pending.len());
                for candidate in pending.drain(..) {
                    add_candidate(handle, &pc, &candidate).await;
                }
            }
            Command::Send(bytes) => {
                let dc = channel.lock().clone();
                match dc {
                    Some(dc) => {
                        if let Err(err) = dc.send(&bytes).await {
                            warn!(%handle, "Data channel send failed: {err}");
                        }
                    }
                    None => warn!(%handle, "No data channel yet, dropping {} bytes", bytes.len()),
                }
            }
            Command::Close => break,
        }
    }

    if let Err(err) = pc.close().await {
        warn!(%handle, "Error closing peer connection: {err}");
    }
    info!(%handle, "Peer connection closed");
}
