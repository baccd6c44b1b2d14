//! Capability interface of the underlying peer-connection transport.
//!
//! The session only ever talks to the transport through [`Transport`]; the
//! transport reports back through a registered [`TransportObserver`]. Every
//! call is fire-and-forget: implementations must not block on I/O and report
//! asynchronous outcomes through the observer instead.

use crate::peer::state::RawConnectionState;
use crate::peer::types::{Candidate, ServerConfig};
use crate::error::TransportError;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Opaque handle to one open transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u64);

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the transport needs to set up a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Servers with normalized `stun:`/`turn:` URLs.
    pub ice_servers: Vec<ServerConfig>,
    pub relay_only: bool,
    /// Whether this side creates the data channel.
    pub initiator: bool,
    pub data_channel_label: String,
}

pub trait Transport: Send + Sync + 'static {
    fn open(&self, config: &TransportConfig) -> Result<TransportHandle, TransportError>;

    fn close(&self, handle: TransportHandle);

    fn apply_remote_candidate(
        &self,
        handle: TransportHandle,
        candidate: &Candidate,
    ) -> Result<(), TransportError>;

    fn send_data(&self, handle: TransportHandle, bytes: Bytes) -> Result<(), TransportError>;

    fn register_observer(
        &self,
        handle: TransportHandle,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<(), TransportError>;
}

/// Callbacks invoked from the transport's own callback context.
pub trait TransportObserver: Send + Sync + 'static {
    fn on_raw_state_change(&self, state: RawConnectionState);

    fn on_local_candidate(&self, candidate: Candidate);

    fn on_data_received(&self, bytes: Bytes);

    fn on_local_video_track(&self, _present: bool) {}

    fn on_remote_video_track(&self, _present: bool) {}
}
