//! Call-signaling core: connectivity state machine, ICE candidate pipeline,
//! data-channel control-message codec and the session that ties them to a
//! peer-connection transport.

pub mod config;
pub mod delegate;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod message;
pub mod peer;
pub mod session;
pub mod transport;
pub mod utils;

pub use config::SessionConfig;
pub use delegate::{CallDelegate, CallEvent, ChannelDelegate};
pub use error::{CandidateError, ConfigError, DecodeError, SignalingError, TransportError};
pub use message::ControlMessage;
pub use peer::{
    CallDirection, CallId, Candidate, ConnectivityState, RawConnectionState, ServerConfig,
    WebRtcTransport,
};
pub use session::{SessionPhase, SignalingSession};
pub use transport::{Transport, TransportConfig, TransportHandle, TransportObserver};
