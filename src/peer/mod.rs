pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod state;
pub mod types;

pub use connection::WebRtcTransport;
pub use ice::CandidatePipeline;
pub use state::{ConnectionStateMachine, ConnectivityState, RawConnectionState};
pub use types::{CallDirection, CallId, Candidate, CandidateKind, IceServerKind, ServerConfig};
