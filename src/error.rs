use crate::peer::types::CallDirection;
use crate::session::SessionPhase;
use crate::transport::TransportHandle;

/// Result type used by session operations.
pub type Result<T> = std::result::Result<T, SignalingError>;

/// Control-message payload rejected by the codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown control message tag {0:#04x}")]
    UnknownVariant(u8),

    #[error("malformed control message: {reason}")]
    Malformed { reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("unknown transport handle {0}")]
    UnknownHandle(TransportHandle),

    #[error("transport {0} is closed")]
    Closed(TransportHandle),

    #[error("no tokio runtime available to drive the transport")]
    NoRuntime,

    #[error("transport rejected the operation: {0}")]
    Rejected(String),
}

/// Failure to apply a remote candidate. Never affects connectivity state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    #[error("malformed candidate: {0:?}")]
    Malformed(String),

    #[error("transport already closed")]
    TransportClosed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ICE server {id:?} has an empty URL")]
    EmptyServerUrl { id: String },

    #[error("TURN server {id:?} requires username and credential")]
    MissingTurnCredentials { id: String },

    #[error("relay-only calls need at least one TURN server")]
    RelayOnlyWithoutTurn,

    #[error("egress capacity must be non-zero")]
    ZeroEgressCapacity,

    #[error("invalid session config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("signaling session must run inside a tokio runtime")]
    NoRuntime,

    #[error("{actual} call cannot be started as {expected}")]
    DirectionMismatch {
        expected: CallDirection,
        actual: CallDirection,
    },

    #[error("session already started (phase {0:?})")]
    AlreadyStarted(SessionPhase),
}
