use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity signal as reported by the transport.
///
/// Ordered the way the underlying ICE agent progresses; noisier than the
/// surfaced [`ConnectivityState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RawConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for RawConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Checking => write!(f, "checking"),
            Self::Connected => write!(f, "connected"),
            Self::Completed => write!(f, "completed"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Call connectivity as seen by the consumer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Terminated,
}

impl ConnectivityState {
    /// `Failed` and `Terminated` accept no further transitions.
    pub fn is_absorbing(self) -> bool {
        matches!(self, ConnectivityState::Failed | ConnectivityState::Terminated)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Checking => write!(f, "checking"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Reduces a raw signal against the last surfaced state.
///
/// Returns the state to surface, or `None` when the signal produces no
/// visible transition. `New` and `Checking` never surface; repeats of the
/// last surfaced state are swallowed; nothing follows an absorbing state.
pub fn reduce(
    raw: RawConnectionState,
    last_surfaced: ConnectivityState,
) -> Option<ConnectivityState> {
    if last_surfaced.is_absorbing() {
        return None;
    }

    let surfaced = match raw {
        RawConnectionState::New | RawConnectionState::Checking => return None,
        RawConnectionState::Connected | RawConnectionState::Completed => {
            ConnectivityState::Connected
        }
        RawConnectionState::Disconnected => ConnectivityState::Disconnected,
        RawConnectionState::Failed => ConnectivityState::Failed,
        RawConnectionState::Closed => ConnectivityState::Terminated,
    };

    (surfaced != last_surfaced).then_some(surfaced)
}

/// Authoritative connectivity state of one session.
///
/// Owned by the ingress context; [`observe_transport_state`](Self::observe_transport_state)
/// is the only way raw signals get in.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    current: ConnectivityState,
    last_surfaced: ConnectivityState,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            current: ConnectivityState::New,
            last_surfaced: ConnectivityState::New,
        }
    }

    /// Current state, including the silent `Checking` phase.
    pub fn current(&self) -> ConnectivityState {
        self.current
    }

    pub fn last_surfaced(&self) -> ConnectivityState {
        self.last_surfaced
    }

    pub fn is_absorbed(&self) -> bool {
        self.last_surfaced.is_absorbing()
    }

    /// Feeds one raw signal. Returns the state to notify, if any.
    pub fn observe_transport_state(
        &mut self,
        raw: RawConnectionState,
    ) -> Option<ConnectivityState> {
        if self.is_absorbed() {
            return None;
        }

        if raw == RawConnectionState::Checking
            && matches!(
                self.current,
                ConnectivityState::New | ConnectivityState::Disconnected
            )
        {
            self.current = ConnectivityState::Checking;
        }

        match reduce(raw, self.last_surfaced) {
            Some(surfaced) => {
                self.current = surfaced;
                self.last_surfaced = surfaced;
                Some(surfaced)
            }
            None => {
                // повтор уже показанного состояния сбрасывает тихий Checking
                if !matches!(raw, RawConnectionState::New | RawConnectionState::Checking) {
                    self.current = self.last_surfaced;
                }
                None
            }
        }
    }

    /// Teardown requested by the session rather than the transport.
    pub fn terminate(&mut self) -> Option<ConnectivityState> {
        self.observe_transport_state(RawConnectionState::Closed)
    }
}
