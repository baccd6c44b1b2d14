use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one call, shared by both participants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl CallId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for CallId {
    fn from(value: u64) -> Self {
        CallId(value)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

impl CallDirection {
    /// The outgoing side opens the data channel, the incoming side waits for it.
    pub fn is_initiator(self) -> bool {
        matches!(self, CallDirection::Outgoing)
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Outgoing => write!(f, "outgoing"),
            CallDirection::Incoming => write!(f, "incoming"),
        }
    }
}

/// ICE candidate type, as carried after `typ` in the candidate line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl CandidateKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "host" => Some(CandidateKind::Host),
            "srflx" => Some(CandidateKind::ServerReflexive),
            "prflx" => Some(CandidateKind::PeerReflexive),
            "relay" => Some(CandidateKind::Relay),
            _ => None,
        }
    }
}

/// Connectivity candidate exchanged between the call participants.
///
/// Candidates are immutable once produced; the transport creates them and
/// the remote side hands them over verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    sdp_mid: Option<String>,
    sdp_mline_index: Option<u16>,
    sdp_payload: String,
}

impl Candidate {
    pub fn new(
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
        sdp_payload: impl Into<String>,
    ) -> Self {
        Self {
            sdp_mid,
            sdp_mline_index,
            sdp_payload: sdp_payload.into(),
        }
    }

    pub fn sdp_mid(&self) -> Option<&str> {
        self.sdp_mid.as_deref()
    }

    pub fn sdp_mline_index(&self) -> Option<u16> {
        self.sdp_mline_index
    }

    pub fn sdp_payload(&self) -> &str {
        &self.sdp_payload
    }

    /// Parses the candidate line and returns the candidate type.
    ///
    /// Returns `None` when the payload is not a well-formed
    /// `candidate:<foundation> <component> <transport> <priority> <address> <port> typ <type>`
    /// line.
    pub fn kind(&self) -> Option<CandidateKind> {
        let line = self.sdp_payload.trim();
        let line = line.strip_prefix("a=").unwrap_or(line);
        let line = line.strip_prefix("candidate:")?;

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return None;
        }
        fields[1].parse::<u16>().ok()?;
        fields[3].parse::<u32>().ok()?;
        fields[5].parse::<u16>().ok()?;
        if fields[6] != "typ" {
            return None;
        }
        CandidateKind::parse(fields[7])
    }

    pub fn is_well_formed(&self) -> bool {
        self.kind().is_some()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IceServerKind {
    Stun,
    Turn,
}

/// ICE server supplied by the embedding app
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "crate::utils::random_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: IceServerKind,
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn stun(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: IceServerKind::Stun,
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        id: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: IceServerKind::Turn,
            url: url.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}
