use crate::error::{CandidateError, TransportError};
use crate::logger::dump_candidate;
use crate::peer::types::{Candidate, IceServerKind, ServerConfig};
use crate::transport::{Transport, TransportHandle};
use tracing::debug;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Local and remote candidate bookkeeping for one session.
///
/// Local candidates are kept in generation order and forwarded exactly once
/// each. Remote candidates that arrive before the transport exists are held
/// until [`take_pending_remote`](Self::take_pending_remote).
#[derive(Debug, Default)]
pub struct CandidatePipeline {
    local: Vec<Candidate>,
    pending_remote: Vec<Candidate>,
    applied_remote: usize,
}

impl CandidatePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a candidate produced by the transport and returns the value to
    /// forward. No deduplication: the transport never repeats itself.
    pub fn on_local_candidate_generated(&mut self, candidate: Candidate) -> Candidate {
        dump_candidate("LOCAL", &candidate);
        self.local.push(candidate.clone());
        debug!("Added local candidate, total count: {}", self.local.len());
        candidate
    }

    pub fn local_candidates(&self) -> &[Candidate] {
        &self.local
    }

    pub fn applied_remote(&self) -> usize {
        self.applied_remote
    }

    pub fn pending_remote(&self) -> &[Candidate] {
        &self.pending_remote
    }

    // кандидаты, полученные до открытия транспорта
    pub fn buffer_remote(&mut self, candidate: Candidate) -> Result<(), CandidateError> {
        check_candidate(&candidate)?;
        debug!("Transport not open yet, queuing remote candidate");
        self.pending_remote.push(candidate);
        Ok(())
    }

    pub fn take_pending_remote(&mut self) -> Vec<Candidate> {
        std::mem::take(&mut self.pending_remote)
    }

    /// Applies a remote candidate to the transport.
    pub fn on_remote_candidate_received(
        &mut self,
        transport: &dyn Transport,
        handle: TransportHandle,
        candidate: &Candidate,
    ) -> Result<(), CandidateError> {
        check_candidate(candidate)?;
        dump_candidate("REMOTE", candidate);
        transport
            .apply_remote_candidate(handle, candidate)
            .map_err(|err| match err {
                TransportError::Closed(_) => CandidateError::TransportClosed,
                other => CandidateError::Transport(other),
            })?;
        self.applied_remote += 1;
        Ok(())
    }
}

fn check_candidate(candidate: &Candidate) -> Result<(), CandidateError> {
    if candidate.is_well_formed() {
        Ok(())
    } else {
        Err(CandidateError::Malformed(candidate.sdp_payload().to_string()))
    }
}

pub fn candidate_init(candidate: &Candidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.sdp_payload().to_string(),
        sdp_mid: candidate.sdp_mid().map(str::to_string),
        sdp_mline_index: candidate.sdp_mline_index(),
        username_fragment: None,
    }
}

pub fn candidate_from_init(init: RTCIceCandidateInit) -> Candidate {
    Candidate::new(init.sdp_mid, init.sdp_mline_index, init.candidate)
}

/// ICE servers in the form the webrtc stack expects. URLs must already be normalized.
pub fn rtc_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| match config.kind {
            IceServerKind::Turn => RTCIceServer {
                urls: vec![config.url.clone()],
                username: config.username.clone().unwrap_or_default(),
                credential: config.credential.clone().unwrap_or_default(),
            },
            IceServerKind::Stun => RTCIceServer {
                urls: vec![config.url.clone()],
                ..Default::default()
            },
        })
        .collect()
}
