use crate::config::{DEFAULT_LOG_FILTER, LOG_TIME_FORMAT};
use crate::peer::types::{Candidate, CandidateKind};
use tracing::{debug, info, trace, warn};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use webrtc::peer_connection::RTCPeerConnection;

/// Installs the global fmt subscriber with local timestamps.
///
/// `RUST_LOG` overrides the compiled-in filter. Returns `false` when a global
/// subscriber was already installed.
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &Candidate) {
    debug!(
        "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
        cand.sdp_payload(),
        cand.sdp_mid(),
        cand.sdp_mline_index()
    );
}

/// Hex dump of a data-channel payload.
pub fn dump_payload(label: &str, payload: &[u8]) {
    trace!("{label}: {} bytes [{}]", payload.len(), hex::encode(payload));
}

/// Summary of the gathered candidate types.
pub fn analyze_candidates(candidates: &[Candidate], relay_only: bool) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        match candidate.kind() {
            Some(CandidateKind::Host) => host_count += 1,
            Some(CandidateKind::ServerReflexive) | Some(CandidateKind::PeerReflexive) => {
                srflx_count += 1
            }
            Some(CandidateKind::Relay) => relay_count += 1,
            None => {}
        }
    }

    info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    );

    if relay_only && relay_count == 0 {
        warn!("Relay-only call produced no TURN relay candidates; connection will fail");
    }
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                debug!(
                    "STATS {moment}: {}:{} type: {:?} bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.stats_type,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                );
            }
        }
    }
}
