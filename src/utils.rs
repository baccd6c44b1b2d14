use crate::peer::types::{CallId, IceServerKind, ServerConfig};
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

pub fn random_call_id() -> CallId {
    CallId(rand::rng().random::<u64>())
}

// Добавляет схему протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    let url = config.url.trim();
    if url.starts_with("turn:")
        || url.starts_with("turns:")
        || url.starts_with("stun:")
        || url.starts_with("stuns:")
    {
        url.to_string()
    } else {
        let scheme = match config.kind {
            IceServerKind::Turn => "turn:",
            IceServerKind::Stun => "stun:",
        };
        format!("{}{}", scheme, url)
    }
}
