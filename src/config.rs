// Конфигурация сессии и значения по умолчанию
// Фильтр логирования по умолчанию зависит от режима сборки

use crate::error::ConfigError;
use crate::peer::types::{CallDirection, CallId, IceServerKind, ServerConfig};
use crate::transport::TransportConfig;
use crate::utils::{add_ice_url_scheme, random_call_id};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "call_signaling=debug"; // в режиме отладки подробные логи

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "call_signaling=warn"; // в продакшене только предупреждения

pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Период ожидания восстановления после Disconnected
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

pub const DEFAULT_EGRESS_CAPACITY: usize = 64;

pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "signaling";

/// Публичные STUN серверы, если приложение не передало свои
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig::stun("default-stun", "stun:stun.l.google.com:19302"),
        ServerConfig::stun("default-stun-1", "stun:stun1.l.google.com:19302"),
    ]
});

fn default_ice_servers() -> Vec<ServerConfig> {
    DEFAULT_ICE_SERVERS.clone()
}

fn default_disconnect_grace_ms() -> Option<u64> {
    Some(GRACE_PERIOD.as_millis() as u64)
}

fn default_egress_capacity() -> usize {
    DEFAULT_EGRESS_CAPACITY
}

fn default_data_channel_label() -> String {
    DEFAULT_DATA_CHANNEL_LABEL.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Generated when absent, for outgoing calls started from JSON.
    #[serde(default = "random_call_id")]
    pub call_id: CallId,
    pub direction: CallDirection,
    #[serde(default)]
    pub use_relay_only: bool,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<ServerConfig>,
    /// `None` disables the grace timer.
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: Option<u64>,
    #[serde(default = "default_egress_capacity")]
    pub egress_capacity: usize,
    #[serde(default = "default_data_channel_label")]
    pub data_channel_label: String,
}

impl SessionConfig {
    pub fn new(call_id: CallId, direction: CallDirection) -> Self {
        Self {
            call_id,
            direction,
            use_relay_only: false,
            ice_servers: default_ice_servers(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
            egress_capacity: DEFAULT_EGRESS_CAPACITY,
            data_channel_label: default_data_channel_label(),
        }
    }

    pub fn outgoing(call_id: CallId) -> Self {
        Self::new(call_id, CallDirection::Outgoing)
    }

    pub fn incoming(call_id: CallId) -> Self {
        Self::new(call_id, CallDirection::Incoming)
    }

    pub fn with_relay_only(mut self, use_relay_only: bool) -> Self {
        self.use_relay_only = use_relay_only;
        self
    }

    pub fn with_ice_servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn with_disconnect_grace(mut self, grace: Option<Duration>) -> Self {
        self.disconnect_grace_ms = grace.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_egress_capacity(mut self, capacity: usize) -> Self {
        self.egress_capacity = capacity;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn disconnect_grace(&self) -> Option<Duration> {
        self.disconnect_grace_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for server in &self.ice_servers {
            if server.url.trim().is_empty() {
                return Err(ConfigError::EmptyServerUrl {
                    id: server.id.clone(),
                });
            }
            if server.kind == IceServerKind::Turn
                && (server.username.is_none() || server.credential.is_none())
            {
                return Err(ConfigError::MissingTurnCredentials {
                    id: server.id.clone(),
                });
            }
        }

        if self.use_relay_only
            && !self
                .ice_servers
                .iter()
                .any(|server| server.kind == IceServerKind::Turn)
        {
            return Err(ConfigError::RelayOnlyWithoutTurn);
        }

        if self.egress_capacity == 0 {
            return Err(ConfigError::ZeroEgressCapacity);
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        let ice_servers = self
            .ice_servers
            .iter()
            .map(|server| ServerConfig {
                url: add_ice_url_scheme(server),
                ..server.clone()
            })
            .collect();

        TransportConfig {
            ice_servers,
            relay_only: self.use_relay_only,
            initiator: self.direction.is_initiator(),
            data_channel_label: self.data_channel_label.clone(),
        }
    }
}
