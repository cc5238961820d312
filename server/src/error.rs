//! Error types for server configuration and connection admission.

use shared::{ConnectionId, Team};

/// Invalid or repeated start-up configuration. Fatal: the process should
/// not run with an undefined cadence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    InvalidRate { name: &'static str, value: u32 },
    #[error("tick governor is already configured")]
    AlreadyConfigured,
    #[error("tick governor has not been configured")]
    NotConfigured,
    #[error("trapper capacity must be positive, got {0}")]
    InvalidCapacity(usize),
}

/// Reasons a connection was not admitted. None of these leave partial state
/// behind, and none are fatal to the running server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    #[error("connection {0} is already admitted")]
    DuplicateConnection(ConnectionId),
    #[error("no spawn points configured for team {0}")]
    NoSpawnPoints(Team),
    #[error("server full ({max_players} players)")]
    ServerFull { max_players: usize },
}
