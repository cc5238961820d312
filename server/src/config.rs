//! Command-line configuration for the dedicated server binary.

use clap::Parser;
use shared::{
    DEFAULT_ACTIVE_TICK_HZ, DEFAULT_IDLE_TICK_HZ, DEFAULT_MAX_PLAYERS, DEFAULT_PHYSICS_HZ,
    DEFAULT_PORT, DEFAULT_TRAPPER_CAPACITY,
};
use std::time::Duration;

use crate::session::SessionConfig;
use crate::tick_governor::TickRates;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Dedicated server for 1620", long_about = None)]
pub struct ServerArgs {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Frame rate while players are connected
    #[arg(long, default_value_t = DEFAULT_ACTIVE_TICK_HZ)]
    pub active_tick_hz: u32,

    /// Frame and physics rate while the server is empty
    #[arg(long, default_value_t = DEFAULT_IDLE_TICK_HZ)]
    pub idle_tick_hz: u32,

    /// Physics rate while players are connected
    #[arg(long, default_value_t = DEFAULT_PHYSICS_HZ)]
    pub physics_hz: u32,

    /// Trapper slots filled before players join the Natives
    #[arg(short, long, default_value_t = DEFAULT_TRAPPER_CAPACITY)]
    pub trapper_capacity: usize,

    /// Maximum concurrent players (0 for no limit)
    #[arg(short, long, default_value_t = DEFAULT_MAX_PLAYERS)]
    pub max_players: usize,

    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value_t = 5)]
    pub client_timeout_secs: u64,

    /// Seed for the graybox native spawn scatter
    #[arg(long, default_value_t = 1620)]
    pub spawn_seed: u64,

    /// Seconds between status log lines
    #[arg(long, default_value_t = 30)]
    pub stats_interval_secs: u64,
}

impl ServerArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_rates(&self) -> TickRates {
        TickRates::new(self.active_tick_hz, self.idle_tick_hz, self.physics_hz)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            trapper_capacity: self.trapper_capacity,
            max_players: (self.max_players > 0).then_some(self.max_players),
        }
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}
