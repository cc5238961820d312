//! CPU cadence control for the headless server
//!
//! The tick governor turns "how many players are connected" into a frame
//! rate and physics step for the frame loop. With nobody connected the server
//! drops to the idle rate, and physics is slowed in lockstep so no simulation
//! work is wasted on an empty world.
//!
//! State machine:
//! - `Idle` while the player count is zero
//! - `Active` while at least one player is connected
//!
//! Every Idle/Active crossing publishes a new [`TickDirective`] on a watch
//! channel. There is no debounce: a join immediately followed by a leave
//! publishes twice.

use log::{debug, info};
use parking_lot::Mutex;
use shared::{
    ServerMode, TickDirective, DEFAULT_ACTIVE_TICK_HZ, DEFAULT_IDLE_TICK_HZ, DEFAULT_PHYSICS_HZ,
};
use tokio::sync::watch;

use crate::error::ConfigError;

/// Tick rates fixed at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRates {
    /// Frame rate while players are connected
    pub active_tick_hz: u32,
    /// Frame rate and physics rate while the server is empty
    pub idle_tick_hz: u32,
    /// Physics rate while players are connected
    pub physics_hz: u32,
}

impl TickRates {
    pub fn new(active_tick_hz: u32, idle_tick_hz: u32, physics_hz: u32) -> Self {
        Self {
            active_tick_hz,
            idle_tick_hz,
            physics_hz,
        }
    }

    /// Rejects any zero rate
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("active_tick_hz", self.active_tick_hz),
            ("idle_tick_hz", self.idle_tick_hz),
            ("physics_hz", self.physics_hz),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }
        Ok(())
    }

    /// The directive for a mode. Pure function of the mode.
    pub fn directive_for(&self, mode: ServerMode) -> TickDirective {
        match mode {
            ServerMode::Active => TickDirective::new(self.active_tick_hz, self.physics_hz),
            ServerMode::Idle => TickDirective::new(self.idle_tick_hz, self.idle_tick_hz),
        }
    }
}

impl Default for TickRates {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVE_TICK_HZ, DEFAULT_IDLE_TICK_HZ, DEFAULT_PHYSICS_HZ)
    }
}

#[derive(Debug)]
struct GovernorState {
    rates: Option<TickRates>,
    mode: ServerMode,
    player_count: u64,
    transitions: u64,
}

fn mode_for(player_count: u64) -> ServerMode {
    if player_count == 0 {
        ServerMode::Idle
    } else {
        ServerMode::Active
    }
}

/// Owns the server's execution cadence
///
/// Safe to share across threads. Never calls back into its caller, so it can
/// be driven from inside another component's critical section.
pub struct TickGovernor {
    state: Mutex<GovernorState>,
    directive_tx: watch::Sender<Option<TickDirective>>,
}

impl TickGovernor {
    /// Creates an unconfigured governor in `Idle` with no players
    pub fn new() -> Self {
        let (directive_tx, _) = watch::channel(None);
        Self {
            state: Mutex::new(GovernorState {
                rates: None,
                mode: ServerMode::Idle,
                player_count: 0,
                transitions: 0,
            }),
            directive_tx,
        }
    }

    /// Creates and configures a governor in one step
    pub fn with_rates(rates: TickRates) -> Result<Self, ConfigError> {
        let governor = Self::new();
        governor.configure(rates)?;
        Ok(governor)
    }

    /// One-time setup
    ///
    /// Fails if any rate is zero or if the governor was already configured.
    /// On success the directive for the current mode is published.
    pub fn configure(&self, rates: TickRates) -> Result<TickDirective, ConfigError> {
        rates.validate()?;

        let (directive, mode) = {
            let mut state = self.state.lock();
            if state.rates.is_some() {
                return Err(ConfigError::AlreadyConfigured);
            }
            state.rates = Some(rates);
            let directive = rates.directive_for(state.mode);
            self.directive_tx.send_replace(Some(directive));
            (directive, state.mode)
        };

        info!(
            "Configured: {}Hz tick, {}Hz physics, {}Hz idle (starting {})",
            rates.active_tick_hz, rates.physics_hz, rates.idle_tick_hz, mode
        );
        Ok(directive)
    }

    /// Records the connected-player count
    ///
    /// Negative counts are clamped to zero. Returns the newly published
    /// directive when the count moved the server between Idle and Active,
    /// `None` otherwise (or while unconfigured).
    pub fn set_player_count(&self, count: i64) -> Option<TickDirective> {
        self.update_count(|_| count)
    }

    /// Adds one player to the current count
    pub fn player_connected(&self) -> Option<TickDirective> {
        self.update_count(|current| current as i64 + 1)
    }

    /// Removes one player from the current count, never going below zero
    pub fn player_disconnected(&self) -> Option<TickDirective> {
        self.update_count(|current| current as i64 - 1)
    }

    fn update_count(&self, next: impl FnOnce(u64) -> i64) -> Option<TickDirective> {
        let (previous, count, transition) = {
            let mut state = self.state.lock();
            let previous = state.player_count;
            let count = next(previous).max(0) as u64;
            state.player_count = count;

            let mode = mode_for(count);
            let transition = if mode == state.mode {
                None
            } else {
                state.mode = mode;
                state.transitions += 1;
                let published = state.rates.map(|rates| rates.directive_for(mode));
                if published.is_some() {
                    self.directive_tx.send_replace(published);
                }
                Some((mode, published))
            };
            (previous, count, transition)
        };

        if previous != count {
            debug!("Player count: {} -> {}", previous, count);
        }
        match transition {
            Some((ServerMode::Idle, Some(directive))) => {
                info!("Entering idle mode ({}Hz)", directive.frame_rate_hz);
                Some(directive)
            }
            Some((ServerMode::Active, Some(directive))) => {
                info!("Exiting idle mode ({}Hz)", directive.frame_rate_hz);
                Some(directive)
            }
            _ => None,
        }
    }

    pub fn current_mode(&self) -> ServerMode {
        self.state.lock().mode
    }

    pub fn current_player_count(&self) -> u64 {
        self.state.lock().player_count
    }

    /// The directive for the current mode, if configured
    pub fn current_directive(&self) -> Option<TickDirective> {
        *self.directive_tx.borrow()
    }

    pub fn rates(&self) -> Option<TickRates> {
        self.state.lock().rates
    }

    pub fn is_configured(&self) -> bool {
        self.state.lock().rates.is_some()
    }

    /// Number of Idle/Active crossings since creation
    pub fn transitions(&self) -> u64 {
        self.state.lock().transitions
    }

    /// Receiver that observes every published directive
    pub fn subscribe(&self) -> watch::Receiver<Option<TickDirective>> {
        self.directive_tx.subscribe()
    }
}

impl Default for TickGovernor {
    fn default() -> Self {
        Self::new()
    }
}
