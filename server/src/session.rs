//! Connection admission and team assignment for the dedicated server
//!
//! This module owns the authoritative record of who is connected, including:
//! - Admission and release of transport connections
//! - Team assignment (Trapper slots first, Natives after)
//! - Round-robin spawn point selection per team
//! - Keeping the tick governor's player count current
//!
//! All mutation goes through a single lock, so concurrent `admit`/`release`
//! calls from network callbacks behave as if they ran in some total order.
//! The lock only ever guards in-memory bookkeeping and the governor update.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use shared::{
    ConnectionId, ServerMode, SpawnAssignment, SpawnPoint, Team, TickDirective,
    DEFAULT_TRAPPER_CAPACITY,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{AdmitError, ConfigError};
use crate::spawn::SpawnRegistry;
use crate::tick_governor::TickGovernor;

/// Admission policy fixed at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Trapper slots filled before any connection goes to the Natives
    pub trapper_capacity: usize,
    /// Optional cap on concurrently admitted connections
    pub max_players: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trapper_capacity: DEFAULT_TRAPPER_CAPACITY,
            max_players: None,
        }
    }
}

/// An admitted player session
///
/// Team and spawn are fixed at admission and never change while the
/// connection is open.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub team: Team,
    pub spawn_index: usize,
    pub spawn: SpawnPoint,
    pub admitted_at: Instant,
}

impl Connection {
    fn assignment(&self) -> SpawnAssignment {
        SpawnAssignment {
            connection_id: self.id,
            team: self.team,
            spawn_index: self.spawn_index,
            spawn_name: self.spawn.name.clone(),
            position: self.spawn.position,
            orientation: self.spawn.orientation,
        }
    }
}

/// Per-team connection counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamCounts {
    pub trappers: usize,
    pub natives: usize,
}

impl TeamCounts {
    pub fn get(&self, team: Team) -> usize {
        match team {
            Team::Trapper => self.trappers,
            Team::Native => self.natives,
        }
    }

    fn get_mut(&mut self, team: Team) -> &mut usize {
        match team {
            Team::Trapper => &mut self.trappers,
            Team::Native => &mut self.natives,
        }
    }

    pub fn total(&self) -> usize {
        self.trappers + self.natives
    }
}

/// Point-in-time view of the session for status logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub players: usize,
    pub teams: TeamCounts,
    pub mode: ServerMode,
    pub directive: Option<TickDirective>,
}

#[derive(Debug, Default)]
struct SessionState {
    connections: HashMap<ConnectionId, Connection>,
    counts: TeamCounts,
}

/// Owns connection bookkeeping and team assignment
///
/// Construct one per server run and hand it (behind an `Arc`) to whatever
/// wires up the transport callbacks. Team counters are maintained
/// incrementally so admission cost does not grow with the player count.
pub struct SessionCoordinator {
    config: SessionConfig,
    trapper_spawns: Vec<SpawnPoint>,
    native_spawns: Vec<SpawnPoint>,
    governor: Arc<TickGovernor>,
    state: Mutex<SessionState>,
}

impl SessionCoordinator {
    /// Creates a coordinator, reading both spawn lists from the registry once
    pub fn new(
        config: SessionConfig,
        registry: &dyn SpawnRegistry,
        governor: Arc<TickGovernor>,
    ) -> Result<Self, ConfigError> {
        if config.trapper_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(config.trapper_capacity));
        }

        let trapper_spawns = registry.spawn_points(Team::Trapper);
        let native_spawns = registry.spawn_points(Team::Native);
        info!(
            "Found {} trapper, {} native spawns",
            trapper_spawns.len(),
            native_spawns.len()
        );
        if trapper_spawns.is_empty() || native_spawns.is_empty() {
            warn!("A team has no spawn points; its admissions will be rejected");
        }

        Ok(Self {
            config,
            trapper_spawns,
            native_spawns,
            governor,
            state: Mutex::new(SessionState::default()),
        })
    }

    fn spawns_for(&self, team: Team) -> &[SpawnPoint] {
        match team {
            Team::Trapper => &self.trapper_spawns,
            Team::Native => &self.native_spawns,
        }
    }

    /// Admits a connection and picks its team and spawn point
    ///
    /// Trapper is chosen while the live trapper count is below capacity,
    /// Native otherwise. The spawn is the team's list entry at
    /// `team count % list length`, using the count before this admission.
    /// A failed admission changes nothing.
    pub fn admit(&self, id: ConnectionId) -> Result<SpawnAssignment, AdmitError> {
        let result = {
            let mut state = self.state.lock();
            self.admit_locked(&mut state, id)
        };

        match &result {
            Ok(assignment) => info!(
                "Connection {} joined as {} at {} (slot {})",
                id, assignment.team, assignment.spawn_name, assignment.spawn_index
            ),
            Err(AdmitError::DuplicateConnection(_)) => {
                warn!("Connection {} already admitted", id)
            }
            Err(AdmitError::NoSpawnPoints(team)) => {
                error!("Rejected connection {}: no {} spawn points in scene", id, team)
            }
            Err(e) => warn!("Rejected connection {}: {}", id, e),
        }
        result
    }

    fn admit_locked(
        &self,
        state: &mut SessionState,
        id: ConnectionId,
    ) -> Result<SpawnAssignment, AdmitError> {
        if state.connections.contains_key(&id) {
            return Err(AdmitError::DuplicateConnection(id));
        }
        if let Some(max_players) = self.config.max_players {
            if state.connections.len() >= max_players {
                return Err(AdmitError::ServerFull { max_players });
            }
        }

        let team = if state.counts.trappers < self.config.trapper_capacity {
            Team::Trapper
        } else {
            Team::Native
        };

        let spawns = self.spawns_for(team);
        if spawns.is_empty() {
            return Err(AdmitError::NoSpawnPoints(team));
        }
        let spawn_index = state.counts.get(team) % spawns.len();

        let connection = Connection {
            id,
            team,
            spawn_index,
            spawn: spawns[spawn_index].clone(),
            admitted_at: Instant::now(),
        };
        let assignment = connection.assignment();

        state.connections.insert(id, connection);
        *state.counts.get_mut(team) += 1;
        self.governor.set_player_count(state.connections.len() as i64);

        Ok(assignment)
    }

    /// Releases a connection
    ///
    /// Unknown IDs are ignored: disconnects may follow a failed admission
    /// or be delivered twice. Returns the released connection, if any.
    pub fn release(&self, id: ConnectionId) -> Option<Connection> {
        let released = {
            let mut state = self.state.lock();
            let released = state.connections.remove(&id);
            if let Some(connection) = &released {
                *state.counts.get_mut(connection.team) -= 1;
                self.governor.set_player_count(state.connections.len() as i64);
            }
            released
        };

        match &released {
            Some(connection) => info!(
                "Connection {} left ({}, {:.1}s)",
                id,
                connection.team,
                connection.admitted_at.elapsed().as_secs_f32()
            ),
            None => debug!("Release of unknown connection {} ignored", id),
        }
        released
    }

    /// Drops every connection, as on server stop
    ///
    /// Governor configuration is untouched; its player count goes to zero.
    pub fn reset(&self) {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = state.connections.len();
            state.connections.clear();
            state.counts = TeamCounts::default();
            self.governor.set_player_count(0);
            dropped
        };
        info!("Session reset ({} connections dropped)", dropped);
    }

    pub fn team_counts(&self) -> TeamCounts {
        self.state.lock().counts
    }

    pub fn player_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.player_count() == 0
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.state.lock().connections.contains_key(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.state.lock().connections.get(&id).cloned()
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn governor(&self) -> &Arc<TickGovernor> {
        &self.governor
    }

    /// Players, team split and cadence in one consistent read
    pub fn stats(&self) -> SessionStats {
        let state = self.state.lock();
        SessionStats {
            players: state.connections.len(),
            teams: state.counts,
            mode: self.governor.current_mode(),
            directive: self.governor.current_directive(),
        }
    }
}

/// Coordinator behaviour tests
///
/// Cover the trapper threshold, spawn rotation, failure atomicity and the
/// player count seen by the tick governor.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::StaticSpawnRegistry;
    use crate::tick_governor::TickRates;
    use shared::Vec3;

    fn spawns(prefix: &str, n: usize) -> Vec<SpawnPoint> {
        (0..n)
            .map(|i| SpawnPoint::new(format!("{}_{}", prefix, i), Vec3::new(i as f32, 0.0, 0.0)))
            .collect()
    }

    fn coordinator_with(
        config: SessionConfig,
        trappers: usize,
        natives: usize,
    ) -> SessionCoordinator {
        let registry = StaticSpawnRegistry::new(spawns("T", trappers), spawns("N", natives));
        let governor = Arc::new(TickGovernor::with_rates(TickRates::default()).unwrap());
        SessionCoordinator::new(config, &registry, governor).unwrap()
    }

    fn coordinator() -> SessionCoordinator {
        coordinator_with(SessionConfig::default(), 4, 12)
    }

    fn assert_consistent(coordinator: &SessionCoordinator) {
        let counts = coordinator.team_counts();
        assert_eq!(counts.total(), coordinator.player_count());
        assert_eq!(
            coordinator.governor().current_player_count(),
            coordinator.player_count() as u64
        );
        let idle = coordinator.governor().current_mode() == ServerMode::Idle;
        assert_eq!(idle, coordinator.is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let registry = StaticSpawnRegistry::graybox(1);
        let governor = Arc::new(TickGovernor::new());
        let config = SessionConfig {
            trapper_capacity: 0,
            max_players: None,
        };
        let result = SessionCoordinator::new(config, &registry, governor);
        assert!(matches!(result, Err(ConfigError::InvalidCapacity(0))));
    }

    #[test]
    fn test_first_four_are_trappers() {
        let coordinator = coordinator();

        for i in 1..=4 {
            let assignment = coordinator.admit(ConnectionId(i)).unwrap();
            assert_eq!(assignment.team, Team::Trapper);
            assert_eq!(assignment.connection_id, ConnectionId(i));
        }
        let fifth = coordinator.admit(ConnectionId(5)).unwrap();
        assert_eq!(fifth.team, Team::Native);

        assert_eq!(
            coordinator.team_counts(),
            TeamCounts {
                trappers: 4,
                natives: 1
            }
        );
        assert_consistent(&coordinator);
    }

    #[test]
    fn test_threshold_uses_live_count() {
        let coordinator = coordinator();

        for i in 1..=4 {
            coordinator.admit(ConnectionId(i)).unwrap();
        }
        assert_eq!(coordinator.admit(ConnectionId(5)).unwrap().team, Team::Native);

        assert!(coordinator.release(ConnectionId(2)).is_some());
        assert_eq!(coordinator.admit(ConnectionId(6)).unwrap().team, Team::Trapper);
        assert_eq!(coordinator.admit(ConnectionId(7)).unwrap().team, Team::Native);
        assert_consistent(&coordinator);
    }

    #[test]
    fn test_native_count_does_not_limit_natives() {
        let coordinator = coordinator_with(SessionConfig::default(), 4, 2);

        for i in 0..4 {
            coordinator.admit(ConnectionId(i)).unwrap();
        }
        for i in 4..30 {
            assert_eq!(coordinator.admit(ConnectionId(i)).unwrap().team, Team::Native);
        }
        assert_eq!(coordinator.team_counts().natives, 26);
    }

    #[test]
    fn test_round_robin_spawn_indices() {
        let config = SessionConfig {
            trapper_capacity: 4,
            max_players: None,
        };
        let coordinator = coordinator_with(config, 2, 3);

        let indices: Vec<usize> = (1..=4)
            .map(|i| coordinator.admit(ConnectionId(i)).unwrap().spawn_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 0, 1]);

        let natives: Vec<String> = (5..=8)
            .map(|i| coordinator.admit(ConnectionId(i)).unwrap().spawn_name)
            .collect();
        assert_eq!(natives, vec!["N_0", "N_1", "N_2", "N_0"]);
    }

    #[test]
    fn test_assignment_carries_spawn_pose() {
        let coordinator = coordinator();
        coordinator.admit(ConnectionId(1)).unwrap();
        let second = coordinator.admit(ConnectionId(2)).unwrap();

        assert_eq!(second.spawn_index, 1);
        assert_eq!(second.spawn_name, "T_1");
        assert_eq!(second.position, Vec3::new(1.0, 0.0, 0.0));

        let connection = coordinator.connection(ConnectionId(2)).unwrap();
        assert_eq!(connection.team, Team::Trapper);
        assert_eq!(connection.spawn.name, "T_1");
    }

    #[test]
    fn test_duplicate_admit_rejected() {
        let coordinator = coordinator();
        coordinator.admit(ConnectionId(1)).unwrap();

        let before = coordinator.team_counts();
        let err = coordinator.admit(ConnectionId(1)).unwrap_err();
        assert_eq!(err, AdmitError::DuplicateConnection(ConnectionId(1)));
        assert_eq!(coordinator.team_counts(), before);
        assert_eq!(coordinator.player_count(), 1);
        assert_consistent(&coordinator);
    }

    #[test]
    fn test_no_spawn_points_rejected() {
        let coordinator = coordinator_with(SessionConfig::default(), 0, 4);

        let err = coordinator.admit(ConnectionId(1)).unwrap_err();
        assert_eq!(err, AdmitError::NoSpawnPoints(Team::Trapper));
        assert!(!coordinator.contains(ConnectionId(1)));
        assert_eq!(coordinator.team_counts(), TeamCounts::default());
        assert_eq!(coordinator.governor().current_mode(), ServerMode::Idle);
    }

    #[test]
    fn test_no_native_spawns_only_blocks_overflow() {
        let config = SessionConfig {
            trapper_capacity: 1,
            max_players: None,
        };
        let coordinator = coordinator_with(config, 1, 0);

        assert_eq!(coordinator.admit(ConnectionId(1)).unwrap().team, Team::Trapper);
        assert_eq!(
            coordinator.admit(ConnectionId(2)).unwrap_err(),
            AdmitError::NoSpawnPoints(Team::Native)
        );
        assert_eq!(coordinator.player_count(), 1);
    }

    #[test]
    fn test_server_full() {
        let config = SessionConfig {
            trapper_capacity: 4,
            max_players: Some(2),
        };
        let coordinator = coordinator_with(config, 4, 4);
        assert_eq!(coordinator.config(), config);

        coordinator.admit(ConnectionId(1)).unwrap();
        coordinator.admit(ConnectionId(2)).unwrap();
        assert_eq!(
            coordinator.admit(ConnectionId(3)).unwrap_err(),
            AdmitError::ServerFull { max_players: 2 }
        );

        coordinator.release(ConnectionId(1));
        assert!(coordinator.admit(ConnectionId(3)).is_ok());
        assert_consistent(&coordinator);
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let coordinator = coordinator();
        coordinator.admit(ConnectionId(1)).unwrap();

        assert!(coordinator.release(ConnectionId(99)).is_none());
        assert_eq!(coordinator.player_count(), 1);
        assert_eq!(coordinator.team_counts().trappers, 1);

        // Second delivery of the same disconnect
        assert!(coordinator.release(ConnectionId(1)).is_some());
        assert!(coordinator.release(ConnectionId(1)).is_none());
        assert_eq!(coordinator.team_counts(), TeamCounts::default());
        assert_consistent(&coordinator);
    }

    #[test]
    fn test_governor_follows_player_count() {
        let coordinator = coordinator();
        let governor = Arc::clone(coordinator.governor());
        assert_eq!(governor.current_mode(), ServerMode::Idle);

        coordinator.admit(ConnectionId(1)).unwrap();
        assert_eq!(governor.current_mode(), ServerMode::Active);
        assert_eq!(governor.current_directive().unwrap().frame_rate_hz, 20);

        coordinator.admit(ConnectionId(2)).unwrap();
        assert_eq!(governor.current_player_count(), 2);

        coordinator.release(ConnectionId(1));
        coordinator.release(ConnectionId(2));
        assert_eq!(governor.current_mode(), ServerMode::Idle);
        assert_eq!(governor.current_directive().unwrap().frame_rate_hz, 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let coordinator = coordinator();
        for i in 0..6 {
            coordinator.admit(ConnectionId(i)).unwrap();
        }

        coordinator.reset();
        assert!(coordinator.is_empty());
        assert_eq!(coordinator.team_counts(), TeamCounts::default());
        assert_eq!(coordinator.governor().current_mode(), ServerMode::Idle);
        assert!(coordinator.governor().is_configured());

        // Rotation restarts from the first spawn
        let assignment = coordinator.admit(ConnectionId(0)).unwrap();
        assert_eq!(assignment.team, Team::Trapper);
        assert_eq!(assignment.spawn_index, 0);
    }

    #[test]
    fn test_stats_snapshot() {
        let coordinator = coordinator();
        for i in 0..5 {
            coordinator.admit(ConnectionId(i)).unwrap();
        }

        let stats = coordinator.stats();
        assert_eq!(stats.players, 5);
        assert_eq!(stats.teams.get(Team::Trapper), 4);
        assert_eq!(stats.teams.get(Team::Native), 1);
        assert_eq!(stats.mode, ServerMode::Active);
        assert_eq!(stats.directive.unwrap().frame_rate_hz, 20);
    }
}
