use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: u32 = 1;

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_ACTIVE_TICK_HZ: u32 = 20;
pub const DEFAULT_IDLE_TICK_HZ: u32 = 1;
pub const DEFAULT_PHYSICS_HZ: u32 = 20;
pub const DEFAULT_TRAPPER_CAPACITY: usize = 4;
pub const DEFAULT_MAX_PLAYERS: usize = 12;

/// Opaque per-connection handle allocated by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two competing sides of a match.
///
/// Trappers are the small team filled first; Natives take every
/// connection once the trapper slots are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Trapper,
    Native,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Trapper => write!(f, "Trapper"),
            Team::Native => write!(f, "Native"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Unit quaternion orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation about the vertical (Y) axis.
    pub fn from_yaw_degrees(degrees: f32) -> Self {
        let half = degrees.to_radians() * 0.5;
        Self {
            x: 0.0,
            y: half.sin(),
            z: 0.0,
            w: half.cos(),
        }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

/// A named spawn transform belonging to one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub name: String,
    pub position: Vec3,
    pub orientation: Quat,
}

impl SpawnPoint {
    pub fn new(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            position,
            orientation: Quat::IDENTITY,
        }
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }
}

/// Where and as what a freshly admitted connection enters the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnAssignment {
    pub connection_id: ConnectionId,
    pub team: Team,
    /// Round-robin slot within the team's spawn list.
    pub spawn_index: usize,
    pub spawn_name: String,
    pub position: Vec3,
    pub orientation: Quat,
}

/// Server execution cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerMode {
    Active,
    Idle,
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::Active => write!(f, "Active"),
            ServerMode::Idle => write!(f, "Idle"),
        }
    }
}

/// Frame rate and fixed physics step the frame loop should run at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickDirective {
    pub frame_rate_hz: u32,
    pub fixed_physics_step_seconds: f32,
}

impl TickDirective {
    pub fn new(frame_rate_hz: u32, physics_hz: u32) -> Self {
        Self {
            frame_rate_hz,
            fixed_physics_step_seconds: 1.0 / physics_hz as f32,
        }
    }

    /// Wall-clock time between two frames.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1) as f64)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: ConnectionId,
        assignment: SpawnAssignment,
    },
    Disconnected {
        reason: String,
    },
}
