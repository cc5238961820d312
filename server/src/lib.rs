//! # Dedicated Server Library
//!
//! This library provides the session coordinator for the 1620 dedicated
//! server. It decides which team every incoming connection joins, where it
//! spawns, and how fast the headless process should tick given who is
//! connected.
//!
//! ## Core Responsibilities
//!
//! ### Cadence Control
//! A headless server with nobody connected has no reason to run at full
//! tick rate. The tick governor drops the process to an idle frame rate (and
//! slows physics in lockstep) whenever the player count reaches zero, and
//! restores the active rate on the first join.
//!
//! ### Admission and Team Assignment
//! The first `trapper_capacity` live connections join the Trappers; every
//! connection beyond that joins the Natives. The threshold is checked
//! against the live count, so a Trapper leaving frees a slot for the next
//! joiner. Each team cycles through its spawn points in list order.
//!
//! ### Transport Integration
//! The coordinator consumes only two signals from the transport, "connection
//! admitted" and "connection lost", and is safe to call from any thread.
//! The bundled UDP adapter maps its own connect, disconnect and timeout
//! events onto those two calls.
//!
//! ## Module Organization
//!
//! ### Tick Governor (`tick_governor`)
//! Two-state Idle/Active machine publishing a frame rate and physics step
//! on every transition.
//!
//! ### Session Coordinator (`session`)
//! Connection table, per-team counters, team threshold and spawn rotation.
//! Forwards every player count change to the governor.
//!
//! ### Spawn Registry (`spawn`)
//! Read-only per-team spawn lists, including the graybox camp layout.
//!
//! ### Client Manager (`client_manager`)
//! Transport-side address book with connection ID allocation and timeouts.
//!
//! ### Network (`network`)
//! UDP adapter and frame loop paced by the governor's directive.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::session::{SessionConfig, SessionCoordinator};
//! use server::spawn::StaticSpawnRegistry;
//! use server::tick_governor::{TickGovernor, TickRates};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 20Hz while anyone is connected, 1Hz when empty
//!     let governor = Arc::new(TickGovernor::with_rates(TickRates::new(20, 1, 20))?);
//!
//!     // First four players are Trappers, everyone after is a Native
//!     let registry = StaticSpawnRegistry::graybox(1620);
//!     let coordinator = Arc::new(SessionCoordinator::new(
//!         SessionConfig::default(),
//!         &registry,
//!         governor,
//!     )?);
//!
//!     let mut server =
//!         Server::new("0.0.0.0:7777", coordinator, Duration::from_secs(5)).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod spawn;
pub mod tick_governor;

pub use error::{AdmitError, ConfigError};
pub use session::{SessionConfig, SessionCoordinator};
pub use tick_governor::{TickGovernor, TickRates};
