//! UDP transport adapter and frame loop for the dedicated server
//!
//! Translates peer traffic into session events and paces the server from
//! the tick governor's directive:
//! - `Connect` admits a connection and answers with its spawn assignment
//! - `Disconnect` and peer timeouts release the connection
//! - the frame interval follows the directive, so an empty server wakes at
//!   the idle rate instead of spinning at the active rate

use crate::client_manager::ClientManager;
use crate::error::ConfigError;
use crate::session::SessionCoordinator;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ConnectionId, Packet, TickDirective, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

type SendError = Box<dyn std::error::Error + Send + Sync>;

const MIN_TIMER_PERIOD: Duration = Duration::from_millis(10);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ConnectionId },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ConnectionId>,
    },
}

/// Cloneable handle for stopping a running server from another task
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    /// Asks the frame loop to stop. Returns false if it already has.
    pub fn shutdown(&self) -> bool {
        self.server_tx.send(ServerMessage::Shutdown).is_ok()
    }
}

/// Frame and physics step counters for the running loop
#[derive(Debug, Default, Clone, Copy)]
struct FrameCounters {
    frames: u64,
    physics_steps: u64,
    accumulator: f32,
}

impl FrameCounters {
    /// Advances by one frame of `dt` seconds, consuming whole physics steps
    fn advance(&mut self, dt: f32, step: f32) {
        self.frames += 1;
        self.accumulator += dt;
        while self.accumulator >= step {
            self.accumulator -= step;
            self.physics_steps += 1;
        }
    }
}

/// Dedicated server: UDP transport in front of a session coordinator
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    coordinator: Arc<SessionCoordinator>,
    client_timeout: Duration,
    stats_interval: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,

    // Background tasks, stopped and joined when the loop exits
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        coordinator: Arc<SessionCoordinator>,
        client_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (stop_tx, _) = watch::channel(false);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new())),
            coordinator,
            client_timeout,
            stats_interval: Duration::from_secs(30),
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
            stop_tx,
            tasks: Vec::new(),
        })
    }

    /// Sets how often the status line is logged
    pub fn with_stats_interval(mut self, stats_interval: Duration) -> Self {
        self.stats_interval = stats_interval.max(MIN_TIMER_PERIOD);
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&mut self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();
        let mut stop_rx = self.stop_tx.subscribe();

        let task = tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                let received = tokio::select! {
                    _ = stop_rx.changed() => break,
                    received = socket.recv_from(&mut buffer) => received,
                };

                match received {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(MIN_TIMER_PERIOD).await;
                    }
                }
            }
        });
        self.tasks.push(task);
    }

    /// Spawns task that processes outgoing packet queue
    ///
    /// On stop the queue is drained first, so packets queued before the
    /// loop exited still go out.
    fn spawn_network_sender(&mut self) {
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut stop_rx = self.stop_tx.subscribe();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    message = game_rx.recv() => match message {
                        Some(message) => Self::deliver(&socket, &clients, message).await,
                        None => break,
                    },
                    _ = stop_rx.changed() => {
                        while let Ok(message) = game_rx.try_recv() {
                            Self::deliver(&socket, &clients, message).await;
                        }
                        break;
                    }
                }
            }
            debug!("Sender stopped");
        });
        self.tasks.push(task);
    }

    async fn deliver(socket: &UdpSocket, clients: &RwLock<ClientManager>, message: GameMessage) {
        match message {
            GameMessage::SendPacket { packet, addr } => {
                if let Err(e) = Self::send_packet_impl(socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
            GameMessage::BroadcastPacket { packet, exclude } => {
                let client_addrs = clients.read().await.get_client_addrs();

                for (client_id, addr) in client_addrs {
                    if Some(client_id) == exclude {
                        continue;
                    }

                    if let Err(e) = Self::send_packet_impl(socket, &packet, addr).await {
                        error!("Failed to send to connection {}: {}", client_id, e);
                    }
                }
            }
        }
    }

    /// Spawns task that monitors peer timeouts
    fn spawn_timeout_checker(&mut self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;
        let period = (timeout / 2).clamp(MIN_TIMER_PERIOD, Duration::from_secs(1));
        let mut stop_rx = self.stop_tx.subscribe();

        let task = tokio::spawn(async move {
            let mut interval = interval(period);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    _ = interval.tick() => {},
                }

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    if server_tx
                        .send(ServerMessage::ClientTimeout { client_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
        self.tasks.push(task);
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), SendError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<ConnectionId>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn disconnect(&self, addr: SocketAddr, reason: &str) {
        self.send_packet(
            Packet::Disconnected {
                reason: reason.to_string(),
            },
            addr,
        );
    }

    /// Turns a peer packet into session events
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Peer connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.disconnect(addr, "Protocol version mismatch");
                    return;
                }

                // A reconnect from the same address replaces the old session
                let existing_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(existing_id) = existing_id {
                    info!("Replacing connection {} from {}", existing_id, addr);
                    self.clients.write().await.remove_client(existing_id);
                    self.coordinator.release(existing_id);
                }

                let client_id = self.clients.write().await.add_client(addr);
                match self.coordinator.admit(client_id) {
                    Ok(assignment) => {
                        self.send_packet(
                            Packet::Connected {
                                client_id,
                                assignment,
                            },
                            addr,
                        );
                    }
                    Err(e) => {
                        self.clients.write().await.remove_client(client_id);
                        self.disconnect(addr, &e.to_string());
                    }
                }
            }

            Packet::Heartbeat => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    clients.touch(client_id);
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.find_client_by_addr(addr);
                    if let Some(client_id) = client_id {
                        clients.remove_client(client_id);
                    }
                    client_id
                };

                if let Some(client_id) = client_id {
                    self.coordinator.release(client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from peer at {}", addr);
            }
        }
    }

    fn frame_timer(directive: &TickDirective) -> Interval {
        let mut timer = interval(directive.frame_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    }

    fn log_stats(&self, counters: &FrameCounters) {
        let stats = self.coordinator.stats();
        info!(
            "Status: {} players ({} trappers, {} natives), mode {}, {} frames, {} physics steps",
            stats.players,
            stats.teams.trappers,
            stats.teams.natives,
            stats.mode,
            counters.frames,
            counters.physics_steps
        );
    }

    /// Main server loop
    ///
    /// Runs until [`ServerHandle::shutdown`] is called, then resets the
    /// session. Fails immediately if the tick governor was never configured.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut directive_rx = self.coordinator.governor().subscribe();
        let mut directive = directive_rx
            .borrow_and_update()
            .ok_or(ConfigError::NotConfigured)?;

        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut frame_timer = Self::frame_timer(&directive);
        let mut stats_timer = interval(self.stats_interval);
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut counters = FrameCounters::default();
        let mut last_frame = Instant::now();

        info!(
            "Server started at {}Hz ({})",
            directive.frame_rate_hz,
            self.coordinator.governor().current_mode()
        );

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.coordinator.release(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Follow the governor between idle and active cadence
                changed = directive_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = *directive_rx.borrow_and_update();
                    if let Some(next) = next {
                        debug!(
                            "Frame rate {}Hz -> {}Hz",
                            directive.frame_rate_hz, next.frame_rate_hz
                        );
                        directive = next;
                        frame_timer = Self::frame_timer(&directive);
                    }
                },

                _ = frame_timer.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f32();
                    last_frame = now;
                    counters.advance(dt, directive.fixed_physics_step_seconds);
                },

                _ = stats_timer.tick() => {
                    self.log_stats(&counters);
                },
            }
        }

        self.broadcast_packet(
            Packet::Disconnected {
                reason: "Server shutting down".to_string(),
            },
            None,
        );
        self.stop_background_tasks().await;
        self.log_stats(&counters);
        self.coordinator.reset();
        Ok(())
    }

    /// Signals every background task to stop and waits for them
    ///
    /// The sender flushes its queue before exiting. Once this returns no
    /// task holds the socket, so dropping the server frees the port.
    async fn stop_background_tasks(&mut self) {
        self.stop_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
    }
}
