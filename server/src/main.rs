use clap::Parser;
use log::{error, info};
use server::config::ServerArgs;
use server::network::Server;
use server::session::SessionCoordinator;
use server::spawn::StaticSpawnRegistry;
use server::tick_governor::TickGovernor;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = ServerArgs::parse();

    // Bad rates or capacity are fatal: never run with an undefined cadence
    let governor = match TickGovernor::with_rates(args.tick_rates()) {
        Ok(governor) => Arc::new(governor),
        Err(e) => {
            error!("Invalid tick configuration: {}", e);
            return Err(e.into());
        }
    };

    let registry = StaticSpawnRegistry::graybox(args.spawn_seed);
    let coordinator = Arc::new(SessionCoordinator::new(
        args.session_config(),
        &registry,
        governor,
    )?);

    let session = coordinator.config();
    match session.max_players {
        Some(max_players) => info!(
            "Starting dedicated server on {} ({} trapper slots, max {} players)",
            args.bind_address(),
            session.trapper_capacity,
            max_players
        ),
        None => info!(
            "Starting dedicated server on {} ({} trapper slots, no player limit)",
            args.bind_address(),
            session.trapper_capacity
        ),
    }

    let mut server = Server::new(&args.bind_address(), coordinator, args.client_timeout())
        .await?
        .with_stats_interval(args.stats_interval());

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    });

    server.run().await?;

    Ok(())
}
