//! Itemization server
//!
//! Authoritative simulation that owns every inventory and replicates them to observing clients.

mod config;
mod entities;
mod network;
mod world;

use std::time::Instant;

use log::{error, info};

use crate::config::ServerConfig;
use crate::network::Server;
use crate::world::GameWorld;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env();
    info!("Starting itemization server...");
    info!("Tick rate: {} Hz", config.tick_rate);

    let mut world = GameWorld::new(config.spawn_enemies);

    let mut server = match Server::new(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server on port {}: {}", config.port, e);
            return;
        }
    };

    let tick_duration = config.tick_duration();
    let mut last_tick = Instant::now();
    let mut tick_count: u64 = 0;

    info!("Server started successfully!");

    // Main game loop
    loop {
        let tick_start = Instant::now();

        server.process_incoming(&mut world).await;

        let delta = last_tick.elapsed().as_secs_f32();
        last_tick = Instant::now();
        let world_messages = world.update(delta, tick_count);
        if !world_messages.is_empty() {
            server.queue_broadcasts(world_messages);
        }

        server.queue_replication(&mut world);
        server.process_outgoing().await;

        tick_count += 1;

        // Sleep until next tick
        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            tokio::time::sleep(tick_duration - elapsed).await;
        }
    }
}
