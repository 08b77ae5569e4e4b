//! Connects to a server and logs every change to the observed inventories.

use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info, warn};

use itemization_client::{ConnectionState, InventoryReplicas, NetworkClient};
use itemization_shared::{find_item_definition, EntityId, InventoryEvent, ServerMessage};

/// Poll interval of the main loop
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "observer")]
#[command(about = "Watch replicated inventories")]
struct Cli {
    /// Server address, `host` or `host:port`
    #[arg(long, default_value = "127.0.0.1")]
    server: String,

    /// Player name to connect as
    #[arg(long, default_value = "observer")]
    name: String,

    /// Stop observing and disconnect after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Other entities whose inventories to observe
    owners: Vec<EntityId>,
}

fn describe(event: &InventoryEvent) -> String {
    let item = event.item();
    let name = find_item_definition(item.definition)
        .map(|def| def.name)
        .unwrap_or_else(|| format!("item #{}", item.definition));
    match event {
        InventoryEvent::ItemTaken { owner, .. } => format!("{} took {} ({})", owner, name, item.id),
        InventoryEvent::ItemRemoved { owner, .. } => format!("{} lost {} ({})", owner, name, item.id),
        InventoryEvent::ItemContextChanged { owner, context, .. } => {
            format!("{} updated {} ({}) to a {:?} context", owner, name, item.id, context.kind())
        }
    }
}

/// Stop every replication stream and leave the server
fn shut_down(client: &mut NetworkClient, replicas: &mut InventoryReplicas) {
    let owners: Vec<EntityId> = replicas.owners().collect();
    for owner in owners {
        if client.player_id() != Some(owner) {
            if let Err(e) = client.send_stop_observing(owner) {
                warn!("Could not stop observing {}: {}", owner, e);
            }
        }
        if let Some(replica) = replicas.forget(owner) {
            info!("Inventory {} held {} items", owner, replica.num_items());
        }
    }
    client.disconnect();
    info!("Disconnected");
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut replicas = InventoryReplicas::new();
    replicas.listen(|event: &InventoryEvent| info!("{}", describe(event)));

    let mut client = NetworkClient::new();
    if let Err(e) = client.connect(&cli.server, &cli.name) {
        error!("{}", e);
        return;
    }

    let deadline = cli.duration.map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            shut_down(&mut client, &mut replicas);
            return;
        }

        for message in client.poll() {
            match &message {
                ServerMessage::Welcome { .. } => {
                    for owner in &cli.owners {
                        if let Err(e) = client.send_observe(*owner) {
                            warn!("Could not observe {}: {}", owner, e);
                        }
                    }
                }
                ServerMessage::DropSpawned { entity_id, item, position } => {
                    info!("Drop {} ({}) appeared at {:?}", entity_id, item.id, position);
                }
                ServerMessage::DropDespawned { entity_id } => info!("Drop {} is gone", entity_id),
                ServerMessage::ActionFailed { reason } => warn!("Server: {}", reason),
                _ => {}
            }

            if let Some(reply) = replicas.handle_message(&message) {
                if let Err(e) = client.send_message(&reply) {
                    warn!("{}", e);
                }
            }
        }

        if let ConnectionState::Failed(reason) = client.state() {
            error!("Connection failed: {}", reason);
            return;
        }

        thread::sleep(POLL_INTERVAL);
    }
}
