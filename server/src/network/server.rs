//! UDP game server implementation.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use uuid::Uuid;

use itemization_shared::{ClientMessage, EntityId, NetRole, ServerMessage, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};

use crate::config::ServerConfig;
use crate::world::GameWorld;

/// Where new players appear
const SPAWN_POSITION: [f32; 3] = [0.0, 0.0, 0.0];

/// Client connection state
#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub player_id: EntityId,
    pub name: String,
    pub last_seen: Instant,
    /// Outgoing message queue
    pub outgoing_queue: Vec<ServerMessage>,
    /// Inventories this client receives replication for
    pub observed: HashSet<EntityId>,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, player_id: EntityId, name: String) -> Self {
        Self {
            addr,
            player_id,
            name,
            last_seen: Instant::now(),
            outgoing_queue: Vec::new(),
            // A player always sees its own inventory
            observed: HashSet::from([player_id]),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    pub fn is_observing(&self, owner: EntityId) -> bool {
        self.observed.contains(&owner)
    }
}

/// Game server
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: HashMap<SocketAddr, ClientConnection>,
    next_player_id: EntityId,
    /// Messages to broadcast to all clients
    broadcast_queue: Vec<ServerMessage>,
    connection_timeout: Duration,
}

impl Server {
    /// Create a new server listening on the configured port
    pub async fn new(config: &ServerConfig) -> Result<Self, std::io::Error> {
        Self::bind(&format!("0.0.0.0:{}", config.port), config.connection_timeout).await
    }

    pub async fn bind(addr: &str, connection_timeout: Duration) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening on {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            clients: HashMap::new(),
            next_player_id: 1,
            broadcast_queue: Vec::new(),
            connection_timeout,
        })
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Process incoming network messages
    pub async fn process_incoming(&mut self, world: &mut GameWorld) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        // Non-blocking receive loop
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, addr)) => {
                    self.handle_packet(&buf[..len], addr, world);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    break;
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    break;
                }
            }
        }

        self.check_timeouts(world);
    }

    /// Handle a received packet
    fn handle_packet(&mut self, data: &[u8], addr: SocketAddr, world: &mut GameWorld) {
        match ClientMessage::deserialize(data) {
            Ok(message) => self.handle_message(addr, message, world),
            Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
        }
    }

    fn handle_message(&mut self, addr: SocketAddr, message: ClientMessage, world: &mut GameWorld) {
        // Update last seen time for known clients
        if let Some(client) = self.clients.get_mut(&addr) {
            client.last_seen = Instant::now();
        }

        match message {
            ClientMessage::Connect { protocol_version, name } => {
                self.handle_connect(addr, protocol_version, name, world);
            }
            ClientMessage::Disconnect => {
                self.handle_disconnect(addr, world);
            }
            ClientMessage::Heartbeat => {}
            ClientMessage::ObserveInventory { owner } => {
                self.handle_observe(addr, owner, world);
            }
            ClientMessage::StopObserving { owner } => {
                if let Some(client) = self.clients.get_mut(&addr) {
                    client.observed.remove(&owner);
                }
            }
            ClientMessage::RequestSnapshot { owner } => {
                self.handle_snapshot_request(addr, owner, world);
            }
            ClientMessage::PickupDrop { drop_entity_id } => {
                self.handle_pickup(addr, drop_entity_id, world);
            }
            ClientMessage::DropItem { item_id } => {
                self.handle_drop_item(addr, item_id, world);
            }
            ClientMessage::Attack { target_id } => {
                self.handle_attack(addr, target_id, world);
            }
        }
    }

    fn handle_connect(&mut self, addr: SocketAddr, protocol_version: u32, name: String, world: &mut GameWorld) {
        if protocol_version != PROTOCOL_VERSION {
            warn!(
                "Client {} uses protocol {} (expected {})",
                addr, protocol_version, PROTOCOL_VERSION
            );
            self.queue_unconnected(
                addr,
                ServerMessage::ConnectFailed {
                    reason: format!("Protocol version mismatch: server is {}", PROTOCOL_VERSION),
                },
            );
            return;
        }

        // Repeated connect from the same address: the Welcome was probably lost
        if let Some(client) = self.clients.get_mut(&addr) {
            client.outgoing_queue.push(ServerMessage::Welcome {
                player_id: client.player_id,
            });
            return;
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        world.spawn_player(player_id, name.clone(), SPAWN_POSITION);
        if let Some(player) = world.get_player_mut(player_id) {
            player.inventory.on_connection_accepted(NetRole::Authoritative);
        }
        info!("{} connected from {} as player {}", name, addr, player_id);

        let mut client = ClientConnection::new(addr, player_id, name);
        client.outgoing_queue.push(ServerMessage::Welcome { player_id });
        client.outgoing_queue.extend(world.inventory_snapshot(player_id));
        client.outgoing_queue.extend(world.spawn_messages());
        self.clients.insert(addr, client);
    }

    fn handle_disconnect(&mut self, addr: SocketAddr, world: &mut GameWorld) {
        if let Some(connection) = self.clients.remove(&addr) {
            info!("{} (player ID: {}) disconnected", connection.name, connection.player_id);
            self.remove_player(connection.player_id, world);
        }
    }

    fn handle_observe(&mut self, addr: SocketAddr, owner: EntityId, world: &GameWorld) {
        let Some(client) = self.clients.get_mut(&addr) else {
            return;
        };

        match world.inventory_snapshot(owner) {
            Some(snapshot) => {
                debug!("Player {} now observes inventory {}", client.player_id, owner);
                client.observed.insert(owner);
                client.outgoing_queue.push(snapshot);
            }
            None => client.outgoing_queue.push(ServerMessage::ActionFailed {
                reason: format!("No inventory for entity {}", owner),
            }),
        }
    }

    fn handle_snapshot_request(&mut self, addr: SocketAddr, owner: EntityId, world: &GameWorld) {
        let Some(client) = self.clients.get_mut(&addr) else {
            return;
        };

        if !client.is_observing(owner) {
            client.outgoing_queue.push(ServerMessage::ActionFailed {
                reason: format!("Not observing inventory {}", owner),
            });
            return;
        }

        if let Some(snapshot) = world.inventory_snapshot(owner) {
            client.outgoing_queue.push(snapshot);
        }
    }

    fn handle_pickup(&mut self, addr: SocketAddr, drop_entity_id: EntityId, world: &mut GameWorld) {
        let Some(player_id) = self.player_id(addr) else {
            return;
        };

        if let Err(reason) = world.pickup_drop(player_id, drop_entity_id) {
            debug!("Player {} failed to pick up {}: {}", player_id, drop_entity_id, reason);
            self.queue_for(addr, ServerMessage::ActionFailed { reason });
        }
    }

    fn handle_drop_item(&mut self, addr: SocketAddr, item_id: Uuid, world: &mut GameWorld) {
        let Some(player_id) = self.player_id(addr) else {
            return;
        };

        match world.drop_item(player_id, item_id) {
            Ok(handle) => debug!("Player {} dropped {} as {}", player_id, item_id, handle),
            Err(reason) => self.queue_for(addr, ServerMessage::ActionFailed { reason }),
        }
    }

    fn handle_attack(&mut self, addr: SocketAddr, target_id: EntityId, world: &mut GameWorld) {
        let Some(player_id) = self.player_id(addr) else {
            return;
        };

        if let Err(reason) = world.process_attack(player_id, target_id) {
            self.queue_for(
                addr,
                ServerMessage::ActionFailed {
                    reason: reason.to_string(),
                },
            );
        }
    }

    /// Check for timed out connections
    fn check_timeouts(&mut self, world: &mut GameWorld) {
        let timeout = self.connection_timeout;
        let timed_out: Vec<SocketAddr> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_timed_out(timeout))
            .map(|(addr, _)| *addr)
            .collect();

        for addr in timed_out {
            if let Some(connection) = self.clients.remove(&addr) {
                warn!("{} (player ID: {}) timed out", connection.name, connection.player_id);
                self.remove_player(connection.player_id, world);
            }
        }
    }

    fn remove_player(&mut self, player_id: EntityId, world: &mut GameWorld) {
        world.despawn_player(player_id);
        for client in self.clients.values_mut() {
            client.observed.remove(&player_id);
        }
    }

    fn player_id(&self, addr: SocketAddr) -> Option<EntityId> {
        let player_id = self.clients.get(&addr).map(|c| c.player_id);
        if player_id.is_none() {
            debug!("Ignoring message from unconnected {}", addr);
        }
        player_id
    }

    fn queue_for(&mut self, addr: SocketAddr, msg: ServerMessage) {
        if let Some(client) = self.clients.get_mut(&addr) {
            client.outgoing_queue.push(msg);
        }
    }

    /// Send immediately to an address that has no connection
    fn queue_unconnected(&self, addr: SocketAddr, msg: ServerMessage) {
        let socket = Arc::clone(&self.socket);
        match msg.serialize() {
            Ok(data) => {
                tokio::spawn(async move {
                    if let Err(e) = socket.send_to(&data, addr).await {
                        error!("Failed to send to {}: {}", addr, e);
                    }
                });
            }
            Err(e) => error!("Failed to serialize message for {}: {}", addr, e),
        }
    }

    /// Queue messages to broadcast to all clients
    pub fn queue_broadcasts(&mut self, messages: Vec<ServerMessage>) {
        self.broadcast_queue.extend(messages);
    }

    /// Route inventory deltas to the clients observing each inventory
    pub fn queue_replication(&mut self, world: &mut GameWorld) {
        for (owner, msg) in world.collect_replication() {
            for client in self.clients.values_mut() {
                if client.is_observing(owner) {
                    client.outgoing_queue.push(msg.clone());
                }
            }
        }
    }

    /// Process outgoing message queues
    pub async fn process_outgoing(&mut self) {
        let broadcasts = std::mem::take(&mut self.broadcast_queue);
        for client in self.clients.values_mut() {
            // Broadcasts go first so a drop exists before a delta references its item
            let queued = std::mem::take(&mut client.outgoing_queue);
            for msg in broadcasts.iter().chain(queued.iter()) {
                let data = match msg.serialize() {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to serialize message for {}: {}", client.addr, e);
                        continue;
                    }
                };
                if data.len() > MAX_DATAGRAM_SIZE {
                    error!("Message for {} is {} bytes, too large for a datagram", client.addr, data.len());
                    continue;
                }
                if let Err(e) = self.socket.send_to(&data, client.addr).await {
                    error!("Failed to send to {}: {}", client.addr, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemization_shared::{ItemDelta, ItemInstance, Payload};

    async fn test_server(timeout: Duration) -> Server {
        Server::bind("127.0.0.1:0", timeout).await.unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn connect(server: &mut Server, world: &mut GameWorld, port: u16, name: &str) -> EntityId {
        server.handle_message(
            addr(port),
            ClientMessage::Connect {
                protocol_version: PROTOCOL_VERSION,
                name: name.to_string(),
            },
            world,
        );
        server.clients[&addr(port)].player_id
    }

    fn drain(server: &mut Server, port: u16) -> Vec<ServerMessage> {
        std::mem::take(&mut server.clients.get_mut(&addr(port)).unwrap().outgoing_queue)
    }

    fn give_item(world: &mut GameWorld, player: EntityId) -> ItemInstance {
        let mut item = ItemInstance::new(1, Payload::empty());
        world
            .get_player_mut(player)
            .unwrap()
            .inventory
            .take_item(&mut item, Payload::empty())
            .unwrap();
        item
    }

    #[tokio::test]
    async fn test_connect_sends_welcome_and_own_snapshot() {
        let mut server = test_server(Duration::from_secs(30)).await;
        let mut world = GameWorld::new(false);

        let player = connect(&mut server, &mut world, 5000, "alice");

        assert!(world.has_player(player));
        let inventory = &world.get_player(player).unwrap().inventory;
        assert_eq!(inventory.role(), NetRole::Authoritative);
        assert!(inventory.has_authority());
        let messages = drain(&mut server, 5000);
        assert_eq!(messages[0], ServerMessage::Welcome { player_id: player });
        assert_eq!(messages[1].inventory_owner(), Some(player));
    }

    #[tokio::test]
    async fn test_deltas_only_reach_observers() {
        let mut server = test_server(Duration::from_secs(30)).await;
        let mut world = GameWorld::new(false);
        let alice = connect(&mut server, &mut world, 5000, "alice");
        let bob = connect(&mut server, &mut world, 5001, "bob");
        let carol = connect(&mut server, &mut world, 5002, "carol");
        server.handle_message(addr(5001), ClientMessage::ObserveInventory { owner: alice }, &mut world);
        drain(&mut server, 5000);
        drain(&mut server, 5001);
        drain(&mut server, 5002);

        let item = give_item(&mut world, alice);
        server.queue_replication(&mut world);

        for port in [5000, 5001] {
            match drain(&mut server, port).as_slice() {
                [ServerMessage::InventoryDelta { owner, delta }] => {
                    assert_eq!(*owner, alice);
                    assert!(matches!(&delta.changes[0], ItemDelta::Added(e) if e.id() == item.id));
                }
                other => panic!("unexpected messages {other:?}"),
            }
        }
        assert!(drain(&mut server, 5002).is_empty());
        assert_ne!(bob, carol);
    }

    #[tokio::test]
    async fn test_observe_unknown_inventory_fails() {
        let mut server = test_server(Duration::from_secs(30)).await;
        let mut world = GameWorld::new(false);
        connect(&mut server, &mut world, 5000, "alice");
        drain(&mut server, 5000);

        server.handle_message(addr(5000), ClientMessage::ObserveInventory { owner: 999 }, &mut world);

        assert!(matches!(
            drain(&mut server, 5000).as_slice(),
            [ServerMessage::ActionFailed { .. }]
        ));
        assert!(!server.clients[&addr(5000)].is_observing(999));
    }

    #[tokio::test]
    async fn test_snapshot_request_requires_observation() {
        let mut server = test_server(Duration::from_secs(30)).await;
        let mut world = GameWorld::new(false);
        let alice = connect(&mut server, &mut world, 5000, "alice");
        let bob = connect(&mut server, &mut world, 5001, "bob");
        drain(&mut server, 5000);

        server.handle_message(addr(5000), ClientMessage::RequestSnapshot { owner: alice }, &mut world);
        server.handle_message(addr(5000), ClientMessage::RequestSnapshot { owner: bob }, &mut world);

        match drain(&mut server, 5000).as_slice() {
            [ServerMessage::InventorySnapshot { owner, .. }, ServerMessage::ActionFailed { .. }] => {
                assert_eq!(*owner, alice)
            }
            other => panic!("unexpected messages {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_drop_reports_to_client() {
        let mut server = test_server(Duration::from_secs(30)).await;
        let mut world = GameWorld::new(false);
        connect(&mut server, &mut world, 5000, "alice");
        drain(&mut server, 5000);

        server.handle_message(addr(5000), ClientMessage::DropItem { item_id: Uuid::new_v4() }, &mut world);

        assert!(matches!(
            drain(&mut server, 5000).as_slice(),
            [ServerMessage::ActionFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_disconnect_despawns_and_stops_observation() {
        let mut server = test_server(Duration::from_secs(30)).await;
        let mut world = GameWorld::new(false);
        let alice = connect(&mut server, &mut world, 5000, "alice");
        connect(&mut server, &mut world, 5001, "bob");
        server.handle_message(addr(5001), ClientMessage::ObserveInventory { owner: alice }, &mut world);

        server.handle_message(addr(5000), ClientMessage::Disconnect, &mut world);

        assert!(!world.has_player(alice));
        assert_eq!(server.client_count(), 1);
        assert!(!server.clients[&addr(5001)].is_observing(alice));
    }

    #[tokio::test]
    async fn test_silent_clients_time_out() {
        let mut server = test_server(Duration::from_millis(1)).await;
        let mut world = GameWorld::new(false);
        let alice = connect(&mut server, &mut world, 5000, "alice");

        std::thread::sleep(Duration::from_millis(10));
        server.check_timeouts(&mut world);

        assert_eq!(server.client_count(), 0);
        assert!(!world.has_player(alice));
    }
}
