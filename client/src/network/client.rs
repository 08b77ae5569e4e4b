//! UDP network client.
//!
//! A simple non-blocking UDP client meant to be polled from the caller's main loop.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use itemization_shared::{ClientMessage, EntityId, ServerMessage, DEFAULT_PORT, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};

/// Connection timeout duration
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Heartbeat interval while idle
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Connection state
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Network client for communicating with the game server
pub struct NetworkClient {
    socket: Option<UdpSocket>,
    server_addr: Option<SocketAddr>,
    state: ConnectionState,
    player_id: Option<EntityId>,
    connect_time: Option<Instant>,
    last_send_time: Instant,
    /// Received messages waiting to be processed
    incoming_messages: Vec<ServerMessage>,
}

impl NetworkClient {
    pub fn new() -> Self {
        Self {
            socket: None,
            server_addr: None,
            state: ConnectionState::Disconnected,
            player_id: None,
            connect_time: None,
            last_send_time: Instant::now(),
            incoming_messages: Vec::new(),
        }
    }

    /// Resolve `server` as `host:port`, or as a bare host using the default port
    fn parse_server_addr(server: &str) -> Result<SocketAddr, String> {
        let with_port = if server.contains(':') {
            server.to_string()
        } else {
            format!("{}:{}", server, DEFAULT_PORT)
        };
        with_port
            .parse()
            .map_err(|e| format!("Invalid server address {}: {}", with_port, e))
    }

    fn init_socket(&mut self, server: &str) -> Result<(), String> {
        let server_addr = Self::parse_server_addr(server)?;

        // Bind to any available port
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| format!("Failed to create socket: {}", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| format!("Failed to set non-blocking: {}", e))?;

        self.socket = Some(socket);
        self.server_addr = Some(server_addr);
        Ok(())
    }

    /// Join the server under `name`
    pub fn connect(&mut self, server: &str, name: &str) -> Result<(), String> {
        if self.socket.is_none() {
            self.init_socket(server)?;
        }

        self.state = ConnectionState::Connecting;
        self.connect_time = Some(Instant::now());

        self.send_message(&ClientMessage::Connect {
            protocol_version: PROTOCOL_VERSION,
            name: name.to_string(),
        })
    }

    /// Disconnect from the server
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            let _ = self.send_message(&ClientMessage::Disconnect);
        }

        self.socket = None;
        self.server_addr = None;
        self.state = ConnectionState::Disconnected;
        self.player_id = None;
        self.connect_time = None;
        self.incoming_messages.clear();
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Player ID (only valid when connected)
    pub fn player_id(&self) -> Option<EntityId> {
        self.player_id
    }

    /// Poll for incoming messages (should be called every frame)
    pub fn poll(&mut self) -> Vec<ServerMessage> {
        self.receive_packets();

        if matches!(self.state, ConnectionState::Connecting) {
            if let Some(connect_time) = self.connect_time {
                if connect_time.elapsed() > CONNECTION_TIMEOUT {
                    self.state = ConnectionState::Failed("Connection timed out".to_string());
                }
            }
        }

        if self.should_send_heartbeat() {
            let _ = self.send_message(&ClientMessage::Heartbeat);
        }

        std::mem::take(&mut self.incoming_messages)
    }

    /// Receive all pending packets
    fn receive_packets(&mut self) {
        let Some(socket) = &self.socket else {
            return;
        };

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut received_packets: Vec<Vec<u8>> = Vec::new();

        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, _addr)) => {
                    received_packets.push(buf[..len].to_vec());
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    break;
                }
                Err(e) => {
                    error!("Network receive error: {}", e);
                    break;
                }
            }
        }

        for packet_data in received_packets {
            self.process_packet(&packet_data);
        }
    }

    fn process_packet(&mut self, data: &[u8]) {
        let message = match ServerMessage::deserialize(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize server message: {}", e);
                return;
            }
        };

        self.handle_connection_message(&message);
        self.incoming_messages.push(message);
    }

    fn handle_connection_message(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::Welcome { player_id } => {
                self.player_id = Some(*player_id);
                self.state = ConnectionState::Connected;
                info!("Connected with player ID: {}", player_id);
            }
            ServerMessage::ConnectFailed { reason } => {
                self.state = ConnectionState::Failed(reason.clone());
                error!("Connection refused: {}", reason);
            }
            _ => {}
        }
    }

    /// Send a message to the server
    pub fn send_message(&mut self, msg: &ClientMessage) -> Result<(), String> {
        let socket = self.socket.as_ref().ok_or("Not connected")?;
        let server_addr = self.server_addr.ok_or("No server address")?;

        let data = msg.serialize().map_err(|e| format!("Failed to encode: {}", e))?;
        socket
            .send_to(&data, server_addr)
            .map_err(|e| format!("Failed to send: {}", e))?;

        self.last_send_time = Instant::now();
        Ok(())
    }

    pub fn send_observe(&mut self, owner: EntityId) -> Result<(), String> {
        self.send_message(&ClientMessage::ObserveInventory { owner })
    }

    pub fn send_stop_observing(&mut self, owner: EntityId) -> Result<(), String> {
        self.send_message(&ClientMessage::StopObserving { owner })
    }

    /// Check if we should send a heartbeat
    pub fn should_send_heartbeat(&self) -> bool {
        self.is_connected() && self.last_send_time.elapsed() > HEARTBEAT_INTERVAL
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::InventoryReplicas;
    use itemization_shared::{InventoryComponent, ItemInstance, NetRole, Payload, PayloadKind};
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_server_addr_defaults_port() {
        assert_eq!(
            NetworkClient::parse_server_addr("127.0.0.1").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        );
        assert_eq!(
            NetworkClient::parse_server_addr("127.0.0.1:9000").unwrap().port(),
            9000
        );
        assert!(NetworkClient::parse_server_addr("not an address").is_err());
    }

    #[test]
    fn test_welcome_connects() {
        let mut client = NetworkClient::new();
        client.state = ConnectionState::Connecting;

        client.handle_connection_message(&ServerMessage::Welcome { player_id: 7 });

        assert!(client.is_connected());
        assert_eq!(client.player_id(), Some(7));
    }

    #[test]
    fn test_refusal_fails_connection() {
        let mut client = NetworkClient::new();
        client.state = ConnectionState::Connecting;

        client.handle_connection_message(&ServerMessage::ConnectFailed {
            reason: "version".into(),
        });

        assert_eq!(client.state(), &ConnectionState::Failed("version".into()));
    }

    #[derive(Serialize, Deserialize)]
    struct Roll {
        quantity: u32,
        note: String,
    }

    impl PayloadKind for Roll {
        const KIND: &'static str = "test.roll";
    }

    #[test]
    fn test_full_inventory_snapshot_arrives_in_one_datagram() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut client = NetworkClient::new();
        client
            .connect(&server.local_addr().unwrap().to_string(), "tester")
            .unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (_, client_addr) = server.recv_from(&mut buf).unwrap();

        let mut inventory = InventoryComponent::new(9, NetRole::Authoritative);
        for quantity in 0..20 {
            let roll = Roll {
                quantity,
                note: "rolled from the goblin camp loot table".into(),
            };
            let mut item = ItemInstance::new(3, Payload::new(&roll).unwrap());
            inventory.take_item(&mut item, Payload::empty()).unwrap();
        }
        let snapshot = ServerMessage::InventorySnapshot {
            owner: 9,
            snapshot: inventory.snapshot(),
        };
        let bytes = snapshot.serialize().unwrap();
        // Larger than a typical MTU-sized packet
        assert!(bytes.len() > 1200);
        server.send_to(&bytes, client_addr).unwrap();

        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while received.is_empty() && Instant::now() < deadline {
            received = client.poll();
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(received, vec![snapshot.clone()]);
        let mut replicas = InventoryReplicas::new();
        replicas.handle_message(&received[0]);
        assert_eq!(replicas.get(9).unwrap().items(), inventory.items());
    }

    #[test]
    fn test_stop_observing_and_disconnect_reach_server() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut client = NetworkClient::new();
        client
            .connect(&server.local_addr().unwrap().to_string(), "tester")
            .unwrap();
        client.handle_connection_message(&ServerMessage::Welcome { player_id: 1 });

        client.send_stop_observing(4).unwrap();
        client.disconnect();

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut received = Vec::new();
        for _ in 0..3 {
            let (len, _) = server.recv_from(&mut buf).unwrap();
            received.push(ClientMessage::deserialize(&buf[..len]).unwrap());
        }
        assert!(matches!(received[0], ClientMessage::Connect { .. }));
        assert_eq!(received[1], ClientMessage::StopObserving { owner: 4 });
        assert_eq!(received[2], ClientMessage::Disconnect);
        assert_eq!(client.state(), &ConnectionState::Disconnected);
        assert_eq!(client.player_id(), None);
    }

    #[test]
    fn test_send_without_socket_fails() {
        let mut client = NetworkClient::new();
        assert!(client.send_message(&ClientMessage::Heartbeat).is_err());
    }
}
