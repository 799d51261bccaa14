//! Session-scoped transport: one socket, one JSON envelope codec, one subscriber

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::util::time::unix_millis;
use crate::ws::protocol::{NetworkMessage, PositionUpdate};

/// Inbound message handler. Only one is ever installed.
pub type MessageCallback = Box<dyn FnMut(NetworkMessage)>;

/// Open/close notification
pub type LifecycleCallback = Box<dyn FnMut()>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Failed to open socket: {0}")]
    Connect(String),

    #[error("Socket write failed: {0}")]
    Write(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Events a socket reports back, drained in order by [`TransportManager::pump`]
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Opened,
    Text(String),
    Closed,
    Error(String),
}

/// A single text-frame connection
pub trait Socket {
    /// Queue a text frame for writing. Must not block.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next pending event, if any
    fn poll_event(&mut self) -> Option<SocketEvent>;

    fn close(&mut self);
}

/// Opens sockets. Injected so tests can run without a network.
pub trait SocketFactory {
    fn open(&mut self, url: &str) -> Result<Box<dyn Socket>, TransportError>;
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Bounded reconnection with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// 0 disables reconnection
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let factor = 1u64 << attempt.min(16);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Owns the match's only connection to the relay
pub struct TransportManager {
    factory: Box<dyn SocketFactory>,
    socket: Option<Box<dyn Socket>>,
    state: ConnectionState,
    url: Option<String>,
    room_code: Option<String>,
    is_host: bool,
    message_callback: Option<MessageCallback>,
    open_callback: Option<LifecycleCallback>,
    close_callback: Option<LifecycleCallback>,
    reconnect: ReconnectPolicy,
    attempts: u32,
    retry_at: Option<u64>,
}

impl TransportManager {
    pub fn new(factory: Box<dyn SocketFactory>) -> Self {
        Self {
            factory,
            socket: None,
            state: ConnectionState::Disconnected,
            url: None,
            room_code: None,
            is_host: false,
            message_callback: None,
            open_callback: None,
            close_callback: None,
            reconnect: ReconnectPolicy::disabled(),
            attempts: 0,
            retry_at: None,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Open the connection. The state reaches `Connected` once the socket
    /// reports it is open (see [`pump`](Self::pump)); at that point the relay
    /// is asked to join `room_code`, or to create a room when there is none.
    pub fn connect(&mut self, url: &str, room_code: Option<&str>) -> Result<(), TransportError> {
        if let Some(mut old) = self.socket.take() {
            debug!("Replacing existing socket");
            old.close();
        }

        self.url = Some(url.to_string());
        self.room_code = room_code.map(str::to_string);
        self.attempts = 0;
        self.retry_at = None;

        info!(url = %url, room_code = ?room_code, "Connecting to relay");
        self.open_socket()
    }

    /// Tear the connection down. Never schedules a reconnect.
    pub fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        self.retry_at = None;
        self.state = ConnectionState::Disconnected;
        info!("Disconnected from relay");

        if let Some(callback) = self.close_callback.as_mut() {
            callback();
        }
    }

    /// Serialize and write a message. Returns `false` when nothing was written.
    pub fn send(&mut self, message: &NetworkMessage) -> bool {
        if self.state != ConnectionState::Connected {
            debug!(kind = message.kind(), "Not connected, message not sent");
            return false;
        }

        let result = match self.socket.as_mut() {
            Some(socket) => serde_json::to_string(message)
                .map_err(TransportError::from)
                .and_then(|text| socket.send_text(text)),
            None => Err(TransportError::NotConnected),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "Failed to send message");
                false
            }
        }
    }

    /// Install the inbound handler, replacing any previous one
    pub fn set_message_callback(&mut self, callback: MessageCallback) {
        if self.message_callback.replace(callback).is_some() {
            debug!("Inbound message handler replaced");
        }
    }

    /// Same as [`set_message_callback`](Self::set_message_callback)
    pub fn on_message(&mut self, callback: impl FnMut(NetworkMessage) + 'static) {
        self.set_message_callback(Box::new(callback));
    }

    pub fn on_open(&mut self, callback: impl FnMut() + 'static) {
        self.open_callback = Some(Box::new(callback));
    }

    pub fn on_close(&mut self, callback: impl FnMut() + 'static) {
        self.close_callback = Some(Box::new(callback));
    }

    /// Drain socket events and run a due reconnect attempt
    pub fn pump(&mut self, now: u64) {
        if self.retry_at.is_some_and(|at| now >= at) {
            self.retry_at = None;
            self.attempts += 1;
            info!(attempt = self.attempts, "Reconnecting to relay");
            if let Err(e) = self.open_socket() {
                warn!(error = %e, "Reconnect attempt failed");
                self.schedule_retry(now);
            }
        }

        while let Some(event) = self.socket.as_mut().and_then(|s| s.poll_event()) {
            match event {
                SocketEvent::Opened => self.handle_open(),
                SocketEvent::Text(text) => self.dispatch_text(&text),
                SocketEvent::Closed => {
                    info!("Relay connection closed");
                    self.handle_lost(now);
                }
                SocketEvent::Error(e) => {
                    warn!(error = %e, "Relay connection error");
                    self.handle_lost(now);
                }
            }
        }
    }

    pub fn send_game_action(&mut self, action: &str, fields: Map<String, Value>) -> bool {
        self.send(&NetworkMessage::game_action(action, fields))
    }

    pub fn send_position_update(&mut self, mut update: PositionUpdate) -> bool {
        update.timestamp = unix_millis();
        self.send(&NetworkMessage::PositionUpdate(update))
    }

    pub fn send_health_update(&mut self, player_index: usize, health: f32) -> bool {
        self.send(&NetworkMessage::health_update(player_index, health))
    }

    pub fn send_replay_request(
        &mut self,
        match_id: &str,
        player_id: &str,
        message: Option<&str>,
    ) -> bool {
        self.send(&NetworkMessage::ReplayRequest {
            match_id: match_id.to_string(),
            player_id: player_id.to_string(),
            message: message.map(str::to_string),
            timestamp: unix_millis(),
        })
    }

    pub fn send_replay_response(&mut self, match_id: &str, player_id: &str, accepted: bool) -> bool {
        self.send(&NetworkMessage::ReplayResponse {
            match_id: match_id.to_string(),
            accepted,
            player_id: Some(player_id.to_string()),
            timestamp: unix_millis(),
        })
    }

    pub fn send_character_selected(&mut self, character: u8, player_num: u8) -> bool {
        self.send(&NetworkMessage::CharacterSelected {
            character,
            player_num,
            timestamp: unix_millis(),
        })
    }

    /// Record host role and announce it immediately
    pub fn set_host(&mut self, is_host: bool) -> bool {
        self.is_host = is_host;
        self.send(&NetworkMessage::host_status(is_host))
    }

    /// Record the room code and announce it immediately
    pub fn set_room_code(&mut self, room_code: &str) -> bool {
        self.room_code = Some(room_code.to_string());
        self.send(&NetworkMessage::room_code(room_code))
    }

    fn open_socket(&mut self) -> Result<(), TransportError> {
        let Some(url) = self.url.clone() else {
            return Err(TransportError::Connect("no relay url".to_string()));
        };

        self.state = ConnectionState::Connecting;
        match self.factory.open(&url) {
            Ok(socket) => {
                self.socket = Some(socket);
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn handle_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        info!(room_code = ?self.room_code, "Connected to relay");

        let join = match &self.room_code {
            Some(code) => NetworkMessage::JoinRoom {
                room_code: code.clone(),
                timestamp: unix_millis(),
            },
            None => NetworkMessage::CreateRoom {
                timestamp: unix_millis(),
            },
        };
        self.send(&join);

        if let Some(callback) = self.open_callback.as_mut() {
            callback();
        }
    }

    fn handle_lost(&mut self, now: u64) {
        self.socket = None;
        self.state = ConnectionState::Disconnected;

        if let Some(callback) = self.close_callback.as_mut() {
            callback();
        }
        self.schedule_retry(now);
    }

    fn schedule_retry(&mut self, now: u64) {
        if self.attempts >= self.reconnect.max_attempts {
            if self.reconnect.max_attempts > 0 {
                warn!(attempts = self.attempts, "Giving up on relay reconnection");
            }
            return;
        }

        let delay = self.reconnect.delay_for(self.attempts);
        debug!(delay_ms = delay, "Scheduling reconnect");
        self.retry_at = Some(now + delay);
    }

    fn dispatch_text(&mut self, text: &str) {
        let message = match serde_json::from_str::<NetworkMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to parse inbound message");
                return;
            }
        };

        // Remember relay-assigned codes so a reconnect rejoins the same room
        if let NetworkMessage::RoomCreated { room_code } = &message {
            self.room_code = Some(room_code.clone());
        }

        match self.message_callback.as_mut() {
            Some(callback) => callback(message),
            None => debug!(kind = message.kind(), "No inbound handler, message dropped"),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::testing::*;
    use super::*;

    #[test]
    fn send_while_disconnected_writes_nothing() {
        let (mut transport, wire) = fake_transport();
        assert!(!transport.send_health_update(1, 90.0));

        transport.connect("ws://relay.test/ws", None).unwrap();
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert!(!transport.send_health_update(1, 90.0));
        assert!(wire.borrow().sent.is_empty());
    }

    #[test]
    fn open_event_connects_and_creates_room() {
        let (mut transport, wire) = fake_transport();
        let opened = Rc::new(RefCell::new(false));
        let flag = opened.clone();
        transport.on_open(move || *flag.borrow_mut() = true);

        transport.connect("ws://relay.test/ws", None).unwrap();
        wire.borrow_mut().events.push_back(SocketEvent::Opened);
        transport.pump(0);

        assert!(transport.is_connected());
        assert!(*opened.borrow());
        let sent = wire.borrow().sent_messages();
        assert!(matches!(sent.as_slice(), [NetworkMessage::CreateRoom { .. }]));
    }

    #[test]
    fn open_with_room_code_joins() {
        let (mut transport, wire) = fake_transport();
        transport.connect("ws://relay.test/ws", Some("QZ7K")).unwrap();
        wire.borrow_mut().events.push_back(SocketEvent::Opened);
        transport.pump(0);

        let sent = wire.borrow().sent_messages();
        match sent.as_slice() {
            [NetworkMessage::JoinRoom { room_code, .. }] => assert_eq!(room_code, "QZ7K"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn connected_send_writes_json_text() {
        let (mut transport, wire) = connected_transport();
        assert!(transport.send_health_update(1, 95.0));

        let text = wire.borrow().sent[0].clone();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "health_update");
        assert_eq!(value["playerIndex"], 1);
        assert_eq!(value["health"], 95.0);
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn room_code_and_character_envelopes() {
        let (mut transport, wire) = connected_transport();
        assert!(transport.set_room_code("QZ7K"));
        assert!(transport.send_character_selected(2, 1));
        assert_eq!(transport.room_code(), Some("QZ7K"));

        let sent = wire.borrow().sent.clone();
        let room: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(room["type"], "room_code");
        assert_eq!(room["roomCode"], "QZ7K");

        let character: Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(character["type"], "character_selected");
        assert_eq!(character["character"], 2);
        assert_eq!(character["playerNum"], 1);
        assert!(character["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn game_action_with_envelope_named_fields_still_decodes() {
        let (mut transport, wire) = connected_transport();
        let mut fields = Map::new();
        fields.insert("x".into(), serde_json::json!("12"));
        fields.insert("timestamp".into(), serde_json::json!("5"));

        assert!(transport.send_game_action("dash", fields));

        let sent = wire.borrow().sent.clone();
        let decoded: NetworkMessage = serde_json::from_str(&sent[0]).unwrap();
        match decoded {
            NetworkMessage::GameAction { action, fields, .. } => {
                assert_eq!(action, "dash");
                assert_eq!(fields.get("x"), Some(&serde_json::json!(12)));
                assert!(!fields.contains_key("timestamp"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn write_failure_returns_false() {
        let (mut transport, wire) = connected_transport();
        wire.borrow_mut().fail_writes = true;
        assert!(!transport.set_host(true));
        assert!(transport.is_host());
        assert!(transport.is_connected());
    }

    #[test]
    fn second_callback_replaces_first() {
        let (mut transport, wire) = connected_transport();
        let first = Rc::new(RefCell::new(Vec::new()));
        let second = Rc::new(RefCell::new(Vec::new()));

        let sink = first.clone();
        transport.on_message(move |m| sink.borrow_mut().push(m));
        let sink = second.clone();
        transport.set_message_callback(Box::new(move |m| sink.borrow_mut().push(m)));

        push_text(&wire, r#"{"type":"jump","playerIdx":1,"timestamp":3}"#);
        transport.pump(10);

        assert!(first.borrow().is_empty());
        assert_eq!(second.borrow().len(), 1);
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let (mut transport, wire) = connected_transport();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        transport.on_message(move |m| sink.borrow_mut().push(m));

        push_text(&wire, "{not json");
        push_text(&wire, r#"{"type":"teleport"}"#);
        push_text(&wire, r#"{"type":"host_status","isHost":true}"#);
        transport.pump(10);

        assert_eq!(seen.borrow().len(), 1);
        assert!(transport.is_connected());
    }

    #[test]
    fn disconnect_closes_socket_and_notifies() {
        let (mut transport, wire) = connected_transport();
        let closed = Rc::new(RefCell::new(0));
        let count = closed.clone();
        transport.on_close(move || *count.borrow_mut() += 1);

        transport.disconnect();

        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(wire.borrow().closed, 1);
        assert_eq!(*closed.borrow(), 1);
        assert!(!transport.send_health_update(0, 50.0));
    }

    #[test]
    fn remote_close_without_policy_stays_down() {
        let (mut transport, wire) = connected_transport();
        wire.borrow_mut().events.push_back(SocketEvent::Closed);
        transport.pump(100);
        assert_eq!(transport.state(), ConnectionState::Disconnected);

        transport.pump(60_000);
        assert_eq!(wire.borrow().opened, 1);
    }

    #[test]
    fn reconnect_is_bounded_with_backoff() {
        let (transport, wire) = fake_transport();
        let mut transport = transport.with_reconnect(ReconnectPolicy {
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        });
        transport.connect("ws://relay.test/ws", None).unwrap();
        wire.borrow_mut().events.push_back(SocketEvent::Error("reset".into()));
        transport.pump(1_000);
        assert_eq!(transport.state(), ConnectionState::Disconnected);

        wire.borrow_mut().fail_opens = true;
        transport.pump(1_099);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        // first retry after 100ms fails, second is scheduled 200ms later
        transport.pump(1_100);
        transport.pump(1_299);
        wire.borrow_mut().fail_opens = false;
        transport.pump(1_300);
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert_eq!(wire.borrow().opened, 2);

        wire.borrow_mut().events.push_back(SocketEvent::Closed);
        transport.pump(1_400);
        transport.pump(100_000);
        assert_eq!(wire.borrow().opened, 2);
    }

    #[test]
    fn reconnect_rejoins_created_room() {
        let (transport, wire) = fake_transport();
        let mut transport = transport.with_reconnect(ReconnectPolicy {
            max_attempts: 1,
            base_delay_ms: 50,
            max_delay_ms: 50,
        });
        transport.connect("ws://relay.test/ws", None).unwrap();
        wire.borrow_mut().events.push_back(SocketEvent::Opened);
        push_text(&wire, r#"{"type":"room_created","roomCode":"WXYZ"}"#);
        wire.borrow_mut().events.push_back(SocketEvent::Closed);
        transport.pump(0);
        assert_eq!(transport.room_code(), Some("WXYZ"));

        wire.borrow_mut().sent.clear();
        transport.pump(50);
        wire.borrow_mut().events.push_back(SocketEvent::Opened);
        transport.pump(60);

        let sent = wire.borrow().sent_messages();
        assert!(matches!(
            sent.as_slice(),
            [NetworkMessage::JoinRoom { room_code, .. }] if room_code == "WXYZ"
        ));
    }

    #[test]
    fn explicit_disconnect_never_reconnects() {
        let (transport, wire) = fake_transport();
        let mut transport = transport.with_reconnect(ReconnectPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        });
        transport.connect("ws://relay.test/ws", None).unwrap();
        wire.borrow_mut().events.push_back(SocketEvent::Opened);
        transport.pump(0);

        transport.disconnect();
        transport.pump(100_000);
        assert_eq!(wire.borrow().opened, 1);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_cancels_pending_retry() {
        let (transport, wire) = fake_transport();
        let mut transport = transport.with_reconnect(ReconnectPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        });
        transport.connect("ws://relay.test/ws", None).unwrap();
        wire.borrow_mut().events.push_back(SocketEvent::Opened);
        wire.borrow_mut().events.push_back(SocketEvent::Closed);
        transport.pump(0);

        // retry is due at 100
        transport.disconnect();
        transport.pump(100);
        transport.pump(100_000);
        assert_eq!(wire.borrow().opened, 1);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 1_500,
        };
        assert_eq!(policy.delay_for(0), 250);
        assert_eq!(policy.delay_for(1), 500);
        assert_eq!(policy.delay_for(2), 1_000);
        assert_eq!(policy.delay_for(3), 1_500);
    }
}
