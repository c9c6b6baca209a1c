//! Stream registry for the relay.
//!
//! The hub tracks every websocket connection and every registered stream.
//! Connections never touch the socket directly from here: each one owns an
//! unbounded queue of [`Outbound`] items that its writer task drains, so the
//! hub can fan a line out to many viewers without awaiting.
//!
//! # Architecture
//!
//! - [`StreamHub`]: cheap-to-clone handle over the shared registry
//! - [`reaper`]: background task closing producers that stopped pinging
//!
//! # Example
//!
//! ```rust
//! use shout::hub::{Flow, StreamHub};
//!
//! let hub = StreamHub::new();
//! let (producer, _producer_rx) = hub.connect();
//! assert_eq!(hub.handle_text(producer, r#"{"initialize":true}"#), Flow::Continue);
//! assert_eq!(hub.stream_count(), 1);
//! ```

pub mod reaper;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::keys;
use crate::protocol::{ErrorBody, RelayInbound, ServerFrame};

/// Identifier of one websocket connection.
pub type ConnectionId = Uuid;

/// Item queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send this frame as JSON text.
    Frame(ServerFrame),
    /// Send a close frame and stop writing.
    Close,
}

/// What the reader loop should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug)]
struct StreamRecord {
    source_command: Option<String>,
    subscribers: HashSet<ConnectionId>,
}

#[derive(Debug)]
struct ConnectionRecord {
    tx: mpsc::UnboundedSender<Outbound>,
    last_ping: Instant,
    produces: Option<String>,
    subscribed_to: Option<String>,
}

impl ConnectionRecord {
    fn send(&self, frame: ServerFrame) {
        // A dropped receiver means the connection is already going away.
        let _ = self.tx.send(Outbound::Frame(frame));
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

#[derive(Debug, Default)]
struct HubState {
    streams: HashMap<String, StreamRecord>,
    connections: HashMap<ConnectionId, ConnectionRecord>,
}

/// Thread-safe registry of connections and streams.
#[derive(Debug, Clone, Default)]
pub struct StreamHub {
    inner: Arc<RwLock<HubState>>,
}

impl StreamHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RwLockWriteGuard<'_, HubState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection and hand back the queue its writer drains.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().connections.insert(
            id,
            ConnectionRecord {
                tx,
                last_ping: Instant::now(),
                produces: None,
                subscribed_to: None,
            },
        );
        debug!(name: "relay.connection.opened", connection = %id, "Websocket connected");
        (id, rx)
    }

    /// Apply one text frame received from `id`.
    pub fn handle_text(&self, id: ConnectionId, text: &str) -> Flow {
        let inbound = match RelayInbound::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(name: "relay.frame.invalid", connection = %id, error = %e, "Undecodable frame");
                return self.reject(id, ErrorBody::bad_json(e));
            }
        };

        match inbound {
            RelayInbound::Initialize { source_command } => {
                self.register(id, source_command);
                Flow::Continue
            }
            RelayInbound::Subscribe { stream_id } => self.subscribe(id, &stream_id),
            RelayInbound::Ping => {
                let mut state = self.state();
                if let Some(conn) = state.connections.get_mut(&id) {
                    conn.last_ping = Instant::now();
                    conn.send(ServerFrame::pong());
                }
                Flow::Continue
            }
            RelayInbound::Data { payload } => self.publish(id, payload, text),
        }
    }

    fn register(&self, id: ConnectionId, source_command: Option<String>) {
        let mut state = self.state();
        let HubState {
            streams,
            connections,
        } = &mut *state;
        let Some(conn) = connections.get_mut(&id) else {
            return;
        };

        if let Some(existing) = &conn.produces {
            conn.send(ServerFrame::stream_id(existing.clone()));
            return;
        }

        let stream_id = keys::new_key(&mut rand::thread_rng(), |k| streams.contains_key(k));
        streams.insert(
            stream_id.clone(),
            StreamRecord {
                source_command: source_command.clone(),
                subscribers: HashSet::new(),
            },
        );
        conn.produces = Some(stream_id.clone());
        conn.last_ping = Instant::now();
        conn.send(ServerFrame::stream_id(stream_id.clone()));

        info!(
            name: "relay.stream.registered",
            stream_id = %stream_id,
            source_command = ?source_command,
            "Initialized source"
        );
    }

    fn subscribe(&self, id: ConnectionId, stream_id: &str) -> Flow {
        let mut state = self.state();
        let HubState {
            streams,
            connections,
        } = &mut *state;
        let Some(conn) = connections.get_mut(&id) else {
            return Flow::Close;
        };

        if !streams.contains_key(stream_id) {
            info!(
                name: "relay.subscribe.unknown",
                stream_id = %stream_id,
                "Attempt to subscribe to non-existent stream"
            );
            conn.send(ServerFrame::error(ErrorBody::no_stream(stream_id)));
            conn.close();
            return Flow::Close;
        }

        if let Some(previous) = conn.subscribed_to.replace(stream_id.to_string()) {
            if let Some(old) = streams.get_mut(&previous) {
                old.subscribers.remove(&id);
            }
        }

        let Some(stream) = streams.get_mut(stream_id) else {
            return Flow::Close;
        };
        stream.subscribers.insert(id);
        conn.last_ping = Instant::now();
        conn.send(ServerFrame::subscribed(stream.source_command.clone()));

        info!(
            name: "relay.stream.subscribed",
            stream_id = %stream_id,
            subscribers = stream.subscribers.len(),
            "Subscribed"
        );
        Flow::Continue
    }

    fn publish(&self, id: ConnectionId, payload: Option<String>, raw: &str) -> Flow {
        let state = self.state();
        let Some(conn) = state.connections.get(&id) else {
            return Flow::Close;
        };

        let Some(stream_id) = conn.produces.as_deref() else {
            info!(name: "relay.frame.unregistered", frame = %raw, "Received frame from unregistered stream");
            conn.send(ServerFrame::error(ErrorBody::not_registered()));
            conn.close();
            return Flow::Close;
        };

        let Some(payload) = payload else {
            info!(name: "relay.frame.no_payload", frame = %raw, "Received frame missing `payload`");
            conn.send(ServerFrame::error(ErrorBody::no_data()));
            conn.close();
            return Flow::Close;
        };

        debug!(name: "relay.payload", stream_id = %stream_id, payload = ?payload, "payload");
        if let Some(stream) = state.streams.get(stream_id) {
            for sub in &stream.subscribers {
                if let Some(viewer) = state.connections.get(sub) {
                    viewer.send(ServerFrame::payload(payload.clone()));
                }
            }
        }
        Flow::Continue
    }

    fn reject(&self, id: ConnectionId, body: ErrorBody) -> Flow {
        if let Some(conn) = self.state().connections.get(&id) {
            conn.send(ServerFrame::error(body));
            conn.close();
        }
        Flow::Close
    }

    /// Forget a connection. A producer takes its stream and its viewers with it.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state();
        let Some(conn) = state.connections.remove(&id) else {
            return;
        };

        if let Some(stream_id) = conn.subscribed_to {
            if let Some(stream) = state.streams.get_mut(&stream_id) {
                stream.subscribers.remove(&id);
            }
        }

        if let Some(stream_id) = conn.produces {
            if let Some(stream) = state.streams.remove(&stream_id) {
                info!(
                    name: "relay.stream.closed",
                    stream_id = %stream_id,
                    subscribers = stream.subscribers.len(),
                    "Cleaning up stream"
                );
                for sub in &stream.subscribers {
                    if let Some(viewer) = state.connections.get_mut(sub) {
                        viewer.subscribed_to = None;
                        viewer.close();
                    }
                }
            }
        }
        debug!(name: "relay.connection.closed", connection = %id, "Websocket closed");
    }

    /// Close every producer silent for longer than `max_silence`. Returns how many.
    pub fn reap(&self, max_silence: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<ConnectionId> = {
            let state = self.state();
            state
                .connections
                .iter()
                .filter(|(_, c)| c.produces.is_some())
                .filter(|(_, c)| now.duration_since(c.last_ping) > max_silence)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in &stale {
            if let Some(conn) = self.state().connections.get(id) {
                conn.close();
            }
            self.disconnect(*id);
        }
        stale.len()
    }

    /// Number of registered streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.state().streams.len()
    }

    /// Ids of every registered stream.
    #[must_use]
    pub fn stream_ids(&self) -> Vec<String> {
        self.state().streams.keys().cloned().collect()
    }

    /// Number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state().connections.len()
    }

    /// Viewers subscribed to `stream_id`, or `None` if it does not exist.
    #[must_use]
    pub fn subscriber_count(&self, stream_id: &str) -> Option<usize> {
        self.state()
            .streams
            .get(stream_id)
            .map(|s| s.subscribers.len())
    }

    /// Stream produced by `id`, if it registered one.
    #[must_use]
    pub fn stream_of(&self, id: ConnectionId) -> Option<String> {
        self.state()
            .connections
            .get(&id)
            .and_then(|c| c.produces.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codes;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    fn register(hub: &StreamHub) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>, String) {
        let (id, mut rx) = hub.connect();
        hub.handle_text(id, r#"{"initialize":true,"source_command":"tail -f x"}"#);
        let stream_id = match drain(&mut rx).pop() {
            Some(Outbound::Frame(ServerFrame::StreamId { stream_id })) => stream_id,
            other => panic!("expected stream id, got {other:?}"),
        };
        (id, rx, stream_id)
    }

    #[test]
    fn test_initialize_assigns_key() {
        let hub = StreamHub::new();
        let (id, mut rx, stream_id) = register(&hub);
        assert!(stream_id.len() >= keys::MIN_KEY_LEN);
        assert_eq!(hub.stream_of(id), Some(stream_id.clone()));

        // A second initialize keeps the same stream.
        hub.handle_text(id, r#"{"initialize":true}"#);
        assert_eq!(
            drain(&mut rx),
            vec![Outbound::Frame(ServerFrame::stream_id(stream_id))]
        );
        assert_eq!(hub.stream_count(), 1);
    }

    #[test]
    fn test_subscribe_and_fan_out() {
        let hub = StreamHub::new();
        let (producer, _prx, stream_id) = register(&hub);

        let (v1, mut rx1) = hub.connect();
        let (v2, mut rx2) = hub.connect();
        let subscribe = format!(r#"{{"subscribe":"{stream_id}"}}"#);
        assert_eq!(hub.handle_text(v1, &subscribe), Flow::Continue);
        assert_eq!(hub.handle_text(v2, &subscribe), Flow::Continue);
        assert_eq!(hub.subscriber_count(&stream_id), Some(2));

        let ack = Outbound::Frame(ServerFrame::subscribed(Some("tail -f x".to_string())));
        assert_eq!(drain(&mut rx1), vec![ack.clone()]);
        assert_eq!(drain(&mut rx2), vec![ack]);

        hub.handle_text(producer, r#"{"payload":"one\n"}"#);
        hub.handle_text(producer, r#"{"payload":"two\n"}"#);
        let expected = vec![
            Outbound::Frame(ServerFrame::payload("one\n")),
            Outbound::Frame(ServerFrame::payload("two\n")),
        ];
        assert_eq!(drain(&mut rx1), expected);
        assert_eq!(drain(&mut rx2), expected);
    }

    #[test]
    fn test_unknown_stream_is_rejected() {
        let hub = StreamHub::new();
        let (viewer, mut rx) = hub.connect();
        assert_eq!(hub.handle_text(viewer, r#"{"subscribe":"nope"}"#), Flow::Close);
        let out = drain(&mut rx);
        assert_eq!(out.len(), 2);
        match &out[0] {
            Outbound::Frame(ServerFrame::Error { error }) => {
                assert_eq!(error.short, codes::NO_STREAM);
                assert_eq!(error.msg, "That stream doesn't exist: nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(out[1], Outbound::Close);
    }

    #[test]
    fn test_data_requires_registration_and_payload() {
        let hub = StreamHub::new();
        let (stranger, mut rx) = hub.connect();
        assert_eq!(hub.handle_text(stranger, r#"{"payload":"x"}"#), Flow::Close);
        assert!(matches!(
            drain(&mut rx).first(),
            Some(Outbound::Frame(ServerFrame::Error { error })) if error.short == codes::NOT_REGISTERED
        ));

        let (producer, mut prx, _) = register(&hub);
        assert_eq!(hub.handle_text(producer, r#"{"data":"x"}"#), Flow::Close);
        assert!(matches!(
            drain(&mut prx).first(),
            Some(Outbound::Frame(ServerFrame::Error { error })) if error.short == codes::NO_DATA
        ));

        let (other, mut orx) = hub.connect();
        assert_eq!(hub.handle_text(other, "{broken"), Flow::Close);
        assert!(matches!(
            drain(&mut orx).first(),
            Some(Outbound::Frame(ServerFrame::Error { error })) if error.short == codes::BAD_JSON
        ));
    }

    #[test]
    fn test_ping_answers_pong() {
        let hub = StreamHub::new();
        let (id, mut rx) = hub.connect();
        assert_eq!(hub.handle_text(id, r#"{"ping":"ping"}"#), Flow::Continue);
        assert_eq!(drain(&mut rx), vec![Outbound::Frame(ServerFrame::pong())]);
    }

    #[test]
    fn test_producer_disconnect_closes_viewers() {
        let hub = StreamHub::new();
        let (producer, _prx, stream_id) = register(&hub);
        let (viewer, mut vrx) = hub.connect();
        hub.handle_text(viewer, &format!(r#"{{"subscribe":"{stream_id}"}}"#));
        drain(&mut vrx);

        hub.disconnect(producer);
        assert_eq!(hub.stream_count(), 0);
        assert_eq!(drain(&mut vrx), vec![Outbound::Close]);

        hub.disconnect(viewer);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_viewer_disconnect_leaves_stream() {
        let hub = StreamHub::new();
        let (_producer, _prx, stream_id) = register(&hub);
        let (viewer, _vrx) = hub.connect();
        hub.handle_text(viewer, &format!(r#"{{"subscribe":"{stream_id}"}}"#));
        hub.disconnect(viewer);
        assert_eq!(hub.subscriber_count(&stream_id), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_only_silent_producers() {
        let hub = StreamHub::new();
        let (_quiet, mut quiet_rx, quiet_stream) = register(&hub);
        let (chatty, mut chatty_rx, chatty_stream) = register(&hub);
        let (viewer, mut vrx) = hub.connect();
        hub.handle_text(viewer, &format!(r#"{{"subscribe":"{quiet_stream}"}}"#));
        drain(&mut vrx);

        tokio::time::advance(Duration::from_secs(20)).await;
        hub.handle_text(chatty, r#"{"ping":"ping"}"#);
        drain(&mut chatty_rx);
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(hub.reap(Duration::from_secs(30)), 1);
        assert_eq!(drain(&mut quiet_rx), vec![Outbound::Close]);
        assert_eq!(drain(&mut vrx), vec![Outbound::Close]);
        assert_eq!(hub.subscriber_count(&quiet_stream), None);
        assert_eq!(hub.subscriber_count(&chatty_stream), Some(0));
    }
}
