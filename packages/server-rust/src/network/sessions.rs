//! SSE session registry.
//!
//! Each legacy SSE client holds one long-lived event stream. Replies to its
//! POSTed messages are pushed through a bounded mpsc channel whose receiver
//! lives inside that stream. A dropped receiver is how a client disconnect
//! becomes visible to the POST side.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::config::SessionConfig;

/// Opaque session identifier, rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Message queued for a session's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// A serialized JSON-RPC reply, sent as a `message` event.
    Event(String),
    /// Ends the stream.
    Close,
}

/// Error returned when queueing a message for a session fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The channel stayed full for the whole timeout.
    Timeout,
    /// The stream has ended; the receiver was dropped.
    Disconnected,
}

/// Sending side of one SSE session.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    tx: mpsc::Sender<OutboundMessage>,
    pub opened_at: Instant,
}

impl SessionHandle {
    /// Attempts to queue a message without blocking.
    #[must_use]
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Queues a message, waiting up to `timeout` for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Timeout` if the channel remains full and
    /// `SendError::Disconnected` if the stream has gone away.
    pub async fn send_timeout(
        &self,
        msg: OutboundMessage,
        timeout: Duration,
    ) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Disconnected),
            Err(_) => Err(SendError::Timeout),
        }
    }

    /// Returns `false` once the event stream has been dropped.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Concurrent registry of open SSE sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session, returning its handle and the stream-side receiver.
    pub fn register(
        &self,
        config: &SessionConfig,
    ) -> (Arc<SessionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(config.outbound_channel_capacity);
        let handle = Arc::new(SessionHandle {
            id: SessionId::new(),
            tx,
            opened_at: Instant::now(),
        });
        self.sessions.insert(handle.id, Arc::clone(&handle));
        (handle, rx)
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Removes and returns every session. Used during graceful shutdown.
    pub fn drain_all(&self) -> Vec<Arc<SessionHandle>> {
        let keys: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        keys.into_iter()
            .filter_map(|key| self.sessions.remove(&key).map(|(_, handle)| handle))
            .collect()
    }

    /// Sends `Close` to every session and empties the registry.
    ///
    /// Uses `try_send` so one stalled client cannot hold up shutdown.
    pub fn close_all(&self) -> usize {
        let handles = self.drain_all();
        for handle in &handles {
            let _ = handle.try_send(OutboundMessage::Close);
        }
        handles.len()
    }
}

/// Removes a session from the registry when its event stream is dropped.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionGuard {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, id: SessionId) -> Self {
        Self { registry, id }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.remove(self.id).is_some() {
            debug!(session_id = %self.id, "sse session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_channel_config() -> SessionConfig {
        SessionConfig {
            outbound_channel_capacity: 2,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn session_id_is_simple_hex_and_parses_back() {
        let id = SessionId::new();
        let rendered = id.to_string();
        assert_eq!(rendered.len(), 32);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rendered.parse::<SessionId>().unwrap(), id);
        assert!("not-a-session".parse::<SessionId>().is_err());
    }

    #[test]
    fn register_get_remove() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = registry.register(&SessionConfig::default());
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get(handle.id).unwrap().id, handle.id);

        assert!(registry.remove(handle.id).is_some());
        assert!(registry.remove(handle.id).is_none());
        assert!(registry.get(handle.id).is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn try_send_respects_capacity() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = registry.register(&small_channel_config());

        assert!(handle.try_send(OutboundMessage::Event("1".to_string())));
        assert!(handle.try_send(OutboundMessage::Event("2".to_string())));
        assert!(!handle.try_send(OutboundMessage::Event("3".to_string())));
    }

    #[test]
    fn dropped_receiver_means_disconnected() {
        let registry = SessionRegistry::new();
        let (handle, rx) = registry.register(&SessionConfig::default());
        assert!(handle.is_connected());
        drop(rx);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn send_timeout_reports_disconnect() {
        let registry = SessionRegistry::new();
        let (handle, rx) = registry.register(&SessionConfig::default());
        drop(rx);
        let result = handle
            .send_timeout(OutboundMessage::Event("x".to_string()), Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(SendError::Disconnected));
    }

    #[tokio::test]
    async fn send_timeout_reports_full_channel() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = registry.register(&small_channel_config());
        assert!(handle.try_send(OutboundMessage::Event("1".to_string())));
        assert!(handle.try_send(OutboundMessage::Event("2".to_string())));
        let result = handle
            .send_timeout(
                OutboundMessage::Event("3".to_string()),
                Duration::from_millis(20),
            )
            .await;
        assert_eq!(result, Err(SendError::Timeout));
    }

    #[tokio::test]
    async fn close_all_sends_close_and_empties_registry() {
        let registry = SessionRegistry::new();
        let (_h1, mut rx1) = registry.register(&SessionConfig::default());
        let (_h2, mut rx2) = registry.register(&SessionConfig::default());

        assert_eq!(registry.close_all(), 2);
        assert_eq!(registry.count(), 0);
        assert_eq!(rx1.recv().await, Some(OutboundMessage::Close));
        assert_eq!(rx2.recv().await, Some(OutboundMessage::Close));
    }

    #[test]
    fn guard_removes_session_on_drop() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, _rx) = registry.register(&SessionConfig::default());
        let guard = SessionGuard::new(Arc::clone(&registry), handle.id);
        assert_eq!(registry.count(), 1);
        drop(guard);
        assert_eq!(registry.count(), 0);
    }
}
