//! Viewer connections and their session subscriptions.
//!
//! The hub only holds lookups (connection → binding, session → viewers).
//! It never touches session state.

use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    common::types::{ChannelId, GuildId, UserId},
    protocol::OutgoingMessage,
};

pub type ConnectionId = Uuid;

/// Per-viewer outbox drained by the socket task.
pub type Outbox = flume::Sender<Message>;

/// Frames a viewer may fall behind by before it is evicted.
pub const OUTBOX_CAPACITY: usize = 64;

pub fn outbox() -> (Outbox, flume::Receiver<Message>) {
    flume::bounded(OUTBOX_CAPACITY)
}

/// What an authenticated connection is allowed to act as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub user_id: Option<UserId>,
    pub guild_id: Option<GuildId>,
    /// `None` for a native handshake that found no session.
    pub session: Option<ChannelId>,
}

struct Viewer {
    outbox: Outbox,
    binding: Option<Binding>,
}

#[derive(Default)]
pub struct SubscriberHub {
    viewers: DashMap<ConnectionId, Viewer>,
    subscribers: DashMap<ChannelId, HashSet<ConnectionId>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a freshly accepted, unauthenticated connection.
    pub fn register(&self, outbox: Outbox) -> ConnectionId {
        let id = Uuid::new_v4();
        self.viewers.insert(id, Viewer { outbox, binding: None });
        id
    }

    /// Binds `conn` to a session (or to none) and subscribes it to that
    /// session's broadcasts. Rebinding moves the subscription.
    pub fn bind(&self, conn: ConnectionId, binding: Binding) -> bool {
        let previous = {
            let Some(mut viewer) = self.viewers.get_mut(&conn) else {
                return false;
            };
            viewer.binding.replace(binding.clone())
        };

        if let Some(old) = previous.and_then(|b| b.session) {
            self.unsubscribe(old, conn);
        }
        if let Some(session) = binding.session {
            self.subscribers.entry(session).or_default().insert(conn);
        }
        true
    }

    pub fn binding(&self, conn: ConnectionId) -> Option<Binding> {
        self.viewers.get(&conn).and_then(|v| v.binding.clone())
    }

    pub fn is_authenticated(&self, conn: ConnectionId) -> bool {
        self.viewers.get(&conn).is_some_and(|v| v.binding.is_some())
    }

    pub fn unregister(&self, conn: ConnectionId) {
        if let Some((_, viewer)) = self.viewers.remove(&conn) {
            if let Some(session) = viewer.binding.and_then(|b| b.session) {
                self.unsubscribe(session, conn);
            }
        }
    }

    /// Sends directly to one connection. A dead or full outbox evicts it.
    pub fn send_to(&self, conn: ConnectionId, msg: &OutgoingMessage) -> bool {
        let Some(json) = msg.to_json() else {
            return false;
        };
        let outbox = match self.viewers.get(&conn) {
            Some(v) => v.outbox.clone(),
            None => return false,
        };
        if let Err(e) = outbox.try_send(Message::Text(json.into())) {
            debug!("evicting viewer {}: {}", conn, e);
            self.unregister(conn);
            return false;
        }
        true
    }

    /// Sends one message to every subscriber of `session`. Connections whose
    /// outbox is gone or full are evicted; the rest still receive it. Returns the
    /// number of deliveries.
    pub fn broadcast(&self, session: ChannelId, msg: &OutgoingMessage) -> usize {
        let Some(json) = msg.to_json() else {
            warn!("[{}] dropping unserializable broadcast", session);
            return 0;
        };
        let frame = Message::Text(json.into());

        let targets: Vec<(ConnectionId, Outbox)> = self
            .subscribers
            .get(&session)
            .map(|set| {
                set.iter()
                    .filter_map(|id| self.viewers.get(id).map(|v| (*id, v.outbox.clone())))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, outbox) in targets {
            match outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!("[{}] evicting viewer {}: {}", session, id, e);
                    self.unregister(id);
                }
            }
        }
        delivered
    }

    /// Drops every subscription to `session`, leaving its viewers connected
    /// but bound to no session.
    pub fn unbind_session(&self, session: ChannelId) {
        let Some((_, ids)) = self.subscribers.remove(&session) else {
            return;
        };
        for id in ids {
            if let Some(mut viewer) = self.viewers.get_mut(&id) {
                if let Some(binding) = viewer.binding.as_mut() {
                    binding.session = None;
                }
            }
        }
    }

    pub fn subscriber_count(&self, session: ChannelId) -> usize {
        self.subscribers.get(&session).map(|s| s.len()).unwrap_or(0)
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    fn unsubscribe(&self, session: ChannelId, conn: ConnectionId) {
        let emptied = match self.subscribers.get_mut(&session) {
            Some(mut set) => {
                set.remove(&conn);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            self.subscribers.remove_if(&session, |_, set| set.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AckStatus;

    fn bound(hub: &SubscriberHub, session: u64) -> (ConnectionId, flume::Receiver<Message>) {
        let (tx, rx) = outbox();
        let id = hub.register(tx);
        hub.bind(
            id,
            Binding {
                user_id: Some(UserId(1)),
                guild_id: Some(GuildId(1)),
                session: Some(ChannelId(session)),
            },
        );
        (id, rx)
    }

    fn text(msg: Message) -> String {
        match msg {
            Message::Text(t) => t.as_str().to_string(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_broken_socket_evicts_only_itself() {
        let hub = SubscriberHub::new();
        let (_a, rx_a) = bound(&hub, 5);
        let (b, rx_b) = bound(&hub, 5);
        let (_c, rx_c) = bound(&hub, 5);
        drop(rx_b);

        let msg = OutgoingMessage::ack("skip", AckStatus::Ok, None);
        assert_eq!(hub.broadcast(ChannelId(5), &msg), 2);
        assert_eq!(hub.subscriber_count(ChannelId(5)), 2);
        assert!(hub.binding(b).is_none());

        assert!(text(rx_a.try_recv().unwrap()).contains("command_ack"));
        assert!(text(rx_c.try_recv().unwrap()).contains("command_ack"));
    }

    #[test]
    fn test_stalled_viewer_is_evicted() {
        let hub = SubscriberHub::new();
        let (stalled, _rx_stalled) = bound(&hub, 5);
        let (_live, rx_live) = bound(&hub, 5);

        let msg = OutgoingMessage::ack("skip", AckStatus::Ok, None);
        for _ in 0..OUTBOX_CAPACITY {
            assert_eq!(hub.broadcast(ChannelId(5), &msg), 2);
            rx_live.try_recv().unwrap();
        }
        assert_eq!(hub.broadcast(ChannelId(5), &msg), 1);
        assert!(hub.binding(stalled).is_none());
        assert_eq!(hub.subscriber_count(ChannelId(5)), 1);
        assert!(!hub.send_to(stalled, &msg));
    }

    #[test]
    fn test_broadcast_is_scoped_to_session() {
        let hub = SubscriberHub::new();
        let (_a, rx_a) = bound(&hub, 5);
        let (_b, rx_b) = bound(&hub, 6);

        hub.broadcast(ChannelId(6), &OutgoingMessage::AuthFailed { reason: "x".into() });
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_rebind_moves_subscription() {
        let hub = SubscriberHub::new();
        let (a, _rx) = bound(&hub, 5);
        hub.bind(
            a,
            Binding {
                user_id: Some(UserId(1)),
                guild_id: Some(GuildId(1)),
                session: Some(ChannelId(6)),
            },
        );
        assert_eq!(hub.subscriber_count(ChannelId(5)), 0);
        assert_eq!(hub.subscriber_count(ChannelId(6)), 1);
    }

    #[test]
    fn test_unbind_session_keeps_viewers_connected() {
        let hub = SubscriberHub::new();
        let (a, _rx) = bound(&hub, 5);
        hub.unbind_session(ChannelId(5));
        assert_eq!(hub.subscriber_count(ChannelId(5)), 0);
        assert_eq!(hub.binding(a).map(|b| b.session), Some(None));
        assert!(hub.is_authenticated(a));
    }

    #[test]
    fn test_unregister_cleans_up() {
        let hub = SubscriberHub::new();
        let (a, _rx) = bound(&hub, 5);
        hub.unregister(a);
        assert_eq!(hub.viewer_count(), 0);
        assert_eq!(hub.subscriber_count(ChannelId(5)), 0);
        assert!(!hub.send_to(a, &OutgoingMessage::AuthFailed { reason: "x".into() }));
    }
}
