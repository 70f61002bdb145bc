//! Event Bus
//!
//! Owns the subscription topology of live connections and fans events out
//! to them.
//!
//! Topology, all keyed by ids:
//!
//! - `channels`: channel_id -> subscribed user ids
//! - `memberships`: user_id -> channel ids the user belongs to
//! - `listeners`: user_id -> identified connections of the user
//!
//! A user is present in `memberships` and in `channels` only while it has at
//! least one identified connection. The topology is mutated under a write
//! lock by `add_listener`, `remove_listener` and the channel subscription
//! calls. `emit` snapshots recipients under a read lock before delivering.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use super::connection::Connection;
use super::messages::CloseCode;
use crate::domain::{Event, EventScope, UserStore};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeError;

/// Gateway errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Event bus is closing")]
    Closing,

    #[error("Connection is not identified")]
    NotIdentified,

    #[error("Connection id allocation failed: {0}")]
    Allocation(#[from] SnowflakeError),

    #[error(transparent)]
    Store(#[from] AppError),
}

#[derive(Debug, Default)]
struct Topology {
    channels: HashMap<i64, HashSet<i64>>,
    memberships: HashMap<i64, HashSet<i64>>,
    listeners: HashMap<i64, Vec<Arc<Connection>>>,
}

impl Topology {
    /// Remove `user_id` from a channel, dropping the channel once empty.
    fn evict(&mut self, channel_id: i64, user_id: i64) {
        if let Some(subscribers) = self.channels.get_mut(&channel_id) {
            subscribers.remove(&user_id);
            if subscribers.is_empty() {
                self.channels.remove(&channel_id);
            }
        }
    }

    fn connections_of<'a>(&self, users: impl IntoIterator<Item = &'a i64>) -> Vec<Arc<Connection>> {
        users
            .into_iter()
            .filter_map(|user_id| self.listeners.get(user_id))
            .flatten()
            .cloned()
            .collect()
    }

    /// Connections of every user sharing a channel in `channel_ids` with
    /// `user_id`, plus the user's own connections.
    fn contacts<'a>(
        &self,
        user_id: i64,
        channel_ids: impl IntoIterator<Item = &'a i64>,
    ) -> Vec<Arc<Connection>> {
        let mut users: HashSet<i64> = channel_ids
            .into_iter()
            .filter_map(|channel_id| self.channels.get(channel_id))
            .flatten()
            .copied()
            .collect();
        users.insert(user_id);
        self.connections_of(&users)
    }
}

/// Scoped fanout of events to live connections
pub struct EventBus {
    users: Arc<dyn UserStore>,
    /// Every attached socket, identified or not
    sessions: DashMap<u64, Arc<Connection>>,
    topology: RwLock<Topology>,
    closing: AtomicBool,
    shutdown_timeout: Duration,
}

impl EventBus {
    pub fn new(users: Arc<dyn UserStore>, shutdown_timeout: Duration) -> Self {
        Self {
            users,
            sessions: DashMap::new(),
            topology: RwLock::new(Topology::default()),
            closing: AtomicBool::new(false),
            shutdown_timeout,
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Track a freshly upgraded socket so that `close` reaches it.
    pub fn attach(&self, conn: &Arc<Connection>) -> Result<(), GatewayError> {
        if self.is_closing() {
            return Err(GatewayError::Closing);
        }
        self.sessions.insert(conn.id(), conn.clone());
        metrics::connection_opened();

        // `close` may have taken its snapshot before the insert
        if self.is_closing() {
            conn.close(CloseCode::Normal);
            return Err(GatewayError::Closing);
        }
        Ok(())
    }

    /// Forget a socket once its loops have ended.
    pub fn detach(&self, conn: &Connection) {
        if self.sessions.remove(&conn.id()).is_some() {
            metrics::connection_closed(conn.user_id().is_some());
        }
    }

    /// Register an identified connection and hydrate its user's memberships.
    pub async fn add_listener(&self, conn: &Arc<Connection>) -> Result<(), GatewayError> {
        if self.is_closing() {
            return Err(GatewayError::Closing);
        }
        let user_id = conn.user_id().ok_or(GatewayError::NotIdentified)?;
        let channel_ids: HashSet<i64> = self
            .users
            .get_channel_ids(user_id)
            .await?
            .into_iter()
            .collect();

        let mut topology = self.topology.write();
        if self.is_closing() {
            return Err(GatewayError::Closing);
        }
        if conn.is_closed() {
            // Its remove_listener already ran while memberships loaded
            tracing::debug!(connection_id = conn.id(), user_id, "Connection closed before registration");
            return Ok(());
        }

        if let Some(previous) = topology.memberships.insert(user_id, channel_ids.clone()) {
            for channel_id in previous.difference(&channel_ids) {
                topology.evict(*channel_id, user_id);
            }
        }
        for channel_id in &channel_ids {
            topology.channels.entry(*channel_id).or_default().insert(user_id);
        }

        let listeners = topology.listeners.entry(user_id).or_default();
        if !listeners.iter().any(|c| c.id() == conn.id()) {
            listeners.push(conn.clone());
        }

        tracing::debug!(
            connection_id = conn.id(),
            user_id,
            channels = channel_ids.len(),
            "Listener added"
        );
        Ok(())
    }

    /// Unregister a connection. Evicts its user entirely once the user has no
    /// connections left. No-op for anonymous or unknown connections.
    pub fn remove_listener(&self, conn: &Connection) {
        let Some(user_id) = conn.user_id() else {
            return;
        };

        let mut guard = self.topology.write();
        let topology = &mut *guard;
        let Some(listeners) = topology.listeners.get_mut(&user_id) else {
            return;
        };

        listeners.retain(|c| c.id() != conn.id());
        if !listeners.is_empty() {
            return;
        }

        topology.listeners.remove(&user_id);
        if let Some(channel_ids) = topology.memberships.remove(&user_id) {
            for channel_id in channel_ids {
                topology.evict(channel_id, user_id);
            }
        }

        tracing::debug!(user_id, "Last listener removed, user evicted");
    }

    /// Close a connection and unregister it.
    pub fn drop_connection(&self, conn: &Connection, code: CloseCode) {
        conn.close(code);
        self.remove_listener(conn);
    }

    /// Add a channel to a live user's memberships. Returns false if the user
    /// has no identified connection.
    pub fn subscribe_channel(&self, user_id: i64, channel_id: i64) -> bool {
        let mut guard = self.topology.write();
        let topology = &mut *guard;
        let Some(memberships) = topology.memberships.get_mut(&user_id) else {
            return false;
        };

        memberships.insert(channel_id);
        topology.channels.entry(channel_id).or_default().insert(user_id);
        true
    }

    /// Remove a channel from a live user's memberships. Returns false if the
    /// user was not subscribed.
    pub fn unsubscribe_channel(&self, user_id: i64, channel_id: i64) -> bool {
        let mut topology = self.topology.write();
        let removed = topology
            .memberships
            .get_mut(&user_id)
            .is_some_and(|memberships| memberships.remove(&channel_id));

        if removed {
            topology.evict(channel_id, user_id);
        }
        removed
    }

    /// Recipients for `scope`, `None` for an Outer event whose user has no
    /// live connection (memberships must come from the store).
    fn snapshot(&self, scope: EventScope) -> Option<Vec<Arc<Connection>>> {
        let topology = self.topology.read();
        match scope {
            EventScope::Local { channel_id } => Some(
                topology
                    .channels
                    .get(&channel_id)
                    .map(|users| topology.connections_of(users))
                    .unwrap_or_default(),
            ),
            EventScope::Outer { user_id } => topology
                .memberships
                .get(&user_id)
                .map(|channel_ids| topology.contacts(user_id, channel_ids)),
            EventScope::Global => Some(topology.listeners.values().flatten().cloned().collect()),
        }
    }

    /// Fan `event` out in the background. Recipients are resolved before
    /// this returns; the handle yields the number of successful deliveries.
    pub fn emit(self: &Arc<Self>, event: Event) -> JoinHandle<usize> {
        let scope = event.scope();
        metrics::record_event(scope.kind());

        let snapshot = if self.is_closing() {
            tracing::debug!(event = event.name(), "Bus is closing, event dropped");
            Some(Vec::new())
        } else {
            self.snapshot(scope)
        };

        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let recipients = match (snapshot, scope) {
                (Some(recipients), _) => recipients,
                (None, EventScope::Outer { user_id }) => match bus.offline_contacts(user_id).await {
                    Ok(recipients) => recipients,
                    Err(e) => {
                        tracing::error!(
                            event = event.name(),
                            user_id,
                            error = %e,
                            "Failed to resolve event recipients, event dropped"
                        );
                        return 0;
                    }
                },
                (None, _) => Vec::new(),
            };
            bus.deliver_all(&event, recipients)
        })
    }

    /// Contacts of a user with no live connection, from stored memberships.
    async fn offline_contacts(&self, user_id: i64) -> Result<Vec<Arc<Connection>>, AppError> {
        let channel_ids = self.users.get_channel_ids(user_id).await?;
        Ok(self.topology.read().contacts(user_id, &channel_ids))
    }

    fn deliver_all(&self, event: &Event, recipients: Vec<Arc<Connection>>) -> usize {
        let mut delivered = 0;
        for conn in recipients {
            match conn.deliver(event) {
                Ok(()) => {
                    metrics::record_delivery(true);
                    delivered += 1;
                }
                Err(e) => {
                    metrics::record_delivery(false);
                    tracing::warn!(
                        connection_id = conn.id(),
                        user_id = ?conn.user_id(),
                        event = event.name(),
                        error = %e,
                        "Delivery failed, dropping connection"
                    );
                    self.drop_connection(&conn, CloseCode::Normal);
                }
            }
        }

        tracing::trace!(event = event.name(), delivered, "Event delivered");
        delivered
    }

    /// Reject new listeners, close every socket with `code` and wait (bounded
    /// by the shutdown timeout) for their writers to flush.
    pub async fn close(&self, code: CloseCode) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let connections: Vec<Arc<Connection>> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        tracing::info!(connections = connections.len(), "Closing event bus");

        for conn in &connections {
            conn.close(code);
        }

        let drained = join_all(connections.iter().map(|conn| conn.drained()));
        if tokio::time::timeout(self.shutdown_timeout, drained).await.is_err() {
            tracing::warn!(
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "Timed out waiting for connections to flush"
            );
        }
    }

    /// Attached sockets, identified or not
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Identified connections
    pub fn listener_count(&self) -> usize {
        self.topology.read().listeners.values().map(Vec::len).sum()
    }

    pub fn is_user_online(&self, user_id: i64) -> bool {
        self.topology.read().listeners.contains_key(&user_id)
    }

    /// Users currently subscribed to `channel_id`
    pub fn channel_subscribers(&self, channel_id: i64) -> HashSet<i64> {
        self.topology
            .read()
            .channels
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of channels with at least one live subscriber
    pub fn channel_count(&self) -> usize {
        self.topology.read().channels.len()
    }

    /// Number of users with tracked memberships
    pub fn tracked_user_count(&self) -> usize {
        self.topology.read().memberships.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use mockall::predicate::eq;
    use serde_json::{json, Map};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::domain::MockUserStore;
    use crate::infrastructure::repositories::InMemoryUserStore;
    use crate::presentation::websocket::connection::{ConnectionState, Outbound};

    struct Harness {
        bus: Arc<EventBus>,
        users: Arc<InMemoryUserStore>,
        next_id: u64,
    }

    impl Harness {
        fn new() -> Self {
            let users = Arc::new(InMemoryUserStore::new());
            let bus = Arc::new(EventBus::new(users.clone(), Duration::from_millis(200)));
            Self {
                bus,
                users,
                next_id: 1,
            }
        }

        fn user(&self, user_id: i64, channel_ids: &[i64]) {
            self.users.insert_user(user_id, b"secret".as_slice(), channel_ids.to_vec());
        }

        async fn connect(&mut self, user_id: i64) -> (Arc<Connection>, UnboundedReceiver<Outbound>) {
            let (conn, rx) = Connection::new(self.next_id);
            self.next_id += 1;
            self.bus.attach(&conn).unwrap();
            conn.identify(user_id).unwrap();
            self.bus.add_listener(&conn).await.unwrap();
            (conn, rx)
        }
    }

    fn payload() -> Map<String, serde_json::Value> {
        let mut payload = Map::new();
        payload.insert("content".into(), json!("hello"));
        payload
    }

    fn dispatched(rx: &mut UnboundedReceiver<Outbound>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Frame(frame) = item {
                if let Some(name) = frame.t {
                    names.push(name);
                }
            }
        }
        names
    }

    #[tokio::test]
    async fn test_local_event_reaches_channel_subscribers_only() {
        let mut h = Harness::new();
        h.user(1, &[100]);
        h.user(2, &[100, 200]);
        h.user(3, &[200]);
        let (_c1, mut rx1) = h.connect(1).await;
        let (_c2, mut rx2) = h.connect(2).await;
        let (_c3, mut rx3) = h.connect(3).await;

        let delivered = h
            .bus
            .emit(Event::local("MESSAGE_CREATE", 100, payload()))
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(dispatched(&mut rx1), vec!["MESSAGE_CREATE"]);
        assert_eq!(dispatched(&mut rx2), vec!["MESSAGE_CREATE"]);
        assert!(dispatched(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn test_local_event_reaches_every_connection_of_a_user() {
        let mut h = Harness::new();
        h.user(1, &[100]);
        let (_a, mut rx_a) = h.connect(1).await;
        let (_b, mut rx_b) = h.connect(1).await;

        let delivered = h
            .bus
            .emit(Event::local("MESSAGE_CREATE", 100, payload()))
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(dispatched(&mut rx_a).len(), 1);
        assert_eq!(dispatched(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_outer_event_reaches_contacts() {
        let mut h = Harness::new();
        h.user(1, &[10, 20]);
        h.user(2, &[10]);
        h.user(3, &[20]);
        h.user(4, &[30]);
        h.user(5, &[10, 20]);
        let (_u1a, mut rx1a) = h.connect(1).await;
        let (_u1b, mut rx1b) = h.connect(1).await;
        let (_u2, mut rx2) = h.connect(2).await;
        let (_u3, mut rx3) = h.connect(3).await;
        let (_u4, mut rx4) = h.connect(4).await;
        let (_u5, mut rx5) = h.connect(5).await;

        let delivered = h
            .bus
            .emit(Event::outer("USER_UPDATE", 1, payload()))
            .await
            .unwrap();

        // Both of user 1's connections, users 2 and 3, and user 5 exactly once
        assert_eq!(delivered, 5);
        assert_eq!(dispatched(&mut rx1a).len(), 1);
        assert_eq!(dispatched(&mut rx1b).len(), 1);
        assert_eq!(dispatched(&mut rx2).len(), 1);
        assert_eq!(dispatched(&mut rx3).len(), 1);
        assert_eq!(dispatched(&mut rx5).len(), 1);
        assert!(dispatched(&mut rx4).is_empty());
    }

    #[tokio::test]
    async fn test_outer_event_for_offline_user_uses_stored_memberships() {
        let mut h = Harness::new();
        h.user(1, &[10]);
        h.user(2, &[10]);
        h.user(3, &[99]);
        let (_u2, mut rx2) = h.connect(2).await;
        let (_u3, mut rx3) = h.connect(3).await;

        let delivered = h
            .bus
            .emit(Event::outer("USER_UPDATE", 1, payload()))
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(dispatched(&mut rx2).len(), 1);
        assert!(dispatched(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn test_global_event_reaches_identified_connections_only() {
        let mut h = Harness::new();
        h.user(1, &[]);
        h.user(2, &[5]);
        let (_c1, mut rx1) = h.connect(1).await;
        let (_c2, mut rx2) = h.connect(2).await;

        let (anonymous, mut rx_anon) = Connection::new(999);
        h.bus.attach(&anonymous).unwrap();

        let delivered = h.bus.emit(Event::global("ANNOUNCE", payload())).await.unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(dispatched(&mut rx1).len(), 1);
        assert_eq!(dispatched(&mut rx2).len(), 1);
        assert!(dispatched(&mut rx_anon).is_empty());
        assert_eq!(h.bus.connection_count(), 3);
        assert_eq!(h.bus.listener_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_listener_leaves_no_orphans() {
        let mut h = Harness::new();
        h.user(1, &[1, 2, 3]);
        h.user(2, &[3]);
        let (_stay, _rx_stay) = h.connect(2).await;

        for _ in 0..50 {
            let (a, _rx_a) = h.connect(1).await;
            let (b, _rx_b) = h.connect(1).await;
            assert!(h.bus.is_user_online(1));

            h.bus.drop_connection(&a, CloseCode::Normal);
            assert!(h.bus.is_user_online(1));
            h.bus.drop_connection(&b, CloseCode::Normal);
            h.bus.detach(&a);
            h.bus.detach(&b);
        }

        assert!(!h.bus.is_user_online(1));
        assert_eq!(h.bus.tracked_user_count(), 1);
        assert_eq!(h.bus.channel_count(), 1);
        assert_eq!(h.bus.channel_subscribers(3), HashSet::from([2]));
        assert!(h.bus.channel_subscribers(1).is_empty());
        assert_eq!(h.bus.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_listener_is_idempotent() {
        let mut h = Harness::new();
        h.user(1, &[1]);
        let (conn, _rx) = h.connect(1).await;

        h.bus.remove_listener(&conn);
        h.bus.remove_listener(&conn);

        let (anonymous, _rx_anon) = Connection::new(50);
        h.bus.remove_listener(&anonymous);

        assert_eq!(h.bus.listener_count(), 0);
        assert_eq!(h.bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_add_listener_refreshes_memberships() {
        let mut h = Harness::new();
        h.user(1, &[1, 2]);
        let (_first, _rx1) = h.connect(1).await;

        h.users.set_channels(1, vec![2, 3]);
        let (_second, _rx2) = h.connect(1).await;

        assert!(h.bus.channel_subscribers(1).is_empty());
        assert_eq!(h.bus.channel_subscribers(2), HashSet::from([1]));
        assert_eq!(h.bus.channel_subscribers(3), HashSet::from([1]));
        assert_eq!(h.bus.listener_count(), 2);
    }

    #[tokio::test]
    async fn test_add_listener_requires_identified_connection() {
        let h = Harness::new();
        let (conn, _rx) = Connection::new(1);

        assert!(matches!(
            h.bus.add_listener(&conn).await,
            Err(GatewayError::NotIdentified)
        ));
    }

    #[tokio::test]
    async fn test_add_listener_skips_closed_connection() {
        let h = Harness::new();
        h.user(1, &[1]);
        let (conn, _rx) = Connection::new(1);
        conn.identify(1).unwrap();
        conn.close(CloseCode::Normal);

        h.bus.add_listener(&conn).await.unwrap();

        assert!(!h.bus.is_user_online(1));
        assert_eq!(h.bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_add_listener_propagates_store_failure() {
        let mut users = MockUserStore::new();
        users
            .expect_get_channel_ids()
            .with(eq(1))
            .times(1)
            .returning(|_| Err(AppError::Unavailable("store down".into())));
        let bus = EventBus::new(Arc::new(users), Duration::from_millis(10));

        let (conn, _rx) = Connection::new(1);
        conn.identify(1).unwrap();

        assert!(matches!(
            bus.add_listener(&conn).await,
            Err(GatewayError::Store(AppError::Unavailable(_)))
        ));
        assert!(!bus.is_user_online(1));
    }

    #[tokio::test]
    async fn test_channel_subscription_updates() {
        let mut h = Harness::new();
        h.user(1, &[1]);
        let (_conn, mut rx) = h.connect(1).await;

        assert!(h.bus.subscribe_channel(1, 7));
        assert!(!h.bus.subscribe_channel(2, 7));
        assert_eq!(h.bus.emit(Event::local("X", 7, payload())).await.unwrap(), 1);

        assert!(h.bus.unsubscribe_channel(1, 7));
        assert!(!h.bus.unsubscribe_channel(1, 7));
        assert_eq!(h.bus.emit(Event::local("X", 7, payload())).await.unwrap(), 0);
        assert_eq!(dispatched(&mut rx).len(), 1);
        assert!(h.bus.channel_subscribers(7).is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_drops_connection() {
        let mut h = Harness::new();
        h.user(1, &[1]);
        h.user(2, &[1]);
        let (dead, dead_rx) = h.connect(1).await;
        let (_alive, mut alive_rx) = h.connect(2).await;
        drop(dead_rx);

        let delivered = h.bus.emit(Event::local("X", 1, payload())).await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(dead.state(), ConnectionState::Closed);
        assert!(!h.bus.is_user_online(1));
        assert_eq!(h.bus.channel_subscribers(1), HashSet::from([2]));
        assert_eq!(dispatched(&mut alive_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_close_shuts_every_socket() {
        let mut h = Harness::new();
        h.user(1, &[1]);
        let (identified, rx1) = h.connect(1).await;
        let (anonymous, rx2) = Connection::new(500);
        h.bus.attach(&anonymous).unwrap();

        // Writers that stop after the close frame
        let mut writers = Vec::new();
        for mut rx in [rx1, rx2] {
            writers.push(tokio::spawn(async move {
                let mut last = None;
                while let Some(item) = rx.recv().await {
                    let stop = matches!(item, Outbound::Close(_));
                    last = Some(item);
                    if stop {
                        break;
                    }
                }
                last
            }));
        }

        h.bus.close(CloseCode::Normal).await;

        assert!(h.bus.is_closing());
        assert!(identified.is_closed());
        assert!(anonymous.is_closed());
        for writer in writers {
            assert_eq!(writer.await.unwrap(), Some(Outbound::Close(CloseCode::Normal)));
        }

        h.user(2, &[1]);
        let (late, _rx) = Connection::new(900);
        assert!(matches!(h.bus.attach(&late), Err(GatewayError::Closing)));
        late.identify(2).unwrap();
        assert!(matches!(h.bus.add_listener(&late).await, Err(GatewayError::Closing)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_after_timeout() {
        let mut h = Harness::new();
        h.user(1, &[1]);
        // Receiver kept alive and never drained
        let (_conn, _rx) = h.connect(1).await;

        let started = tokio::time::Instant::now();
        h.bus.close(CloseCode::Normal).await;

        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_emit_while_closing_delivers_nothing() {
        let mut h = Harness::new();
        h.user(1, &[1]);
        let (_conn, rx) = h.connect(1).await;
        drop(rx);

        h.bus.close(CloseCode::Normal).await;

        let delivered = h.bus.emit(Event::global("X", payload())).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_concurrent_emits_do_not_corrupt_topology() {
        let mut h = Harness::new();
        for user_id in 1..=20 {
            h.user(user_id, &[1, 2]);
        }

        let mut receivers = BTreeMap::new();
        let mut handles = Vec::new();
        for user_id in 1..=20 {
            let (conn, rx) = h.connect(user_id).await;
            receivers.insert(user_id, (conn, rx));
            handles.push(h.bus.emit(Event::local("X", 1, payload())));
        }
        for (_, (conn, _)) in receivers.iter().filter(|(user_id, _)| **user_id % 2 == 0) {
            h.bus.drop_connection(conn, CloseCode::Normal);
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(h.bus.listener_count(), 10);
        assert_eq!(h.bus.channel_subscribers(1).len(), 10);
    }
}
