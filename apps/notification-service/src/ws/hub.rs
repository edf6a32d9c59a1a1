//! Connection manager: indexes live WebSocket sessions by connection, user,
//! and organization, and fans frames out into per-session bounded queues.
//! Senders never touch the socket; each session's writer task drains its own
//! queue, so a slow client cannot stall anyone else.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use core_lib::events::NotificationView;

pub const DEFAULT_SEND_BUFFER: usize = 64;

/// Frame on the wire to the client: `{type, data}`.
#[derive(Debug, Clone, Serialize)]
pub struct WsFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl WsFrame {
    pub fn new(kind: &str, data: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
        }
    }

    pub fn notification_created(view: &NotificationView) -> Self {
        Self::new(
            "notification.created",
            serde_json::to_value(view).unwrap_or(serde_json::Value::Null),
        )
    }
}

#[derive(Debug)]
struct Session {
    user_id: Uuid,
    /// Organizations this session may subscribe to, fixed at handshake.
    allowed_orgs: HashSet<Uuid>,
    subscribed_orgs: HashSet<Uuid>,
    sender: mpsc::Sender<WsFrame>,
}

/// Shared, concurrency-safe session registry.
///
/// Lock discipline: a `by_user`/`by_org` guard is never held while touching
/// `by_conn`; membership sets are copied out first.
pub struct ConnectionHub {
    by_conn: DashMap<Uuid, Session>,
    by_user: DashMap<Uuid, HashSet<Uuid>>,
    by_org: DashMap<Uuid, HashSet<Uuid>>,
    send_buffer: usize,
}

impl ConnectionHub {
    pub fn new(send_buffer: usize) -> Self {
        Self {
            by_conn: DashMap::new(),
            by_user: DashMap::new(),
            by_org: DashMap::new(),
            send_buffer: send_buffer.max(1),
        }
    }

    /// Register a session and hand back the receiving end of its outbound
    /// queue for the writer task.
    pub fn register(
        &self,
        conn_id: Uuid,
        user_id: Uuid,
        allowed_orgs: HashSet<Uuid>,
    ) -> mpsc::Receiver<WsFrame> {
        let (sender, receiver) = mpsc::channel(self.send_buffer);
        self.by_conn.insert(
            conn_id,
            Session {
                user_id,
                allowed_orgs,
                subscribed_orgs: HashSet::new(),
                sender,
            },
        );
        self.by_user.entry(user_id).or_default().insert(conn_id);
        info!("Session {} registered for user {}.", conn_id, user_id);
        receiver
    }

    /// Subscribe a session to an organization channel. Unknown sessions and
    /// organizations outside the session's allowed set are ignored.
    pub fn subscribe(&self, conn_id: Uuid, org_id: Uuid) {
        let newly_added = match self.by_conn.get_mut(&conn_id) {
            Some(mut session) => {
                if !session.allowed_orgs.contains(&org_id) {
                    debug!(
                        "Session {} not allowed to subscribe to org {}; ignoring.",
                        conn_id, org_id
                    );
                    return;
                }
                session.subscribed_orgs.insert(org_id)
            }
            None => return,
        };
        if newly_added {
            self.by_org.entry(org_id).or_default().insert(conn_id);
            // The session may have been torn down between the two index
            // updates (e.g. by an overflow on another thread); undo so
            // by_org never outlives by_conn.
            if !self.by_conn.contains_key(&conn_id) {
                if let Some(mut conns) = self.by_org.get_mut(&org_id) {
                    conns.remove(&conn_id);
                }
                self.by_org.remove_if(&org_id, |_, conns| conns.is_empty());
            }
        }
    }

    pub fn unsubscribe(&self, conn_id: Uuid, org_id: Uuid) {
        let was_subscribed = match self.by_conn.get_mut(&conn_id) {
            Some(mut session) => session.subscribed_orgs.remove(&org_id),
            None => return,
        };
        if was_subscribed {
            if let Some(mut conns) = self.by_org.get_mut(&org_id) {
                conns.remove(&conn_id);
            }
            self.by_org.remove_if(&org_id, |_, conns| conns.is_empty());
        }
    }

    /// Remove a session from every index and close its outbound queue.
    pub fn remove(&self, conn_id: Uuid) {
        let Some((_, session)) = self.by_conn.remove(&conn_id) else {
            return;
        };
        if let Some(mut conns) = self.by_user.get_mut(&session.user_id) {
            conns.remove(&conn_id);
        }
        self.by_user
            .remove_if(&session.user_id, |_, conns| conns.is_empty());
        for org_id in &session.subscribed_orgs {
            if let Some(mut conns) = self.by_org.get_mut(org_id) {
                conns.remove(&conn_id);
            }
            self.by_org.remove_if(org_id, |_, conns| conns.is_empty());
        }
        info!("Session {} removed.", conn_id);
        // Dropping `session` here drops the sender, which ends the writer.
    }

    /// Enqueue a frame to every session of one user. Returns how many
    /// sessions accepted it.
    pub fn send_to_user(&self, user_id: Uuid, frame: &WsFrame) -> usize {
        let conn_ids: Vec<Uuid> = match self.by_user.get(&user_id) {
            Some(conns) => conns.iter().copied().collect(),
            None => return 0,
        };
        let mut sent = 0;
        for conn_id in conn_ids {
            if self.enqueue(conn_id, frame.clone()) {
                sent += 1;
            }
        }
        sent
    }

    /// Enqueue a frame to every session subscribed to an organization.
    pub fn broadcast_to_org(&self, org_id: Uuid, frame: &WsFrame) -> usize {
        let conn_ids: Vec<Uuid> = match self.by_org.get(&org_id) {
            Some(conns) => conns.iter().copied().collect(),
            None => return 0,
        };
        let mut sent = 0;
        for conn_id in conn_ids {
            if self.enqueue(conn_id, frame.clone()) {
                sent += 1;
            }
        }
        sent
    }

    /// A full queue means the client has stopped draining: the frame is
    /// dropped and the session torn down. Stored notifications are
    /// unaffected; the client resyncs on its next list fetch.
    fn enqueue(&self, conn_id: Uuid, frame: WsFrame) -> bool {
        let result = match self.by_conn.get(&conn_id) {
            Some(session) => session.sender.try_send(frame),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Session {} outbound queue full; dropping frame and closing session.",
                    conn_id
                );
                self.remove(conn_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.remove(conn_id);
                false
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.by_conn.len()
    }

    pub fn user_session_count(&self, user_id: Uuid) -> usize {
        self.by_user.get(&user_id).map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::Arc;

    fn frame() -> WsFrame {
        WsFrame::new("notification.created", serde_json::json!({"n": 1}))
    }

    /// The three indices must agree for every surviving session.
    fn assert_consistent(hub: &ConnectionHub) {
        for entry in hub.by_conn.iter() {
            let conn_id = *entry.key();
            let session = entry.value();
            let in_user = hub
                .by_user
                .get(&session.user_id)
                .map(|c| c.contains(&conn_id))
                .unwrap_or(false);
            assert!(in_user, "conn {} missing from by_user", conn_id);
            for org in &session.subscribed_orgs {
                let in_org = hub
                    .by_org
                    .get(org)
                    .map(|c| c.contains(&conn_id))
                    .unwrap_or(false);
                assert!(in_org, "conn {} missing from by_org[{}]", conn_id, org);
            }
        }
        for entry in hub.by_user.iter() {
            for conn_id in entry.value() {
                assert!(
                    hub.by_conn.contains_key(conn_id),
                    "by_user holds dead conn {}",
                    conn_id
                );
            }
        }
        for entry in hub.by_org.iter() {
            let org = *entry.key();
            for conn_id in entry.value() {
                let session = hub.by_conn.get(conn_id).expect("by_org holds dead conn");
                assert!(
                    session.subscribed_orgs.contains(&org),
                    "by_org[{}] holds unsubscribed conn {}",
                    org,
                    conn_id
                );
            }
        }
    }

    #[test]
    fn register_subscribe_remove_scrubs_all_indices() {
        let hub = ConnectionHub::default();
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let conn = Uuid::new_v4();

        let _rx = hub.register(conn, user, HashSet::from([org]));
        hub.subscribe(conn, org);
        assert_eq!(hub.session_count(), 1);
        assert_consistent(&hub);

        hub.remove(conn);
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.user_session_count(user), 0);
        assert!(hub.by_org.get(&org).is_none());
    }

    #[test]
    fn subscribe_outside_allowed_set_is_ignored() {
        let hub = ConnectionHub::default();
        let conn = Uuid::new_v4();
        let _rx = hub.register(conn, Uuid::new_v4(), HashSet::new());

        let org = Uuid::new_v4();
        hub.subscribe(conn, org);
        assert!(hub.by_org.get(&org).is_none());
        assert_eq!(hub.broadcast_to_org(org, &frame()), 0);
    }

    #[test]
    fn resubscribe_is_idempotent() {
        let hub = ConnectionHub::default();
        let conn = Uuid::new_v4();
        let org = Uuid::new_v4();
        let _rx = hub.register(conn, Uuid::new_v4(), HashSet::from([org]));

        hub.subscribe(conn, org);
        hub.unsubscribe(conn, org);
        hub.subscribe(conn, org);
        assert_consistent(&hub);
        assert_eq!(hub.broadcast_to_org(org, &frame()), 1);
    }

    #[tokio::test]
    async fn multi_session_user_gets_one_frame_per_session() {
        let hub = ConnectionHub::default();
        let user = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let mut rx1 = hub.register(s1, user, HashSet::new());
        let mut rx2 = hub.register(s2, user, HashSet::new());

        assert_eq!(hub.send_to_user(user, &frame()), 2);

        let f1 = rx1.try_recv().expect("session 1 frame");
        let f2 = rx2.try_recv().expect("session 2 frame");
        assert_eq!(f1.kind, "notification.created");
        assert_eq!(f2.kind, "notification.created");
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_frame_and_closes_session() {
        let hub = ConnectionHub::new(2);
        let user = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let mut rx = hub.register(conn, user, HashSet::new());

        assert_eq!(hub.send_to_user(user, &frame()), 1);
        assert_eq!(hub.send_to_user(user, &frame()), 1);
        // Third frame overflows: dropped, session removed.
        assert_eq!(hub.send_to_user(user, &frame()), 0);
        assert_eq!(hub.session_count(), 0);
        assert_consistent(&hub);

        // The two buffered frames are still drainable, then the queue ends.
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn random_schedules_keep_indices_consistent() {
        let mut rng = rand::rng();
        let hub = ConnectionHub::default();
        let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let orgs: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut live: Vec<Uuid> = Vec::new();
        let mut receivers = Vec::new();

        for _ in 0..2_000 {
            match rng.random_range(0..5) {
                0 => {
                    let conn = Uuid::new_v4();
                    let user = users[rng.random_range(0..users.len())];
                    let allowed: HashSet<Uuid> = orgs
                        .iter()
                        .filter(|_| rng.random_bool(0.7))
                        .copied()
                        .collect();
                    receivers.push(hub.register(conn, user, allowed));
                    live.push(conn);
                }
                1 if !live.is_empty() => {
                    let conn = live[rng.random_range(0..live.len())];
                    hub.subscribe(conn, orgs[rng.random_range(0..orgs.len())]);
                }
                2 if !live.is_empty() => {
                    let conn = live[rng.random_range(0..live.len())];
                    hub.unsubscribe(conn, orgs[rng.random_range(0..orgs.len())]);
                }
                3 if !live.is_empty() => {
                    let conn = live.swap_remove(rng.random_range(0..live.len()));
                    hub.remove(conn);
                }
                _ => {
                    hub.broadcast_to_org(orgs[rng.random_range(0..orgs.len())], &frame());
                }
            }
        }
        assert_consistent(&hub);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ops_keep_indices_consistent() {
        let hub = Arc::new(ConnectionHub::default());
        let org = Uuid::new_v4();
        let mut handles = Vec::new();

        for _ in 0..8 {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let conn = Uuid::new_v4();
                    let user = Uuid::new_v4();
                    let _rx = hub.register(conn, user, HashSet::from([org]));
                    hub.subscribe(conn, org);
                    hub.broadcast_to_org(org, &frame());
                    hub.unsubscribe(conn, org);
                    hub.subscribe(conn, org);
                    hub.remove(conn);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(hub.session_count(), 0);
        assert_consistent(&hub);
    }
}
