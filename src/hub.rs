use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};

use crate::codec;
use crate::store;

/// Depth of each connection's outbound frame queue. A full queue drops the
/// frame rather than blocking the producer.
pub const SEND_QUEUE_DEPTH: usize = 256;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Server→client frame. Binary fields travel as base64; `data` is base64 of
/// JSON bytes (presence, typing and signaling payloads).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub from: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub to: Option<i64>,
    #[serde(
        with = "codec::b64_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub content: Option<Vec<u8>>,
    #[serde(
        with = "codec::b64_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub nonce: Option<Vec<u8>>,
    #[serde(
        with = "codec::b64_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub data: Option<Vec<u8>>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: i64,
    pub username: String,
    pub online: bool,
}

/// A live registered connection. `conn_id` is a process-local monotonic id;
/// lifecycle events are reconciled against it so a stale socket closing
/// after a reconnect cannot mark the user offline.
#[derive(Debug, Clone)]
pub struct Client {
    pub user_id: i64,
    pub username: String,
    pub conn_id: u64,
    sender: mpsc::Sender<String>,
}

impl Client {
    pub fn new(user_id: i64, username: String) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(SEND_QUEUE_DEPTH);
        let client = Client {
            user_id,
            username,
            conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        };
        (client, receiver)
    }
}

enum HubEvent {
    Register(Client, oneshot::Sender<()>),
    Unregister {
        user_id: i64,
        conn_id: u64,
        done: oneshot::Sender<()>,
    },
}

/// Process-wide registry of live connections, keyed by user id. Reads
/// (delivery, online checks) are concurrent; lifecycle transitions are
/// serialised through a single event-loop task.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    clients: DashMap<i64, Client>,
    events: mpsc::UnboundedSender<HubEvent>,
}

impl Hub {
    pub fn spawn(db: SqlitePool) -> Hub {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(HubInner {
            clients: DashMap::new(),
            events,
        });
        tokio::spawn(run_event_loop(inner.clone(), db, receiver));
        Hub { inner }
    }

    /// Hand a new connection to the event loop; resolves once the client is
    /// registered and its initial presence snapshot is queued.
    pub async fn register(&self, client: Client) {
        let (done, ack) = oneshot::channel();
        if self
            .inner
            .events
            .send(HubEvent::Register(client, done))
            .is_ok()
        {
            let _ = ack.await;
        }
    }

    /// Hand a connection teardown to the event loop. Idempotent: only the
    /// currently registered `(user_id, conn_id)` pair changes anything.
    pub async fn unregister(&self, user_id: i64, conn_id: u64) {
        let (done, ack) = oneshot::channel();
        if self
            .inner
            .events
            .send(HubEvent::Unregister {
                user_id,
                conn_id,
                done,
            })
            .is_ok()
        {
            let _ = ack.await;
        }
    }

    /// Deliver an envelope to one user. Non-blocking: absent receiver is
    /// silent, a full queue drops the frame with a log entry.
    pub fn send_message(&self, to: i64, mut envelope: Envelope) {
        envelope.to = Some(to);
        let Ok(frame) = serde_json::to_string(&envelope) else {
            return;
        };
        if let Some(client) = self.inner.clients.get(&to) {
            if let Err(mpsc::error::TrySendError::Full(_)) = client.sender.try_send(frame) {
                tracing::warn!(user_id = to, "failed to send message: send queue full");
            }
        }
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.inner.clients.contains_key(&user_id)
    }

    pub fn online_users(&self) -> Vec<i64> {
        self.inner.clients.iter().map(|entry| *entry.key()).collect()
    }
}

async fn run_event_loop(
    inner: Arc<HubInner>,
    db: SqlitePool,
    mut events: mpsc::UnboundedReceiver<HubEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Register(client, done) => {
                handle_register(&inner, &db, client).await;
                let _ = done.send(());
            }
            HubEvent::Unregister {
                user_id,
                conn_id,
                done,
            } => {
                handle_unregister(&inner, user_id, conn_id);
                let _ = done.send(());
            }
        }
    }
}

async fn handle_register(inner: &HubInner, db: &SqlitePool, client: Client) {
    // Evict any previous connection for this user (e.g. from a reconnect the
    // client hasn't learned is dead). Dropping its sender ends its writer.
    if let Some((_, stale)) = inner.clients.remove(&client.user_id) {
        tracing::info!(user_id = client.user_id, "closing stale connection");
        drop(stale);
    }

    // Give the newcomer a complete initial view of who is online.
    for entry in inner.clients.iter() {
        if entry.user_id == client.user_id {
            continue;
        }
        let frame = presence_frame(entry.user_id, &entry.username, true);
        let _ = client.sender.try_send(frame);
    }

    let user_id = client.user_id;
    let username = client.username.clone();
    inner.clients.insert(user_id, client);
    broadcast_presence(inner, user_id, &username, true);

    if let Err(err) = store::users::update_last_seen(db, user_id).await {
        tracing::warn!(user_id, error = %err, "failed to update last_seen");
    }
}

fn handle_unregister(inner: &HubInner, user_id: i64, conn_id: u64) {
    // Reconciliation: a stale socket closing after a successful reconnect
    // must not mark the user offline.
    if let Some((_, client)) = inner
        .clients
        .remove_if(&user_id, |_, current| current.conn_id == conn_id)
    {
        broadcast_presence(inner, user_id, &client.username, false);
    }
}

fn broadcast_presence(inner: &HubInner, user_id: i64, username: &str, online: bool) {
    let frame = presence_frame(user_id, username, online);
    for entry in inner.clients.iter() {
        if entry.sender.try_send(frame.clone()).is_err() {
            tracing::debug!(target_user = *entry.key(), "presence frame dropped");
        }
    }
}

fn presence_frame(user_id: i64, username: &str, online: bool) -> String {
    let payload = Presence {
        user_id,
        username: username.to_string(),
        online,
    };
    let envelope = Envelope {
        kind: "presence".to_string(),
        data: Some(serde_json::to_vec(&payload).unwrap_or_default()),
        timestamp: Utc::now().timestamp(),
        ..Default::default()
    };
    serde_json::to_string(&envelope).unwrap_or_default()
}
