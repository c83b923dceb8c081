use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use presence::PlayerId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::PushMessage;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

pub type PushTx = mpsc::Sender<PushMessage>;
pub type PushRx = mpsc::Receiver<PushMessage>;

/// Identifies one registered connection. Dropping it does nothing; pass it
/// back to [`PushHub::unregister`] when the connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushHandle {
    pub player_id: PlayerId,
    pub conn_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Queue full; the message was discarded.
    Dropped,
    /// Player has no live connection.
    NoSubscriber,
}

struct Writer {
    conn_id: u64,
    tx: PushTx,
}

/// Routes push messages to per-player bounded write queues.
///
/// Sends never block: a full queue drops the message with a warning. One
/// connection per player; a newer registration replaces the older one.
pub struct PushHub {
    capacity: usize,
    next_conn_id: AtomicU64,
    writers: Mutex<HashMap<PlayerId, Writer>>,
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_conn_id: AtomicU64::new(1),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn register(&self, player_id: PlayerId) -> (PushHandle, PushRx) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut writers = self.lock();
        if writers.insert(player_id, Writer { conn_id, tx }).is_some() {
            tracing::debug!(player_id, conn_id, "push hub: replaced older connection");
        } else {
            tracing::debug!(player_id, conn_id, "push hub: connection registered");
        }
        (PushHandle { player_id, conn_id }, rx)
    }

    /// Remove the writer if it still belongs to `handle`. Returns false when a
    /// newer connection has taken over.
    pub fn unregister(&self, handle: &PushHandle) -> bool {
        let mut writers = self.lock();
        match writers.get(&handle.player_id) {
            Some(w) if w.conn_id == handle.conn_id => {
                writers.remove(&handle.player_id);
                tracing::debug!(player_id = handle.player_id, conn_id = handle.conn_id, "push hub: connection unregistered");
                true
            }
            _ => false,
        }
    }

    pub fn is_connected(&self, player_id: PlayerId) -> bool {
        self.lock().contains_key(&player_id)
    }

    pub fn connected_count(&self) -> usize {
        self.lock().len()
    }

    pub fn send(&self, player_id: PlayerId, msg: PushMessage) -> SendOutcome {
        let mut writers = self.lock();
        let Some(writer) = writers.get(&player_id) else {
            return SendOutcome::NoSubscriber;
        };
        match writer.tx.try_send(msg) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(
                    player_id,
                    kind = msg.kind(),
                    capacity = self.capacity,
                    "push queue full, dropping message"
                );
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(player_id, "push hub: write channel closed");
                writers.remove(&player_id);
                SendOutcome::NoSubscriber
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PlayerId, Writer>> {
        // The map holds plain channel handles; a panic mid-insert cannot
        // leave it inconsistent.
        self.writers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
