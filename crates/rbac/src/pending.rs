use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::user_context::UserContext;

/// `{id, original_topic, payload_bytes, user_context, correlation_id,
/// received_at, expires_at}`. Created when the interceptor routes a
/// protected message, removed on verdict, expiry, eviction, or shutdown.
#[derive(Debug, Clone)]
pub struct PendingValidation {
    pub correlation_id: Uuid,
    pub original_topic: String,
    pub payload_bytes: Vec<u8>,
    pub user_context: UserContext,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of [`PendingTable::insert`]: whether an older entry had to be
/// dropped to make room under `max_queue_size`.
pub enum InsertOutcome {
    Inserted,
    InsertedWithEviction(PendingValidation),
}

/// Bounded, drop-oldest queue of validations awaiting an authorization
/// verdict. Guarded by a single `tokio::sync::Mutex` in
/// [`crate::interceptor::RbacInterceptor`]; no bus I/O ever happens while
/// holding it, the same discipline the teacher's `ZmqRequestClient` applies
/// to its `pending: Mutex<HashMap<Uuid, PendingReply>>`.
///
/// `order` tracks insertion order so the oldest entry can be found in O(1)
/// amortized; ids already removed (by verdict or sweep) are skipped lazily
/// rather than eagerly purged from the middle of the deque.
pub struct PendingTable {
    max_queue_size: usize,
    entries: HashMap<Uuid, PendingValidation>,
    order: VecDeque<Uuid>,
}

impl PendingTable {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            max_queue_size,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `entry`, evicting the oldest live entry first if the table is
    /// already at `max_queue_size`.
    pub fn insert(&mut self, entry: PendingValidation) -> InsertOutcome {
        let evicted = if self.entries.len() >= self.max_queue_size {
            self.evict_oldest()
        } else {
            None
        };

        self.order.push_back(entry.correlation_id);
        self.entries.insert(entry.correlation_id, entry);

        match evicted {
            Some(evicted) => InsertOutcome::InsertedWithEviction(evicted),
            None => InsertOutcome::Inserted,
        }
    }

    fn evict_oldest(&mut self) -> Option<PendingValidation> {
        while let Some(id) = self.order.pop_front() {
            if let Some(entry) = self.entries.remove(&id) {
                return Some(entry);
            }
        }
        None
    }

    /// Remove and return the entry for `correlation_id`, if still pending.
    pub fn remove(&mut self, correlation_id: Uuid) -> Option<PendingValidation> {
        self.entries.remove(&correlation_id)
    }

    /// Remove and return every entry with `expires_at < now`.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<PendingValidation> {
        let expired_ids: Vec<Uuid> = self
            .entries
            .values()
            .filter(|e| e.expires_at < now)
            .map(|e| e.correlation_id)
            .collect();

        expired_ids.iter().filter_map(|id| self.entries.remove(id)).collect()
    }

    /// Drain every remaining entry, for shutdown-time `shutdown_aborted`
    /// flushing.
    pub fn drain_all(&mut self) -> Vec<PendingValidation> {
        self.order.clear();
        self.entries.drain().map(|(_, v)| v).collect()
    }
}
