//! In-memory session store with a watch bus.
//!
//! Holds one entry per live NETCONF session, keyed by session id, and fans
//! out every committed mutation to registered watchers in commit order. All
//! public operations are linearized under a single exclusive lock; watcher
//! sinks are bounded so a slow subscriber drops events instead of blocking
//! the mutator.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Store errors surfaced to callers; never fatal to a connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("the entry does not exist")]
    NotFound,
}

/// Key of a session entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub session_id: String,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// A recorded NETCONF RPC invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub namespace: String,
    pub status: bool,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Value of a session entry: liveness plus the operation history keyed by
/// timestamp string (RFC 3339, so iteration order is chronological).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionValue {
    pub alive: bool,
    pub operations: BTreeMap<String, Operation>,
}

impl SessionValue {
    /// A fresh entry for a newly established session.
    pub fn alive() -> Self {
        Self {
            alive: true,
            operations: BTreeMap::new(),
        }
    }
}

/// Kind of a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// A store mutation, carrying a snapshot of the value at the commit instant
/// (the new value for `Created`/`Updated`, the pre-delete value for
/// `Deleted`).
#[derive(Debug, Clone)]
pub struct Event {
    pub key: SessionKey,
    pub value: SessionValue,
    pub kind: EventKind,
}

struct Inner {
    entries: HashMap<SessionKey, SessionValue>,
    watchers: HashMap<Uuid, mpsc::Sender<Event>>,
}

/// The session store.
pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                watchers: HashMap::new(),
            }),
        }
    }

    /// Insert or replace an entry, emitting a `Created` event.
    pub async fn put(&self, key: SessionKey, value: SessionValue) {
        debug!(session = %key.session_id, "creating store entry");
        let mut inner = self.inner.lock().await;
        inner.entries.insert(key.clone(), value.clone());
        notify(
            &mut inner.watchers,
            Event {
                key,
                value,
                kind: EventKind::Created,
            },
        );
    }

    /// Insert or replace an entry, emitting an `Updated` event.
    pub async fn update(&self, key: SessionKey, value: SessionValue) {
        debug!(session = %key.session_id, "updating store entry");
        let mut inner = self.inner.lock().await;
        inner.entries.insert(key.clone(), value.clone());
        notify(
            &mut inner.watchers,
            Event {
                key,
                value,
                kind: EventKind::Updated,
            },
        );
    }

    /// Get a snapshot of the entry for `key`.
    pub async fn get(&self, key: &SessionKey) -> Result<SessionValue, StoreError> {
        let inner = self.inner.lock().await;
        inner.entries.get(key).cloned().ok_or(StoreError::NotFound)
    }

    /// Remove the entry for `key`, emitting a `Deleted` event with the
    /// pre-delete value. Removing an absent key is a no-op.
    pub async fn delete(&self, key: &SessionKey) {
        debug!(session = %key.session_id, "deleting store entry");
        let mut inner = self.inner.lock().await;
        if let Some(value) = inner.entries.remove(key) {
            notify(
                &mut inner.watchers,
                Event {
                    key: key.clone(),
                    value,
                    kind: EventKind::Deleted,
                },
            );
        }
    }

    /// Drain a snapshot of all entries into `sink`, then close it. An empty
    /// store closes the sink and reports `NotFound`.
    pub async fn entries(
        &self,
        sink: mpsc::Sender<(SessionKey, SessionValue)>,
    ) -> Result<(), StoreError> {
        let snapshot: Vec<(SessionKey, SessionValue)> = {
            let inner = self.inner.lock().await;
            inner
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        if snapshot.is_empty() {
            return Err(StoreError::NotFound);
        }

        for entry in snapshot {
            if sink.send(entry).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Register `sink` as a watcher. Events are delivered in commit order
    /// until `shutdown` fires or the sink is closed, at which point the
    /// watcher is deregistered.
    pub async fn watch(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>, sink: mpsc::Sender<Event>) {
        let id = Uuid::new_v4();
        {
            let mut inner = self.inner.lock().await;
            inner.watchers.insert(id, sink);
        }
        debug!(watcher = %id, "registered store watcher");

        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if shutdown.changed().await.is_err() {
                    break;
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            let mut inner = store.inner.lock().await;
            if inner.watchers.remove(&id).is_some() {
                debug!(watcher = %id, "removed store watcher");
            }
        });
    }

    /// Number of entries currently in the store.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan an event out to every watcher. Closed watchers are pruned; a watcher
/// with a full buffer loses the event rather than blocking the mutation.
fn notify(watchers: &mut HashMap<Uuid, mpsc::Sender<Event>>, event: Event) {
    watchers.retain(|id, sink| match sink.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(watcher = %id, "watcher buffer full, dropping event");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    });
}
