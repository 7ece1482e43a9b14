//! Concurrent registry of live sessions.
//!
//! Uses DashMap so that an embedding event loop running on several threads
//! can route readiness callbacks to sessions without a global lock. Each
//! session sits behind its own mutex; at most one thread drives it at a time.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tracing::info;

use crate::dispatch::SessionState;
use crate::session::Session;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Strong type for connection identifiers. Unique within the process.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl ClientId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Sessions keyed by client.
#[derive(Default)]
pub struct ClientMap {
    sessions: DashMap<ClientId, Mutex<Session>>,
}

impl ClientMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) -> ClientId {
        let id = session.client_id();
        self.sessions.insert(id, Mutex::new(session));
        info!(client = %id, "client connected");
        id
    }

    /// Runs `f` on the session of `id`.
    ///
    /// Must not be called again from inside `f`: the shard stays locked.
    pub fn with<R>(&self, id: ClientId, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let entry = self.sessions.get(&id)?;
        let mut session = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut session))
    }

    /// Removes the session of `id`, closing it.
    pub fn remove(&self, id: ClientId) -> Option<Session> {
        let (_, session) = self.sessions.remove(&id)?;
        let mut session = session.into_inner().unwrap_or_else(PoisonError::into_inner);
        session.close();
        info!(client = %id, "client disconnected");
        Some(session)
    }

    /// Drops every session that reached `Closed`. Returns their ids.
    pub fn reap(&self) -> Vec<ClientId> {
        let mut reaped = Vec::new();
        self.sessions.retain(|id, session| {
            let session = session.get_mut().unwrap_or_else(PoisonError::into_inner);
            let keep = session.state() != SessionState::Closed;
            if !keep {
                reaped.push(*id);
            }
            keep
        });
        for id in &reaped {
            info!(client = %id, "client reaped");
        }
        reaped
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
