//! Client session registry
//!
//! Tracks the client connections bound to each reader. When a reader's card
//! is removed, every session bound to it is terminated and a
//! [`SessionEvent::Terminated`] is broadcast to all subscribers.

use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
    time::SystemTime,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use smartcas_core::{CaId, ServiceId};
use tracing::debug;

use crate::state::ReaderId;

/// Identifier of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("session-{_0}")]
pub struct SessionId(pub u32);

/// Session notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was terminated because its reader's card was removed
    Terminated {
        /// Terminated session
        session: SessionId,
        /// Reader the session was bound to
        reader: ReaderId,
    },
}

/// The view of client sessions the card session engine needs
pub trait ClientSessions: Send + Sync + fmt::Debug {
    /// Terminate every session bound to `reader`, returning how many were terminated
    fn terminate_all_bound_to(&self, reader: &ReaderId) -> usize;

    /// Record the last ECM a session asked for
    fn update_last_seen(&self, session: SessionId, srvid: ServiceId, caid: CaId, at: SystemTime);
}

/// A connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    /// Session id
    pub id: SessionId,
    /// Authenticated user name
    pub user: String,
    /// Reader the session is bound to
    pub reader: ReaderId,
    /// Service of the last ECM
    pub last_srvid: Option<ServiceId>,
    /// CA id of the last ECM
    pub last_caid: Option<CaId>,
    /// Time of the last ECM
    pub last_seen: Option<SystemTime>,
}

/// In-process session registry
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, ClientSession>>,
    next_id: AtomicU32,
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `user` bound to `reader`
    pub fn open(&self, user: impl Into<String>, reader: ReaderId) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = ClientSession {
            id,
            user: user.into(),
            reader,
            last_srvid: None,
            last_caid: None,
            last_seen: None,
        };
        self.sessions.write().insert(id, session);
        id
    }

    /// Close a session without notification
    pub fn close(&self, id: SessionId) -> Option<ClientSession> {
        self.sessions.write().remove(&id)
    }

    /// Snapshot of a session
    pub fn get(&self, id: SessionId) -> Option<ClientSession> {
        self.sessions.read().get(&id).cloned()
    }

    /// Ids of all sessions bound to `reader`
    pub fn bound_to(&self, reader: &ReaderId) -> Vec<SessionId> {
        let mut ids: Vec<_> = self
            .sessions
            .read()
            .values()
            .filter(|s| &s.reader == reader)
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is open
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn broadcast(&self, event: &SessionEvent) {
        // Drop subscribers whose receiver is gone
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl ClientSessions for SessionRegistry {
    fn terminate_all_bound_to(&self, reader: &ReaderId) -> usize {
        let terminated: Vec<ClientSession> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<SessionId> = sessions
                .values()
                .filter(|s| &s.reader == reader)
                .map(|s| s.id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &terminated {
            debug!(session = %session.id, user = %session.user, %reader, "Terminating client session");
            self.broadcast(&SessionEvent::Terminated {
                session: session.id,
                reader: reader.clone(),
            });
        }
        terminated.len()
    }

    fn update_last_seen(&self, session: SessionId, srvid: ServiceId, caid: CaId, at: SystemTime) {
        if let Some(entry) = self.sessions.write().get_mut(&session) {
            entry.last_srvid = Some(srvid);
            entry.last_caid = Some(caid);
            entry.last_seen = Some(at);
        }
    }
}
