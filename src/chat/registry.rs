//! In-memory map from identity to its live chat connection.
//!
//! One binding per identity; registering again replaces the previous handle.
//! Nothing here is persisted, clients rebuild it by reconnecting.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::ServerEvent;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: Uuid,
    sender: EventSender,
}

impl ConnectionHandle {
    pub fn new(sender: EventSender) -> Self {
        Self { connection_id: Uuid::new_v4(), sender }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queues an event for the socket writer. False once the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    bindings: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle that was replaced, if any.
    pub fn register(&self, identity: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self.write().insert(identity, handle);
        tracing::debug!(user_id = %identity, replaced = previous.is_some(), "connection registered");
        previous
    }

    pub fn resolve(&self, identity: Uuid) -> Option<ConnectionHandle> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&identity)
            .cloned()
    }

    pub fn unregister(&self, identity: Uuid) -> Option<ConnectionHandle> {
        self.write().remove(&identity)
    }

    /// Unregisters only if the binding still belongs to `connection_id`.
    pub fn release(&self, identity: Uuid, connection_id: Uuid) -> bool {
        let mut bindings = self.write();
        if bindings.get(&identity).is_some_and(|h| h.connection_id == connection_id) {
            bindings.remove(&identity);
            tracing::debug!(user_id = %identity, "connection released");
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, ConnectionHandle>> {
        self.bindings.write().unwrap_or_else(PoisonError::into_inner)
    }
}
