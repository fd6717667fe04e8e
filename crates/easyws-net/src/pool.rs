//! Concurrent registry of live connections keyed by client identity.

use std::sync::Arc;

use dashmap::DashMap;
use easyws_core::ClientId;

use crate::connection::Connection;

/// Lookup table from [`ClientId`] to live [`Connection`].
///
/// All operations are safe to call concurrently. Lookups return owned
/// handles, so callers never hold a map lock across an await.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: DashMap<ClientId, Arc<Connection>>,
}

impl ConnectionPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection, replacing any entry with the same identity.
    pub fn add_or_update(&self, connection: Arc<Connection>) {
        let _ = self.connections.insert(connection.id(), connection);
    }

    /// Look up a connection.
    pub fn get(&self, id: ClientId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a connection. Removing an absent identity is a no-op.
    pub fn delete(&self, id: ClientId) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    /// Whether an identity is registered.
    pub fn contains(&self, id: ClientId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Snapshot of the registered identities, in ascending order.
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.connections.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of the registered connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
