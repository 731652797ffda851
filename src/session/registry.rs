//! Connection -> relay registry
//!
//! Mirrors live relays: a connection has an entry only while its relay is
//! up. The owning session manager removes the entry whenever that relay
//! goes away (stop, replacement, remote end of call), and once more on
//! connection loss, after which the connection never appears again.
//! Everyone else (HTTP status handlers) only reads snapshots.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::session::{ConnectionId, SessionCounters};

/// Point-in-time view of one connection's relay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connection_id: ConnectionId,
    pub device_id: String,
    pub device_name: String,
    pub relay_session_id: String,
    pub playlist_url: String,
    pub microphone_active: bool,
    pub started_at: DateTime<Utc>,
    pub counters: SessionCounters,
}

/// Shared map of active relays, keyed by connection
#[derive(Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<DashMap<ConnectionId, SessionSnapshot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the relay of a connection
    pub fn register(&self, snapshot: SessionSnapshot) {
        self.entries.insert(snapshot.connection_id, snapshot);
    }

    /// Apply `f` to a connection's entry if it has one
    pub fn update<F>(&self, connection_id: &ConnectionId, f: F)
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        if let Some(mut entry) = self.entries.get_mut(connection_id) {
            f(entry.value_mut());
        }
    }

    pub fn remove(&self, connection_id: &ConnectionId) -> Option<SessionSnapshot> {
        self.entries.remove(connection_id).map(|(_, snapshot)| snapshot)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<SessionSnapshot> {
        self.entries.get(connection_id).map(|e| e.value().clone())
    }

    /// All active relays, oldest first
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<SessionSnapshot> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.started_at);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
