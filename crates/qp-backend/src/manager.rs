//! Connection manager (§5 "shared resources"): a mapping from connection
//! name to `(DbBackend, last_used, ttl)`, mutated only by the single core
//! thread that owns the broker's event loop — grounded on
//! `cori-proxy::proxy::CoriProxy`'s pool-per-connection, lazily-constructed
//! design, generalized from "one upstream" to "one pool per catalog name".
//!
//! Reaping is driven by wall clock on access, exactly as specified: there is
//! no background task. A connection idle longer than its TTL is dropped and
//! silently reopened on the next request that needs it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use qp_core::{ConnCatalog, QpError};

use crate::backend::DbBackend;
use crate::error::BackendError;
use crate::postgres::PgBackend;

/// Default number of pooled physical connections per catalog entry. Kept
/// small: this proxy serves one cooperative session loop, not a connection
/// multiplexer for many concurrent clients (§5 `MAX_CLIENTS`).
const POOL_MAX_CONNECTIONS: u32 = 4;

struct Entry {
    backend: Box<dyn DbBackend>,
    last_used: Instant,
}

pub struct ConnectionManager {
    catalog: ConnCatalog,
    ttl: Duration,
    entries: HashMap<String, Entry>,
}

impl ConnectionManager {
    pub fn new(catalog: ConnCatalog, ttl: Duration) -> Self {
        Self {
            catalog,
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &ConnCatalog {
        &self.catalog
    }

    /// Return the live backend for `name`, reaping it first if it has sat
    /// idle past `ttl` and lazily opening a fresh one if absent or just
    /// reaped. Every call refreshes `last_used`.
    pub async fn get(&mut self, name: &str) -> Result<&dyn DbBackend, QpError> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(name) {
            if now.duration_since(entry.last_used) >= self.ttl {
                tracing::info!(conn = %name, "reaping idle backend connection past ttl");
                self.entries.remove(name);
            }
        }

        if !self.entries.contains_key(name) {
            let profile = self
                .catalog
                .get(name)
                .ok_or_else(|| QpError::from(BackendError::UnknownConnection(name.to_string())))?;
            tracing::debug!(conn = %name, host = %profile.host, "opening backend connection");
            let backend = PgBackend::connect(&profile.connection_string(), POOL_MAX_CONNECTIONS)
                .await
                .map_err(QpError::from)?;
            self.entries.insert(
                name.to_string(),
                Entry {
                    backend: Box::new(backend),
                    last_used: now,
                },
            );
        } else {
            self.entries.get_mut(name).unwrap().last_used = now;
        }

        Ok(self.entries.get(name).unwrap().backend.as_ref())
    }

    /// Drop a connection outright, e.g. after a fatal backend error (§5
    /// "a fatal error on a backend connection disconnects it and forces
    /// the next request to lazily reopen").
    pub fn disconnect(&mut self, name: &str) {
        self.entries.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_connection_name_is_absent_from_the_catalog() {
        let catalog = ConnCatalog::from_yaml("connections: {}\n").unwrap();
        let mgr = ConnectionManager::new(catalog, Duration::from_secs(300));
        assert!(mgr.catalog().get("nope").is_none());
    }

    #[tokio::test]
    async fn get_rejects_a_name_absent_from_the_catalog_without_opening_a_socket() {
        let catalog = ConnCatalog::from_yaml("connections: {}\n").unwrap();
        let mut mgr = ConnectionManager::new(catalog, Duration::from_secs(300));
        let err = mgr.get("nope").await.unwrap_err();
        assert!(matches!(err, QpError::BackendError(_)));
    }
}
