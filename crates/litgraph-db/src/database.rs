//! Store connection parameters and backend selection.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use crate::error::{DbError, Result};
use crate::memory::MemoryGraphStore;
use crate::neo4j::Neo4jGraphStore;
use crate::pg_repository::PgGraphStore;
use crate::repository::GraphStore;

pub const DEFAULT_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_USER: &str = "neo4j";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_MAX_CONNECTIONS: usize = 8;

/// Address, principal and credential of the graph store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub uri: String,
    pub user: String,
    pub password: SecretString,
    pub max_connections: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            user: DEFAULT_USER.to_string(),
            password: SecretString::from(DEFAULT_PASSWORD.to_string()),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Which backend a URI points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Neo4j,
    Postgres,
    Memory,
}

impl Backend {
    /// Pick the backend from the URI scheme.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let scheme = uri
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| DbError::InvalidConfig(format!("store URI has no scheme: {uri}")))?;

        match scheme.as_str() {
            "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc" => Ok(Backend::Neo4j),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "memory" => Ok(Backend::Memory),
            _ => Err(DbError::UnsupportedScheme(scheme)),
        }
    }
}

/// Open the graph store described by `config`.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn GraphStore>> {
    if config.max_connections == 0 {
        return Err(DbError::InvalidConfig("max_connections must be at least 1".to_string()));
    }
    let backend = Backend::from_uri(&config.uri)?;
    info!(?backend, uri = %config.uri, "Opening graph store");

    let store: Arc<dyn GraphStore> = match backend {
        Backend::Neo4j => Arc::new(Neo4jGraphStore::connect(config).await?),
        Backend::Postgres => Arc::new(PgGraphStore::connect(config).await?),
        Backend::Memory => Arc::new(MemoryGraphStore::new()),
    };
    Ok(store)
}
