//! Graph store error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Neo4j error: {0}")]
    Neo4j(String),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("PostgreSQL pool error: {0}")]
    Pool(String),

    #[error("Unsupported store URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("Unexpected row shape: {0}")]
    Decode(String),

    #[error("Graph store not initialized: constraints must be set up before writes")]
    NotInitialized,
}

impl From<neo4rs::Error> for DbError {
    fn from(err: neo4rs::Error) -> Self {
        DbError::Neo4j(err.to_string())
    }
}


impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DbError::Pool(err.to_string())
    }
}
