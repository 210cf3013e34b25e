//! litgraph-db: Graph store layer.
//!
//! Documents are nodes keyed by their corpus identifier, citations are
//! directed `REFERENCES` edges. Three backends implement [`GraphStore`]:
//!
//! - Neo4j over Bolt (`bolt://`, `neo4j://`)
//! - PostgreSQL (`postgres://`)
//! - an in-process store (`memory://`) for dry runs and tests
//!
//! # Example
//!
//! ```rust,no_run
//! use litgraph_db::{connect, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = connect(&StoreConfig::default()).await?;
//!     store.ensure_constraints().await?;
//!     println!("{:?}", store.statistics().await?);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod memory;
pub mod neo4j;
pub mod pg_repository;
pub mod repository;
pub mod schema;

pub use database::{connect, Backend, StoreConfig};
pub use error::{DbError, Result};
pub use memory::{MemoryGraphStore, StoredNode};
pub use neo4j::Neo4jGraphStore;
pub use pg_repository::PgGraphStore;
pub use repository::{GraphStore, RowStream};
