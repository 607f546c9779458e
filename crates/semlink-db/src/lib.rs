//! # semlink-db
//!
//! PostgreSQL + pgvector persistence layer for semlink.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for links, the blacklist, embeddings, and
//!   custom targets
//! - Content chunking for embedding generation
//!
//! ## Example
//!
//! ```rust,ignore
//! use semlink_db::Database;
//! use semlink_core::{EventBus, LinkRepository, ProposeLinkRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/semlink", EventBus::default()).await?;
//!
//!     let link_id = db.links.propose(ProposeLinkRequest {
//!         source_id: 42,
//!         anchor_text: "mortgage guide".to_string(),
//!         target_url: "https://example.com/mortgage-guide".to_string(),
//!         target_id: Some(7),
//!         score: 0.81,
//!     }).await?;
//!
//!     println!("Proposed link: {}", link_id);
//!     Ok(())
//! }
//! ```

pub mod blacklist;
pub mod chunking;
pub mod custom_targets;
pub mod embeddings;
pub mod links;
pub mod pool;

// Always compiled so integration tests (in tests/) can use
// DEFAULT_TEST_DATABASE_URL.
pub mod test_fixtures;

// Re-export core types
pub use semlink_core::*;

pub use blacklist::PgBlacklistRepository;
pub use chunking::{ChunkerConfig, ItemChunker};
pub use custom_targets::PgCustomTargetRepository;
pub use embeddings::PgEmbeddingRepository;
pub use links::PgLinkRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

use semlink_core::EventBus;

/// Aggregate handle over every repository, sharing one pool and one event
/// bus.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Event bus shared with the repositories; subscribe here to observe
    /// `LinkChanged` notifications.
    pub events: EventBus,
    /// Proposed-link repository.
    pub links: PgLinkRepository,
    /// Rejection blacklist repository.
    pub blacklist: PgBlacklistRepository,
    /// Per-(item, chunk) embedding storage.
    pub embeddings: PgEmbeddingRepository,
    /// Operator-curated custom target repository.
    pub custom_targets: PgCustomTargetRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>, events: EventBus) -> Self {
        Self {
            links: PgLinkRepository::new(pool.clone(), events.clone()),
            blacklist: PgBlacklistRepository::new(pool.clone()),
            embeddings: PgEmbeddingRepository::new(pool.clone()),
            custom_targets: PgCustomTargetRepository::new(pool.clone()),
            events,
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str, events: EventBus) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool, events))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(
        url: &str,
        config: PoolConfig,
        events: EventBus,
    ) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool, events))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))
    }
}
