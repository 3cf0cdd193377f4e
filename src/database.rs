//!  Thread-safe SQLite connection pool instantiation, and the [`Store`]
//!  built on top of it.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::debug;

use crate::models::{Message, SpamRecord};
use crate::store::{Email, Store, StoreError};

pub type Pool = SqlitePool;

/// Score written for accepted mail; the oracle only answers yes or no.
const HAM_SCORE: f64 = 0.0;
const SPAM_SCORE: f64 = 1.0;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Couldn't connect to {url}: {source}")]
    Connect { url: String, source: sqlx::Error },

    #[error("Couldn't create tables: {0}")]
    Migrate(#[source] sqlx::Error),

    #[error("Couldn't INSERT row: {0}")]
    CouldNotInsert(#[source] sqlx::Error),
}

/// Opens (creating it if needed) the SQLite database at `url`.
pub async fn connect(
    url: &str,
    max_connections: u32,
) -> Result<Pool, DatabaseError> {
    let connect_err = |source| DatabaseError::Connect {
        url: url.to_owned(),
        source,
    };

    let options = SqliteConnectOptions::from_str(url)
        .map_err(connect_err)?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(connect_err)
}

/// A private in-memory database. One connection that never expires, since
/// the data lives exactly as long as it does.
pub async fn connect_in_memory() -> Result<Pool, DatabaseError> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|source| DatabaseError::Connect {
            url: "sqlite::memory:".to_owned(),
            source,
        })
}

/// Creates the `emails` and `spam_logs` tables if they are missing.
pub async fn migrate(pool: &Pool) -> Result<(), DatabaseError> {
    for statement in [Message::CREATE_TABLE, SpamRecord::CREATE_TABLE] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(DatabaseError::Migrate)?;
    }

    Ok(())
}

/// [`Store`] backed by the SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_message(&self, email: &Email) -> Result<(), StoreError> {
        let id = Message::insert(email, HAM_SCORE, &self.pool)
            .await
            .map_err(DatabaseError::CouldNotInsert)?;
        debug!("Saved message {} for {}", id, email.recipient);

        Ok(())
    }

    async fn save_spam_record(&self, email: &Email) -> Result<(), StoreError> {
        let id = SpamRecord::insert(email, SPAM_SCORE, &self.pool)
            .await
            .map_err(DatabaseError::CouldNotInsert)?;
        debug!("Logged spam record {} from {}", id, email.sender);

        Ok(())
    }
}
