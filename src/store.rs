//! # Message store
//!
//! Where finished messages go. The SMTP side only sees the [`Store`] trait;
//! [`crate::database::SqliteStore`] is the durable implementation and
//! [`MemoryStore`] keeps everything in process for embedding and tests.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::database::DatabaseError;

/// A message whose DATA phase completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub sender: String,
    pub recipient: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence boundary for completed messages.
///
/// Implementations are shared by every worker and must tolerate concurrent
/// calls. A failure never changes the reply sent to the client, the caller
/// only logs it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists an accepted message.
    async fn save_message(&self, email: &Email) -> Result<(), StoreError>;

    /// Records a message the spam oracle rejected.
    async fn save_spam_record(&self, email: &Email) -> Result<(), StoreError>;
}

/// In-process [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<Email>>,
    spam_records: Mutex<Vec<Email>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Email> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn spam_records(&self) -> Vec<Email> {
        self.spam_records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_message(&self, email: &Email) -> Result<(), StoreError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }

    async fn save_spam_record(&self, email: &Email) -> Result<(), StoreError> {
        self.spam_records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }
}
