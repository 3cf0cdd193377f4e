//! # maildrop
//!
//! A small mail-transfer server. It accepts SMTP connections, hands each one
//! to a fixed-size pool of workers, runs the `HELO`/`MAIL`/`RCPT`/`DATA`
//! conversation, asks an external classifier whether the message is spam and
//! stores the result in SQLite.
//!
//! Only a subset of SMTP is spoken: no extensions, no authentication, no TLS.
//!
//! ```no_run
//! use std::sync::Arc;
//! use maildrop::{Config, MemoryStore, SmtpServer, TcpSpamOracle};
//!
//! # async fn run() -> Result<(), maildrop::SmtpError> {
//! let config = Config::default();
//! let oracle = Arc::new(TcpSpamOracle::new(
//!     config.spam_oracle_addr,
//!     config.spam_oracle_timeout,
//! ));
//! let server = SmtpServer::new(config, oracle, Arc::new(MemoryStore::new()));
//! let handle = server.handle();
//!
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.shutdown().await;
//! });
//! server.start().await
//! # }
//! ```

pub mod config;
pub mod database;
pub mod metrics;
pub mod models;
pub mod smtp;
pub mod spam;
pub mod store;
pub mod time;
pub mod tracing;

pub use config::{Config, ConfigError};
pub use database::{DatabaseError, SqliteStore};
pub use metrics::{Metrics, MetricsSnapshot};
pub use smtp::{ShutdownHandle, SmtpError, SmtpServer};
pub use spam::{SpamError, SpamOracle, TcpSpamOracle};
pub use store::{Email, MemoryStore, Store, StoreError};
