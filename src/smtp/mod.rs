//! # SMTP server module
//!
//! A listener hands accepted connections to a fixed pool of workers, each
//! of which drives one connection at a time through a small state machine
//! built with enums and matching:
//!
//! - [`app`]: listener/dispatcher and graceful shutdown
//! - [`pool`]: connection queue and workers
//! - [`connection`]: per-connection I/O, spam check and storage
//! - [`state_machine`]: the protocol itself, no I/O
//! - [`command`], [`parse`], [`sanitize`], [`reply`]: line level helpers

pub mod app;
pub mod command;
pub mod connection;
pub mod error;
pub mod parse;
pub mod pool;
pub mod reply;
pub mod sanitize;
pub mod state_machine;

pub use app::{ShutdownHandle, SmtpServer};
pub use connection::{serve_connection, SessionContext};
pub use error::SmtpError;
pub use reply::Reply;
pub use state_machine::{Action, Delivery, Limits, Session, State};
