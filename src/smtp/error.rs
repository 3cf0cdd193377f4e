//! Error types for the SMTP server

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    /// The listener couldn't be set up; the server can't run at all.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Client idle for more than {0:?}")]
    Timeout(Duration),
}
