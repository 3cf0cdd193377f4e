//! # Spam classification
//!
//! The server asks an external classifier about every finished message. The
//! classifier speaks a tiny protocol over its own TCP connection: the raw
//! body goes out, a `SPAM` or `HAM` token comes back.
//!
//! Whatever goes wrong here is reported as a [`SpamError`]; deciding what a
//! failure means for the message is the session driver's job.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Longest verdict the oracle is expected to send.
const MAX_VERDICT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum SpamError {
    #[error("couldn't reach spam oracle at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("spam oracle I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spam oracle didn't answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed spam oracle verdict: {0:?}")]
    Malformed(String),
}

#[async_trait]
pub trait SpamOracle: Send + Sync {
    /// `true` when `body` is spam.
    async fn classify(&self, body: &[u8]) -> Result<bool, SpamError>;
}

/// Client for the oracle listening on a local TCP endpoint.
#[derive(Debug, Clone)]
pub struct TcpSpamOracle {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpSpamOracle {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    async fn exchange(&self, body: &[u8]) -> Result<bool, SpamError> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|source| SpamError::Connect {
                addr: self.addr,
                source,
            })?;

        stream.write_all(body).await?;
        stream.shutdown().await?;

        let mut verdict = Vec::with_capacity(MAX_VERDICT_LEN);
        let mut buf = [0; MAX_VERDICT_LEN];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            verdict.extend_from_slice(&buf[..n]);
            if parse_verdict(&verdict).is_some()
                || verdict.len() >= MAX_VERDICT_LEN
            {
                break;
            }
        }

        parse_verdict(&verdict).ok_or_else(|| {
            SpamError::Malformed(String::from_utf8_lossy(&verdict).into_owned())
        })
    }
}

#[async_trait]
impl SpamOracle for TcpSpamOracle {
    async fn classify(&self, body: &[u8]) -> Result<bool, SpamError> {
        let verdict = tokio::time::timeout(self.timeout, self.exchange(body))
            .await
            .map_err(|_| SpamError::Timeout(self.timeout))??;
        debug!("Spam oracle verdict: spam={}", verdict);

        Ok(verdict)
    }
}

fn parse_verdict(raw: &[u8]) -> Option<bool> {
    match raw.trim_ascii() {
        b"SPAM" => Some(true),
        b"HAM" => Some(false),
        _ => None,
    }
}
