use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::smtp::connection::SessionContext;
use crate::smtp::error::SmtpError;
use crate::smtp::pool::{Connection, ConnectionQueue, WorkerPool};
use crate::spam::SpamOracle;
use crate::store::Store;

/// Pause after a failed accept. Running out of file descriptors would
/// otherwise spin the accept loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener plus worker pool. Runs until its [`ShutdownHandle`] fires.
pub struct SmtpServer {
    config: Config,
    ctx: Arc<SessionContext>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Stops a running [`SmtpServer`]. Cheap to clone; stopping is one-way.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownHandle {
    /// Stops accepting, then waits until every worker has finished the
    /// session it is in and drained the queue.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl SmtpServer {
    pub fn new(
        config: Config,
        oracle: Arc<dyn SpamOracle>,
        store: Arc<dyn Store>,
    ) -> Self {
        let ctx = SessionContext {
            hostname: config.hostname.clone(),
            limits: config.limits,
            idle_timeout: config.idle_timeout,
            oracle,
            store,
            metrics: Arc::new(Metrics::new()),
        };

        Self {
            config,
            ctx: Arc::new(ctx),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.ctx.metrics.clone()
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
            tracker: self.tracker.clone(),
        }
    }

    /// Binds the configured address and serves until shut down.
    pub async fn start(&self) -> Result<(), SmtpError> {
        let addr = self.config.listen_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| SmtpError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("SMTP server listening on {}", addr);

        self.serve(listener).await
    }

    /// Serves on an already bound listener until shut down.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), SmtpError> {
        let queue = Arc::new(ConnectionQueue::new());
        let pool = WorkerPool::spawn(
            self.config.workers,
            queue.clone(),
            self.ctx.clone(),
            &self.tracker,
        );
        info!(workers = pool.size(), "Worker pool started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Accepted connection");
                        self.ctx.metrics.connection_accepted();
                        let connection = Connection::new(stream, peer);
                        if let Err(rejected) = queue.push(connection) {
                            warn!(
                                peer = %rejected.peer,
                                "Queue closed, dropping connection"
                            );
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                        back_off(&self.shutdown).await;
                    }
                },
            }
        }

        drop(listener);
        info!(queued = queue.len(), "SMTP listener stopped, draining workers");

        queue.close();
        self.tracker.close();
        pool.join().await;

        info!(
            metrics = %self.ctx.metrics.snapshot().to_json(),
            "SMTP server stopped"
        );
        Ok(())
    }
}

/// Sleeps for [`ACCEPT_BACKOFF`], cut short by shutdown.
async fn back_off(shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
    }
}
