//! # Worker pool
//!
//! The listener pushes accepted connections into a [`ConnectionQueue`]; a
//! fixed number of workers pop them off in arrival order and run one
//! session each, to completion, before coming back for more.
//!
//! Closing the queue is how the pool is told to stop: workers keep serving
//! whatever is still queued and exit once it is empty.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::smtp::connection::{serve_connection, SessionContext};

/// An accepted client socket and who is on the other end.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO shared by the listener and the workers.
///
/// Every item pushed is popped by exactly one consumer.
#[derive(Debug)]
pub struct ConnectionQueue<T = Connection> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> Default for ConnectionQueue<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }
}

impl<T> ConnectionQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `item` and wakes one waiting worker. Once the queue is closed
    /// the item is handed back instead.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(item);
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Waits for the oldest item. `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before looking, so a push in between isn't missed.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    if !state.items.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Refuses further pushes and wakes every waiting worker. Irreversible.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed set of workers draining a [`ConnectionQueue`].
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` workers (at least one) on `tracker`.
    pub fn spawn(
        size: usize,
        queue: Arc<ConnectionQueue>,
        ctx: Arc<SessionContext>,
        tracker: &TaskTracker,
    ) -> Self {
        let workers = (0..size.max(1))
            .map(|id| tracker.spawn(run_worker(id, queue.clone(), ctx.clone())))
            .collect();

        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit. Only returns after the queue has been
    /// closed.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<ConnectionQueue>,
    ctx: Arc<SessionContext>,
) {
    debug!(worker = id, "Worker started");

    while let Some(Connection { stream, peer }) = queue.pop().await {
        debug!(worker = id, %peer, "Serving connection");

        // A session of its own, so a panic in it stays in it.
        let session_ctx = ctx.clone();
        let session = tokio::spawn(async move {
            serve_connection(stream, peer, &session_ctx).await
        });

        match session.await {
            Ok(Ok(())) => debug!(worker = id, %peer, "Session finished"),
            Ok(Err(e)) => warn!(
                worker = id,
                %peer,
                error = %e,
                "Session ended with error"
            ),
            Err(e) if e.is_panic() => {
                error!(
                    worker = id,
                    %peer,
                    "Session panicked, connection dropped"
                );
                ctx.metrics.session_panicked();
            }
            Err(e) => error!(worker = id, %peer, error = %e, "Session aborted"),
        }
        ctx.metrics.session_completed();
    }

    debug!(worker = id, "Worker stopped");
}
