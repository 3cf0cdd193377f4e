//! # Process-wide counters
//!
//! Shared by the listener and every worker through an `Arc`. Counters only
//! ever go up; [`Metrics::snapshot`] reads them all at once for logging.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    connections_accepted: AtomicU64,
    sessions_completed: AtomicU64,
    sessions_panicked: AtomicU64,
    messages_accepted: AtomicU64,
    messages_rejected_spam: AtomicU64,
    oracle_failures: AtomicU64,
    store_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub sessions_completed: u64,
    pub sessions_panicked: u64,
    pub messages_accepted: u64,
    pub messages_rejected_spam: u64,
    pub oracle_failures: u64,
    pub store_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        bump(&self.connections_accepted);
    }

    pub fn session_completed(&self) {
        bump(&self.sessions_completed);
    }

    pub fn session_panicked(&self) {
        bump(&self.sessions_panicked);
    }

    pub fn message_accepted(&self) {
        bump(&self.messages_accepted);
    }

    pub fn message_rejected_spam(&self) {
        bump(&self.messages_rejected_spam);
    }

    pub fn oracle_failed(&self) {
        bump(&self.oracle_failures);
    }

    pub fn store_failed(&self) {
        bump(&self.store_failures);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections_accepted: load(&self.connections_accepted),
            sessions_completed: load(&self.sessions_completed),
            sessions_panicked: load(&self.sessions_panicked),
            messages_accepted: load(&self.messages_accepted),
            messages_rejected_spam: load(&self.messages_rejected_spam),
            oracle_failures: load(&self.oracle_failures),
            store_failures: load(&self.store_failures),
        }
    }
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_add_up_across_threads() {
        let metrics = Arc::new(Metrics::new());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.message_accepted();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        metrics.message_rejected_spam();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_accepted, 400);
        assert_eq!(snapshot.messages_rejected_spam, 1);
        assert_eq!(snapshot.connections_accepted, 0);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = Metrics::new();
        metrics.connection_accepted();

        let json: serde_json::Value =
            serde_json::from_str(&metrics.snapshot().to_json()).unwrap();
        assert_eq!(json["connections_accepted"], 1);
        assert_eq!(json["store_failures"], 0);
    }
}
