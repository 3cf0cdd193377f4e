//! # Persisted rows
//!
//! Row types and queries for the two tables the SQLite store writes: one
//! for accepted mail, one audit log for mail rejected as spam.

mod message;
mod spam_record;

pub use message::Message;
pub use spam_record::SpamRecord;
