//! # Connection driver
//!
//! Runs one [`Session`] against a byte stream: greets, reads, feeds the
//! state machine and writes whatever it answers. Finished messages are
//! classified and stored from here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::metrics::Metrics;
use crate::smtp::error::SmtpError;
use crate::smtp::reply::Reply;
use crate::smtp::state_machine::{Action, Delivery, Limits, Session};
use crate::spam::SpamOracle;
use crate::store::{Email, Store};

const READ_BUFFER_SIZE: usize = 4096;

/// Everything a session needs besides its stream. Shared by all workers.
pub struct SessionContext {
    pub hostname: String,
    pub limits: Limits,
    pub idle_timeout: Duration,
    pub oracle: Arc<dyn SpamOracle>,
    pub store: Arc<dyn Store>,
    pub metrics: Arc<Metrics>,
}

/// Serves one client until it quits, disconnects or fails. The stream is
/// shut down on every way out.
pub async fn serve_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    ctx: &SessionContext,
) -> Result<(), SmtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = drive(&mut stream, peer, ctx).await;
    let _ = stream.shutdown().await;
    result
}

async fn drive<S>(
    stream: &mut S,
    peer: SocketAddr,
    ctx: &SessionContext,
) -> Result<(), SmtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(ctx.limits);
    send(stream, &Reply::greeting(&ctx.hostname)).await?;

    let mut buf = vec![0; READ_BUFFER_SIZE];
    loop {
        while let Some(action) = session.poll() {
            match action {
                Action::Reply(reply) => send(stream, &reply).await?,
                Action::Close(reply) => {
                    send(stream, &reply).await?;
                    debug!(%peer, "Client quit");
                    return Ok(());
                }
                Action::Deliver(email) => {
                    let delivery = deliver(&email, ctx).await;
                    send(stream, &delivery.reply()).await?;
                }
                Action::Continue => {}
            }
        }

        let read = stream.read(&mut buf);
        let n = match tokio::time::timeout(ctx.idle_timeout, read).await {
            Ok(n) => n?,
            Err(_) => {
                send(stream, &Reply::timeout(&ctx.hostname)).await?;
                return Err(SmtpError::Timeout(ctx.idle_timeout));
            }
        };
        if n == 0 {
            debug!(%peer, state = ?session.state(), "Peer closed connection");
            return Ok(());
        }
        session.feed(&buf[..n]);
    }
}

/// Classifies and stores a finished message. Exactly one store call per
/// message; neither collaborator can turn this into a protocol error.
async fn deliver(email: &Email, ctx: &SessionContext) -> Delivery {
    // Fail-open: a message the oracle couldn't classify counts as ham.
    let is_spam = match ctx.oracle.classify(&email.body).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(error = %e, "Spam oracle failed, accepting unclassified");
            ctx.metrics.oracle_failed();
            false
        }
    };

    if is_spam {
        if let Err(e) = ctx.store.save_spam_record(email).await {
            error!(error = %e, sender = %email.sender, "Couldn't log spam");
            ctx.metrics.store_failed();
        }
        ctx.metrics.message_rejected_spam();
        Delivery::RejectedAsSpam
    } else {
        if let Err(e) = ctx.store.save_message(email).await {
            error!(
                error = %e,
                recipient = %email.recipient,
                "Couldn't save message"
            );
            ctx.metrics.store_failed();
        }
        ctx.metrics.message_accepted();
        Delivery::Accepted
    }
}

async fn send<S>(stream: &mut S, reply: &Reply) -> Result<(), SmtpError>
where
    S: AsyncWrite + Unpin,
{
    debug!("Sending {}", reply);
    stream.write_all(reply.to_wire().as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spam::SpamError;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{
        AsyncBufReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
    };
    use tokio::task::JoinHandle;

    /// Oracle with a canned answer; `None` plays an unreachable oracle.
    struct Canned {
        verdict: Option<bool>,
        calls: AtomicUsize,
    }

    impl Canned {
        fn new(verdict: Option<bool>) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SpamOracle for Canned {
        async fn classify(&self, _body: &[u8]) -> Result<bool, SpamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
                .ok_or_else(|| SpamError::Malformed("oracle down".to_owned()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn save_message(&self, _: &Email) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_owned()))
        }

        async fn save_spam_record(&self, _: &Email) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_owned()))
        }
    }

    struct Client {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn line(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line
        }

        async fn send(&mut self, data: &str) {
            self.writer.write_all(data.as_bytes()).await.unwrap();
        }

        async fn command(&mut self, data: &str) -> String {
            self.send(data).await;
            self.line().await
        }
    }

    fn context(
        oracle: Arc<dyn SpamOracle>,
        store: Arc<dyn Store>,
    ) -> SessionContext {
        SessionContext {
            hostname: "mx.test".to_owned(),
            limits: Limits::default(),
            idle_timeout: Duration::from_secs(5),
            oracle,
            store,
            metrics: Arc::new(Metrics::new()),
        }
    }

    fn connect(
        ctx: Arc<SessionContext>,
    ) -> (Client, JoinHandle<Result<(), SmtpError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let handle = tokio::spawn(async move {
            serve_connection(server, peer, &ctx).await
        });
        let (reader, writer) = tokio::io::split(client);
        (
            Client {
                reader: BufReader::new(reader),
                writer,
            },
            handle,
        )
    }

    async fn open_transaction(client: &mut Client) {
        assert_eq!(client.line().await, "220 mx.test ESMTP Ready\r\n");
        assert_eq!(client.command("HELO a\r\n").await, "250 Hello a\r\n");
        assert_eq!(
            client.command("MAIL FROM:<x@y.com>\r\n").await,
            "250 Sender OK\r\n"
        );
        assert_eq!(
            client.command("RCPT TO:<z@y.com>\r\n").await,
            "250 Recipient OK\r\n"
        );
        assert!(client.command("DATA\r\n").await.starts_with("354 "));
    }

    #[tokio::test]
    async fn full_conversation_stores_message() {
        let store = Arc::new(MemoryStore::new());
        let oracle = Canned::new(Some(false));
        let ctx = Arc::new(context(oracle.clone(), store.clone()));
        let (mut client, handle) = connect(ctx.clone());

        open_transaction(&mut client).await;
        assert_eq!(
            client.command("Hi\r\n.\r\n").await,
            "250 Message accepted for delivery\r\n"
        );
        assert_eq!(client.command("QUIT\r\n").await, "221 Bye\r\n");
        assert_eq!(client.line().await, "");
        handle.await.unwrap().unwrap();

        assert_eq!(
            store.messages(),
            vec![Email {
                sender: "x@y.com".to_owned(),
                recipient: "z@y.com".to_owned(),
                body: b"Hi\r\n".to_vec(),
            }]
        );
        assert!(store.spam_records().is_empty());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.metrics.snapshot().messages_accepted, 1);
    }

    #[tokio::test]
    async fn spam_goes_to_audit_log() {
        let store = Arc::new(MemoryStore::new());
        let ctx = Arc::new(context(Canned::new(Some(true)), store.clone()));
        let (mut client, handle) = connect(ctx.clone());

        open_transaction(&mut client).await;
        assert_eq!(
            client.command("Buy now\r\n.\r\n").await,
            "554 Message rejected as spam\r\n"
        );
        client.command("QUIT\r\n").await;
        handle.await.unwrap().unwrap();

        assert!(store.messages().is_empty());
        assert_eq!(store.spam_records().len(), 1);
        assert_eq!(store.spam_records()[0].body, b"Buy now\r\n");
        assert_eq!(ctx.metrics.snapshot().messages_rejected_spam, 1);
    }

    #[tokio::test]
    async fn oracle_failure_fails_open() {
        let store = Arc::new(MemoryStore::new());
        let ctx = Arc::new(context(Canned::new(None), store.clone()));
        let (mut client, _handle) = connect(ctx.clone());

        open_transaction(&mut client).await;
        assert_eq!(
            client.command("Hi\r\n.\r\n").await,
            "250 Message accepted for delivery\r\n"
        );
        assert_eq!(store.messages().len(), 1);
        assert_eq!(ctx.metrics.snapshot().oracle_failures, 1);
    }

    #[tokio::test]
    async fn store_failure_keeps_reply_and_connection() {
        let ctx = Arc::new(context(
            Canned::new(Some(false)),
            Arc::new(BrokenStore),
        ));
        let (mut client, handle) = connect(ctx.clone());

        open_transaction(&mut client).await;
        assert_eq!(
            client.command("Hi\r\n.\r\n").await,
            "250 Message accepted for delivery\r\n"
        );
        assert_eq!(client.command("NOOP\r\n").await, "250 OK\r\n");
        assert_eq!(client.command("QUIT\r\n").await, "221 Bye\r\n");
        handle.await.unwrap().unwrap();
        assert_eq!(ctx.metrics.snapshot().store_failures, 1);
    }

    #[tokio::test]
    async fn second_message_on_same_connection() {
        let store = Arc::new(MemoryStore::new());
        let ctx = Arc::new(context(Canned::new(Some(false)), store.clone()));
        let (mut client, _handle) = connect(ctx);

        open_transaction(&mut client).await;
        client.command("one\r\n.\r\n").await;
        assert_eq!(
            client.command("RCPT TO:<w@y.com>\r\n").await,
            "250 Recipient OK\r\n"
        );
        assert!(client.command("DATA\r\n").await.starts_with("354 "));
        client.command("two\r\n.\r\n").await;

        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, "x@y.com");
        assert_eq!(messages[1].recipient, "w@y.com");
        assert_eq!(messages[1].body, b"two\r\n");
    }

    #[tokio::test]
    async fn body_split_across_writes_is_stored_once() {
        let store = Arc::new(MemoryStore::new());
        let oracle = Canned::new(Some(false));
        let ctx = Arc::new(context(oracle.clone(), store.clone()));
        let (mut client, _handle) = connect(ctx);

        open_transaction(&mut client).await;
        for piece in ["Subj", "ect: x\r", "\n\r\n..dot", "\r\n.", "\r", "\n"] {
            client.send(piece).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(
            client.line().await,
            "250 Message accepted for delivery\r\n"
        );

        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].body, b"Subject: x\r\n\r\n.dot\r\n");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_mid_data_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let oracle = Canned::new(Some(false));
        let ctx = Arc::new(context(oracle.clone(), store.clone()));
        let (mut client, handle) = connect(ctx);

        open_transaction(&mut client).await;
        client.send("half a message\r\n").await;
        drop(client);

        handle.await.unwrap().unwrap();
        assert!(store.messages().is_empty());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn idle_client_is_timed_out() {
        let mut ctx =
            context(Canned::new(Some(false)), Arc::new(MemoryStore::new()));
        ctx.idle_timeout = Duration::from_millis(50);
        let (mut client, handle) = connect(Arc::new(ctx));

        assert_eq!(client.line().await, "220 mx.test ESMTP Ready\r\n");
        assert_eq!(
            client.line().await,
            "421 mx.test Timeout, closing connection\r\n"
        );
        assert!(matches!(
            handle.await.unwrap(),
            Err(SmtpError::Timeout(_))
        ));
    }
}
