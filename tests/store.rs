use maildrop::database::{self, Pool};
use maildrop::models::{Message, SpamRecord};
use maildrop::{Email, SqliteStore, Store};

async fn fresh_pool() -> Pool {
    let pool = database::connect_in_memory().await.unwrap();
    database::migrate(&pool).await.unwrap();
    pool
}

fn email(body: &str) -> Email {
    Email {
        sender: "x@y.com".to_owned(),
        recipient: "z@y.com".to_owned(),
        body: body.as_bytes().to_vec(),
    }
}

#[tokio::test]
async fn accepted_message_is_queued() {
    let store = SqliteStore::new(fresh_pool().await);
    let pool = store.pool();

    store
        .save_message(&email("Subject: Hello there\r\n\r\nHi\r\n"))
        .await
        .unwrap();

    let messages = Message::all(pool).await.unwrap();
    assert_eq!(messages.len(), 1);

    let message = &messages[0];
    assert_eq!(message.sender, "x@y.com");
    assert_eq!(message.recipient, "z@y.com");
    assert_eq!(message.subject.as_deref(), Some("Hello there"));
    assert_eq!(message.body, "Subject: Hello there\r\n\r\nHi\r\n");
    assert_eq!(message.status, "queued");
    assert_eq!(message.spam_score, 0.0);
    assert!(message.received_at_rfc3339().is_some());

    assert!(SpamRecord::all(pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn message_without_headers_has_no_subject() {
    let store = SqliteStore::new(fresh_pool().await);
    let pool = store.pool();

    store.save_message(&email("Hi\r\n")).await.unwrap();

    let messages = Message::all(pool).await.unwrap();
    assert_eq!(messages[0].subject, None);
}

#[tokio::test]
async fn spam_goes_to_the_audit_log_only() {
    let store = SqliteStore::new(fresh_pool().await);
    let pool = store.pool();

    store
        .save_spam_record(&email("Buy now\r\n"))
        .await
        .unwrap();

    assert!(Message::all(pool).await.unwrap().is_empty());

    let records = SpamRecord::all(pool).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "x@y.com");
    assert_eq!(records[0].recipient, "z@y.com");
    assert_eq!(records[0].body, "Buy now\r\n");
    assert_eq!(records[0].spam_score, 1.0);
}

#[tokio::test]
async fn messages_are_looked_up_by_recipient() {
    let store = SqliteStore::new(fresh_pool().await);
    let pool = store.pool();

    store.save_message(&email("one\r\n")).await.unwrap();
    store
        .save_message(&Email {
            recipient: "other@y.com".to_owned(),
            ..email("two\r\n")
        })
        .await
        .unwrap();
    store.save_message(&email("three\r\n")).await.unwrap();

    let found = Message::find_by_recipient("z@y.com", pool).await.unwrap();
    let bodies: Vec<_> = found.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["one\r\n", "three\r\n"]);
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let store = SqliteStore::new(fresh_pool().await);
    let pool = store.pool();
    store.save_message(&email("kept\r\n")).await.unwrap();

    database::migrate(pool).await.unwrap();

    assert_eq!(Message::all(pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn insert_without_tables_fails() {
    let pool = database::connect_in_memory().await.unwrap();
    let store = SqliteStore::new(pool);

    assert!(store.save_message(&email("Hi\r\n")).await.is_err());
}
