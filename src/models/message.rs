/*!
 * # This model works on top of the `emails` SQL table
 *
 * ```sql
 *    CREATE TABLE "emails" (
 *        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
 *        "sender" TEXT NOT NULL,
 *        "recipient" TEXT NOT NULL,
 *        "subject" TEXT,
 *        "body" TEXT NOT NULL,
 *        "received_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
 *        "status" TEXT NOT NULL DEFAULT 'queued',
 *        "spam_score" REAL NOT NULL DEFAULT 0
 *    );
 * ```
*/

use sqlx::FromRow;

use crate::database::Pool;
use crate::smtp::parse::extract_subject;
use crate::store::Email;
use crate::time::{sqlite_datetime_to_rfc3339, sqlite_now};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Message {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub received_at: String,
    /// Delivery status, `queued` on arrival.
    pub status: String,
    pub spam_score: f64,
}

impl Message {
    pub(crate) const CREATE_TABLE: &'static str = concat!(
        r#"CREATE TABLE IF NOT EXISTS "emails" ("#,
        r#""id" INTEGER PRIMARY KEY AUTOINCREMENT, "#,
        r#""sender" TEXT NOT NULL, "#,
        r#""recipient" TEXT NOT NULL, "#,
        r#""subject" TEXT, "#,
        r#""body" TEXT NOT NULL, "#,
        r#""received_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, "#,
        r#""status" TEXT NOT NULL DEFAULT 'queued', "#,
        r#""spam_score" REAL NOT NULL DEFAULT 0);"#
    );

    /// Saves an accepted [`Email`] with the default `queued` status and
    /// returns the new row id.
    pub async fn insert(
        email: &Email,
        spam_score: f64,
        pool: &Pool,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(concat!(
            r#"INSERT INTO "emails" "#,
            r#"("sender", "recipient", "subject", "body", "received_at", "#,
            r#""spam_score") "#,
            r#"VALUES (?1, ?2, ?3, ?4, ?5, ?6);"#
        ))
        .bind(&email.sender)
        .bind(&email.recipient)
        .bind(extract_subject(&email.body))
        .bind(String::from_utf8_lossy(&email.body).into_owned())
        .bind(sqlite_now())
        .bind(spam_score)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Returns every stored [`Message`], oldest first.
    pub async fn all(pool: &Pool) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(concat!(
            r#"SELECT id, sender, recipient, subject, body, received_at, "#,
            r#"status, spam_score FROM emails ORDER BY id"#
        ))
        .fetch_all(pool)
        .await
    }

    /// Returns all [`Message`] records addressed to `recipient`.
    pub async fn find_by_recipient(
        recipient: &str,
        pool: &Pool,
    ) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(concat!(
            r#"SELECT id, sender, recipient, subject, body, received_at, "#,
            r#"status, spam_score FROM emails WHERE recipient = ?1 "#,
            r#"ORDER BY id"#
        ))
        .bind(recipient)
        .fetch_all(pool)
        .await
    }

    /// `received_at` as RFC 3339, `None` if the column holds garbage.
    pub fn received_at_rfc3339(&self) -> Option<String> {
        sqlite_datetime_to_rfc3339(&self.received_at).ok()
    }
}
