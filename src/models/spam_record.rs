/*!
 * # This model works on top of the `spam_logs` SQL table
 *
 * ```sql
 *    CREATE TABLE "spam_logs" (
 *        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
 *        "sender" TEXT NOT NULL,
 *        "recipient" TEXT NOT NULL,
 *        "body" TEXT NOT NULL,
 *        "logged_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
 *        "spam_score" REAL NOT NULL DEFAULT 1
 *    );
 * ```
*/

use sqlx::FromRow;

use crate::database::Pool;
use crate::store::Email;
use crate::time::sqlite_now;

/// Audit entry for a message rejected as spam.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SpamRecord {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub logged_at: String,
    pub spam_score: f64,
}

impl SpamRecord {
    pub(crate) const CREATE_TABLE: &'static str = concat!(
        r#"CREATE TABLE IF NOT EXISTS "spam_logs" ("#,
        r#""id" INTEGER PRIMARY KEY AUTOINCREMENT, "#,
        r#""sender" TEXT NOT NULL, "#,
        r#""recipient" TEXT NOT NULL, "#,
        r#""body" TEXT NOT NULL, "#,
        r#""logged_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, "#,
        r#""spam_score" REAL NOT NULL DEFAULT 1);"#
    );

    pub async fn insert(
        email: &Email,
        spam_score: f64,
        pool: &Pool,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(concat!(
            r#"INSERT INTO "spam_logs" "#,
            r#"("sender", "recipient", "body", "logged_at", "spam_score") "#,
            r#"VALUES (?1, ?2, ?3, ?4, ?5);"#
        ))
        .bind(&email.sender)
        .bind(&email.recipient)
        .bind(String::from_utf8_lossy(&email.body).into_owned())
        .bind(sqlite_now())
        .bind(spam_score)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn all(pool: &Pool) -> Result<Vec<SpamRecord>, sqlx::Error> {
        sqlx::query_as::<_, SpamRecord>(concat!(
            r#"SELECT id, sender, recipient, body, logged_at, spam_score "#,
            r#"FROM spam_logs ORDER BY id"#
        ))
        .fetch_all(pool)
        .await
    }
}
