use crate::models::{self, Enrichment};
use anyhow::{Context, Result};
use sqlx::{Row, sqlite::SqlitePool};

/// Last-fetched, enriched list per folder. Only used to paint the first frame;
/// a fresh provider fetch always overwrites it.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open cache at {}", database_url))?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");
        sqlx::query(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn save_folder(&self, folder: &str, messages: &[models::Message]) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cached_messages WHERE folder = ?")
            .bind(folder)
            .execute(&mut *tx)
            .await?;

        for (position, msg) in messages.iter().enumerate() {
            let enrichment = msg
                .enrichment
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("Failed to serialize enrichment")?;

            sqlx::query(
                "INSERT OR REPLACE INTO cached_messages (folder, position, id, thread_id, subject, from_name, from_address, to_address, cc, date, snippet, body, has_attachment, is_unread, is_starred, enrichment, cached_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            )
            .bind(folder)
            .bind(position as i64)
            .bind(&msg.id)
            .bind(&msg.thread_id)
            .bind(&msg.subject)
            .bind(&msg.from)
            .bind(&msg.from_address)
            .bind(&msg.to)
            .bind(&msg.cc)
            .bind(&msg.date)
            .bind(&msg.snippet)
            .bind(&msg.body)
            .bind(msg.has_attachment)
            .bind(msg.is_unread)
            .bind(msg.is_starred)
            .bind(enrichment)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn load_folder(&self, folder: &str) -> Result<Vec<models::Message>> {
        let rows = sqlx::query(
            "SELECT id, thread_id, subject, from_name, from_address, to_address, cc, date, snippet, body, has_attachment, is_unread, is_starred, enrichment
             FROM cached_messages
             WHERE folder = ?
             ORDER BY position ASC",
        )
        .bind(folder)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|row| {
                let enrichment: Option<String> = row.get(13);
                models::Message {
                    id: row.get(0),
                    thread_id: row.get(1),
                    subject: row.get(2),
                    from: row.get(3),
                    from_address: row.get(4),
                    to: row.get(5),
                    cc: row.get(6),
                    date: row.get(7),
                    snippet: row.get(8),
                    body: row.get(9),
                    has_attachment: row.get(10),
                    is_unread: row.get(11),
                    is_starred: row.get(12),
                    // A row written by an older build may not parse; treat it as unenriched.
                    enrichment: enrichment
                        .and_then(|json| serde_json::from_str::<Enrichment>(&json).ok()),
                }
            })
            .collect();

        Ok(messages)
    }

    pub async fn clear_folder(&self, folder: &str) -> Result<()> {
        sqlx::query("DELETE FROM cached_messages WHERE folder = ?")
            .bind(folder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
