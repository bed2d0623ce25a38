use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StorageError;
use crate::history::ChatStore;
use crate::model::{ChatMessage, Feedback, Role};

type MessageRow = (String, String, String, String, Option<String>, String);

pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl ChatStore for SqliteChatStore {
    fn append(&self, message: &ChatMessage) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let message = message.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO chat_messages (id, symbol, role, content, feedback, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(message.id.to_string())
            .bind(&message.symbol)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.feedback.map(Feedback::as_str))
            .bind(message.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)
            .attach_with(|| format!("symbol: {}", message.symbol))?;
            Ok(())
        })
    }

    fn messages(
        &self,
        symbol: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ChatMessage>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<MessageRow> = sqlx::query_as(
                "SELECT id, symbol, role, content, feedback, created_at \
                 FROM chat_messages \
                 WHERE symbol = ? \
                 ORDER BY seq DESC \
                 LIMIT ?",
            )
            .bind(&symbol)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            let mut messages = rows
                .into_iter()
                .map(message_from_row)
                .collect::<Result<Vec<_>, _>>()?;

            // Return in ascending order (oldest first)
            messages.reverse();
            Ok(messages)
        })
    }

    fn clear(&self, symbol: &str) -> BoxFuture<'_, Result<u64, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM chat_messages WHERE symbol = ?")
                .bind(&symbol)
                .execute(&self.pool)
                .await
                .change_context(StorageError::Query)?;
            Ok(result.rows_affected())
        })
    }

    fn set_feedback(
        &self,
        id: Uuid,
        feedback: Feedback,
    ) -> BoxFuture<'_, Result<bool, Report<StorageError>>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE chat_messages SET feedback = ? WHERE id = ?")
                .bind(feedback.as_str())
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .change_context(StorageError::Insert)?;
            Ok(result.rows_affected() > 0)
        })
    }
}

fn message_from_row(row: MessageRow) -> Result<ChatMessage, Report<StorageError>> {
    let (id, symbol, role, content, feedback, created_at) = row;

    let id = Uuid::parse_str(&id)
        .change_context(StorageError::Query)
        .attach_with(|| format!("invalid message id: {id}"))?;
    let role = Role::from_str(&role)
        .ok_or_else(|| Report::new(StorageError::Query).attach(format!("unknown role: {role}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .change_context(StorageError::Query)?
        .with_timezone(&Utc);

    Ok(ChatMessage {
        id,
        symbol,
        role,
        content,
        feedback: feedback.as_deref().and_then(Feedback::from_str),
        created_at,
    })
}
