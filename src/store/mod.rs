//! SQLite-backed event store: the single source of truth for events and votes.

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::{Config, PasswordlessDelete};
use crate::models::{Event, EventId, EventSummary, ExportSnapshot, NewEvent, VoteReceipt};
use crate::utils::error::AppError;
use crate::utils::password;

mod legacy;
mod migrate;

pub use legacy::ImportReport;
pub use migrate::MigrationReport;

/// Opens the connection pool, creating the database file if needed.
/// Foreign keys are enforced on every connection so votes cascade with their event.
pub async fn connect_pool(config: &Config) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
}

#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
    passwordless_delete: PasswordlessDelete,
}

impl EventStore {
    pub fn new(pool: SqlitePool, passwordless_delete: PasswordlessDelete) -> Self {
        Self {
            pool,
            passwordless_delete,
        }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_event(&self, new_event: NewEvent) -> Result<EventId, AppError> {
        let title = new_event.title.trim();
        if title.is_empty() {
            return Err(AppError::ValidationError("Event title is required".to_string()));
        }
        let date = new_event.date.trim();
        if date.is_empty() {
            return Err(AppError::ValidationError("Event date is required".to_string()));
        }
        let description = new_event
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        let password_hash = match password::supplied(new_event.password.as_deref()) {
            Some(raw) => Some(password::hash_password_blocking(raw.to_string()).await?),
            None => None,
        };

        let id: EventId = sqlx::query_scalar(
            "INSERT INTO events (title, description, date, password_hash, vote_count) \
             VALUES (?, ?, ?, ?, 0) RETURNING id",
        )
        .bind(title)
        .bind(description)
        .bind(date)
        .bind(password_hash.as_deref())
        .fetch_one(&self.pool)
        .await?;

        info!(
            event_id = id,
            protected = password_hash.is_some(),
            "Event created"
        );
        Ok(id)
    }

    /// All events ordered by date, then id.
    pub async fn list_events(&self) -> Result<Vec<EventSummary>, AppError> {
        let events = sqlx::query_as::<_, EventSummary>(
            "SELECT id, title, description, date, vote_count FROM events ORDER BY date ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn get_event(&self, id: EventId) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, title, description, date, password_hash, vote_count FROM events WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Deletes an event and, through the foreign key, all of its votes.
    pub async fn delete_event(&self, id: EventId, password: Option<&str>) -> Result<(), AppError> {
        let event = self.get_event(id).await?.ok_or_else(|| event_not_found(id))?;

        match event.password_hash.filter(|hash| !hash.trim().is_empty()) {
            Some(stored_hash) => {
                let raw = password::supplied(password).ok_or(AppError::IncorrectPassword)?;
                if !password::verify_password_blocking(raw.to_string(), stored_hash).await? {
                    return Err(AppError::IncorrectPassword);
                }
            }
            None if self.passwordless_delete == PasswordlessDelete::Forbid => {
                return Err(AppError::Forbidden(
                    "Events without a password cannot be deleted".to_string(),
                ));
            }
            None => {}
        }

        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(event_not_found(id));
        }

        info!(event_id = id, "Event deleted");
        Ok(())
    }

    pub async fn export(&self) -> Result<ExportSnapshot, AppError> {
        Ok(ExportSnapshot {
            exported_at: Utc::now(),
            events: self.list_events().await?,
        })
    }

    /// Inserts the vote and bumps the event's count in one transaction.
    ///
    /// Duplicates are detected by the `(event_id, email)` unique constraint rather than a
    /// lookup, so two concurrent attempts by the same voter cannot both succeed.
    pub(crate) async fn record_vote(
        &self,
        event_id: EventId,
        email: &str,
    ) -> Result<VoteReceipt, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted =
            sqlx::query("INSERT INTO votes (event_id, email, created_at) VALUES (?, ?, ?)")
                .bind(event_id)
                .bind(email)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await;

        if let Err(e) = inserted {
            return Err(match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::AlreadyVoted,
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    event_not_found(event_id)
                }
                other => other.into(),
            });
        }

        let vote_count: i64 = sqlx::query_scalar(
            "UPDATE events SET vote_count = vote_count + 1 WHERE id = ? RETURNING vote_count",
        )
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(VoteReceipt {
            event_id,
            email: email.to_string(),
            vote_count,
        })
    }

    /// Number of vote rows referencing `event_id`.
    pub async fn count_votes(&self, event_id: EventId) -> Result<i64, AppError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE event_id = ?")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

pub(crate) fn event_not_found(id: EventId) -> AppError {
    AppError::NotFound(format!("Event with id '{}' was not found", id))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A migrated store on a private in-memory database.
    pub async fn memory_store(passwordless_delete: PasswordlessDelete) -> EventStore {
        let store = EventStore::new(memory_pool().await, passwordless_delete);
        store.migrate().await.expect("migrate in-memory store");
        store
    }

    /// A single-connection in-memory pool. The connection is never recycled, since
    /// dropping it would drop the database.
    pub async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .expect("open in-memory sqlite")
    }

    /// A SQLite file in the temp directory, removed with its journal files on drop.
    pub struct TempDatabase {
        path: std::path::PathBuf,
    }

    impl TempDatabase {
        pub fn new(label: &str) -> Self {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            let path = std::env::temp_dir().join(format!(
                "eventvote-{}-{}-{}.db",
                label,
                std::process::id(),
                nanos
            ));
            Self { path }
        }

        /// Opens a migrated store through [`connect_pool`] with `connections` pooled
        /// connections, so transactions really run side by side.
        pub async fn store(&self, connections: u32) -> EventStore {
            let config = Config {
                database_url: format!("sqlite://{}", self.path.display()),
                max_connections: connections,
                ..Config::default()
            };
            let pool = connect_pool(&config).await.expect("open file database");
            let store = EventStore::new(pool, PasswordlessDelete::Forbid);
            store.migrate().await.expect("migrate file database");
            store
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm", "-journal"] {
                let mut file = self.path.clone().into_os_string();
                file.push(suffix);
                let _ = std::fs::remove_file(file);
            }
        }
    }

    pub fn new_event(title: &str, date: &str, password: Option<&str>) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            description: Some(format!("{} description", title)),
            date: date.to_string(),
            password: password.map(str::to_string),
        }
    }
}
