use tracing::{info, warn};

use super::EventStore;
use crate::models::EventId;
use crate::utils::error::AppError;
use crate::utils::password::{self, StoredPassword};

const CREATE_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    date TEXT NOT NULL,
    password_hash TEXT,
    vote_count INTEGER NOT NULL DEFAULT 0 CHECK (vote_count >= 0)
)
"#;

const CREATE_VOTES: &str = r#"
CREATE TABLE IF NOT EXISTS votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events (id) ON DELETE CASCADE,
    email TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (event_id, email)
)
"#;

const RECONCILE_VOTE_COUNTS: &str = r#"
UPDATE events
SET vote_count = (SELECT COUNT(*) FROM votes WHERE votes.event_id = events.id)
WHERE vote_count <> (SELECT COUNT(*) FROM votes WHERE votes.event_id = events.id)
"#;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub columns_added: Vec<&'static str>,
    pub legacy_passwords_moved: u64,
    pub passwords_hashed: usize,
    /// Of `passwords_hashed`, values that carried the Argon2 prefix without parsing.
    pub malformed_hashed: usize,
    pub blank_passwords_cleared: usize,
    pub rows_skipped: usize,
    pub vote_counts_reconciled: u64,
}

impl EventStore {
    /// Brings the schema up to date. Safe to run on every startup.
    pub async fn migrate(&self) -> Result<MigrationReport, AppError> {
        let mut report = MigrationReport::default();

        sqlx::query(CREATE_EVENTS).execute(&self.pool).await?;
        sqlx::query(CREATE_VOTES).execute(&self.pool).await?;

        self.upgrade_legacy_columns(&mut report).await?;
        self.hash_stored_passwords(&mut report).await?;

        report.vote_counts_reconciled = sqlx::query(RECONCILE_VOTE_COUNTS)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if report.vote_counts_reconciled > 0 {
            warn!(
                events = report.vote_counts_reconciled,
                "Reconciled vote counts that drifted from the votes table"
            );
        }

        info!(?report, "Schema migration complete");
        Ok(report)
    }

    /// Early `events` tables had a `votes` count and, later, a plaintext `password` column.
    async fn upgrade_legacy_columns(&self, report: &mut MigrationReport) -> Result<(), AppError> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('events')")
                .fetch_all(&self.pool)
                .await?;
        let has = |name: &str| columns.iter().any(|c| c == name);

        if !has("password_hash") {
            sqlx::query("ALTER TABLE events ADD COLUMN password_hash TEXT")
                .execute(&self.pool)
                .await?;
            report.columns_added.push("password_hash");
        }
        if !has("vote_count") {
            sqlx::query("ALTER TABLE events ADD COLUMN vote_count INTEGER NOT NULL DEFAULT 0")
                .execute(&self.pool)
                .await?;
            report.columns_added.push("vote_count");
        }

        if has("password") {
            // Plaintext moves into password_hash, where the hashing pass picks it up.
            let mut tx = self.pool.begin().await?;
            report.legacy_passwords_moved = sqlx::query(
                "UPDATE events SET password_hash = password \
                 WHERE password_hash IS NULL AND password IS NOT NULL AND TRIM(password) <> ''",
            )
            .execute(&mut *tx)
            .await?
            .rows_affected();
            sqlx::query("UPDATE events SET password = '' WHERE password IS NOT NULL AND password <> ''")
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        if !report.columns_added.is_empty() || report.legacy_passwords_moved > 0 {
            info!(
                columns = ?report.columns_added,
                passwords_moved = report.legacy_passwords_moved,
                "Upgraded legacy events table"
            );
        }
        Ok(())
    }

    /// Rewrites plaintext passwords as Argon2 hashes. Each row is handled on its own so
    /// one bad value does not stop the rest.
    async fn hash_stored_passwords(&self, report: &mut MigrationReport) -> Result<(), AppError> {
        let rows: Vec<(EventId, String)> =
            sqlx::query_as("SELECT id, password_hash FROM events WHERE password_hash IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;

        for (id, stored) in rows {
            let kind = password::classify(&stored);
            match kind {
                StoredPassword::Hashed => {}
                StoredPassword::Blank => match self.replace_password(id, &stored, None).await {
                    Ok(true) => report.blank_passwords_cleared += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(event_id = id, error = %e, "Failed to clear blank password");
                        report.rows_skipped += 1;
                    }
                },
                StoredPassword::Malformed | StoredPassword::Plaintext => {
                    // A value we hashed always parses, so an unparseable "$argon2..." is
                    // a plaintext password that happens to share the prefix.
                    if kind == StoredPassword::Malformed {
                        warn!(
                            event_id = id,
                            "Stored password has an Argon2 prefix but does not parse, hashing it as plaintext"
                        );
                    }
                    let rewritten = match password::hash_password_blocking(stored.clone()).await {
                        Ok(hash) => self.replace_password(id, &stored, Some(&hash)).await,
                        Err(e) => Err(e),
                    };
                    match rewritten {
                        Ok(true) => {
                            report.passwords_hashed += 1;
                            if kind == StoredPassword::Malformed {
                                report.malformed_hashed += 1;
                            }
                        }
                        Ok(false) => {}
                        Err(e) => {
                            warn!(event_id = id, error = %e, "Failed to hash legacy password");
                            report.rows_skipped += 1;
                        }
                    }
                }
            }
        }

        if report.passwords_hashed > 0 {
            info!(count = report.passwords_hashed, "Hashed legacy plaintext passwords");
        }
        Ok(())
    }

    /// Compare-and-swap on the stored value so a concurrent run cannot hash a hash.
    async fn replace_password(
        &self,
        id: EventId,
        expected: &str,
        replacement: Option<&str>,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE events SET password_hash = ? WHERE id = ? AND password_hash = ?")
                .bind(replacement)
                .bind(id)
                .bind(expected)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
