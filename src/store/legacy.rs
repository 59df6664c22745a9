//! One-time import of the old `events.json` file layout:
//!
//! ```json
//! { "1": { "title": "...", "description": "...", "date": "...",
//!          "votes": ["a@x.com"], "password": "plaintext" } }
//! ```
//!
//! Imported events keep their ids. When a row with the same id already exists (older
//! deployments mirrored the JSON into an `events` table without passwords or voters),
//! the missing password hash and votes are merged into it. A password hash that is
//! already set is never replaced, and votes are de-duplicated by the unique constraint,
//! so importing the same file twice is harmless.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::EventStore;
use crate::models::{normalize_email, EventId};
use crate::utils::error::AppError;
use crate::utils::password;

#[derive(Debug, Deserialize)]
struct LegacyEvent {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    votes: Vec<String>,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Existing rows that gained a password hash or voters from the file.
    pub merged: usize,
    pub already_present: usize,
    pub skipped: usize,
}

enum ImportOutcome {
    Created,
    Merged,
    Unchanged,
}

impl EventStore {
    pub async fn import_legacy_file(&self, path: &Path) -> Result<ImportReport, AppError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::InternalServerError(format!("failed to read {}: {}", path.display(), e))
        })?;

        self.import_legacy_json(&raw).await
    }

    pub async fn import_legacy_json(&self, raw: &str) -> Result<ImportReport, AppError> {
        let entries: BTreeMap<String, LegacyEvent> = serde_json::from_str(raw).map_err(|e| {
            AppError::ValidationError(format!("legacy events file is not valid JSON: {}", e))
        })?;

        let mut report = ImportReport::default();
        for (key, legacy) in entries {
            let Ok(id) = key.trim().parse::<EventId>() else {
                warn!(key = %key, "Skipping legacy event with a non-numeric id");
                report.skipped += 1;
                continue;
            };
            if legacy.title.trim().is_empty() || legacy.date.trim().is_empty() {
                warn!(event_id = id, "Skipping legacy event without a title or date");
                report.skipped += 1;
                continue;
            }

            match self.import_event(id, legacy).await {
                Ok(ImportOutcome::Created) => report.imported += 1,
                Ok(ImportOutcome::Merged) => report.merged += 1,
                Ok(ImportOutcome::Unchanged) => report.already_present += 1,
                Err(e) => {
                    warn!(event_id = id, error = %e, "Failed to import legacy event");
                    report.skipped += 1;
                }
            }
        }

        info!(?report, "Legacy JSON import finished");
        Ok(report)
    }

    /// Creates the event, or fills in what an existing row of the same id is missing.
    /// Rows mirrored from the JSON file by older deployments carry neither the password
    /// nor the voters.
    async fn import_event(
        &self,
        id: EventId,
        legacy: LegacyEvent,
    ) -> Result<ImportOutcome, AppError> {
        let existing: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_hash FROM events WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let gated = matches!(&existing, Some(Some(hash)) if !hash.trim().is_empty());

        let password_hash = match password::supplied(Some(legacy.password.as_str())) {
            Some(raw) if !gated => Some(password::hash_password_blocking(raw.to_string()).await?),
            _ => None,
        };
        let description = Some(legacy.description.trim()).filter(|d| !d.is_empty());

        let mut tx = self.pool.begin().await?;

        let created = if existing.is_none() {
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO events (id, title, description, date, password_hash, vote_count) \
                 VALUES (?, ?, ?, ?, ?, 0)",
            )
            .bind(id)
            .bind(legacy.title.trim())
            .bind(description)
            .bind(legacy.date.trim())
            .bind(password_hash.as_deref())
            .execute(&mut *tx)
            .await?;
            inserted.rows_affected() > 0
        } else {
            false
        };

        let mut changed = created;
        if !created {
            if let Some(hash) = password_hash.as_deref() {
                changed |= sqlx::query(
                    "UPDATE events SET password_hash = ? \
                     WHERE id = ? AND (password_hash IS NULL OR TRIM(password_hash) = '')",
                )
                .bind(hash)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                    > 0;
            }
        }

        let now = Utc::now();
        for email in legacy.votes.iter().map(|e| normalize_email(e)) {
            if email.is_empty() {
                continue;
            }
            changed |= sqlx::query(
                "INSERT OR IGNORE INTO votes (event_id, email, created_at) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(&email)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;
        }

        sqlx::query(
            "UPDATE events SET vote_count = (SELECT COUNT(*) FROM votes WHERE event_id = ?) \
             WHERE id = ?",
        )
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(match (created, changed) {
            (true, _) => ImportOutcome::Created,
            (false, true) => ImportOutcome::Merged,
            (false, false) => ImportOutcome::Unchanged,
        })
    }
}
