use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type EventId = i64;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub vote_count: i64,
}

impl Event {
    pub fn requires_password(&self) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|hash| !hash.trim().is_empty())
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            date: self.date.clone(),
            vote_count: self.vote_count,
        }
    }
}

/// Public projection of an event: no password hash, no voter identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EventSummary {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub exported_at: DateTime<Utc>,
    pub events: Vec<EventSummary>,
}
