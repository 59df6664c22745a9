use serde::{Deserialize, Serialize};

use super::event::EventId;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewVote {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Returned when a vote is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteReceipt {
    pub event_id: EventId,
    pub email: String,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteEvent {
    #[serde(default)]
    pub password: Option<String>,
}

/// Lower-cases and trims an email so that `A@X.com ` and `a@x.com` are the same voter.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
