use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;

use crate::models::{EventId, NewVote};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::created;

pub async fn cast_vote(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(payload): Json<NewVote>,
) -> Result<Response, AppError> {
    let receipt = state
        .admission
        .cast_vote(event_id, &payload.email, payload.password.as_deref())
        .await?;

    Ok(created(receipt, "Your vote has been recorded!"))
}
