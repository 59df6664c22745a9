use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::models::{DeleteEvent, EventId, NewEvent};
use crate::state::AppState;
use crate::store::event_not_found;
use crate::utils::error::AppError;
use crate::utils::response::{attachment, created, empty_success, success};

const EXPORT_FILENAME: &str = "events-export.json";

#[derive(Serialize)]
struct CreatedEvent {
    id: EventId,
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.store.list_events().await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(payload): Json<NewEvent>,
) -> Result<Response, AppError> {
    let id = state.store.create_event(payload).await?;
    Ok(created(CreatedEvent { id }, "Event created successfully"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<Response, AppError> {
    let event = state
        .store
        .get_event(id)
        .await?
        .ok_or_else(|| event_not_found(id))?;

    Ok(success(event.summary(), "Event retrieved"))
}

/// The body is optional; a bare `DELETE` counts as "no password".
pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    payload: Option<Json<DeleteEvent>>,
) -> Result<Response, AppError> {
    let password = payload.and_then(|Json(body)| body.password);
    state.store.delete_event(id, password.as_deref()).await?;
    Ok(empty_success("Event deleted"))
}

pub async fn export_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let snapshot = state.store.export().await?;
    Ok(attachment(snapshot, EXPORT_FILENAME))
}
