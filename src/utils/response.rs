use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

fn envelope<T: Serialize>(data: Option<T>, message: impl Into<String>) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data,
        message: Some(message.into()),
    }
}

pub fn success<T>(data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    (StatusCode::OK, Json(envelope(Some(data), message))).into_response()
}

pub fn created<T>(data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    (StatusCode::CREATED, Json(envelope(Some(data), message))).into_response()
}

pub fn empty_success(message: impl Into<String>) -> Response {
    (StatusCode::OK, Json(envelope::<()>(None, message))).into_response()
}

/// Serves `data` as a downloadable JSON file.
pub fn attachment<T>(data: T, filename: &str) -> Response
where
    T: Serialize,
{
    let mut response = (StatusCode::OK, Json(data)).into_response();
    let disposition = format!("attachment; filename=\"{}\"", filename);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<Value>,
    status: StatusCode,
) -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    };

    (status, Json(body)).into_response()
}
