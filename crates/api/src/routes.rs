//! HTTP route handlers for the API.

use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use companion_common::{ChatTurn, CompanionError, EmotionRecord};
use companion_coordinator::{ChatOutcome, Coaching, EmotionAnalysis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub llm_model: String,
    pub classifier: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        llm_model: state.coordinator.llm_model().to_string(),
        classifier: state.coordinator.classifier_name().to_string(),
    })
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<CompanionError> for ErrorResponse {
    fn from(err: CompanionError) -> Self {
        let (status, code) = match &err {
            CompanionError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            CompanionError::Upstream { .. }
            | CompanionError::Llm(_)
            | CompanionError::Classifier(_)
            | CompanionError::Embedding(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            error!(error = %err, code, "Request failed");
        } else {
            warn!(error = %err, code, "Request rejected");
        }

        Self {
            status,
            error: err.to_string(),
            code,
        }
    }
}

impl From<JsonRejection> for ErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "Malformed request body");
        Self {
            status: StatusCode::BAD_REQUEST,
            error: rejection.body_text(),
            code: "INVALID_REQUEST",
        }
    }
}

type ApiResult<T> = Result<Json<T>, ErrorResponse>;

/// `{status: "success", data}` wrapper used by the chat and analysis routes.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> Envelope<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_name: String,
    pub message: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Envelope<ChatOutcome>> {
    let Json(request) = body?;
    info!(
        user = %request.user_name,
        message_preview = %request.message.chars().take(50).collect::<String>(),
        "Received chat message"
    );

    let outcome = state
        .coordinator
        .chat(&request.user_name, &request.message)
        .await?;
    Ok(Envelope::success(outcome))
}

#[derive(Debug, Deserialize)]
pub struct EmotionRequest {
    pub user_name: String,
    pub text: String,
}

pub async fn analyze_emotion(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EmotionRequest>, JsonRejection>,
) -> ApiResult<Envelope<EmotionAnalysis>> {
    let Json(request) = body?;
    let analysis = state
        .coordinator
        .analyze_emotion(&request.user_name, &request.text)
        .await?;
    Ok(Envelope::success(analysis))
}

#[derive(Debug, Serialize)]
pub struct EmotionsResponse {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotions: Option<Vec<EmotionRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

pub async fn recent_emotions(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
) -> ApiResult<EmotionsResponse> {
    let emotions = state.coordinator.recent_emotions(&user_name).await?;
    // report the name the records were looked up under
    let user_name = user_name.trim().to_string();

    let response = if emotions.is_empty() {
        EmotionsResponse {
            user: user_name,
            emotions: None,
            message: Some("No emotion records."),
        }
    } else {
        EmotionsResponse {
            user: user_name,
            emotions: Some(emotions),
            message: None,
        }
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct CoachRequest {
    pub text: String,
}

pub async fn coach(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CoachRequest>, JsonRejection>,
) -> ApiResult<Coaching> {
    let Json(request) = body?;
    Ok(Json(state.coordinator.coach(&request.text).await?))
}

#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    pub user: String,
    pub messages: Vec<ChatTurn>,
}

pub async fn get_memory(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
) -> ApiResult<MemoryResponse> {
    let buffer = state.coordinator.memory(&user_name).await?;
    Ok(Json(MemoryResponse {
        user: user_name.trim().to_string(),
        messages: buffer.turns().to_vec(),
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteMemoryResponse {
    pub user: String,
    pub deleted: bool,
}

pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path(user_name): Path<String>,
) -> ApiResult<DeleteMemoryResponse> {
    let deleted = state.coordinator.reset_memory(&user_name).await?;
    Ok(Json(DeleteMemoryResponse {
        user: user_name.trim().to_string(),
        deleted,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_by_kind() {
        let validation = ErrorResponse::from(CompanionError::Validation("empty".into()));
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.code, "VALIDATION_ERROR");

        let upstream = ErrorResponse::from(CompanionError::upstream("openai", "timeout"));
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);

        let config = ErrorResponse::from(CompanionError::Config("bad database url".into()));
        assert_eq!(config.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(config.code, "INTERNAL_ERROR");
    }

    #[test]
    fn error_body_has_no_status_field() {
        let response = ErrorResponse::from(CompanionError::Validation("user_name".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }

    #[test]
    fn empty_emotions_render_message() {
        let response = EmotionsResponse {
            user: "yeonji".into(),
            emotions: None,
            message: Some("No emotion records."),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"user": "yeonji", "message": "No emotion records."})
        );
    }

    #[test]
    fn chat_request_requires_both_fields() {
        assert!(serde_json::from_str::<ChatRequest>(r#"{"user_name": "a"}"#).is_err());
        let request: ChatRequest =
            serde_json::from_str(r#"{"user_name": "a", "message": "hi"}"#).unwrap();
        assert_eq!(request.message, "hi");
    }
}
