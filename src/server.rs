//! HTTP API
//!
//! - `POST /api/index-schema` rebuilds the stored schema
//! - `GET /api/schema-status` reports what is indexed
//! - `POST /api/chat` answers one message given prior turns

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::QueryBridgeError;
use crate::indexer::SchemaIndexer;
use crate::models::ConversationTurn;
use crate::service::{ChatOutcome, ChatService, FailureKind};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub indexer: Arc<SchemaIndexer>,
    pub service: Arc<ChatService>,
}

/// Index trigger response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Schema status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    pub message: String,
}

/// Chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

/// Chat response; which fields are present depends on the outcome
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversational: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Map<String, Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_firewall_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_safety_blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_ip: Option<String>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/index-schema", post(index_schema))
        .route("/api/schema-status", get(schema_status))
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Rebuild the stored schema
pub async fn index_schema(State(state): State<AppState>) -> (StatusCode, Json<IndexResponse>) {
    match state.indexer.index().await {
        Ok(schema) => (
            StatusCode::OK,
            Json(IndexResponse {
                success: true,
                message: format!("{} tables indexed", schema.tables.len()),
                tables_count: Some(schema.tables.len()),
                indexed_at: Some(schema.indexed_at),
            }),
        ),
        Err(e) => {
            error!(error = %e, "Schema indexing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(IndexResponse { success: false, message: e.to_string(), tables_count: None, indexed_at: None }),
            )
        },
    }
}

/// Report the stored schema
pub async fn schema_status(State(state): State<AppState>) -> (StatusCode, Json<StatusResponse>) {
    match state.service.status().await {
        Ok(status) if status.indexed_at.is_some() => (
            StatusCode::OK,
            Json(StatusResponse {
                indexed: status.indexed,
                tables_count: Some(status.tables_count),
                indexed_at: status.indexed_at,
                message: format!("{} tables indexed", status.tables_count),
            }),
        ),
        Ok(_) => (
            StatusCode::OK,
            Json(StatusResponse {
                indexed: false,
                tables_count: None,
                indexed_at: None,
                message: "No schema indexed".to_string(),
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusResponse { indexed: false, tables_count: None, indexed_at: None, message: e.to_string() }),
        ),
    }
}

/// Answer one chat message
pub async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> (StatusCode, Json<ChatResponse>) {
    match state.service.chat(&req.message, &req.history).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            let status = match e {
                QueryBridgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error!(error = %e, "Chat request failed");
            (status, Json(ChatResponse { success: false, message: Some(e.to_string()), ..ChatResponse::default() }))
        },
    }
}

/// Map a chat outcome onto its status code and body
pub fn outcome_response(outcome: ChatOutcome) -> (StatusCode, Json<ChatResponse>) {
    match outcome {
        ChatOutcome::Conversational { message } => (
            StatusCode::OK,
            Json(ChatResponse {
                success: true,
                conversational: Some(true),
                message: Some(message),
                ..ChatResponse::default()
            }),
        ),
        ChatOutcome::Answer { sql, rows, explanation } => (
            StatusCode::OK,
            Json(ChatResponse {
                success: true,
                sql: Some(sql),
                row_count: Some(rows.row_count()),
                truncated: Some(rows.truncated),
                data: Some(rows.rows),
                explanation: Some(explanation),
                ..ChatResponse::default()
            }),
        ),
        ChatOutcome::Failed(failure) => {
            let status = match failure.kind {
                FailureKind::SchemaNotIndexed | FailureKind::SafetyBlocked { .. } => StatusCode::BAD_REQUEST,
                FailureKind::ConnectivityBlocked { .. } => StatusCode::FORBIDDEN,
                FailureKind::ExecutionFailed { .. } | FailureKind::EmptyResultAnomaly => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            };
            let detected_ip = match &failure.kind {
                FailureKind::ConnectivityBlocked { detected_ip } => detected_ip.clone(),
                _ => None,
            };
            (
                status,
                Json(ChatResponse {
                    success: false,
                    message: Some(failure.message),
                    sql: failure.sql,
                    error_kind: Some(failure.kind.label()),
                    is_firewall_error: Some(matches!(failure.kind, FailureKind::ConnectivityBlocked { .. })),
                    is_safety_blocked: Some(matches!(failure.kind, FailureKind::SafetyBlocked { .. })),
                    detected_ip,
                    ..ChatResponse::default()
                }),
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ChatFailure;

    #[test]
    fn test_connectivity_maps_to_forbidden() {
        let outcome = ChatOutcome::Failed(ChatFailure::new(
            FailureKind::ConnectivityBlocked { detected_ip: Some("198.51.100.4".to_string()) },
            Some("SELECT 1".to_string()),
        ));
        let (status, Json(body)) = outcome_response(outcome);
        assert_eq!(status, StatusCode::FORBIDDEN);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["isFirewallError"], true);
        assert_eq!(json["isSafetyBlocked"], false);
        assert_eq!(json["detectedIp"], "198.51.100.4");
        assert_eq!(json["errorKind"], "connectivity_blocked");
        assert_eq!(json["sql"], "SELECT 1");
    }

    #[test]
    fn test_conversational_body_is_minimal() {
        let (status, Json(body)) = outcome_response(ChatOutcome::Conversational { message: "Hello".to_string() });
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"success": true, "conversational": true, "message": "Hello"})
        );
    }

    #[test]
    fn test_empty_result_anomaly_is_server_error() {
        let outcome = ChatOutcome::Failed(ChatFailure::new(FailureKind::EmptyResultAnomaly, None));
        let (status, _) = outcome_response(outcome);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
