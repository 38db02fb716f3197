//! HTTP handler tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use querybridge::config::DatabaseConfig;
use querybridge::conversation::ConversationAssembler;
use querybridge::db::Database;
use querybridge::executor::{ErrorClassifier, StatementExecutor};
use querybridge::indexer::{EnumPolicy, SchemaIndexer};
use querybridge::llm::{ChatMessage, CompletionClient};
use querybridge::server::{self, AppState, ChatRequest};
use querybridge::service::{ChatService, ChatSettings};
use querybridge::store::MemorySchemaStore;
use querybridge::Result;
use rusqlite::Connection;
use serde_json::{json, Value};
use tempfile::TempDir;

struct FixedModel(&'static str);

#[async_trait]
impl CompletionClient for FixedModel {
    async fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn state(dir: &TempDir, reply: &'static str) -> AppState {
    let path = dir.path().join("api.db");
    if !path.exists() {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE Products (Id INTEGER PRIMARY KEY, Name TEXT);
             INSERT INTO Products VALUES (1, 'Lamp'), (2, 'Desk');
             CREATE TABLE Suppliers (Id INTEGER PRIMARY KEY);",
        )
        .unwrap();
    }

    let database = Arc::new(
        Database::open(&DatabaseConfig {
            path: path.to_string_lossy().into_owned(),
            max_connections: 2,
            connection_timeout_secs: 1,
            max_result_rows: 100,
        })
        .unwrap(),
    );
    let store = Arc::new(MemorySchemaStore::new());

    let indexer = SchemaIndexer::new(database.clone(), store.clone(), EnumPolicy::default(), Duration::from_secs(30));
    let service = ChatService::new(
        store,
        Arc::new(FixedModel(reply)),
        StatementExecutor::new(database, ErrorClassifier::new(vec!["firewall".to_string()]), Duration::from_secs(5)),
        ConversationAssembler::default(),
        ChatSettings::default(),
    );
    AppState { indexer: Arc::new(indexer), service: Arc::new(service) }
}

fn to_json<T: serde::Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap()
}

fn request(message: &str) -> Json<ChatRequest> {
    Json(serde_json::from_value(json!({"message": message})).unwrap())
}

#[tokio::test]
async fn test_status_before_index() {
    let dir = TempDir::new().unwrap();
    let (status, Json(body)) = server::schema_status(State(state(&dir, "hi"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(to_json(&body), json!({"indexed": false, "message": "No schema indexed"}));
}

#[tokio::test]
async fn test_index_then_status() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir, "hi");

    let (status, Json(body)) = server::index_schema(State(state.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let body = to_json(&body);
    assert_eq!(body["success"], true);
    assert_eq!(body["tablesCount"], 2);
    assert_eq!(body["message"], "2 tables indexed");
    assert!(body["indexedAt"].is_string());

    let (_, Json(status_body)) = server::schema_status(State(state)).await;
    let status_body = to_json(&status_body);
    assert_eq!(status_body["indexed"], true);
    assert_eq!(status_body["tablesCount"], 2);
    assert_eq!(status_body["indexedAt"], body["indexedAt"]);
}

#[tokio::test]
async fn test_chat_before_index_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let (status, Json(body)) = server::chat(State(state(&dir, "SQL: SELECT 1")), request("hi")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = to_json(&body);
    assert_eq!(body["success"], false);
    assert_eq!(body["errorKind"], "schema_not_indexed");
    assert_eq!(body["isFirewallError"], false);
    assert!(body.get("sql").is_none());
}

#[tokio::test]
async fn test_chat_answer_body() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir, "SQL: SELECT Id, Name FROM Products ORDER BY Id");
    let _ = server::index_schema(State(state.clone())).await;

    let (status, Json(body)) = server::chat(State(state), request("List products")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        to_json(&body),
        json!({
            "success": true,
            "sql": "SELECT Id, Name FROM Products ORDER BY Id",
            "data": [{"Id": 1, "Name": "Lamp"}, {"Id": 2, "Name": "Desk"}],
            "rowCount": 2,
            "truncated": false,
            "explanation": "Found 2 result(s)"
        })
    );
}

#[tokio::test]
async fn test_chat_safety_block_body() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir, "SQL: DROP TABLE Products");
    let _ = server::index_schema(State(state.clone())).await;

    let (status, Json(body)) = server::chat(State(state), request("Clean up")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = to_json(&body);
    assert_eq!(body["isSafetyBlocked"], true);
    assert_eq!(body["sql"], "DROP TABLE Products");
}

#[tokio::test]
async fn test_chat_invalid_input() {
    let dir = TempDir::new().unwrap();
    let (status, Json(body)) = server::chat(State(state(&dir, "hi")), request("   ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(to_json(&body)["success"], false);
}

#[tokio::test]
async fn test_index_failure_is_server_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemorySchemaStore::new());
    let missing = Arc::new(
        Database::open(&DatabaseConfig {
            path: dir.path().join("nope.db").to_string_lossy().into_owned(),
            max_connections: 1,
            connection_timeout_secs: 1,
            max_result_rows: 10,
        })
        .unwrap(),
    );
    let mut state = state(&dir, "hi");
    state.indexer = Arc::new(SchemaIndexer::new(missing, store, EnumPolicy::default(), Duration::from_secs(30)));

    let (status, Json(body)) = server::index_schema(State(state)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_json(&body);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().starts_with("Database unreachable"));
}
