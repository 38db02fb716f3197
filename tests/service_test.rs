//! End-to-end chat scenarios with a scripted model and a real SQLite file

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use querybridge::config::DatabaseConfig;
use querybridge::conversation::{ConversationAssembler, SystemPreamble};
use querybridge::db::{Database, QueryOutcome, QueryRunner};
use querybridge::executor::{ErrorClassifier, StatementExecutor};
use querybridge::indexer::{EnumPolicy, SchemaIndexer};
use querybridge::llm::{ChatMessage, CompletionClient};
use querybridge::models::ConversationTurn;
use querybridge::service::{ChatOutcome, ChatService, ChatSettings, FailureKind};
use querybridge::store::{MemorySchemaStore, SchemaStore};
use querybridge::{QueryBridgeError, Result};
use rusqlite::Connection;
use tempfile::TempDir;

/// Model that answers from a script and records what it was sent
struct ScriptedModel {
    reply: String,
    delay: Duration,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self { reply: reply.to_string(), delay: Duration::ZERO, seen: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        self.seen.lock().unwrap().push(messages.to_vec());
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Counts statements before handing them to the real database
struct CountingRunner {
    inner: Arc<dyn QueryRunner>,
    calls: AtomicUsize,
}

#[async_trait]
impl QueryRunner for CountingRunner {
    async fn run(&self, sql: &str) -> Result<QueryOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.run(sql).await
    }
}

struct Harness {
    _dir: TempDir,
    database: Arc<Database>,
    store: Arc<MemorySchemaStore>,
    runner: Arc<CountingRunner>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let database = Arc::new(open_db(dir.path()));
        let runner = Arc::new(CountingRunner { inner: database.clone(), calls: AtomicUsize::new(0) });
        Self { _dir: dir, database, store: Arc::new(MemorySchemaStore::new()), runner }
    }

    async fn index(&self) {
        SchemaIndexer::new(
            self.database.clone(),
            self.store.clone(),
            EnumPolicy::default(),
            Duration::from_secs(30),
        )
        .index()
        .await
        .unwrap();
    }

    fn service_with(&self, model: Arc<dyn CompletionClient>, runner: Arc<dyn QueryRunner>) -> ChatService {
        let classifier = ErrorClassifier::new(vec!["not allowed to access the server".to_string()]);
        ChatService::new(
            self.store.clone(),
            model,
            StatementExecutor::new(runner, classifier, Duration::from_secs(5)),
            ConversationAssembler::new(SystemPreamble {
                intro: "You are an SQL assistant.".to_string(),
                ..SystemPreamble::default()
            }),
            ChatSettings { model_timeout: Duration::from_millis(200), ..ChatSettings::default() },
        )
    }

    fn service(&self, model: Arc<dyn CompletionClient>) -> ChatService {
        self.service_with(model, self.runner.clone())
    }

    fn db_calls(&self) -> usize {
        self.runner.calls.load(Ordering::SeqCst)
    }
}

fn open_db(dir: &Path) -> Database {
    let path = dir.join("sales.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Orders (Id INTEGER PRIMARY KEY, Status VARCHAR(20), Total REAL);
         WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 150)
         INSERT INTO Orders SELECT n, CASE n % 2 WHEN 0 THEN 'OPEN' ELSE 'CLOSED' END, n * 2.0 FROM seq;",
    )
    .unwrap();
    drop(conn);

    Database::open(&DatabaseConfig {
        path: path.to_string_lossy().into_owned(),
        max_connections: 2,
        connection_timeout_secs: 1,
        max_result_rows: 100,
    })
    .unwrap()
}

#[tokio::test]
async fn test_not_indexed_makes_no_model_call() {
    let harness = Harness::new();
    let model = ScriptedModel::new("SQL: SELECT 1");
    let service = harness.service(model.clone());

    let ChatOutcome::Failed(failure) = service.chat("How many orders?", &[]).await.unwrap() else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::SchemaNotIndexed);
    assert_eq!(failure.sql, None);
    assert_eq!(model.calls(), 0);
    assert_eq!(harness.db_calls(), 0);
}

#[tokio::test]
async fn test_sql_answer() {
    let harness = Harness::new();
    harness.index().await;
    let model = ScriptedModel::new("SQL: SELECT Id, Status FROM Orders ORDER BY Id LIMIT 100\nVoici les commandes.");
    let service = harness.service(model.clone());

    let ChatOutcome::Answer { sql, rows, explanation } = service.chat("Show orders", &[]).await.unwrap() else {
        panic!("expected answer");
    };
    assert_eq!(sql, "SELECT Id, Status FROM Orders ORDER BY Id LIMIT 100");
    assert_eq!(explanation, "Voici les commandes.");
    assert_eq!(rows.row_count(), 100);
    assert!(!rows.truncated);
    assert_eq!(rows.rows[0]["Status"], "CLOSED");
    assert_eq!(harness.db_calls(), 1);
}

#[tokio::test]
async fn test_schema_prompt_reaches_model() {
    let harness = Harness::new();
    harness.index().await;
    let model = ScriptedModel::new("Hello");
    let service = harness.service(model.clone());

    service.chat("hi", &[]).await.unwrap();

    let seen = model.seen.lock().unwrap();
    let system = &seen[0][0].content;
    assert!(system.starts_with("You are an SQL assistant."));
    assert!(system.contains("### main.Orders (150 rows)"));
    assert!(system.contains("'CLOSED', 'OPEN'"));
}

#[tokio::test]
async fn test_conversational_reply_skips_database() {
    let harness = Harness::new();
    harness.index().await;
    let service = harness.service(ScriptedModel::new("Bonjour, comment puis-je vous aider ?"));

    let outcome = service.chat("Bonjour", &[]).await.unwrap();
    assert_eq!(outcome, ChatOutcome::Conversational { message: "Bonjour, comment puis-je vous aider ?".to_string() });
    assert_eq!(harness.db_calls(), 0);
}

#[tokio::test]
async fn test_history_is_replayed_with_sql() {
    let harness = Harness::new();
    harness.index().await;
    let model = ScriptedModel::new("They are the most recent ones.");
    let service = harness.service(model.clone());

    let history = vec![
        ConversationTurn::user("Show open orders"),
        ConversationTurn::assistant("75 open orders.", Some("SELECT * FROM Orders WHERE Status = 'OPEN'".to_string())),
    ];
    service.chat("Why those?", &history).await.unwrap();

    let seen = model.seen.lock().unwrap();
    let sent = &seen[0];
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[2].content, "SQL: SELECT * FROM Orders WHERE Status = 'OPEN'\n75 open orders.");
    assert_eq!(sent[3].content, "Why those?");
}

#[tokio::test]
async fn test_long_history_keeps_most_recent_turns() {
    let harness = Harness::new();
    harness.index().await;
    let model = ScriptedModel::new("Still here.");
    let service = ChatService::new(
        harness.store.clone(),
        model.clone(),
        StatementExecutor::new(harness.runner.clone(), ErrorClassifier::new(vec![]), Duration::from_secs(5)),
        ConversationAssembler::default(),
        ChatSettings { max_history_turns: 4, ..ChatSettings::default() },
    );

    let history: Vec<ConversationTurn> = (0..60).map(|i| ConversationTurn::user(format!("turn {i}"))).collect();
    let outcome = service.chat("And now?", &history).await.unwrap();
    assert_eq!(outcome, ChatOutcome::Conversational { message: "Still here.".to_string() });

    let seen = model.seen.lock().unwrap();
    let sent = &seen[0];
    assert_eq!(sent.len(), 6);
    assert_eq!(sent[1].content, "turn 56");
    assert_eq!(sent[4].content, "turn 59");
    assert_eq!(sent[5].content, "And now?");
}

#[tokio::test]
async fn test_mutating_sql_is_blocked_before_database() {
    let harness = Harness::new();
    harness.index().await;
    let service = harness.service(ScriptedModel::new("SQL: DELETE FROM Orders WHERE Status = 'CLOSED'"));

    let ChatOutcome::Failed(failure) = service.chat("Remove closed orders", &[]).await.unwrap() else {
        panic!("expected failure");
    };
    assert!(matches!(failure.kind, FailureKind::SafetyBlocked { ref reason } if reason.contains("DELETE")));
    assert_eq!(failure.sql.as_deref(), Some("DELETE FROM Orders WHERE Status = 'CLOSED'"));
    assert!(failure.message.contains("read-only"));
    assert_eq!(harness.db_calls(), 0);
}

#[tokio::test]
async fn test_bad_column_is_execution_failure() {
    let harness = Harness::new();
    harness.index().await;
    let service = harness.service(ScriptedModel::new("SQL: SELECT Customer FROM Orders"));

    let ChatOutcome::Failed(failure) = service.chat("Who ordered?", &[]).await.unwrap() else {
        panic!("expected failure");
    };
    assert!(matches!(failure.kind, FailureKind::ExecutionFailed { .. }));
    assert!(failure.message.starts_with("SQL error: "));
    assert_eq!(failure.sql.as_deref(), Some("SELECT Customer FROM Orders"));
}

#[tokio::test]
async fn test_default_explanation_counts_rows() {
    let harness = Harness::new();
    harness.index().await;
    let service = harness.service(ScriptedModel::new("SQL: SELECT Id FROM Orders WHERE Id <= 3"));

    let ChatOutcome::Answer { explanation, .. } = service.chat("First orders", &[]).await.unwrap() else {
        panic!("expected answer");
    };
    assert_eq!(explanation, "Found 3 result(s)");
}

struct FirewalledRunner;

#[async_trait]
impl QueryRunner for FirewalledRunner {
    async fn run(&self, _sql: &str) -> Result<QueryOutcome> {
        Err(QueryBridgeError::Other(
            "Client with IP address '203.0.113.9' is not allowed to access the server.".to_string(),
        ))
    }
}

#[tokio::test]
async fn test_firewall_failure_carries_ip() {
    let harness = Harness::new();
    harness.index().await;
    let service = harness.service_with(ScriptedModel::new("SQL: SELECT Id FROM Orders"), Arc::new(FirewalledRunner));

    let ChatOutcome::Failed(failure) = service.chat("orders", &[]).await.unwrap() else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::ConnectivityBlocked { detected_ip: Some("203.0.113.9".to_string()) });
    assert!(failure.message.contains("203.0.113.9"));
}

#[tokio::test]
async fn test_slow_model_times_out() {
    let harness = Harness::new();
    harness.index().await;
    let model = Arc::new(ScriptedModel {
        reply: "Hello".to_string(),
        delay: Duration::from_secs(5),
        seen: Mutex::new(Vec::new()),
    });
    let service = harness.service(model);

    let err = service.chat("hi", &[]).await.unwrap_err();
    assert!(matches!(err, QueryBridgeError::Timeout { ref operation, .. } if operation == "model completion"));
}

#[tokio::test]
async fn test_status_after_index() {
    let harness = Harness::new();
    let service = harness.service(ScriptedModel::new("Hello"));

    let before = service.status().await.unwrap();
    assert!(!before.indexed);
    assert_eq!(before.indexed_at, None);

    harness.index().await;
    let after = service.status().await.unwrap();
    assert!(after.indexed);
    assert_eq!(after.tables_count, 1);
    assert_eq!(after.version.as_deref(), Some("1.0"));
    assert_eq!(harness.store.get().await.unwrap().unwrap().indexed_at, after.indexed_at.unwrap());
}
