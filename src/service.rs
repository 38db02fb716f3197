//! Chat request orchestration
//!
//! One request is one sequential chain: schema snapshot, model call, then
//! (only for SQL candidates that pass the gate) execution. Every external call
//! runs under its own time budget.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::conversation::ConversationAssembler;
use crate::error::{QueryBridgeError, Result};
use crate::executor::{ClassifiedError, StatementExecutor};
use crate::interpreter::{self, ModelResponse};
use crate::llm::CompletionClient;
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{ConversationTurn, DatabaseSchema, RowSet, SafetyVerdict};
use crate::prompt::PromptCompiler;
use crate::safety::SqlSafetyGate;
use crate::store::SchemaStore;
use crate::validation::InputValidator;

/// Why a chat request ended without rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    SchemaNotIndexed,
    SafetyBlocked { reason: String },
    ConnectivityBlocked { detected_ip: Option<String> },
    ExecutionFailed { raw_message: String },
    EmptyResultAnomaly,
}

impl FailureKind {
    /// Stable label used in metrics and API payloads
    pub fn label(&self) -> &'static str {
        match self {
            Self::SchemaNotIndexed => "schema_not_indexed",
            Self::SafetyBlocked { .. } => "safety_blocked",
            Self::ConnectivityBlocked { .. } => "connectivity_blocked",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::EmptyResultAnomaly => "empty_result_anomaly",
        }
    }

    /// Message shown to the person asking
    pub fn user_message(&self) -> String {
        match self {
            Self::SchemaNotIndexed => {
                "The database schema has not been indexed yet. Run an index first, then ask again."
                    .to_string()
            },
            Self::SafetyBlocked { reason } => format!(
                "Query blocked: this assistant is read-only and only runs SELECT queries ({reason})."
            ),
            Self::ConnectivityBlocked { detected_ip } => {
                let who = detected_ip.as_deref().unwrap_or("this host");
                format!(
                    "The database server refused the connection from {who}. \
                     Add this address to the server's firewall allow-list. \
                     The change can take a few minutes to apply."
                )
            },
            Self::ExecutionFailed { raw_message } => format!("SQL error: {raw_message}"),
            Self::EmptyResultAnomaly => "The SQL query did not return a valid result set.".to_string(),
        }
    }
}

impl From<ClassifiedError> for FailureKind {
    fn from(err: ClassifiedError) -> Self {
        match err {
            ClassifiedError::ConnectivityBlocked { detected_ip } => Self::ConnectivityBlocked { detected_ip },
            ClassifiedError::ExecutionFailed { raw_message } => Self::ExecutionFailed { raw_message },
            ClassifiedError::EmptyResultAnomaly => Self::EmptyResultAnomaly,
        }
    }
}

/// A terminal, user-facing failure of one chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFailure {
    pub kind: FailureKind,
    pub message: String,
    /// The statement involved, echoed for transparency
    pub sql: Option<String>,
}

impl ChatFailure {
    pub fn new(kind: FailureKind, sql: Option<String>) -> Self {
        let message = kind.user_message();
        Self { kind, message, sql }
    }
}

/// Result of one chat request
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// Plain-language reply, the database was not touched
    Conversational { message: String },
    /// A vetted statement ran and returned rows (possibly zero)
    Answer { sql: String, rows: RowSet, explanation: String },
    Failed(ChatFailure),
}

impl ChatOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Conversational { .. } => "conversational",
            Self::Answer { .. } => "answer",
            Self::Failed(failure) => failure.kind.label(),
        }
    }
}

/// Snapshot of what the store currently holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaStatus {
    pub indexed: bool,
    pub tables_count: usize,
    pub indexed_at: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

/// Tunables for [`ChatService`]
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub temperature: f32,
    pub store_timeout: Duration,
    pub model_timeout: Duration,
    /// Older turns beyond this are not replayed
    pub max_history_turns: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            store_timeout: Duration::from_secs(10),
            model_timeout: Duration::from_secs(90),
            max_history_turns: 50,
        }
    }
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            temperature: config.llm.temperature,
            store_timeout: Duration::from_secs(config.timeouts.store_secs),
            model_timeout: Duration::from_secs(config.timeouts.model_secs),
            max_history_turns: config.assistant.max_history_turns,
        }
    }
}

/// Answers questions against the indexed database
pub struct ChatService {
    store: Arc<dyn SchemaStore>,
    llm: Arc<dyn CompletionClient>,
    executor: StatementExecutor,
    assembler: ConversationAssembler,
    compiler: PromptCompiler,
    settings: ChatSettings,
    metrics: Arc<MetricsCollector>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn SchemaStore>,
        llm: Arc<dyn CompletionClient>,
        executor: StatementExecutor,
        assembler: ConversationAssembler,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            llm,
            executor,
            assembler,
            compiler: PromptCompiler::default(),
            settings,
            metrics: Arc::new(MetricsCollector::default()),
        }
    }

    /// What is currently indexed.
    pub async fn status(&self) -> Result<SchemaStatus> {
        let schema = self.load_schema().await?;
        Ok(match schema {
            Some(schema) => SchemaStatus {
                indexed: !schema.is_empty(),
                tables_count: schema.tables.len(),
                indexed_at: Some(schema.indexed_at),
                version: Some(schema.version),
            },
            None => SchemaStatus { indexed: false, tables_count: 0, indexed_at: None, version: None },
        })
    }

    /// Answer one message given the prior conversation.
    ///
    /// `Err` only for infrastructure faults and invalid input; every other
    /// terminal condition is a [`ChatOutcome::Failed`].
    pub async fn chat(&self, message: &str, history: &[ConversationTurn]) -> Result<ChatOutcome> {
        InputValidator::validate_chat_message(message)?;
        InputValidator::validate_history(history)?;
        let message = InputValidator::sanitize_text(message);

        let skip = history.len().saturating_sub(self.settings.max_history_turns);
        if skip > 0 {
            debug!(dropped = skip, kept = self.settings.max_history_turns, "Trimming oldest history turns");
        }
        let history = &history[skip..];

        let outcome = self.run_chain(&message, history).await?;
        self.metrics.record_chat_outcome(outcome.label());
        info!(outcome = outcome.label(), "Chat request finished");
        Ok(outcome)
    }

    async fn run_chain(&self, message: &str, history: &[ConversationTurn]) -> Result<ChatOutcome> {
        // One read per request: the whole chain sees the same document.
        let schema = match self.load_schema().await? {
            Some(schema) if !schema.is_empty() => schema,
            _ => return Ok(ChatOutcome::Failed(ChatFailure::new(FailureKind::SchemaNotIndexed, None))),
        };

        let schema_prompt = self.compiler.render(&schema);
        let messages = self.assembler.build(&schema_prompt, history, message);
        debug!(messages = messages.len(), prompt_chars = schema_prompt.len(), "Calling model");

        let timer = OperationTimer::new("model_completion");
        let raw = within(
            "model completion",
            self.settings.model_timeout,
            self.llm.complete(&messages, self.settings.temperature),
        )
        .await?;
        self.metrics.record_model_call(timer.elapsed());

        let (statement, explanation) = match interpreter::parse(&raw) {
            ModelResponse::Conversational { message } => {
                return Ok(ChatOutcome::Conversational { message });
            },
            ModelResponse::SqlCandidate { statement, explanation } => (statement, explanation),
        };
        debug!(sql = %statement, "Model proposed SQL");

        if let SafetyVerdict::Blocked { reason } = SqlSafetyGate::check(&statement) {
            warn!(sql = %statement, reason = %reason, "Statement blocked");
            return Ok(ChatOutcome::Failed(ChatFailure::new(
                FailureKind::SafetyBlocked { reason },
                Some(statement),
            )));
        }

        match self.executor.execute(&statement).await {
            Ok(rows) => {
                let explanation = if explanation.is_empty() {
                    format!("Found {} result(s)", rows.row_count())
                } else {
                    explanation
                };
                Ok(ChatOutcome::Answer { sql: statement, rows, explanation })
            },
            Err(err) => Ok(ChatOutcome::Failed(ChatFailure::new(err.into(), Some(statement)))),
        }
    }

    async fn load_schema(&self) -> Result<Option<DatabaseSchema>> {
        within("schema store read", self.settings.store_timeout, self.store.get()).await
    }
}

async fn within<T>(
    operation: &str,
    budget: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(budget, fut).await.map_err(|_| QueryBridgeError::Timeout {
        operation: operation.to_string(),
        secs: budget.as_secs(),
    })?
}
