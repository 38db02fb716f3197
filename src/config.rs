use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::conversation::{SystemPreamble, VocabularyEntry};
use crate::indexer::EnumPolicy;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub indexing: IndexingConfig,
    pub assistant: AssistantConfig,
    pub executor: ExecutorConfig,
    pub timeouts: TimeoutConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file opened read-only
    pub path: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    pub max_result_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the sled schema store
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default)]
    pub enum_policy: EnumPolicy,
}

/// Text of the system instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub preamble: String,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyEntry>,
    pub rules: String,
    /// Most recent turns replayed to the model; older ones are dropped
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

const fn default_max_history_turns() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Substrings that mark a network-access denial in a driver error
    pub connectivity_signatures: Vec<String>,
}

/// Budgets for each external call, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub store_secs: u64,
    pub model_secs: u64,
    pub query_secs: u64,
    pub index_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

const DEFAULT_PREAMBLE: &str = "You are an expert SQL assistant that helps users query their SQLite database. \
Answer in the language the user writes in.";

const DEFAULT_RULES: &str = "BEHAVIOUR:
1. If the question needs data from the database:
   - Generate the SQL query IMMEDIATELY, without a long preamble
   - Start your answer with \"SQL:\" followed by the query
   - Do NOT describe your SQL reasoning
   - If a choice needs clarifying, do it in ONE short sentence after the SQL
2. If the question asks for an explanation, a clarification, or is a conversational follow-up:
   - Answer concisely in natural language
   - Refer to previous queries when useful
   - Do NOT generate SQL when it is not needed

SQL RULES:
- Only read data: a single SELECT (or WITH ... SELECT) statement
- Use ONLY the tables and columns of the schema above
- Limit results to 100 rows (LIMIT 100)
- ALWAYS join to replace ids with readable information
- For columns listing possible values, use ONLY those exact values, with their exact case
- Use clear, descriptive column aliases";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "data/database.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
                max_result_rows: 1000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                api_key: None,
                temperature: 0.2,
                request_timeout_secs: 60,
            },
            store: StoreConfig {
                path: ".schema_store".to_string(),
            },
            indexing: IndexingConfig::default(),
            assistant: AssistantConfig {
                preamble: DEFAULT_PREAMBLE.to_string(),
                vocabulary: Vec::new(),
                rules: DEFAULT_RULES.to_string(),
                max_history_turns: default_max_history_turns(),
            },
            executor: ExecutorConfig {
                connectivity_signatures: vec![
                    "not allowed to access the server".to_string(),
                    "firewall".to_string(),
                ],
            },
            timeouts: TimeoutConfig {
                store_secs: 10,
                model_secs: 90,
                query_secs: 30,
                index_secs: 600,
            },
            server: ServerConfig {
                bind: "127.0.0.1:3000".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .map_err(|e| anyhow::anyhow!("Failed to build default configuration: {}", e))?;

        let config = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("querybridge").required(false))
            // QUERYBRIDGE__DATABASE__PATH=... style overrides
            .add_source(Environment::with_prefix("QUERYBRIDGE").separator("__").try_parsing(true))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.path.trim().is_empty() {
            return Err(anyhow::anyhow!("database.path must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }
        if self.database.max_result_rows == 0 {
            return Err(anyhow::anyhow!("max_result_rows must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate model config
        if self.assistant.max_history_turns == 0 {
            return Err(anyhow::anyhow!("assistant.max_history_turns must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow::anyhow!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow::anyhow!("llm.model must not be empty"));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request_timeout_secs must be greater than 0"));
        }

        // Validate enum policy
        let policy = &self.indexing.enum_policy;
        if policy.name_hints.is_empty() {
            return Err(anyhow::anyhow!("enum_policy.name_hints must not be empty"));
        }
        if !(policy.max_distinct_ratio > 0.0 && policy.max_distinct_ratio <= 1.0) {
            return Err(anyhow::anyhow!(
                "enum_policy.max_distinct_ratio must be in (0, 1], got {}",
                policy.max_distinct_ratio
            ));
        }
        if policy.max_values == 0 {
            return Err(anyhow::anyhow!("enum_policy.max_values must be greater than 0"));
        }

        // Validate timeouts
        let t = &self.timeouts;
        if t.store_secs == 0 || t.model_secs == 0 || t.query_secs == 0 || t.index_secs == 0 {
            return Err(anyhow::anyhow!("all timeouts must be greater than 0"));
        }

        Ok(())
    }

    /// Get database path from environment or config
    pub fn get_database_path(&self) -> String {
        std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| self.database.path.clone())
    }

    /// Get the model API key from config or `OPENAI_API_KEY`
    pub fn get_api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| self.logging.level.clone())
    }

    /// System instruction pieces for the conversation assembler
    pub fn system_preamble(&self) -> SystemPreamble {
        SystemPreamble {
            intro: self.assistant.preamble.clone(),
            vocabulary: self.assistant.vocabulary.clone(),
            rules: self.assistant.rules.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.path, "data/database.db");
        assert_eq!(config.logging.level, "info");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_survive_config_layering() {
        let defaults = Config::try_from(&AppConfig::default()).unwrap();
        let loaded: AppConfig = Config::builder()
            .add_source(defaults)
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(loaded.indexing.enum_policy, EnumPolicy::default());
        assert_eq!(loaded.executor.connectivity_signatures.len(), 2);
    }
}
