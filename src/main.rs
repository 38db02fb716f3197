use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use querybridge::config::AppConfig;
use querybridge::conversation::ConversationAssembler;
use querybridge::db::Database;
use querybridge::executor::{ErrorClassifier, StatementExecutor};
use querybridge::indexer::SchemaIndexer;
use querybridge::llm::{CompletionClient, OpenAiClient};
use querybridge::logging::{init_logging, OperationTimer};
use querybridge::models::OutputFormat;
use querybridge::output::render_rows;
use querybridge::server::{self, AppState};
use querybridge::service::{ChatOutcome, ChatService, ChatSettings};
use querybridge::store::{MemorySchemaStore, SchemaStore, SledSchemaStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Keep the indexed schema in memory instead of the on-disk store
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the database catalog and store a fresh schema
    Index,
    /// Show what is currently indexed
    Status,
    /// Ask one question against the indexed database
    Ask {
        /// The question, in plain language
        question: String,

        /// Row output format (table, csv or json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Serve the HTTP API
    Serve {
        /// Address to bind, overrides `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },
}

/// Everything the commands need, wired from configuration
struct App {
    database: Arc<Database>,
    indexer: Arc<SchemaIndexer>,
    service: Arc<ChatService>,
}

impl App {
    fn build(config: &AppConfig, ephemeral: bool) -> Result<Self> {
        let mut db_config = config.database.clone();
        db_config.path = config.get_database_path();
        info!(path = %db_config.path, "Using database");
        let database = Arc::new(Database::open(&db_config)?);

        let store: Arc<dyn SchemaStore> = if ephemeral {
            Arc::new(MemorySchemaStore::new())
        } else {
            Arc::new(
                SledSchemaStore::open(&PathBuf::from(&config.store.path))
                    .with_context(|| format!("Failed to open schema store at {}", config.store.path))?,
            )
        };

        let llm = OpenAiClient::new(&config.llm, config.get_api_key())?;
        if config.get_api_key().is_none() {
            warn!("No model API key configured; set OPENAI_API_KEY or llm.api_key");
        }
        info!(provider = llm.name(), model = llm.model(), "Model client ready");

        let indexer = SchemaIndexer::new(
            database.clone(),
            Arc::clone(&store),
            config.indexing.enum_policy.clone(),
            Duration::from_secs(config.timeouts.index_secs),
        );

        let executor = StatementExecutor::new(
            database.clone(),
            ErrorClassifier::new(config.executor.connectivity_signatures.clone()),
            Duration::from_secs(config.timeouts.query_secs),
        );

        let service = ChatService::new(
            store,
            Arc::new(llm),
            executor,
            ConversationAssembler::new(config.system_preamble()),
            ChatSettings::from_config(config),
        );

        Ok(Self { database, indexer: Arc::new(indexer), service: Arc::new(service) })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(
        Some(&config.get_log_level()),
        log_file.as_deref(),
        config.logging.format == "json",
    )?;

    info!("Starting querybridge");

    let cli = Cli::parse();
    let app = App::build(&config, cli.ephemeral)?;

    match cli.command {
        Commands::Index => index(&app).await?,
        Commands::Status => status(&app).await?,
        Commands::Ask { question, format } => ask(&app, &question, &format).await?,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = AppState { indexer: app.indexer, service: app.service };
            server::serve(state, &bind).await?;
        },
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
async fn index(app: &App) -> Result<()> {
    let timer = OperationTimer::new("cli_index");
    let schema = app.indexer.index().await.context("Schema indexing failed")?;
    timer.finish();

    let enum_columns: usize = schema
        .tables
        .iter()
        .map(|t| t.columns.iter().filter(|c| c.enum_values.is_some()).count())
        .sum();
    println!(
        "{} tables indexed at {} ({enum_columns} enum-like columns)",
        schema.tables.len(),
        schema.indexed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn status(app: &App) -> Result<()> {
    let status = app.service.status().await?;
    match status.indexed_at {
        Some(at) => println!(
            "{} tables indexed at {} (format {})",
            status.tables_count,
            at.format("%Y-%m-%d %H:%M:%S UTC"),
            status.version.unwrap_or_default()
        ),
        None => println!("No schema indexed"),
    }

    let database = Arc::clone(&app.database);
    match tokio::task::spawn_blocking(move || database.check_connection()).await? {
        Ok(()) => println!("Database reachable"),
        Err(e) => println!("Database unreachable: {}", e.raw_message()),
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn ask(app: &App, question: &str, format: &str) -> Result<()> {
    let output_format = format.parse::<OutputFormat>().unwrap_or_else(|e| {
        warn!("{e}. Using table as default.");
        OutputFormat::Table
    });

    match app.service.chat(question, &[]).await? {
        ChatOutcome::Conversational { message } => println!("{message}"),
        ChatOutcome::Answer { sql, rows, explanation } => {
            println!("SQL: {sql}");
            println!("{explanation}");
            println!();
            print!("{}", render_rows(&rows, output_format)?);
        },
        ChatOutcome::Failed(failure) => {
            if let Some(sql) = &failure.sql {
                println!("SQL: {sql}");
            }
            anyhow::bail!("{} [{}]", failure.message, failure.kind.label());
        },
    }
    Ok(())
}
