use data_modeler::cache::{MemorySuggestionCache, SqliteSuggestionCache, SuggestionCache};
use data_modeler::collector::{DataSource, PostgresSchemaCollector};
use data_modeler::config::ModelerConfig;
use data_modeler::db::{init_pool, LogicalNameStore, NoLogicalNames, TableMetadataRepository};
use data_modeler::llm::LlmClient;
use data_modeler::semantic::LlmJoinSuggester;
use data_modeler::{InferenceOptions, InferenceService, InferredJoin, JoinInferenceEngine, TableSchema};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "data-modeler")]
#[command(about = "Suggest JOIN relationships between the tables of a data source")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer joins for tables described in a JSON file
    Infer {
        /// JSON array of table schemas
        #[arg(long)]
        schema_file: PathBuf,

        /// Also ask the LLM (or set JOIN_USE_AI)
        #[arg(long)]
        ai: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Collect the schema of a Postgres data source and infer joins
    InferSource {
        /// Connection URL of the data source
        #[arg(long)]
        connection_url: String,

        /// Id under which logical names and cached results are stored
        #[arg(long)]
        data_source_id: i64,

        /// Schema to analyse (default: public)
        #[arg(long)]
        schema: Option<String>,

        /// Maximum tables to analyse (or set JOIN_MAX_TABLES)
        #[arg(long)]
        max_tables: Option<usize>,

        /// Also ask the LLM (or set JOIN_USE_AI)
        #[arg(long)]
        ai: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ModelerConfig::from_env()?;

    match args.command {
        Commands::Infer { schema_file, ai, format } => {
            run_infer(&config, schema_file, ai, format).await
        }
        Commands::InferSource { connection_url, data_source_id, schema, max_tables, ai, format } => {
            run_infer_source(&config, connection_url, data_source_id, schema, max_tables, ai, format).await
        }
    }
}

fn build_engine(config: &ModelerConfig, use_ai: bool) -> JoinInferenceEngine {
    if !use_ai {
        return JoinInferenceEngine::rules_only();
    }
    let llm = LlmClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_base_url.clone(),
    );
    if llm.is_offline() {
        warn!("OPENAI_API_KEY not set, AI suggestions run in offline mode");
    }
    JoinInferenceEngine::new(Arc::new(LlmJoinSuggester::new(Arc::new(llm))))
}

async fn run_infer(config: &ModelerConfig, schema_file: PathBuf, ai: bool, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(&schema_file)
        .with_context(|| format!("Failed to read {}", schema_file.display()))?;
    let tables: Vec<TableSchema> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse table schemas in {}", schema_file.display()))?;
    info!("Loaded {} tables from {}", tables.len(), schema_file.display());

    let use_ai = ai || config.use_ai;
    let engine = build_engine(config, use_ai);
    let options = InferenceOptions { use_ai, ..Default::default() };
    let joins = engine.infer_joins(&tables, &options).await;

    print_joins(&joins, format)
}

async fn run_infer_source(
    config: &ModelerConfig,
    connection_url: String,
    data_source_id: i64,
    schema: Option<String>,
    max_tables: Option<usize>,
    ai: bool,
    format: OutputFormat,
) -> Result<()> {
    let use_ai = ai || config.use_ai;

    let cache: Arc<dyn SuggestionCache> = match &config.cache_path {
        Some(path) => Arc::new(SqliteSuggestionCache::open(path)?),
        None => Arc::new(MemorySuggestionCache::new()),
    };

    let logical_names: Arc<dyn LogicalNameStore> = match &config.database_url {
        Some(url) => match init_pool(url).await {
            Ok(pool) => Arc::new(TableMetadataRepository::new(pool)),
            Err(e) => {
                warn!("Metadata database unavailable, using physical names: {}", e);
                Arc::new(NoLogicalNames)
            }
        },
        None => Arc::new(NoLogicalNames),
    };

    let service = InferenceService::new(
        build_engine(config, use_ai),
        Arc::new(PostgresSchemaCollector::new()),
        logical_names,
        cache,
    )
    .with_cache_ttl(config.cache_ttl);

    let data_source = DataSource {
        name: format!("data source {}", data_source_id),
        connection_url,
    };
    let options = InferenceOptions { use_ai, ..Default::default() };
    let joins = service
        .infer_joins_from_data_source(
            &data_source,
            data_source_id,
            schema.as_deref(),
            &options,
            max_tables.unwrap_or(config.max_tables),
        )
        .await;

    print_joins(&joins, format)
}

fn print_joins(joins: &[InferredJoin], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(joins)?),
        OutputFormat::Text => {
            if joins.is_empty() {
                println!("No joins found.");
            }
            for join in joins {
                println!(
                    "{:.2} [{:?}] {} {}",
                    join.confidence_score,
                    join.confidence_level,
                    join.suggested_join_type.as_sql(),
                    join.join_condition()
                );
                println!("     {} ({})", join.reasoning, join.matched_patterns.join(", "));
            }
        }
    }
    Ok(())
}
