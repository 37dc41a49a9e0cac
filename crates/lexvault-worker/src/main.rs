//! lexvault-worker: background document processor and operator CLI.
//!
//! `run` starts the task worker and the stale-task sweeper against the
//! PostgreSQL queue. The remaining subcommands are one-shot operations for
//! operators: registering uploads, queueing documents, decrypting a stored
//! document, sweeping stale tasks and asking questions over a case.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use lexvault_core::{defaults, AiProvider, EventBus, Repositories, TaskKind, TaskPayload};
use lexvault_crypto::{KeyManager, MasterSecret};
use lexvault_db::{log_pool_metrics, Database, DocumentStore, FilesystemBackend, PoolConfig};
use lexvault_inference::{build_provider, ProviderConfig, ProviderKind};
use lexvault_jobs::{
    enqueue_document_processing, register_upload, DocumentProcessor, DocumentVault,
    StaleTaskSweeper, SweeperConfig, WorkerBuilder, WorkerConfig,
};
use lexvault_search::{ChunkIndexer, RagRequest, RagService};

#[derive(Parser)]
#[command(name = "lexvault-worker")]
#[command(author, version, about = "Secure document-processing worker for LexVault")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the task worker and stale-task sweeper until interrupted
    Run,

    /// Claim and process a single queued task, then exit
    ProcessOnce,

    /// Store a file as an uploaded document of a case
    Upload {
        /// Case the document belongs to
        case_id: Uuid,

        /// File to upload
        file: PathBuf,

        /// User recorded as the uploader
        #[arg(long)]
        uploaded_by: Option<Uuid>,

        /// Queue the document for processing right away
        #[arg(long)]
        enqueue: bool,

        /// Do not generate embeddings when processing
        #[arg(long)]
        no_embeddings: bool,
    },

    /// Queue an existing document for processing
    Enqueue {
        /// Document to process
        document_id: Uuid,

        /// Do not generate embeddings
        #[arg(long)]
        no_embeddings: bool,

        /// Request AI analysis of the document
        #[arg(long)]
        ai_analysis: bool,
    },

    /// Decrypt a stored document into a local file
    Decrypt {
        /// Encrypted document
        document_id: Uuid,

        /// Destination for the plaintext
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Force-fail tasks stuck in processing
    Sweep,

    /// Print queue counts as JSON
    Stats,

    /// Ask a question answered from a case's documents
    Ask {
        /// Case to search
        case_id: Uuid,

        /// The question
        message: String,

        /// Provider that generates the answer (openai, gemini)
        #[arg(short, long)]
        provider: Option<String>,

        /// Continue an existing conversation
        #[arg(long)]
        conversation_id: Option<Uuid>,
    },

    /// Print a fresh hex-encoded master secret
    GenerateMasterKey,

    /// Apply pending database migrations
    Migrate,
}

/// Shared handles built from the environment.
struct Runtime {
    db: Database,
    repos: Repositories,
    documents: DocumentStore,
    events: Arc<EventBus>,
}

impl Runtime {
    async fn connect() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/lexvault".to_string());
        info!("Connecting to database...");
        let db = Database::connect(&database_url, PoolConfig::from_env())
            .await
            .context("database connection failed")?;
        info!("Database connected");

        let storage_root =
            std::env::var("STORAGE_ROOT").unwrap_or_else(|_| defaults::STORAGE_ROOT.to_string());
        let backend = FilesystemBackend::new(&storage_root);
        backend
            .validate()
            .await
            .with_context(|| format!("storage root {} is not usable", storage_root))?;
        info!(storage_root = %storage_root, "Object storage initialized");

        Ok(Self {
            repos: db.repositories(),
            db,
            documents: DocumentStore::new(Arc::new(backend)),
            events: Arc::new(EventBus::new(defaults::EVENT_BUS_CAPACITY)),
        })
    }

    fn processor(
        &self,
        keys: Arc<KeyManager>,
        provider: Arc<dyn AiProvider>,
    ) -> DocumentProcessor {
        let indexer = ChunkIndexer::new(provider, self.repos.chunks.clone());
        DocumentProcessor::new(
            self.repos.clone(),
            self.documents.clone(),
            keys,
            self.events.clone(),
        )
        .with_indexer(Arc::new(indexer))
    }
}

fn key_manager() -> anyhow::Result<Arc<KeyManager>> {
    let master = MasterSecret::from_env(defaults::MASTER_KEY_ENV)
        .with_context(|| {
            format!(
                "{} must hold the hex or base64 encoding of 32 bytes",
                defaults::MASTER_KEY_ENV
            )
        })?;
    Ok(Arc::new(KeyManager::new(master)))
}

fn default_provider() -> anyhow::Result<Arc<dyn AiProvider>> {
    let config = ProviderConfig::from_env()?;
    Ok(build_provider(&config)?)
}

fn payload(embeddings: bool, ai_analysis: bool) -> TaskPayload {
    TaskPayload::default()
        .with_embeddings(embeddings)
        .with_ai_analysis(ai_analysis)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _file_guard = init_tracing();

    match cli.command {
        Commands::Run => cmd_run().await,
        Commands::ProcessOnce => cmd_process_once().await,
        Commands::Upload {
            case_id,
            file,
            uploaded_by,
            enqueue,
            no_embeddings,
        } => cmd_upload(case_id, &file, uploaded_by, enqueue, !no_embeddings).await,
        Commands::Enqueue {
            document_id,
            no_embeddings,
            ai_analysis,
        } => cmd_enqueue(document_id, payload(!no_embeddings, ai_analysis)).await,
        Commands::Decrypt {
            document_id,
            output,
        } => cmd_decrypt(document_id, &output).await,
        Commands::Sweep => cmd_sweep().await,
        Commands::Stats => cmd_stats().await,
        Commands::Ask {
            case_id,
            message,
            provider,
            conversation_id,
        } => cmd_ask(case_id, message, provider, conversation_id).await,
        Commands::GenerateMasterKey => cmd_generate_master_key(),
        Commands::Migrate => cmd_migrate().await,
    }
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "lexvault_worker=debug,lexvault_jobs=debug")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lexvault_worker=debug,lexvault_jobs=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("lexvault-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Logs go to stderr so command output on stdout stays parseable
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    debug!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

async fn cmd_run() -> anyhow::Result<()> {
    let rt = Runtime::connect().await?;
    let keys = key_manager()?;
    let provider = default_provider()?;

    let log_events = {
        let mut rx = rt.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => debug!(
                        event_type = %envelope.event_type,
                        document_id = ?envelope.document_id,
                        "Pipeline event"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event logger lagged behind the bus")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let pool_metrics = {
        let pool = rt.db.pool().clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(defaults::POOL_METRICS_INTERVAL_SECS));
            loop {
                interval.tick().await;
                log_pool_metrics(&pool);
            }
        })
    };

    let worker = WorkerBuilder::new(rt.repos.tasks.clone(), rt.events.clone())
        .with_config(WorkerConfig::from_env())
        .with_handler(rt.processor(keys, provider))
        .build()
        .await;
    let worker_handle = worker.start();

    let sweeper_handle = StaleTaskSweeper::new(
        rt.repos.tasks.clone(),
        rt.events.clone(),
        SweeperConfig::from_env(),
    )
    .start();

    info!("Worker running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received, draining in-flight tasks");

    if let Err(e) = sweeper_handle.shutdown().await {
        warn!(error = %e, "Sweeper did not shut down cleanly");
    }
    // A disabled worker has already exited, so the signal has nowhere to go
    if let Err(e) = worker_handle.shutdown().await {
        warn!(error = %e, "Worker did not shut down cleanly");
    }
    pool_metrics.abort();
    log_events.abort();
    info!("Worker stopped");
    Ok(())
}

async fn cmd_process_once() -> anyhow::Result<()> {
    let rt = Runtime::connect().await?;
    let worker = WorkerBuilder::new(rt.repos.tasks.clone(), rt.events.clone())
        .with_handler(rt.processor(key_manager()?, default_provider()?))
        .build()
        .await;

    match worker.process_one().await? {
        Some(processed) => {
            println!(
                "{}",
                serde_json::json!({
                    "task_id": processed.task_id,
                    "document_id": processed.document_id,
                    "status": processed.status,
                    "error_message": processed.error_message,
                })
            );
        }
        None => println!("No queued tasks"),
    }
    Ok(())
}

async fn cmd_upload(
    case_id: Uuid,
    file: &Path,
    uploaded_by: Option<Uuid>,
    enqueue: bool,
    embeddings: bool,
) -> anyhow::Result<()> {
    let file_name = file
        .file_name()
        .and_then(|f| f.to_str())
        .context("upload path has no usable file name")?;
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let rt = Runtime::connect().await?;
    let document =
        register_upload(&rt.repos, &rt.documents, case_id, file_name, &data, uploaded_by).await?;
    println!("{}", document.id);

    if enqueue {
        let task_id = enqueue_document_processing(
            &rt.repos,
            &rt.events,
            document.id,
            TaskKind::DocumentAnalysis,
            payload(embeddings, false),
        )
        .await?;
        info!(document_id = %document.id, task_id = %task_id, "Document queued");
    }
    Ok(())
}

async fn cmd_enqueue(document_id: Uuid, payload: TaskPayload) -> anyhow::Result<()> {
    let rt = Runtime::connect().await?;
    let task_id = enqueue_document_processing(
        &rt.repos,
        &rt.events,
        document_id,
        TaskKind::DocumentAnalysis,
        payload,
    )
    .await?;
    println!("{}", task_id);
    Ok(())
}

async fn cmd_decrypt(document_id: Uuid, output: &Path) -> anyhow::Result<()> {
    let rt = Runtime::connect().await?;
    let vault = DocumentVault::new(rt.repos.clone(), rt.documents.clone(), key_manager()?);
    let plaintext = vault.read_decrypted(document_id).await?;
    tokio::fs::write(output, plaintext.as_slice())
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        document_id = %document_id,
        byte_len = plaintext.len(),
        output = %output.display(),
        "Document decrypted"
    );
    Ok(())
}

async fn cmd_sweep() -> anyhow::Result<()> {
    let rt = Runtime::connect().await?;
    let sweeper = StaleTaskSweeper::new(
        rt.repos.tasks.clone(),
        rt.events.clone(),
        SweeperConfig::from_env(),
    );
    let swept = sweeper.sweep_once().await?;
    for task in &swept {
        println!("{}\t{}", task.id, task.document_id);
    }
    info!(result_count = swept.len(), "Sweep finished");
    Ok(())
}

async fn cmd_stats() -> anyhow::Result<()> {
    let rt = Runtime::connect().await?;
    let stats = rt.repos.tasks.queue_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn cmd_ask(
    case_id: Uuid,
    message: String,
    provider: Option<String>,
    conversation_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let rt = Runtime::connect().await?;
    let config = ProviderConfig::from_env()?;
    let alternate = match config.kind {
        ProviderKind::OpenAi => ProviderKind::Gemini,
        ProviderKind::Gemini => ProviderKind::OpenAi,
    };

    let rag = RagService::new(Arc::new(rt.db.search.clone()), build_provider(&config)?)
        .with_provider(build_provider(&config.clone().with_kind(alternate))?);
    let response = rag
        .answer(RagRequest {
            message,
            case_id,
            conversation_id,
            ai_provider: provider,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_generate_master_key() -> anyhow::Result<()> {
    let secret = MasterSecret::generate()?;
    println!("{}", secret.to_hex().as_str());
    Ok(())
}

async fn cmd_migrate() -> anyhow::Result<()> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/lexvault".to_string());
    let db = Database::connect(&database_url, PoolConfig::from_env()).await?;
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");
    Ok(())
}
