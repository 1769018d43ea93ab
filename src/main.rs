// src/main.rs
// Hivemind entry point: serve (HTTP API), worker (queue consumers), and
// ingest (platform event loop) runtimes behind one CLI.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use hivemind::answer::{AnswerRouter, ThematicAnalyzer, WebSearchClient};
use hivemind::config::{Config, OverrideStore};
use hivemind::consistency::ConsistencyService;
use hivemind::documents::DocumentProcessor;
use hivemind::embeddings::{SparseEncoder, TextEmbedder};
use hivemind::ingest::IngestService;
use hivemind::llm::LlmClient;
use hivemind::platform::{PlatformEvent, run_ingest_loop};
use hivemind::queue::WorkQueue;
use hivemind::queue::handlers::TaskContext;
use hivemind::queue::worker::WorkerPool;
use hivemind::retrieval::RetrievalEngine;
use hivemind::state::AppState;
use hivemind::store::Store;
use hivemind::vector::VectorIndex;

#[derive(Parser)]
#[command(name = "hivemind", version, about = "Community intelligence layer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API runtime.
    Serve,
    /// Run the queue worker runtime.
    Worker,
    /// Run the ingest runtime, consuming platform events as JSON lines on stdin.
    Ingest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env());
    config.validate().context("configuration invalid")?;

    // Default store/broker/cache paths live under data/.
    let _ = std::fs::create_dir_all("data");

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Worker => worker(config).await,
        Command::Ingest => ingest(config).await,
    }
}

async fn build_state(config: Arc<Config>) -> Result<Arc<AppState>> {
    let store = Store::connect(&config.store).await?;
    let queue = WorkQueue::connect(&config.queue.broker_url).await?;

    let overrides = Arc::new(OverrideStore::load(&config.settings_overrides_path));
    let embedder = Arc::new(TextEmbedder::from_config(&config));
    let index = Arc::new(
        VectorIndex::connect(
            &config.vector_index.url,
            config.vector_index.api_key.as_deref(),
            embedder.dimension(),
        )
        .await?,
    );

    let engine = Arc::new(RetrievalEngine::new(index.clone(), embedder.clone(), true));
    let llm = Arc::new(LlmClient::from_config(&config, &overrides.snapshot()));
    if llm.is_available() {
        info!("Answering with model {}", llm.model_name());
    } else {
        warn!("No LLM provider configured; template fallbacks only");
    }

    let router = Arc::new(AnswerRouter::new(
        store.clone(),
        engine.clone(),
        embedder.clone(),
        llm,
        WebSearchClient::new(config.web_search_api_key.clone()),
        ThematicAnalyzer::new(&config.topics_cache_dir),
    ));
    let consistency = Arc::new(ConsistencyService::new(
        store.clone(),
        queue.clone(),
        index.clone(),
    ));

    Ok(Arc::new(AppState {
        config,
        store,
        queue,
        index,
        embedder,
        engine,
        router,
        consistency,
        overrides,
    }))
}

async fn serve(config: Arc<Config>) -> Result<()> {
    let state = build_state(config.clone()).await?;
    let app = hivemind::api::http_router(state);

    let bind = config.server.bind_address();
    info!("HTTP API listening on {}", bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn worker(config: Arc<Config>) -> Result<()> {
    let state = build_state(config.clone()).await?;

    // Stale/unbound sweep runs alongside the workers.
    let _sweeper = state
        .consistency
        .clone()
        .spawn_sweeper(Duration::from_secs(300));

    let context = TaskContext {
        store: state.store.clone(),
        queue: state.queue.clone(),
        index: state.index.clone(),
        embedder: state.embedder.clone(),
        sparse: SparseEncoder::new(),
        documents: DocumentProcessor::new(),
        vision: Arc::new(LlmClient::vision_from_config(
            &config,
            &state.overrides.snapshot(),
        )),
        router: state.router.clone(),
        ingest_config: config.ingest.clone(),
    };

    let pool = WorkerPool::new(state.queue.clone(), Arc::new(context), config.queue.clone());
    pool.run().await;
    Ok(())
}

async fn ingest(config: Arc<Config>) -> Result<()> {
    let store = Store::connect(&config.store).await?;
    let queue = WorkQueue::connect(&config.queue.broker_url).await?;
    let service = IngestService::new(store, queue, config.ingest.clone());

    // The platform adapter pipes events in as JSON lines; the loop stays
    // unblocked because handlers only persist and enqueue.
    let (tx, rx) = mpsc::channel::<PlatformEvent>(1024);
    let reader = tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PlatformEvent>(&line) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Unparseable platform event: {}", e),
            }
        }
    });

    run_ingest_loop(service, rx).await?;
    reader.abort();
    Ok(())
}
