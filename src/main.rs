// src/main.rs
// FeedPulse — a single binary exposing the HTTP ingest edge and the two
// long-running background workers as separate subcommands, so the three
// independent processes of the concurrency model (§5) can be deployed apart
// or co-located for local development.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use feedpulse::config::CONFIG;
use feedpulse::state::AppState;
use feedpulse::workers::{IngestionConsumer, OutboxDispatcher};

#[derive(Parser)]
#[command(name = "feedpulse", about = "Social-feed analytics ingestion and dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP ingest edge (default).
    Serve,
    /// Run only the outbox dispatcher (C4).
    Dispatcher,
    /// Run only the ingestion consumer (C5).
    Consumer,
    /// Run the outbox dispatcher and the ingestion consumer together.
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_from_config())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    feedpulse::metrics::init_metrics();

    let cli = Cli::parse();
    let state = Arc::new(AppState::new().await?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Dispatcher => run_dispatcher(state).await,
        Command::Consumer => run_consumer(state).await,
        Command::Worker => {
            let dispatcher_state = state.clone();
            let dispatcher = tokio::spawn(async move { run_dispatcher(dispatcher_state).await });
            let consumer = tokio::spawn(async move { run_consumer(state).await });
            let (dispatcher_result, consumer_result) = tokio::join!(dispatcher, consumer);
            dispatcher_result??;
            consumer_result??;
            Ok(())
        }
    }
}

async fn serve(state: Arc<AppState>) -> Result<()> {
    let app = feedpulse::api::http::router(state);
    let bind_address = CONFIG.bind_address();
    info!(%bind_address, "starting HTTP ingest edge");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_dispatcher(state: Arc<AppState>) -> Result<()> {
    info!("starting outbox dispatcher");
    let worker_id = format!("dispatcher-{}", uuid::Uuid::new_v4());
    let dispatcher = OutboxDispatcher::new(
        state.repo.clone(),
        state.publisher.clone(),
        state.search.clone(),
        CONFIG.outbox.clone(),
        worker_id,
        CONFIG.broker.routing_key.clone(),
        state.metrics.clone(),
    );
    dispatcher.run().await;
    Ok(())
}

async fn run_consumer(state: Arc<AppState>) -> Result<()> {
    info!("starting ingestion consumer");
    let consumer =
        IngestionConsumer::new(state.repo.clone(), state.search.clone(), CONFIG.broker.clone(), state.metrics.clone());
    consumer.run().await;
    Ok(())
}

fn level_from_config() -> tracing::Level {
    match CONFIG.logging.level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
