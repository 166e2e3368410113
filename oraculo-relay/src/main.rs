//! Relay binary: the webhook/answer server plus the operator commands
//! for initializing and rebuilding the knowledge index.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use oraculo::answer::AnswerPipeline;
use oraculo::config::EngineConfig;
use oraculo::ingest::{IngestOutcome, IngestionPipeline, ingest_channel, spawn_ingest_worker};
use oraculo::records::RecordStore;
use oraculo_relay::webhook::{RelayState, router};
use oraculo_relay::{EvolutionApi, RelayConfig, TurnBuffer, spawn_responder};

/// Placeholder entry so a brand-new deployment has a loadable index
/// before the first training record arrives.
const SEED_TEXT: &str =
    "Knowledge base initialized. Add training material to answer questions.";

#[derive(Parser)]
#[command(name = "oraculo-relay", about = "WhatsApp relay for the oraculo engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook/answer server with its ingest and reply workers.
    Serve,
    /// Create the index with a seed entry if none exists yet.
    InitIndex,
    /// Re-run ingestion over every stored training record.
    Reingest {
        /// Wipe the index before reprocessing.
        #[arg(long)]
        wipe: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    match Cli::parse().command {
        Command::Serve => serve().await,
        Command::InitIndex => init_index().await,
        Command::Reingest { wipe } => reingest(wipe).await,
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let engine_config = EngineConfig::from_env()?;
    let relay_config = RelayConfig::from_env()?;

    let store = RecordStore::open(&engine_config.records_db).await?;
    let ingestion = Arc::new(IngestionPipeline::from_config(&engine_config)?);
    let answers = Arc::new(AnswerPipeline::from_config(&engine_config, store.clone())?);

    let (ingest, ingest_queue) = ingest_channel();
    spawn_ingest_worker(ingestion, store.clone(), ingest_queue);

    let (turns, fired) = TurnBuffer::new(relay_config.debounce_window);
    let outbound = Arc::new(EvolutionApi::new(
        relay_config.evolution_base_url.clone(),
        relay_config.evolution_keys.clone(),
    )?);
    spawn_responder(
        fired,
        answers.clone(),
        outbound,
        relay_config.default_instance.clone(),
    );

    let app = router(RelayState {
        turns,
        store,
        answers,
        ingest,
    });
    let listener = TcpListener::bind(relay_config.bind_addr).await?;
    tracing::info!(addr = %relay_config.bind_addr, "oraculo relay listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn init_index() -> Result<(), Box<dyn std::error::Error>> {
    let engine_config = EngineConfig::from_env()?;
    let pipeline = IngestionPipeline::from_config(&engine_config)?;
    if pipeline.initialize_index(SEED_TEXT).await? {
        tracing::info!(dir = %engine_config.index_dir.display(), "knowledge index created");
    } else {
        tracing::info!(dir = %engine_config.index_dir.display(), "knowledge index already exists");
    }
    Ok(())
}

async fn reingest(wipe: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine_config = EngineConfig::from_env()?;
    let store = RecordStore::open(&engine_config.records_db).await?;
    let pipeline = IngestionPipeline::from_config(&engine_config)?;

    if wipe {
        pipeline.wipe_index().await?;
        tracing::info!("knowledge index wiped");
    }

    let trainings = store.list_trainings().await?;
    if trainings.is_empty() {
        tracing::warn!("no training records to reprocess");
        return Ok(());
    }

    tracing::info!(count = trainings.len(), "reprocessing training records");
    let mut failures = 0usize;
    for record in &trainings {
        match pipeline.ingest(record).await {
            Ok(IngestOutcome::Indexed { chunks, .. }) => {
                tracing::info!(record = %record.id, chunks, "record reprocessed");
            }
            Ok(IngestOutcome::NoContent) => {
                tracing::warn!(record = %record.id, "record had no extractable content");
            }
            Err(err) => {
                failures += 1;
                tracing::error!(record = %record.id, error = %err, "record failed to reprocess");
            }
        }
    }
    tracing::info!(
        processed = trainings.len() - failures,
        failures,
        "reprocessing finished"
    );
    Ok(())
}
