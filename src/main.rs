use chrono::{Duration, Utc};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use shipbot::application::flow::{ConversationEngine, Stores};
use shipbot::application::guard::InMemoryInputGuard;
use shipbot::application::rates::RateEngine;
use shipbot::application::sweeper::spawn_sweeper;
use shipbot::config::Settings;
use shipbot::domain::ports::{ClockRef, RateCacheBox};
use shipbot::infrastructure::clock::ManualClock;
use shipbot::infrastructure::in_memory::InMemoryRateCache;
use shipbot::interfaces::csv::reply_writer::ReplyWriter;
use shipbot::interfaces::csv::transcript_reader::{TranscriptEvent, TranscriptReader};
use shipbot::interfaces::fixture::FixtureRateSource;
use shipbot::telemetry;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Conversation transcript CSV (user_id,chat_id,kind,content)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON file with the rate source answer. Defaults to a built-in sample.
    #[arg(long)]
    rates: Option<PathBuf>,

    /// TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated time between transcript messages, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pace_ms: i64,
}

fn in_memory(settings: &Settings) -> (Stores, RateCacheBox) {
    (
        Stores::in_memory(settings.progress_retention()),
        Box::new(InMemoryRateCache::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>, settings: &Settings) -> Result<(Stores, RateCacheBox)> {
    use shipbot::infrastructure::rocksdb::RocksDBStore;

    let Some(db_path) = db_path else {
        return Ok(in_memory(settings));
    };
    let store = RocksDBStore::open_with_retention(db_path, settings.progress_retention())?;
    let stores = Stores {
        sessions: Box::new(store.clone()),
        progress: Box::new(store.clone()),
        orders: Box::new(store.clone()),
        templates: Box::new(store.clone()),
    };
    Ok((stores, Box::new(store)))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>, settings: &Settings) -> Result<(Stores, RateCacheBox)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory(settings))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    telemetry::init(&settings.logging.filter);

    // Replays run on simulated time so the input guard sees realistic gaps.
    let clock = ManualClock::new(Utc::now());
    let clock_ref: ClockRef = Arc::new(clock.clone());

    let source = match &cli.rates {
        Some(path) => FixtureRateSource::from_path(path)?,
        None => FixtureRateSource::sample(),
    };
    let (stores, rate_cache) = open_stores(cli.db_path, &settings)?;
    let rates = RateEngine::new(
        Box::new(source),
        rate_cache,
        clock_ref.clone(),
        settings.rates.policy(),
    );
    let guard = InMemoryInputGuard::new(
        clock_ref.clone(),
        settings.guard_interval(),
        settings.guard.notice_after,
    );
    let engine = Arc::new(ConversationEngine::new(
        stores,
        rates,
        Box::new(guard),
        clock_ref,
        settings.engine_settings(),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(engine.clone(), settings.sweep_interval(), shutdown.clone());

    let file = File::open(&cli.input).into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = ReplyWriter::new(stdout.lock())?;
    for event in TranscriptReader::new(file).events() {
        match event {
            Ok(TranscriptEvent::Wait(millis)) => clock.advance(Duration::milliseconds(millis)),
            Ok(TranscriptEvent::Message(inbound)) => {
                clock.advance(Duration::milliseconds(cli.pace_ms));
                let reply = engine.handle(inbound.clone()).await;
                writer.write_reply(&inbound, &reply)?;
            }
            Err(e) => {
                eprintln!("Error reading transcript: {}", e);
            }
        }
    }
    writer.flush()?;

    shutdown.cancel();
    sweeper.await.into_diagnostic()?;

    Ok(())
}
