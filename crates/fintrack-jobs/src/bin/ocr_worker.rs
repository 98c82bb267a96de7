//! fintrack-ocr-worker - consumes the receipt OCR queue

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use fintrack_jobs::defaults::{
    OCR_DEAD_LETTER_QUEUE, OCR_QUEUE, REDIS_RESPONSE_TIMEOUT_SECS, REDIS_URL,
};
use fintrack_jobs::{
    OcrProcessor, ProcessorConfig, QueueRunner, RedisStore, RedisStoreConfig, RunnerConfig,
    RunnerEvent,
};

#[derive(Debug, Parser)]
#[command(name = "fintrack-ocr-worker", version, about = "Receipt OCR queue worker")]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = REDIS_URL)]
    redis_url: String,

    /// Seconds a Redis command may go unanswered
    #[arg(long, env = "REDIS_RESPONSE_TIMEOUT_SECS", default_value_t = REDIS_RESPONSE_TIMEOUT_SECS)]
    redis_response_timeout: u64,

    /// Queue to consume jobs from
    #[arg(long, env = "OCR_QUEUE", default_value = OCR_QUEUE)]
    queue: String,

    /// Queue exhausted jobs are moved to
    #[arg(long, env = "OCR_DEAD_LETTER_QUEUE", default_value = OCR_DEAD_LETTER_QUEUE)]
    dead_letter_queue: String,
}

/// `LOG_FORMAT=json` switches to JSON lines; `LOG_FILE` sends output to a
/// daily-rolled file instead of stdout. The guard must outlive the worker.
fn init_tracing() -> Option<WorkerGuard> {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let (writer, ansi, guard) = match std::env::var("LOG_FILE") {
        Ok(path) => {
            let path = std::path::Path::new(&path);
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("fintrack-ocr-worker.log");
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
            (BoxMakeWriter::new(non_blocking), false, Some(guard))
        }
        Err(_) => (BoxMakeWriter::new(std::io::stdout), true, None),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fintrack_jobs=info,fintrack_ocr_worker=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let _log_guard = init_tracing();
    info!(queue = %cli.queue, "fintrack-ocr-worker starting");

    let runner_config = RunnerConfig::from_env();
    if !runner_config.enabled {
        warn!("RUNNER_ENABLED is off, exiting");
        return Ok(());
    }

    let store = RedisStore::connect_with(
        RedisStoreConfig::default()
            .with_url(cli.redis_url)
            .with_response_timeout(cli.redis_response_timeout),
    )
    .await?;

    let processor_config = ProcessorConfig::from_env()
        .with_queue(cli.queue)
        .with_dead_letter_queue(cli.dead_letter_queue);

    let processor = OcrProcessor::builder(Arc::new(store))
        .with_config(processor_config)
        .build()?;

    let handle = QueueRunner::new(processor, runner_config).start();
    let mut events = handle.events();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, finishing current job");
    handle.shutdown().await?;

    loop {
        match events.recv().await {
            Ok(RunnerEvent::RunnerStopped) | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
        }
    }

    info!("fintrack-ocr-worker stopped");
    Ok(())
}
