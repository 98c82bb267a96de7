//! Queue runner: pops OCR jobs and feeds them to the processor one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use fintrack_core::defaults::{EVENT_BUS_CAPACITY, RUNNER_ERROR_BACKOFF_MS, RUNNER_POP_TIMEOUT_SECS};
use fintrack_core::{Error, OcrJob, Result};

use crate::processor::{JobFailure, OcrProcessor};

/// Configuration for the queue runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Whether to consume the queue at all.
    pub enabled: bool,
    /// How long one pop waits for a job before shutdown is re-checked.
    pub pop_timeout_secs: u64,
    /// Pause after a broker error before popping again.
    pub error_backoff_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pop_timeout_secs: RUNNER_POP_TIMEOUT_SECS,
            error_backoff_ms: RUNNER_ERROR_BACKOFF_MS,
        }
    }
}

impl RunnerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RUNNER_ENABLED` | `true` | Enable/disable queue consumption |
    /// | `RUNNER_POP_TIMEOUT_SECS` | `5` | Blocking pop timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("RUNNER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let pop_timeout_secs = std::env::var("RUNNER_POP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(RUNNER_POP_TIMEOUT_SECS)
            .max(1);

        Self {
            enabled,
            pop_timeout_secs,
            error_backoff_ms: RUNNER_ERROR_BACKOFF_MS,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_pop_timeout(mut self, secs: u64) -> Self {
        self.pop_timeout_secs = secs;
        self
    }

    pub fn with_error_backoff(mut self, ms: u64) -> Self {
        self.error_backoff_ms = ms;
        self
    }
}

/// Event emitted by the queue runner.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    /// Job delivered; retry counter cleared.
    JobCompleted { job_id: String },
    /// Job failed and was put back on the main queue.
    JobRequeued {
        job_id: String,
        attempt: u32,
        error: String,
    },
    /// Job failed for the last time and went to the dead-letter queue.
    JobDeadLettered {
        job_id: String,
        attempts: u32,
        error: String,
    },
    /// Job failed and its retry state could not be written.
    JobFailed { job_id: String, error: String },
    /// Payload was not a job; stored raw in the dead-letter queue.
    PayloadRejected { error: String },
    RunnerStarted,
    RunnerStopped,
}

impl RunnerEvent {
    fn from_failure(failure: &JobFailure) -> Self {
        let error = failure.cause().to_string();
        match failure {
            JobFailure::Requeued {
                job_id, attempt, ..
            } => RunnerEvent::JobRequeued {
                job_id: job_id.clone(),
                attempt: *attempt,
                error,
            },
            JobFailure::DeadLettered {
                job_id, attempts, ..
            } => RunnerEvent::JobDeadLettered {
                job_id: job_id.clone(),
                attempts: *attempts,
                error,
            },
            JobFailure::Unrecorded { job_id, .. } | JobFailure::Store { job_id, .. } => {
                RunnerEvent::JobFailed {
                    job_id: job_id.clone(),
                    error: failure.to_string(),
                }
            }
        }
    }
}

/// Handle for controlling a running queue runner.
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<RunnerEvent>,
}

impl RunnerHandle {
    /// Ask the runner to stop after the job in hand, if any.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    pub fn events(&self) -> broadcast::Receiver<RunnerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Consumes the main OCR queue.
pub struct QueueRunner {
    processor: Arc<OcrProcessor>,
    config: RunnerConfig,
    event_tx: broadcast::Sender<RunnerEvent>,
}

impl QueueRunner {
    pub fn new(processor: OcrProcessor, config: RunnerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            processor: Arc::new(processor),
            config,
            event_tx,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<RunnerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the runner loop and return a handle for control.
    pub fn start(self) -> RunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        RunnerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Queue runner is disabled, not starting");
            return;
        }

        let queue = &self.processor.config().queue;
        info!(
            %queue,
            dead_letter_queue = %self.processor.config().dead_letter_queue,
            pop_timeout_secs = self.config.pop_timeout_secs,
            "Queue runner started"
        );
        let _ = self.event_tx.send(RunnerEvent::RunnerStarted);

        let backoff = Duration::from_millis(self.config.error_backoff_ms);

        loop {
            // Only checked between pops; a popped job is always processed.
            if shutdown_rx.try_recv().is_ok() {
                info!("Queue runner received shutdown signal");
                break;
            }

            if let Err(e) = self.run_once().await {
                error!(%queue, error = %e, "Failed to pop from queue");
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Queue runner received shutdown signal");
                        break;
                    }
                    _ = sleep(backoff) => {}
                }
            }
        }

        let _ = self.event_tx.send(RunnerEvent::RunnerStopped);
        info!("Queue runner stopped");
    }

    /// Pop and handle at most one payload.
    ///
    /// `Ok(None)` means the pop timed out on an empty queue. Job failures are
    /// reported as events, not errors; `Err` is reserved for the broker
    /// refusing the pop or the raw dead-letter push.
    pub async fn run_once(&self) -> Result<Option<RunnerEvent>> {
        let config = self.processor.config();
        let timeout = Duration::from_secs(self.config.pop_timeout_secs);

        let payload = match self.processor.store().blpop(&config.queue, timeout).await? {
            Some(payload) => payload,
            None => return Ok(None),
        };

        let event = match serde_json::from_str::<OcrJob>(&payload) {
            Ok(job) => match self.processor.process_one(&job).await {
                Ok(job_id) => RunnerEvent::JobCompleted { job_id },
                Err(failure) => RunnerEvent::from_failure(&failure),
            },
            Err(e) => {
                warn!(
                    queue = %config.dead_letter_queue,
                    error = %e,
                    "Payload is not an OCR job, dead-lettering as-is"
                );
                self.processor
                    .store()
                    .lpush(&config.dead_letter_queue, &payload)
                    .await?;
                RunnerEvent::PayloadRejected {
                    error: e.to_string(),
                }
            }
        };

        debug!(?event, "Handled queue payload");
        let _ = self.event_tx.send(event.clone());
        Ok(Some(event))
    }
}
