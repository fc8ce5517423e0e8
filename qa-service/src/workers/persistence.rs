use crate::config::PersistenceConfig;
use crate::error::QaError;
use crate::models::ChatHistoryRecord;
use crate::services::history::HistoryRecorder;
use crate::services::metrics;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Submits finished stream turns to the persistence pool.
#[derive(Clone)]
pub struct PersistenceHandle {
    job_tx: mpsc::Sender<ChatHistoryRecord>,
    producers: TaskTracker,
}

impl PersistenceHandle {
    /// Queue a record, waiting for space when the queue is full.
    pub async fn submit(&self, record: ChatHistoryRecord) -> Result<(), QaError> {
        self.job_tx
            .send(record)
            .await
            .map_err(|_| QaError::Persistence("Persistence pool is shut down".to_string()))
    }

    /// Spawn a task that may still `submit` after its caller has returned.
    /// Shutdown waits for these tasks before it stops taking jobs.
    pub fn spawn_producer<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.producers.spawn(task)
    }
}

/// Bounded background writer for streamed turns.
///
/// A single dispatcher pulls jobs off a bounded queue and spawns one write
/// per job, with at most `worker_count` writes in flight. Failed writes are
/// logged and counted, never retried.
pub struct PersistencePool {
    dispatcher: JoinHandle<()>,
    shutdown_token: CancellationToken,
    producers: TaskTracker,
}

impl PersistencePool {
    pub fn start(recorder: HistoryRecorder, config: &PersistenceConfig) -> (PersistenceHandle, Self) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_size);
        let shutdown_token = CancellationToken::new();
        let producers = TaskTracker::new();

        tracing::info!(
            worker_count = config.worker_count,
            queue_size = config.queue_size,
            "Starting persistence pool"
        );

        let dispatcher = tokio::spawn(dispatch(
            recorder,
            job_rx,
            Arc::new(Semaphore::new(config.worker_count)),
            config.worker_count,
            shutdown_token.clone(),
        ));

        let handle = PersistenceHandle {
            job_tx,
            producers: producers.clone(),
        };
        let pool = Self {
            dispatcher,
            shutdown_token,
            producers,
        };

        (handle, pool)
    }

    /// Wait for producer tasks to finish submitting, stop accepting jobs,
    /// write everything already queued, and wait for in-flight writes.
    pub async fn shutdown(self) {
        tracing::info!(
            producers = self.producers.len(),
            "Initiating persistence pool shutdown"
        );
        self.producers.close();
        self.producers.wait().await;
        self.shutdown_token.cancel();
        if let Err(e) = self.dispatcher.await {
            tracing::error!(error = %e, "Persistence dispatcher panicked");
        }
    }
}

async fn dispatch(
    recorder: HistoryRecorder,
    mut job_rx: mpsc::Receiver<ChatHistoryRecord>,
    semaphore: Arc<Semaphore>,
    worker_count: usize,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Persistence dispatcher shutting down, draining queue");
                break;
            }
            job = job_rx.recv() => match job {
                Some(record) => spawn_write(&recorder, &semaphore, record).await,
                None => {
                    tracing::info!("Channel closed, persistence dispatcher exiting");
                    break;
                }
            }
        }
    }

    job_rx.close();
    let mut drained = 0usize;
    while let Some(record) = job_rx.recv().await {
        spawn_write(&recorder, &semaphore, record).await;
        drained += 1;
    }

    // Every permit back means every write has finished.
    if semaphore.acquire_many(worker_count as u32).await.is_ok() {
        tracing::info!(drained, "Persistence pool stopped");
    }
}

async fn spawn_write(
    recorder: &HistoryRecorder,
    semaphore: &Arc<Semaphore>,
    record: ChatHistoryRecord,
) {
    let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
        tracing::error!(session_id = %record.session_id, "Persistence semaphore closed, dropping record");
        return;
    };

    let recorder = recorder.clone();
    tokio::spawn(async move {
        let _permit = permit;
        let session_id = record.session_id.clone();
        match recorder.record(record).await {
            Ok(_) => metrics::record_history_write("stream", "ok"),
            Err(e) => {
                metrics::record_history_write("stream", "failed");
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "Detached chat history write failed"
                );
            }
        }
    });
}
