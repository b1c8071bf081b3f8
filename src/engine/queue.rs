// src/engine/queue.rs

//! Background FIFO of job requests.
//!
//! `put_job` never blocks: the request is handed to a worker task that submits
//! queued requests strictly one after another, waiting for each job to finish
//! before taking the next. Callers get a receiver for the submitted [`Job`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::job::{Job, JobRequest};
use crate::engine::runtime::JobEngine;
use crate::errors::{JobGraphError, Result};

struct QueuedRequest {
    request: JobRequest,
    reply: oneshot::Sender<Result<Arc<Job>>>,
}

pub struct JobQueuer {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    worker: JoinHandle<()>,
}

impl JobQueuer {
    /// Start the queue worker on the current tokio runtime.
    pub fn new(engine: JobEngine) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_queue(engine, rx));
        Self { tx, worker }
    }

    /// Enqueue a request. The receiver resolves once the job was submitted
    /// (or submission failed).
    pub fn put_job(&self, request: JobRequest) -> Result<oneshot::Receiver<Result<Arc<Job>>>> {
        let name = request.name.clone();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueuedRequest { request, reply })
            .map_err(|_| JobGraphError::EngineShutdown(name.clone()))?;
        debug!(name = %name, "job request queued");
        Ok(rx)
    }

    /// Stop accepting requests and wait for the queued ones to finish.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(err) = self.worker.await {
            error!(error = %err, "job queue worker failed");
        }
    }
}

async fn run_queue(engine: JobEngine, mut rx: mpsc::UnboundedReceiver<QueuedRequest>) {
    while let Some(QueuedRequest { request, reply }) = rx.recv().await {
        let name = request.name.clone();
        // Synchronous flag is ignored here; the queue always waits below.
        match engine.submit_request(request.synchronous(false)).await {
            Ok(job) => {
                let _ = reply.send(Ok(Arc::clone(&job)));
                let status = job.wait_for_completion().await;
                info!(job = %job.id(), name = %name, status = %status, "queued job finished");
            }
            Err(err) => {
                error!(name = %name, error = %err, "queued job submission failed");
                let _ = reply.send(Err(err));
            }
        }
    }
    debug!("job queue drained");
}
