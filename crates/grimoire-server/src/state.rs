//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use grimoire_core::GrimoireConfig;
use grimoire_infer::EmbeddingProvider;
use grimoire_ingest::{IngestReport, IngestRequest};
use grimoire_runtime::Orchestrator;
use grimoire_store::SqliteStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Ingestion job status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJob {
    pub id: String,
    pub name: String,
    pub source: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub queued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A rulebook waiting for the ingestion worker.
pub struct IngestJobRequest {
    pub job_id: String,
    pub request: IngestRequest,
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: GrimoireConfig,
    pub orchestrator: Orchestrator,
    pub jobs: RwLock<HashMap<String, IngestJob>>,
    ingest_tx: mpsc::UnboundedSender<IngestJobRequest>,
    ingest_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<IngestJobRequest>>>,
}

impl AppState {
    pub fn new(
        config: GrimoireConfig,
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(store, embedder, config.search.clone());

        Self {
            config,
            orchestrator,
            jobs: RwLock::new(HashMap::new()),
            ingest_tx: tx,
            ingest_rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    pub fn store(&self) -> &SqliteStore {
        self.orchestrator.store()
    }

    /// Take the ingestion receiver (can only be called once, by the worker).
    pub fn take_ingest_rx(&self) -> Option<mpsc::UnboundedReceiver<IngestJobRequest>> {
        self.ingest_rx.lock().take()
    }

    /// Record a queued job and hand the request to the worker. Returns the job id.
    pub fn enqueue(&self, request: IngestRequest) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let job = IngestJob {
            id: job_id.clone(),
            name: request.name.clone(),
            source: request.source.clone(),
            status: JobStatus::Queued,
            report: None,
            error: None,
            queued_at: now_millis(),
            started_at: None,
            completed_at: None,
        };
        self.jobs.write().insert(job_id.clone(), job);

        if self
            .ingest_tx
            .send(IngestJobRequest {
                job_id: job_id.clone(),
                request,
            })
            .is_err()
        {
            tracing::error!("Ingestion worker is not running; job {} dropped", job_id);
            self.update_job(&job_id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some("ingestion worker is not running".into());
                job.completed_at = Some(now_millis());
            });
        }
        job_id
    }

    pub fn update_job(&self, job_id: &str, f: impl FnOnce(&mut IngestJob)) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            f(job);
        }
    }

    /// Counts of queued and processing jobs.
    pub fn queue_depth(&self) -> (usize, usize) {
        let jobs = self.jobs.read();
        let queued = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .count();
        let processing = jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .count();
        (queued, processing)
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
