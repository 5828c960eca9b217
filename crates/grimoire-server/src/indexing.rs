//! Background ingestion queue: parses and embeds rulebooks off the request path.

use std::sync::Arc;

use grimoire_core::Error;
use grimoire_runtime::orchestrator::DEFAULT_BACKFILL_BATCH;
use tracing::{error, info, warn};

use crate::state::{now_millis, AppState, IngestJobRequest, JobStatus};

/// Finished jobs kept for `GET /api/rules/jobs`.
const MAX_FINISHED_JOBS: usize = 100;

/// Start the background ingestion worker task.
pub fn start_ingest_worker(state: Arc<AppState>) {
    let mut rx = match state.take_ingest_rx() {
        Some(rx) => rx,
        None => {
            error!("Ingestion worker already started");
            return;
        }
    };

    // Embed entries left without an embedding by earlier sessions.
    let catchup_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = catchup_state
            .orchestrator
            .backfill_embeddings(DEFAULT_BACKFILL_BATCH)
            .await
        {
            warn!("Startup embedding backfill failed: {}", e);
        }
    });

    tokio::spawn(async move {
        info!("Background ingestion worker started");
        while let Some(job) = rx.recv().await {
            process_ingest_job(&state, job).await;
        }
    });
}

pub async fn process_ingest_job(state: &AppState, job: IngestJobRequest) {
    let IngestJobRequest { job_id, request } = job;
    state.update_job(&job_id, |job| {
        job.status = JobStatus::Processing;
        job.started_at = Some(now_millis());
    });

    let name = request.name.clone();
    info!("Processing ingestion job {}: {}", job_id, name);

    match state.orchestrator.ingest(request).await {
        Ok(report) => {
            info!("Ingested {} → document {}", name, report.document_id);
            state.update_job(&job_id, |job| {
                job.status = JobStatus::Completed;
                job.report = Some(report);
                job.completed_at = Some(now_millis());
            });
        }
        Err(Error::DuplicateContent(_)) => {
            info!("Skipped duplicate: {}", name);
            state.update_job(&job_id, |job| {
                job.status = JobStatus::Completed;
                job.error = Some("Duplicate content".to_string());
                job.completed_at = Some(now_millis());
            });
        }
        Err(e) => {
            error!("Failed to ingest {}: {}", name, e);
            state.update_job(&job_id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                job.completed_at = Some(now_millis());
            });
        }
    }

    cleanup_old_jobs(state);
}

fn cleanup_old_jobs(state: &AppState) {
    let mut jobs = state.jobs.write();
    let mut finished: Vec<(String, i64)> = jobs
        .values()
        .filter(|j| j.status.is_finished())
        .map(|j| (j.id.clone(), j.completed_at.unwrap_or(j.queued_at)))
        .collect();

    if finished.len() > MAX_FINISHED_JOBS {
        finished.sort_by_key(|(_, t)| *t);
        let remove_count = finished.len() - MAX_FINISHED_JOBS;
        for (id, _) in finished.into_iter().take(remove_count) {
            jobs.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grimoire_core::GrimoireConfig;
    use grimoire_infer::NoopEmbedder;
    use grimoire_ingest::IngestRequest;
    use grimoire_store::{FileType, SqliteStore};

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = GrimoireConfig::from_env(dir.path()).unwrap();
        let store = SqliteStore::open(&config.data_paths.corpus, 8).unwrap();
        let state = AppState::new(config, Arc::new(store), Arc::new(NoopEmbedder::new(8)));
        (state, dir)
    }

    fn request(text: &str) -> IngestRequest {
        IngestRequest {
            name: "Basic Rules".into(),
            text: text.into(),
            source: "basic_rules".into(),
            file_type: FileType::Text,
        }
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let (state, _dir) = test_state();
        let text = "Ch. 1: Introduction\nAdventures await the bold.";
        let job_id = state.enqueue(request(text));
        assert_eq!(state.jobs.read()[&job_id].status, JobStatus::Queued);
        assert_eq!(state.queue_depth(), (1, 0));

        let mut rx = state.take_ingest_rx().unwrap();
        let job = rx.recv().await.unwrap();
        process_ingest_job(&state, job).await;

        let job = state.jobs.read()[&job_id].clone();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.report.unwrap().chapters, 1);
        assert!(job.completed_at.is_some());

        // Same text again is reported as a completed duplicate.
        let dup_id = state.enqueue(request(text));
        let job = rx.recv().await.unwrap();
        process_ingest_job(&state, job).await;
        let dup = state.jobs.read()[&dup_id].clone();
        assert_eq!(dup.status, JobStatus::Completed);
        assert_eq!(dup.error.as_deref(), Some("Duplicate content"));
    }

    #[tokio::test]
    async fn test_failed_job() {
        let (state, _dir) = test_state();
        let job_id = state.enqueue(IngestRequest {
            source: " ".into(),
            ..request("Ch. 1: Introduction\nText.")
        });
        let mut rx = state.take_ingest_rx().unwrap();
        process_ingest_job(&state, rx.recv().await.unwrap()).await;

        let job = state.jobs.read()[&job_id].clone();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("source"));
    }

    #[test]
    fn test_cleanup_keeps_recent_finished_jobs() {
        let (state, _dir) = test_state();
        let ids: Vec<String> = (0..MAX_FINISHED_JOBS + 5)
            .map(|i| {
                let id = state.enqueue(request(&format!("text {}", i)));
                state.update_job(&id, |job| {
                    job.status = JobStatus::Completed;
                    job.completed_at = Some(i as i64);
                });
                id
            })
            .collect();

        cleanup_old_jobs(&state);
        let jobs = state.jobs.read();
        assert_eq!(jobs.len(), MAX_FINISHED_JOBS);
        assert!(!jobs.contains_key(&ids[0]));
        assert!(jobs.contains_key(&ids[MAX_FINISHED_JOBS + 4]));
    }
}
