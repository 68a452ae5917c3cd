//! Per-stage adapters and the SCANNING -> CONVERTING -> EXPORTING ->
//! FINALIZING state machine, grounded on `documents/tasks.py`'s task chain
//! (`scan_pdf_task` -> `docling_convert_task` -> `export_artifacts_task` ->
//! `finalize_job_task`).

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::docling::{ConversionEngine, ConversionLimits};
use crate::domain::{ArtifactKind, Document, DocumentStatus, IngestionJob, JobStatus, Stage, StageTiming};
use crate::pipeline::export;
use crate::pipeline::profiles::get_profile_definition;
use crate::scanner::{MalwareScanner, ScanVerdict, SCAN_ERROR_CODE_INVALID_RESPONSE};
use crate::storage::StorageClient;
use crate::store::DocStore;
use crate::webhooks;

pub struct StageContext {
    pub store: Arc<DocStore>,
    pub storage: Arc<StorageClient>,
    pub scanner: Arc<dyn MalwareScanner>,
    pub engine: Arc<dyn ConversionEngine>,
    pub conversion_limits: ConversionLimits,
}

/// Whether running this stage produced a next stage to enqueue, finished
/// the job, or should be retried/dead-lettered by the caller.
pub enum StageOutcome {
    Advance(Stage),
    JobFinished,
    Retry { error_code: String, error_message: String },
    Terminal { error_code: String, error_message: String },
}

pub async fn run_stage(ctx: &StageContext, job_id: Uuid, stage: Stage) -> StageOutcome {
    let Some(mut job) = ctx.store.get_job(job_id).ok().flatten() else {
        return StageOutcome::Terminal {
            error_code: "JOB_NOT_FOUND".into(),
            error_message: format!("job {job_id} disappeared from the store"),
        };
    };

    if job.cancel_requested {
        let previous = (job.status, job.stage);
        job.status = JobStatus::Cancelled;
        job.updated_at = crate::domain::now();
        job.finished_at.get_or_insert_with(|| job.updated_at.clone());
        let _ = ctx.store.put_job(&job);
        if (job.status, job.stage) != previous {
            webhooks::notify_job_updated(&ctx.store, &job, previous.0, previous.1).await;
        }
        return StageOutcome::Terminal {
            error_code: "CANCELLED".into(),
            error_message: "job was cancelled before this stage ran".into(),
        };
    }

    // A job is only ever picked up while Queued; mark it Running for the
    // duration of this stage and record the first time it started.
    let entry = (job.status, job.stage);
    if job.status == JobStatus::Queued {
        job.status = JobStatus::Running;
        if job.started_at.is_none() {
            job.started_at = Some(crate::domain::now());
        }
        job.updated_at = crate::domain::now();
        let _ = ctx.store.put_job(&job);
        webhooks::notify_job_updated(&ctx.store, &job, entry.0, entry.1).await;
    }

    let previous = (job.status, job.stage);
    let started_at = crate::domain::now();
    let result = match stage {
        Stage::Scanning => run_scan(ctx, &job).await,
        Stage::Converting => run_convert(ctx, &job).await,
        Stage::Exporting => run_export(ctx, &job).await,
        Stage::Finalizing => run_finalize(ctx, &job).await,
    };

    let finished_at = crate::domain::now();
    let outcome = match result {
        Ok(()) => {
            job.stage_history.push(StageTiming {
                stage,
                started_at,
                finished_at: Some(finished_at.clone()),
                error_code: None,
            });
            job.updated_at = finished_at.clone();
            match stage.next() {
                Some(next) => {
                    job.stage = next;
                    let _ = ctx.store.put_job(&job);
                    StageOutcome::Advance(next)
                }
                None => {
                    job.status = JobStatus::Succeeded;
                    job.finished_at = Some(finished_at);
                    let _ = ctx.store.put_job(&job);
                    StageOutcome::JobFinished
                }
            }
        }
        Err((code, message)) => {
            job.stage_history.push(StageTiming {
                stage,
                started_at,
                finished_at: Some(finished_at.clone()),
                error_code: Some(code.clone()),
            });
            job.error_code = Some(code.clone());
            job.error_message = Some(message.clone());
            job.updated_at = finished_at.clone();

            if code == "VIRUS_FOUND" {
                // A virus hit is its own terminal status, never a retry
                // candidate and never folded into the generic FAILED bucket.
                job.status = JobStatus::Quarantined;
                job.finished_at = Some(finished_at);
                let _ = ctx.store.put_job(&job);
                StageOutcome::Terminal { error_code: code, error_message: message }
            } else if job.attempt + 1 < job.max_attempts && is_retryable(&code) {
                job.attempt += 1;
                let _ = ctx.store.put_job(&job);
                StageOutcome::Retry { error_code: code, error_message: message }
            } else {
                job.status = JobStatus::Failed;
                job.finished_at = Some(finished_at);
                let _ = ctx.store.put_job(&job);
                StageOutcome::Terminal { error_code: code, error_message: message }
            }
        }
    };

    if (job.status, job.stage) != previous {
        webhooks::notify_job_updated(&ctx.store, &job, previous.0, previous.1).await;
    }
    outcome
}

fn is_retryable(error_code: &str) -> bool {
    !matches!(error_code, "VIRUS_FOUND" | "CANCELLED" | "JOB_NOT_FOUND")
}

/// Backoff schedule for stage retries, mirroring the worker HTTP client's
/// exponential 1s/2s/4s progression.
pub fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt.min(6)))
}

async fn run_scan(ctx: &StageContext, job: &IngestionJob) -> Result<(), (String, String)> {
    let document = ctx
        .store
        .get_document(job.document_id)
        .map_err(|e| ("STORE_ERROR".to_string(), e.to_string()))?
        .ok_or_else(|| ("DOCUMENT_NOT_FOUND".to_string(), "document missing".to_string()))?;

    let path = ctx.storage.local_path(&document.storage_key);
    let verdict = ctx.scanner.scan(&path).await.map_err(|e| match e {
        crate::scanner::ScanError::InvalidResponse => (
            SCAN_ERROR_CODE_INVALID_RESPONSE.to_string(),
            "scanner returned an unparseable response".to_string(),
        ),
        other => ("CLAMAV_UNAVAILABLE".to_string(), other.to_string()),
    })?;

    let mut document = document;
    match verdict {
        ScanVerdict::Clean => {
            let clean_key = format!("clean/{}/{}.pdf", document.tenant_id, document.id);
            ctx.storage
                .move_local(&document.storage_key, &clean_key)
                .await
                .map_err(|e| ("STORE_ERROR".to_string(), e.to_string()))?;
            document.storage_key = clean_key;
            document.status = DocumentStatus::Clean;
            ctx.store
                .put_document(&document)
                .map_err(|e| ("STORE_ERROR".to_string(), e.to_string()))?;
            Ok(())
        }
        ScanVerdict::Infected { signature } => {
            document.status = DocumentStatus::Infected;
            let _ = ctx.store.put_document(&document);
            Err(("VIRUS_FOUND".to_string(), format!("scanner flagged signature {signature}")))
        }
        ScanVerdict::Error { message } => Err(("VIRUS_SCAN_ERROR".to_string(), message)),
    }
}

async fn run_convert(ctx: &StageContext, job: &IngestionJob) -> Result<(), (String, String)> {
    let document = ctx
        .store
        .get_document(job.document_id)
        .map_err(|e| ("STORE_ERROR".to_string(), e.to_string()))?
        .ok_or_else(|| ("DOCUMENT_NOT_FOUND".to_string(), "document missing".to_string()))?;

    let path = ctx.storage.local_path(&document.storage_key);
    let structured = ctx
        .engine
        .convert(&path, &ctx.conversion_limits)
        .await
        .map_err(|e| ("DOCLING_CONVERT_FAILED".to_string(), e.to_string()))?;

    let bytes = export::render(ArtifactKind::DoclingJson, &structured);
    store_artifact(ctx, job, ArtifactKind::DoclingJson, &bytes).await?;

    ctx.store
        .persist()
        .map_err(|e| ("STORE_ERROR".to_string(), e.to_string()))?;

    // Stash the structured document under a deterministic key so the
    // export stage can re-derive it without re-running conversion.
    let cache_key = format!("convert-cache/{}.json", job.id);
    ctx.storage
        .write_local(&cache_key, serde_json::to_vec(&structured).unwrap_or_default())
        .await
        .map_err(|e| ("STORE_ERROR".to_string(), e.to_string()))?;
    Ok(())
}

async fn run_export(ctx: &StageContext, job: &IngestionJob) -> Result<(), (String, String)> {
    let cache_key = format!("convert-cache/{}.json", job.id);
    let bytes = ctx
        .storage
        .read_local(&cache_key)
        .await
        .map_err(|e| ("DOCLING_LOAD_FAILED".to_string(), e.to_string()))?;
    let structured: crate::docling::StructuredDocument =
        serde_json::from_slice(&bytes).map_err(|e| ("DOCLING_LOAD_FAILED".to_string(), e.to_string()))?;

    let profile = get_profile_definition(&job.profile);
    let kinds = profile
        .map(|p| p.exports)
        .unwrap_or_else(|| vec![ArtifactKind::Markdown, ArtifactKind::Text]);

    for kind in kinds {
        if kind == ArtifactKind::DoclingJson {
            continue; // already written during conversion
        }
        let rendered = export::render(kind, &structured);
        store_artifact(ctx, job, kind, &rendered).await?;
    }
    Ok(())
}

async fn run_finalize(ctx: &StageContext, job: &IngestionJob) -> Result<(), (String, String)> {
    let cache_key = format!("convert-cache/{}.json", job.id);
    let _ = ctx.storage.delete_local(&cache_key).await;
    ctx.store
        .persist()
        .map_err(|e| ("STORE_ERROR".to_string(), e.to_string()))?;
    Ok(())
}

async fn store_artifact(
    ctx: &StageContext,
    job: &IngestionJob,
    kind: ArtifactKind,
    bytes: &[u8],
) -> Result<(), (String, String)> {
    use sha2::{Digest, Sha256};
    let sha256 = hex::encode(Sha256::digest(bytes));
    let storage_key = format!("artifacts/{}/{}/{:?}", job.tenant_id, job.id, kind);
    ctx.storage
        .write_local(&storage_key, bytes.to_vec())
        .await
        .map_err(|e| ("ARTIFACT_WRITE_FAILED".to_string(), e.to_string()))?;

    let artifact = crate::domain::Artifact {
        id: Uuid::new_v4(),
        tenant_id: job.tenant_id,
        job_id: job.id,
        kind,
        storage_key,
        size_bytes: bytes.len() as u64,
        sha256,
        created_at: crate::domain::now(),
        expires_at: None,
    };
    ctx.store
        .put_artifact(&artifact)
        .map_err(|e| ("ARTIFACT_CONFLICT".to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactKind as Kind, DocumentStatus, JobStatus};
    use crate::scanner::FakeScanner;
    use tempfile::TempDir;

    fn make_ctx(dir: &TempDir) -> StageContext {
        StageContext {
            store: Arc::new(DocStore::open(dir.path().join("store")).unwrap()),
            storage: Arc::new(StorageClient::local(dir.path().join("blobs"))),
            scanner: Arc::new(FakeScanner::clean()),
            engine: Arc::new(crate::docling::MockConversionEngine),
            conversion_limits: ConversionLimits { max_num_pages: 1000, max_file_size_bytes: 10_000_000 },
        }
    }

    async fn seed_job(ctx: &StageContext) -> IngestionJob {
        let tenant_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let storage_key = "quarantine/test.pdf".to_string();
        ctx.storage.write_local(&storage_key, vec![0u8; 4096]).await.unwrap();

        let document = Document {
            id: document_id,
            tenant_id,
            original_filename: "test.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 4096,
            sha256: "abc".into(),
            status: DocumentStatus::Uploaded,
            storage_key,
            created_at: crate::domain::now(),
            expires_at: None,
        };
        ctx.store.put_document(&document).unwrap();

        let job = IngestionJob {
            id: Uuid::new_v4(),
            tenant_id,
            document_id,
            status: JobStatus::Running,
            stage: Stage::Scanning,
            profile: "fast_text".into(),
            options: serde_json::json!({}),
            attempt: 0,
            max_attempts: 3,
            compare_group_id: None,
            external_uuid: None,
            stage_history: vec![],
            error_code: None,
            error_message: None,
            error_details: None,
            queued_at: crate::domain::now(),
            started_at: Some(crate::domain::now()),
            finished_at: None,
            created_at: crate::domain::now(),
            updated_at: crate::domain::now(),
            cancel_requested: false,
        };
        ctx.store.put_job(&job).unwrap();
        job
    }

    #[tokio::test]
    async fn full_pipeline_advances_through_every_stage() {
        let dir = TempDir::new().unwrap();
        let ctx = make_ctx(&dir);
        let job = seed_job(&ctx).await;

        let outcome = run_stage(&ctx, job.id, Stage::Scanning).await;
        assert!(matches!(outcome, StageOutcome::Advance(Stage::Converting)));

        let outcome = run_stage(&ctx, job.id, Stage::Converting).await;
        assert!(matches!(outcome, StageOutcome::Advance(Stage::Exporting)));

        let outcome = run_stage(&ctx, job.id, Stage::Exporting).await;
        assert!(matches!(outcome, StageOutcome::Advance(Stage::Finalizing)));

        let outcome = run_stage(&ctx, job.id, Stage::Finalizing).await;
        assert!(matches!(outcome, StageOutcome::JobFinished));

        let artifacts = ctx.store.list_artifacts_for_job(job.id).unwrap();
        assert!(artifacts.iter().any(|a| a.kind == Kind::Text));
    }

    #[tokio::test]
    async fn infected_scan_fails_the_job_without_retry() {
        let dir = TempDir::new().unwrap();
        let mut ctx = make_ctx(&dir);
        ctx.scanner = Arc::new(FakeScanner::infected("Eicar"));
        let job = seed_job(&ctx).await;

        let outcome = run_stage(&ctx, job.id, Stage::Scanning).await;
        match outcome {
            StageOutcome::Terminal { error_code, .. } => assert_eq!(error_code, "VIRUS_FOUND"),
            _ => panic!("expected terminal failure"),
        }
        let updated_job = ctx.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(updated_job.status, JobStatus::Quarantined);
    }

    #[tokio::test]
    async fn scanner_reported_error_fails_the_job_and_is_retried() {
        let dir = TempDir::new().unwrap();
        let mut ctx = make_ctx(&dir);
        ctx.scanner = Arc::new(FakeScanner::scanner_error("Can't access file"));
        let job = seed_job(&ctx).await;

        let outcome = run_stage(&ctx, job.id, Stage::Scanning).await;
        match outcome {
            StageOutcome::Retry { error_code, .. } => assert_eq!(error_code, "VIRUS_SCAN_ERROR"),
            _ => panic!("expected a retryable failure"),
        }
        let updated_job = ctx.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(updated_job.status, JobStatus::Running);
        assert_eq!(updated_job.attempt, 1);
    }

    #[tokio::test]
    async fn cancelled_job_short_circuits_the_stage() {
        let dir = TempDir::new().unwrap();
        let ctx = make_ctx(&dir);
        let mut job = seed_job(&ctx).await;
        job.cancel_requested = true;
        ctx.store.put_job(&job).unwrap();

        let outcome = run_stage(&ctx, job.id, Stage::Scanning).await;
        assert!(matches!(outcome, StageOutcome::Terminal { error_code, .. } if error_code == "CANCELLED"));
    }
}
