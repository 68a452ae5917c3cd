//! Webhook delivery: signed payloads with exponential-backoff retry.
//!
//! No original-Python implementation of `deliver_webhook_delivery` or
//! `queue_job_webhooks` survived into the retrieval pack — only test
//! expectations in `documents/tests/test_webhooks.py` and
//! `test_webhook_queue.py`. Those tests pin the signing scheme (HMAC-SHA256
//! over the raw JSON body, `x-docrefinery-signature: sha256=<hex>`) and the
//! status transitions (`pending` -> `retrying`/`delivered`/`failed`) this
//! module reproduces; retry scheduling is modeled on
//! `worker::http::HttpClient`'s exponential backoff loop.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{DeliveryStatus, IngestionJob, JobStatus, Stage, WebhookDelivery, WebhookEndpoint};
use crate::store::DocStore;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-docrefinery-signature";
pub const EVENT_HEADER: &str = "x-docrefinery-event";
pub const DELIVERY_HEADER: &str = "x-docrefinery-delivery";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
pub const DEFAULT_INITIAL_BACKOFF_SECONDS: u64 = 30;

pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Mirrors the field set the original `queue_job_webhooks`/
/// `deliver_webhook_delivery` pair put on the wire; `job_id` and
/// `job_uuid` are the same value here since this rewrite has no separate
/// integer primary key for jobs.
pub fn build_payload(
    job: &IngestionJob,
    event: &str,
    previous_status: JobStatus,
    previous_stage: Stage,
) -> serde_json::Value {
    serde_json::json!({
        "event": event,
        "job_id": job.id,
        "job_uuid": job.id,
        "document_id": job.document_id,
        "external_uuid": job.external_uuid,
        "status": job.status.as_str(),
        "stage": job.stage.as_str(),
        "previous_status": previous_status.as_str(),
        "previous_stage": previous_stage.as_str(),
        "error_code": job.error_code,
        "error_message": job.error_message,
        "error_details": job.error_details,
        "queued_at": job.queued_at,
        "started_at": job.started_at,
        "finished_at": job.finished_at,
        "created_at": job.created_at,
        "modified_at": job.updated_at,
        "profile": job.profile,
    })
}

pub fn backoff_for_attempt(attempt: u32, initial_seconds: u64) -> Duration {
    Duration::from_secs(initial_seconds * 2u64.pow(attempt.min(10)))
}

/// New delivery records, created for every endpoint subscribed to `event`
/// regardless of whether it's currently enabled — a disabled endpoint still
/// gets a delivery row, it just fails without a network call at attempt
/// time, mirroring `queue_job_webhooks`'s filter.
pub fn build_deliveries(
    endpoints: &[WebhookEndpoint],
    job: &IngestionJob,
    event: &str,
    previous_status: JobStatus,
    previous_stage: Stage,
) -> Vec<WebhookDelivery> {
    let now = crate::domain::now();
    endpoints
        .iter()
        .filter(|e| e.subscribed_events.iter().any(|s| s == event))
        .map(|endpoint| WebhookDelivery {
            id: Uuid::new_v4(),
            tenant_id: job.tenant_id,
            endpoint_id: endpoint.id,
            job_id: job.id,
            event: event.to_string(),
            payload: build_payload(job, event, previous_status, previous_stage),
            status: DeliveryStatus::Pending,
            attempt: 0,
            next_attempt_at: now.clone(),
            last_response_code: None,
            last_error: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        })
        .collect()
}

pub struct DeliveryClient {
    http: reqwest::Client,
}

impl Default for DeliveryClient {
    fn default() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl DeliveryClient {
    /// Attempts one delivery, updating `delivery` in place with the new
    /// status and scheduling the next attempt on failure. Also updates
    /// `endpoint`'s summary timestamps; the caller is responsible for
    /// persisting both rows afterward.
    pub async fn attempt(&self, delivery: &mut WebhookDelivery, endpoint: &mut WebhookEndpoint) {
        if !endpoint.is_enabled {
            delivery.status = DeliveryStatus::Failed;
            delivery.last_error = Some("Endpoint disabled".to_string());
            delivery.updated_at = crate::domain::now();
            endpoint.last_failure_at = Some(delivery.updated_at.clone());
            return;
        }

        let body = serde_json::to_vec(&delivery.payload).unwrap_or_default();
        let signature = sign(&endpoint.secret, &body);

        delivery.attempt += 1;
        let response = self
            .http
            .post(&endpoint.url)
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, &delivery.event)
            .header(DELIVERY_HEADER, delivery.id.to_string())
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(10))
            .body(body)
            .send()
            .await;

        delivery.updated_at = crate::domain::now();
        match response {
            Ok(resp) if resp.status().is_success() => {
                delivery.status = DeliveryStatus::Delivered;
                delivery.last_response_code = Some(resp.status().as_u16());
                delivery.last_error = None;
                endpoint.last_success_at = Some(delivery.updated_at.clone());
            }
            Ok(resp) => {
                delivery.last_response_code = Some(resp.status().as_u16());
                self.schedule_retry_or_fail(delivery);
                endpoint.last_failure_at = Some(delivery.updated_at.clone());
            }
            Err(e) => {
                delivery.last_error = Some(e.to_string());
                self.schedule_retry_or_fail(delivery);
                endpoint.last_failure_at = Some(delivery.updated_at.clone());
            }
        }
    }

    fn schedule_retry_or_fail(&self, delivery: &mut WebhookDelivery) {
        if delivery.attempt >= DEFAULT_MAX_ATTEMPTS {
            delivery.status = DeliveryStatus::Failed;
            return;
        }
        delivery.status = DeliveryStatus::Retrying;
        let backoff = backoff_for_attempt(delivery.attempt, DEFAULT_INITIAL_BACKOFF_SECONDS);
        let next = time::OffsetDateTime::now_utc() + backoff;
        delivery.next_attempt_at = next
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| crate::domain::now());
    }
}

/// Queues a `job.updated` delivery for every endpoint in the job's tenant
/// subscribed to it. Called from the stage pipeline after every adapter run
/// and from the cancel/retry handlers, whenever the job's `(status, stage)`
/// pair differs from what it was before the write that just happened.
pub async fn notify_job_updated(
    store: &DocStore,
    job: &IngestionJob,
    previous_status: JobStatus,
    previous_stage: Stage,
) {
    let endpoints = match store.list_webhook_endpoints_for_tenant(job.tenant_id) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "failed to list webhook endpoints for job update");
            return;
        }
    };
    let deliveries = build_deliveries(&endpoints, job, "job.updated", previous_status, previous_stage);
    for delivery in deliveries {
        if let Err(e) = store.put_webhook_delivery(&delivery) {
            warn!(job_id = %job.id, error = %e, "failed to persist webhook delivery");
        }
    }
}

/// Polls [`DocStore::due_webhook_deliveries`] on an interval and attempts
/// each one, persisting the updated delivery row after every attempt.
/// Runs for the lifetime of the process, spawned alongside the stage
/// worker pool.
pub async fn run_delivery_worker(store: Arc<DocStore>, client: DeliveryClient, poll_interval: Duration) {
    loop {
        tokio::time::sleep(poll_interval).await;
        let now = crate::domain::now();
        let due = match store.due_webhook_deliveries(&now) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to list due webhook deliveries");
                continue;
            }
        };
        for mut delivery in due {
            let Ok(Some(mut endpoint)) = store.get_webhook_endpoint(delivery.endpoint_id) else {
                warn!(delivery_id = %delivery.id, "webhook endpoint missing for due delivery");
                continue;
            };
            client.attempt(&mut delivery, &mut endpoint).await;
            debug!(delivery_id = %delivery.id, status = ?delivery.status, "webhook delivery attempted");
            if let Err(e) = store.put_webhook_delivery(&delivery) {
                warn!(delivery_id = %delivery.id, error = %e, "failed to persist webhook delivery");
            }
            if let Err(e) = store.put_webhook_endpoint(&endpoint) {
                warn!(endpoint_id = %endpoint.id, error = %e, "failed to persist webhook endpoint summary");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_the_same_secret_and_body() {
        let a = sign("secret", b"payload");
        let b = sign("secret", b"payload");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));
    }

    #[test]
    fn signature_changes_with_the_secret() {
        assert_ne!(sign("secret-a", b"payload"), sign("secret-b", b"payload"));
    }

    fn fake_job(tenant: Uuid) -> IngestionJob {
        let now = crate::domain::now();
        IngestionJob {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            document_id: Uuid::new_v4(),
            status: JobStatus::Succeeded,
            stage: Stage::Finalizing,
            profile: "fast_text".into(),
            options: serde_json::json!({}),
            attempt: 0,
            max_attempts: 3,
            compare_group_id: None,
            external_uuid: None,
            stage_history: Vec::new(),
            error_code: None,
            error_message: None,
            error_details: None,
            queued_at: now.clone(),
            started_at: Some(now.clone()),
            finished_at: Some(now.clone()),
            created_at: now.clone(),
            updated_at: now,
            cancel_requested: false,
        }
    }

    #[test]
    fn deliveries_are_built_for_subscribed_endpoints_enabled_or_not() {
        let tenant = Uuid::new_v4();
        let job = fake_job(tenant);
        let subscribed = WebhookEndpoint {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            url: "https://example.com/hook".into(),
            secret: "s".into(),
            subscribed_events: vec!["job.updated".into()],
            is_enabled: true,
            created_at: crate::domain::now(),
            last_success_at: None,
            last_failure_at: None,
        };
        let disabled = WebhookEndpoint { is_enabled: false, id: Uuid::new_v4(), ..subscribed.clone() };
        let unsubscribed = WebhookEndpoint {
            id: Uuid::new_v4(),
            subscribed_events: vec!["job.failed".into()],
            ..subscribed.clone()
        };

        let deliveries = build_deliveries(
            &[subscribed.clone(), disabled.clone(), unsubscribed],
            &job,
            "job.updated",
            JobStatus::Running,
            Stage::Exporting,
        );
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().any(|d| d.endpoint_id == subscribed.id));
        assert!(deliveries.iter().any(|d| d.endpoint_id == disabled.id));
    }

    #[tokio::test]
    async fn disabled_endpoint_fails_without_a_network_call() {
        let tenant = Uuid::new_v4();
        let job = fake_job(tenant);
        let mut endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            url: "https://example.invalid/hook".into(),
            secret: "s".into(),
            subscribed_events: vec!["job.updated".into()],
            is_enabled: false,
            created_at: crate::domain::now(),
            last_success_at: None,
            last_failure_at: None,
        };
        let mut delivery = build_deliveries(
            std::slice::from_ref(&endpoint),
            &job,
            "job.updated",
            JobStatus::Running,
            Stage::Exporting,
        )
        .remove(0);

        DeliveryClient::default().attempt(&mut delivery, &mut endpoint).await;

        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.last_error.as_deref(), Some("Endpoint disabled"));
        assert_eq!(delivery.attempt, 0);
    }

    #[test]
    fn retry_backoff_grows_exponentially() {
        let first = backoff_for_attempt(0, 30);
        let second = backoff_for_attempt(1, 30);
        assert_eq!(first, Duration::from_secs(30));
        assert_eq!(second, Duration::from_secs(60));
    }
}
