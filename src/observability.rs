//! Metrics counters and readiness probes.
//!
//! Extends the upstream `observability::Metrics` (atomic counters +
//! snapshot) with the gauge family `/metrics` exposes
//! (`documents/core/views.py`'s Prometheus text exposition) and the
//! `healthz`/`readyz` distinction the original `core/views.py` makes
//! between "process is up" and "dependencies are reachable".

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    jobs_accepted: AtomicU64,
    jobs_failed: AtomicU64,
    tasks_published: AtomicU64,
    webhook_deliveries_attempted: AtomicU64,
    webhook_deliveries_delivered: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_accepted(&self) {
        self.jobs_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_published(&self) {
        self.tasks_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_attempted(&self) {
        self.webhook_deliveries_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_delivered(&self) {
        self.webhook_deliveries_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_accepted: self.jobs_accepted.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            tasks_published: self.tasks_published.load(Ordering::Relaxed),
            webhook_deliveries_attempted: self.webhook_deliveries_attempted.load(Ordering::Relaxed),
            webhook_deliveries_delivered: self.webhook_deliveries_delivered.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition matching the `docling_jobs_total{status=...}`
    /// family spec.md's metrics contract names, plus the counters above as
    /// supplementary gauges.
    pub fn render_prometheus(&self, job_status_counts: &[(&str, u64)]) -> String {
        let mut out = String::new();
        out.push_str("# HELP docling_jobs_total Jobs by terminal status\n");
        out.push_str("# TYPE docling_jobs_total counter\n");
        for (status, count) in job_status_counts {
            out.push_str(&format!("docling_jobs_total{{status=\"{status}\"}} {count}\n"));
        }
        let snap = self.snapshot();
        out.push_str(&format!("docrefinery_jobs_accepted_total {}\n", snap.jobs_accepted));
        out.push_str(&format!("docrefinery_jobs_failed_total {}\n", snap.jobs_failed));
        out.push_str(&format!(
            "docrefinery_webhook_deliveries_attempted_total {}\n",
            snap.webhook_deliveries_attempted
        ));
        out.push_str(&format!(
            "docrefinery_webhook_deliveries_delivered_total {}\n",
            snap.webhook_deliveries_delivered
        ));
        out
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_accepted: u64,
    pub jobs_failed: u64,
    pub tasks_published: u64,
    pub webhook_deliveries_attempted: u64,
    pub webhook_deliveries_delivered: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    Up,
    Down(String),
}

#[derive(Debug, Clone)]
pub struct ReadinessReport {
    pub store: ComponentHealth,
    pub queue: ComponentHealth,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.store == ComponentHealth::Up && self.queue == ComponentHealth::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_requires_every_component_up() {
        let report = ReadinessReport { store: ComponentHealth::Up, queue: ComponentHealth::Down("x".into()) };
        assert!(!report.is_ready());
    }

    #[test]
    fn prometheus_rendering_includes_job_status_gauges() {
        let metrics = Metrics::new();
        metrics.job_accepted();
        let text = metrics.render_prometheus(&[("succeeded", 3)]);
        assert!(text.contains("docling_jobs_total{status=\"succeeded\"} 3"));
        assert!(text.contains("docrefinery_jobs_accepted_total 1"));
    }
}
