//! Prometheus metrics for deployment tracking.

use std::time::Duration;

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a deployment created in its initial status.
pub fn deployment_created(environment: &str) {
    counter!("deploy_deployments_created_total", "environment" => environment.to_string())
        .increment(1);
}

/// Record a deployment status transition.
pub fn deployment_status_changed(status: &str) {
    counter!("deploy_status_transitions_total", "status" => status.to_string()).increment(1);
}

/// Record a rejected transition attempt.
pub fn transition_rejected(from: &str) {
    counter!("deploy_transitions_rejected_total", "from" => from.to_string()).increment(1);
}

/// Record a source-control lookup and whether it resolved.
pub fn scm_lookup(operation: &'static str, resolved: bool, elapsed: Duration) {
    let outcome = if resolved { "resolved" } else { "unresolved" };
    counter!("deploy_scm_lookups_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    histogram!("deploy_scm_lookup_duration_ms", "operation" => operation)
        .record(elapsed.as_secs_f64() * 1000.0);
}
