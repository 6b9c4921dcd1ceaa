use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("http_requests_total", "HTTP responses by status code");
    metrics::describe_histogram!("http_request_duration_seconds", "HTTP request latency");
    metrics::describe_counter!("results_stored_total", "Exam results written to the store");
    metrics::describe_counter!("results_deleted_total", "Exam results removed by staff");
    metrics::describe_counter!("exam_lookups_total", "Exam code lookups by outcome");
    metrics::describe_counter!("integrity_warnings_total", "Integrity warnings by trigger");
    metrics::describe_counter!("integrity_violations_total", "Integrity violations by trigger");
    metrics::describe_counter!("session_restarts_total", "Attempt restarts by reason");
    metrics::describe_counter!("duplicate_sessions_total", "Tabs frozen by a newer tab");
    metrics::describe_counter!("results_submitted_total", "Results submitted by trigger");
    metrics::describe_counter!("result_submit_failures_total", "Result writes that failed");
}
