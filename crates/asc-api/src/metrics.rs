//! `/metrics`: `autoscaling_groups_managed`,
//! `job_{create,process}_{total,failure}_total{type}`, `queue_{error,stalled}_total`,
//! `queue_waiting`. The producer/worker in `asc-scheduler` record these
//! through the `metrics` facade macros at the point of decision; this
//! module only installs the Prometheus recorder that backs them and
//! renders its scrape text.

use axum::response::IntoResponse;
use axum::http::{header, StatusCode};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder once at startup. Panics if
/// called twice — same contract as `metrics::set_global_recorder`, which
/// this wraps.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

#[utoipa::path(get, path = "/metrics", tag = "monitoring", responses((status = 200, description = "Prometheus scrape text")))]
pub async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], handle.render())
}
