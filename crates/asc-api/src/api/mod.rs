//! Admin/sidecar HTTP surface (spec section 6): group CRUD, sidecar
//! poll/stats/status, health, metrics, and the Jibri status webhook.
//!
//! A cloneable `AppState` holds `Arc`s to every collaborator, one
//! `utoipa::OpenApi` derive backs the docs, one `SwaggerUi` mount serves
//! them, and auth is layered on with `axum::middleware::from_fn_with_state`.

pub mod auth;
pub mod model;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{middleware, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use asc_audit::Audit;
use asc_cloud::CloudDriverRegistry;
use asc_common::{ActionType, AuditEntry, AutoscalerError, InstanceGroup};
use asc_lock::LockManager;
use asc_registry::GroupRegistry;
use asc_shutdown::ShutdownManager;
use asc_tracker::InstanceTracker;

use crate::api::auth::{auth_middleware, AuthState};
use crate::api::model::{
    DesiredCountRequest, GroupReport, GroupsResponse, InstanceDetails, JibriState, LaunchProtectedRequest,
    LaunchProtectedResponse, SaveResponse, ShutdownPollResponse, StatsReport,
};
use crate::error::{ApiError, Result};
use crate::{health, metrics};

/// Every collaborator a handler might need, cheap to clone (all `Arc`
/// fields) so it can sit in axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn GroupRegistry>,
    pub tracker: Arc<dyn InstanceTracker>,
    pub audit: Arc<dyn Audit>,
    pub shutdown: Arc<dyn ShutdownManager>,
    pub clouds: Arc<CloudDriverRegistry>,
    pub locks: Arc<LockManager>,
    pub metrics_handle: PrometheusHandle,
    pub group_lock_ttl_ms: u64,
    pub idle_ttl_sec: u64,
    pub metric_ttl_sec: u64,
    pub shutdown_ttl_sec: u64,
    pub audit_ttl_sec: u64,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_handler,
        health::liveness_probe,
        health::readiness_probe,
        metrics::metrics_handler,
        hook_status,
        sidecar_poll,
        sidecar_stats,
        sidecar_status,
        put_group,
        put_desired_count,
        list_groups,
        get_group,
        get_group_report,
        delete_group,
        reset_groups,
        launch_protected,
    ),
    tags((name = "health"), (name = "monitoring"), (name = "groups"), (name = "sidecar")),
)]
pub struct ApiDoc;

impl AppState {
    /// Build the full router: open health/metrics routes plus the
    /// bearer-gated admin/sidecar surface (spec section 6).
    pub fn router(self, auth: asc_config::AuthConfig) -> Router {
        let auth_state = AuthState::new(auth);
        let metrics_handle = self.metrics_handle.clone();

        let api = Router::new()
            .route("/hook/v1/status", post(hook_status))
            .route("/sidecar/poll", post(sidecar_poll))
            .route("/sidecar/stats", post(sidecar_stats))
            .route("/sidecar/status", post(sidecar_status))
            .route("/groups", get(list_groups))
            .route("/groups/:name", put(put_group).get(get_group).delete(delete_group))
            .route("/groups/:name/desired-count", put(put_desired_count))
            .route("/groups/:name/report", get(get_group_report))
            .route("/groups/actions/reset", post(reset_groups))
            .route("/groups/:name/actions/launch-protected", post(launch_protected))
            .with_state(self)
            .layer(middleware::from_fn_with_state(auth_state, auth_middleware));

        let open = Router::new()
            .route("/health", get(health::health_handler))
            .route("/health/live", get(health::liveness_probe))
            .route("/health/ready", get(health::readiness_probe))
            .route("/metrics", get(metrics::metrics_handler))
            .with_state(metrics_handle);

        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
            .merge(open)
            .merge(api)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    }
}

/// `POST /hook/v1/status` — the Jibri status webhook (spec section 6).
/// Validated but otherwise observational: it carries no fields the
/// autoscaling core consumes beyond confirming the two required ones are
/// present, so it's logged and acknowledged rather than persisted.
#[utoipa::path(post, path = "/hook/v1/status", tag = "sidecar", request_body = JibriState, responses((status = 200, body = SaveResponse), (status = 400, body = crate::api::model::ErrorResponse)))]
pub async fn hook_status(Json(body): Json<JibriState>) -> Result<Json<SaveResponse>> {
    body.validate().map_err(ApiError::Validation)?;
    info!(jibri_id = ?body.jibri_id, status = ?body.status, "jibri status hook received");
    Ok(Json(SaveResponse::default()))
}

/// `POST /sidecar/poll` — whether this instance should shut down.
#[utoipa::path(post, path = "/sidecar/poll", tag = "sidecar", request_body = InstanceDetails, responses((status = 200, body = ShutdownPollResponse)))]
pub async fn sidecar_poll(
    State(state): State<AppState>,
    Json(body): Json<InstanceDetails>,
) -> Result<Json<ShutdownPollResponse>> {
    let status = state.shutdown.get_status(&body.instance_id).await?;
    Ok(Json(status.into()))
}

/// `POST /sidecar/stats` and `/sidecar/status` share the same body and
/// tracking behavior; the spec names them as two routes for wire
/// compatibility with existing sidecar deployments (section 9).
#[utoipa::path(post, path = "/sidecar/stats", tag = "sidecar", request_body = StatsReport, responses((status = 200, body = ShutdownPollResponse), (status = 400, body = crate::api::model::ErrorResponse)))]
pub async fn sidecar_stats(state: State<AppState>, body: Json<StatsReport>) -> Result<Json<ShutdownPollResponse>> {
    track_and_poll(state, body).await
}

#[utoipa::path(post, path = "/sidecar/status", tag = "sidecar", request_body = StatsReport, responses((status = 200, body = ShutdownPollResponse), (status = 400, body = crate::api::model::ErrorResponse)))]
pub async fn sidecar_status(state: State<AppState>, body: Json<StatsReport>) -> Result<Json<ShutdownPollResponse>> {
    track_and_poll(state, body).await
}

async fn track_and_poll(
    State(state): State<AppState>,
    Json(body): Json<StatsReport>,
) -> Result<Json<ShutdownPollResponse>> {
    let instance_id = body.instance_id.clone();
    let (status, value) = body.into_status_and_value().map_err(ApiError::Validation)?;

    state
        .tracker
        .track(status, value, state.idle_ttl_sec, state.metric_ttl_sec)
        .await?;

    let poll = state.shutdown.get_status(&instance_id).await?;
    Ok(Json(poll.into()))
}

/// `PUT /groups/:name` — upsert a group definition.
#[utoipa::path(put, path = "/groups/{name}", tag = "groups", request_body = InstanceGroup, responses((status = 200, body = SaveResponse), (status = 400, body = crate::api::model::ErrorResponse)))]
pub async fn put_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut group): Json<InstanceGroup>,
) -> Result<Json<SaveResponse>> {
    group.name = name;
    state.registry.upsert(group).await?;
    Ok(Json(SaveResponse::default()))
}

/// `PUT /groups/:name/desired-count` — the only write path the admin API
/// exposes for `desiredCount`; it is clamped to `[min, max]` by the
/// registry itself, never rejected for being out of bounds (spec section
/// 4.1's invariant is maintained by clamping, not refusing). Takes the
/// group's autoscale lock (spec section 6) so this can never race a
/// concurrent `Autoscaler`/`InstanceLauncher` tick's `desiredCount` write.
#[utoipa::path(put, path = "/groups/{name}/desired-count", tag = "groups", request_body = DesiredCountRequest, responses((status = 200, body = InstanceGroup), (status = 404, body = crate::api::model::ErrorResponse)))]
pub async fn put_desired_count(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<DesiredCountRequest>,
) -> Result<Json<InstanceGroup>> {
    let registry = state.registry.clone();
    let name_for_lock = name.clone();
    let locked = state
        .locks
        .with_group_lock(&name, state.group_lock_ttl_ms, move || async move {
            registry.set_desired_count(&name_for_lock, body.desired_count).await
        })
        .await
        .map_err(ApiError::from)?;

    let group = locked.ok_or_else(|| ApiError::Conflict(format!("group {name} is locked, retry")))??;
    Ok(Json(group))
}

#[utoipa::path(get, path = "/groups", tag = "groups", responses((status = 200, body = GroupsResponse)))]
pub async fn list_groups(State(state): State<AppState>) -> Result<Json<GroupsResponse>> {
    let instance_groups = state.registry.list().await?;
    Ok(Json(GroupsResponse { instance_groups }))
}

#[utoipa::path(get, path = "/groups/{name}", tag = "groups", responses((status = 200, body = InstanceGroup), (status = 404, body = crate::api::model::ErrorResponse)))]
pub async fn get_group(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<InstanceGroup>> {
    let group = state
        .registry
        .get(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group not found: {name}")))?;
    Ok(Json(group))
}

/// `GET /groups/:name/report` — the group definition plus audit history,
/// run timestamps, and tracked/cloud inventory counts (spec section 4.8).
/// A cloud-side enumeration failure is transient (spec section 7) and does
/// not fail the whole report, it just leaves `cloud_instance_count` unset.
#[utoipa::path(get, path = "/groups/{name}/report", tag = "groups", responses((status = 200, body = GroupReport), (status = 404, body = crate::api::model::ErrorResponse)))]
pub async fn get_group_report(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<GroupReport>> {
    let group = state
        .registry
        .get(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group not found: {name}")))?;

    let tracked = state.tracker.get_current(&name).await?;
    let tracked_instance_count = tracked.len();

    let cloud_instance_count = match state.clouds.get(group.cloud) {
        Ok(driver) => match driver.list_instances(&group).await {
            Ok(instances) => Some(instances.len()),
            Err(e) => {
                warn!(group = %name, error = %e, "cloud inventory lookup failed for report, omitting count");
                None
            }
        },
        Err(e) => {
            warn!(group = %name, error = %e, "no cloud driver configured for report, omitting count");
            None
        }
    };

    let last_autoscaler_run = state.audit.last_autoscaler_run(&name).await?;
    let last_launcher_run = state.audit.last_launcher_run(&name).await?;
    let audit_entries = state.audit.list(&name).await?;

    Ok(Json(GroupReport {
        group,
        tracked_instance_count,
        cloud_instance_count,
        last_autoscaler_run,
        last_launcher_run,
        audit_entries,
    }))
}

/// `DELETE /groups/:name` — rejected if any instance is still tracked
/// (spec section 4.1 d): the registry enforces this, this handler only
/// supplies the live count.
#[utoipa::path(delete, path = "/groups/{name}", tag = "groups", responses((status = 200, body = SaveResponse), (status = 400, body = crate::api::model::ErrorResponse)))]
pub async fn delete_group(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<SaveResponse>> {
    let live = state.tracker.get_current(&name).await?.len();
    state.registry.delete(&name, live).await?;
    Ok(Json(SaveResponse::default()))
}

/// `POST /groups/actions/reset` — re-seed the registry from the baseline
/// group list loaded at startup (`GROUP_CONFIG_FILE`), overwriting the
/// current definitions (spec section 6).
#[utoipa::path(post, path = "/groups/actions/reset", tag = "groups", request_body = GroupsResponse, responses((status = 200, body = SaveResponse)))]
pub async fn reset_groups(
    State(state): State<AppState>,
    Json(body): Json<GroupsResponse>,
) -> Result<Json<SaveResponse>> {
    state.registry.reset_to_baseline(body.instance_groups).await?;
    Ok(Json(SaveResponse::default()))
}

/// `POST /groups/:name/actions/launch-protected` — launch instances
/// outside the normal autoscale/launch convergence loop, immune from
/// scale-down selection for `scaleDownProtectedTtlSec` (spec section 4.9).
/// Runs under the group's autoscale lock end to end, same as
/// `Autoscaler`/`InstanceLauncher`, since it mutates `desiredCount` and
/// scale-down protection.
#[utoipa::path(post, path = "/groups/{name}/actions/launch-protected", tag = "groups", request_body = LaunchProtectedRequest, responses((status = 200, body = LaunchProtectedResponse), (status = 404, body = crate::api::model::ErrorResponse)))]
pub async fn launch_protected(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<LaunchProtectedRequest>,
) -> Result<Json<LaunchProtectedResponse>> {
    let registry = state.registry.clone();
    let clouds = state.clouds.clone();
    let audit = state.audit.clone();
    let audit_ttl_sec = state.audit_ttl_sec;
    let name_for_lock = name.clone();

    let locked = state
        .locks
        .with_group_lock(&name, state.group_lock_ttl_ms, move || async move {
            let mut group = registry
                .get(&name_for_lock)
                .await?
                .ok_or_else(|| AutoscalerError::GroupNotFound(name_for_lock.clone()))?;

            if let Some(instance_configuration_id) = body.instance_configuration_id {
                group.instance_configuration_id = instance_configuration_id;
            }

            let driver = clouds.get(group.cloud).map_err(|e| AutoscalerError::Cloud(e.to_string()))?;
            let launched = driver.launch(&group, body.count).await.map_err(|e| AutoscalerError::Cloud(e.to_string()))?;

            for result in &launched {
                registry
                    .set_scale_down_protection(&name_for_lock, &result.instance_id, body.scale_down_protected_ttl_sec)
                    .await?;
            }

            let old_desired_count = group.scaling_options.desired_count;
            let new_desired_count = old_desired_count + launched.len() as u32;
            let updated = registry.set_desired_count(&name_for_lock, new_desired_count).await?;

            if !launched.is_empty() {
                let entry = AuditEntry {
                    timestamp: chrono::Utc::now(),
                    action_type: ActionType::Launch,
                    count: launched.len() as u32,
                    old_desired_count,
                    new_desired_count: updated.scaling_options.desired_count,
                    scale_metrics: Vec::new(),
                };
                audit.record(&name_for_lock, entry, audit_ttl_sec).await?;
            }

            Ok::<_, AutoscalerError>(LaunchProtectedResponse {
                launched_instance_ids: launched.into_iter().map(|r| r.instance_id).collect(),
                new_desired_count: updated.scaling_options.desired_count,
            })
        })
        .await
        .map_err(ApiError::from)?;

    let response = locked.ok_or_else(|| ApiError::Conflict(format!("group {name} is locked, retry")))??;
    Ok(Json(response))
}
