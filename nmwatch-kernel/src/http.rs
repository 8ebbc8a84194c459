/**
 * API REST NMWATCH - Surface de lecture pour la couche présentation
 *
 * RÔLE :
 * Expose le FleetSnapshot en JSON pour le dashboard (rendu HTML, seuils de
 * couleur, refresh côté client : hors kernel). Lecture seule, aucune commande
 * vers les mineurs.
 *
 * ROUTES :
 * - GET /health            → "ok"
 * - GET /fleet             → devices triés + totaux
 * - GET /devices/{id}      → un device ou 404
 * - GET /system/health     → compteurs d'ingestion
 */

use crate::firmware::{is_outdated, ReleaseSource};
use crate::hashrate::format_hashrate;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{Device, DeviceId, DeviceReport};
use crate::registry::SharedRegistry;
use crate::snapshot::SnapshotService;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    report: DeviceReport,
    last_seen: String,       // RFC3339
    seen_seconds_ago: i64,
    outdated: bool,
}

#[derive(Serialize)]
pub struct FleetView {
    devices: Vec<DeviceView>,
    device_count: usize,
    total_hashrate_kh: f64,
    total_hashrate: String,
    latest_version_seen: Option<String>,
    latest_release: Option<String>,
    taken_at: String,
}

fn to_view(d: &Device, latest_release: Option<&str>, now: OffsetDateTime) -> DeviceView {
    DeviceView {
        report: d.report.clone(),
        last_seen: d.last_seen.format(&Rfc3339).unwrap_or_default(),
        seen_seconds_ago: (now - d.last_seen).whole_seconds().max(0),
        outdated: is_outdated(&d.report.version, latest_release),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub snapshots: SnapshotService,
    pub health_tracker: HealthTracker,
    pub release: Arc<dyn ReleaseSource>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/fleet", get(get_fleet))
        .route("/devices/{id}", get(get_device))
        .with_state(app_state)
}

// GET /fleet
async fn get_fleet(State(app): State<AppState>) -> Json<FleetView> {
    let snapshot = app.snapshots.fleet_snapshot();
    let latest_release = app.release.latest_version();
    let now = snapshot.taken_at;

    let devices: Vec<DeviceView> = snapshot
        .devices
        .iter()
        .map(|d| to_view(d, latest_release.as_deref(), now))
        .collect();

    Json(FleetView {
        device_count: devices.len(),
        devices,
        total_hashrate_kh: snapshot.total_hashrate_normalized,
        total_hashrate: format_hashrate(snapshot.total_hashrate_normalized),
        latest_version_seen: snapshot.latest_version_seen,
        latest_release,
        taken_at: now.format(&Rfc3339).unwrap_or_default(),
    })
}

// GET /devices/{id}
async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceView>, StatusCode> {
    let Some(device) = app.registry.get(&DeviceId::new(id)) else {
        return Err(StatusCode::NOT_FOUND);
    };
    let latest_release = app.release.latest_version();
    Ok(Json(to_view(&device, latest_release.as_deref(), OffsetDateTime::now_utc())))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.registry))
}
