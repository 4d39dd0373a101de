use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use salon_scheduler::error::AppError;
use salon_scheduler::scheduling::{
    booking_router, BookingService, NotificationSink, RosterImporter, SalonRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct RosterCheckRequest {
    pub(crate) services_csv: String,
    pub(crate) stylists_csv: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RosterCheckResponse {
    pub(crate) services: usize,
    pub(crate) stylists: usize,
    pub(crate) on_duty: usize,
    /// Services nobody on the roster is qualified to perform.
    pub(crate) uncovered_services: Vec<String>,
}

pub(crate) fn with_booking_routes<R, N>(service: Arc<BookingService<R, N>>) -> axum::Router
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    booking_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/roster/check",
            axum::routing::post(roster_check_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Dry-run a roster export before it is used to seed the directory.
pub(crate) async fn roster_check_endpoint(
    Json(payload): Json<RosterCheckRequest>,
) -> Result<Json<RosterCheckResponse>, AppError> {
    let roster = RosterImporter::from_readers(
        Cursor::new(payload.services_csv.into_bytes()),
        Cursor::new(payload.stylists_csv.into_bytes()),
    )?;

    let uncovered_services = roster
        .services
        .iter()
        .filter(|service| {
            !roster
                .stylists
                .iter()
                .any(|stylist| stylist.qualified_for(&service.id))
        })
        .map(|service| service.id.0.clone())
        .collect();

    Ok(Json(RosterCheckResponse {
        services: roster.services.len(),
        stylists: roster.stylists.len(),
        on_duty: roster.stylists.iter().filter(|s| s.on_duty).count(),
        uncovered_services,
    }))
}
