use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::{error, warn};

use super::domain::{AppointmentId, CustomerId, ServiceId, StylistId};
use super::lifecycle::LifecycleEvent;
use super::repository::{NotificationSink, RepositoryError, SalonRepository};
use super::service::{
    Agenda, BookingOutcome, BookingRequest, BookingService, BookingServiceError, RatingSubmission,
    TransitionOutcome,
};
use super::suggestion::SuggestedBooking;

/// Router builder exposing HTTP endpoints for assignment, booking, and lifecycle changes.
pub fn booking_router<R, N>(service: Arc<BookingService<R, N>>) -> Router
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route("/api/v1/appointments", post(book_handler::<R, N>))
        .route(
            "/api/v1/appointments/assign",
            post(assign_handler::<R, N>),
        )
        .route(
            "/api/v1/appointments/accept",
            post(accept_handler::<R, N>),
        )
        .route(
            "/api/v1/appointments/:appointment_id",
            get(status_handler::<R, N>),
        )
        .route(
            "/api/v1/appointments/:appointment_id/confirm",
            post(confirm_handler::<R, N>),
        )
        .route(
            "/api/v1/appointments/:appointment_id/complete",
            post(complete_handler::<R, N>),
        )
        .route(
            "/api/v1/appointments/:appointment_id/cancel",
            post(cancel_handler::<R, N>),
        )
        .route(
            "/api/v1/appointments/:appointment_id/rating",
            post(rating_handler::<R, N>),
        )
        .route(
            "/api/v1/customers/:customer_id/agenda",
            get(customer_agenda_handler::<R, N>),
        )
        .route(
            "/api/v1/stylists/:stylist_id/agenda",
            get(stylist_agenda_handler::<R, N>),
        )
        .route(
            "/api/v1/maintenance/sweep",
            post(sweep_handler::<R, N>),
        )
        .route(
            "/api/v1/maintenance/reminders",
            post(reminders_handler::<R, N>),
        )
        .with_state(service)
}

/// Wire shape of a booking request; accepts `HH:MM` as well as `HH:MM:SS`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BookingPayload {
    pub(crate) customer_id: String,
    pub(crate) service_id: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub(crate) date: NaiveDate,
    #[serde(deserialize_with = "deserialize_time")]
    pub(crate) time: NaiveTime,
}

impl From<BookingPayload> for BookingRequest {
    fn from(payload: BookingPayload) -> Self {
        BookingRequest {
            customer_id: CustomerId(payload.customer_id),
            service_id: ServiceId(payload.service_id),
            date: payload.date,
            time: payload.time,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AcceptPayload {
    pub(crate) customer_id: String,
    pub(crate) suggestion: SuggestedBooking,
}

/// Present when a customer cancels; staff cancellations send no body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CancelPayload {
    pub(crate) customer_id: String,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub(crate) async fn assign_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    axum::Json(payload): axum::Json<BookingPayload>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    let request = BookingRequest::from(payload);
    match service.assign(&request) {
        Ok(decision) => {
            let payload = json!({
                "message": decision.summary(),
                "decision": decision,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn book_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    axum::Json(payload): axum::Json<BookingPayload>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    let request = BookingRequest::from(payload);
    let outcome = match service.book(request.clone(), now()) {
        Err(err) if err.is_retryable() => {
            warn!(customer = ?request.customer_id, "retrying booking after slot conflict");
            service.book(request, now())
        }
        other => other,
    };

    match outcome {
        Ok(BookingOutcome::Booked {
            appointment,
            alternatives,
            preferred,
        }) => {
            let alternatives: Vec<_> = alternatives.into_iter().map(|s| s.id).collect();
            let payload = json!({
                "outcome": "booked",
                "appointment": appointment.status_view(),
                "alternatives": alternatives,
                "preferred": preferred,
                "message": "appointment booked; complete payment to confirm",
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Ok(BookingOutcome::Suggested { slot, suggestion }) => {
            let payload = json!({
                "outcome": "suggested",
                "date": slot.date,
                "time": slot.time.format("%H:%M").to_string(),
                "stylists": slot.stylist_ids(),
                "suggestion": suggestion,
                "message": "no stylist is free at that time; accept the suggested slot to book it",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(BookingOutcome::Unavailable) => {
            let payload = json!({
                "outcome": "unavailable",
                "message": "no available stylists or time slots found in the booking horizon; please contact the salon directly",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn accept_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    axum::Json(payload): axum::Json<AcceptPayload>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    let customer = CustomerId(payload.customer_id);
    match service.accept_suggestion(&customer, &payload.suggestion, now()) {
        Ok(appointment) => {
            let payload = json!({
                "outcome": "booked",
                "appointment": appointment.status_view(),
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    Path(appointment_id): Path<String>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.get(&AppointmentId(appointment_id)) {
        Ok(appointment) => (StatusCode::OK, axum::Json(appointment.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn confirm_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    Path(appointment_id): Path<String>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    transition_response(service.transition(&AppointmentId(appointment_id), LifecycleEvent::Confirm))
}

pub(crate) async fn complete_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    Path(appointment_id): Path<String>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    transition_response(service.transition(&AppointmentId(appointment_id), LifecycleEvent::Complete))
}

pub(crate) async fn cancel_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    Path(appointment_id): Path<String>,
    payload: Option<axum::Json<CancelPayload>>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    let id = AppointmentId(appointment_id);
    let result = match payload {
        Some(axum::Json(payload)) => {
            service.cancel_for_customer(&id, &CustomerId(payload.customer_id))
        }
        None => service.transition(&id, LifecycleEvent::Cancel),
    };
    transition_response(result)
}

pub(crate) async fn rating_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    Path(appointment_id): Path<String>,
    axum::Json(submission): axum::Json<RatingSubmission>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.rate(&AppointmentId(appointment_id), submission, now()) {
        Ok(rating) => (StatusCode::CREATED, axum::Json(rating)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn customer_agenda_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    Path(customer_id): Path<String>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    agenda_response(service.customer_agenda(&CustomerId(customer_id), now().date()))
}

pub(crate) async fn stylist_agenda_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
    Path(stylist_id): Path<String>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    agenda_response(service.stylist_agenda(&StylistId(stylist_id), now().date()))
}

pub(crate) async fn sweep_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.sweep(now()) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reminders_handler<R, N>(
    State(service): State<Arc<BookingService<R, N>>>,
) -> Response
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.send_reminders(now().date()) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

fn transition_response(result: Result<TransitionOutcome, BookingServiceError>) -> Response {
    match result {
        Ok(outcome) => {
            let message = if !outcome.changed {
                "appointment was already cancelled".to_string()
            } else if outcome.points_revoked > 0 {
                format!(
                    "appointment is now {}; {} loyalty points have been revoked",
                    outcome.appointment.status.label(),
                    outcome.points_revoked
                )
            } else if outcome.points_granted > 0 {
                format!(
                    "appointment is now {}; {} loyalty points earned",
                    outcome.appointment.status.label(),
                    outcome.points_granted
                )
            } else {
                format!("appointment is now {}", outcome.appointment.status.label())
            };
            let payload = json!({
                "appointment": outcome.appointment.status_view(),
                "points_granted": outcome.points_granted,
                "points_revoked": outcome.points_revoked,
                "changed": outcome.changed,
                "message": message,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn agenda_response(result: Result<Agenda, BookingServiceError>) -> Response {
    match result {
        Ok(agenda) => {
            let upcoming: Vec<_> = agenda.upcoming.iter().map(|a| a.status_view()).collect();
            let recent: Vec<_> = agenda.recent.iter().map(|a| a.status_view()).collect();
            let payload = json!({
                "upcoming": upcoming,
                "recent": recent,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: BookingServiceError) -> Response {
    let (status, message) = match &err {
        BookingServiceError::Validation(detail) => {
            (StatusCode::UNPROCESSABLE_ENTITY, detail.clone())
        }
        BookingServiceError::NotPermitted(detail) => (StatusCode::FORBIDDEN, detail.clone()),
        BookingServiceError::SlotTaken => (
            StatusCode::CONFLICT,
            "that slot was just taken; please try again".to_string(),
        ),
        BookingServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, "appointment not found".to_string())
        }
        BookingServiceError::Lifecycle(detail) => {
            warn!(%detail, "lifecycle misuse");
            (
                StatusCode::CONFLICT,
                "something went wrong, please retry".to_string(),
            )
        }
        BookingServiceError::Invariant(_)
        | BookingServiceError::Repository(_)
        | BookingServiceError::Ledger(_) => {
            error!(%err, "booking request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "something went wrong, please retry".to_string(),
            )
        }
    };

    (status, axum::Json(json!({ "error": message }))).into_response()
}

/// Parses `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Parses `HH:MM`, also accepting `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|err| format!("failed to parse '{raw}' as HH:MM ({err})"))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time(&raw).map_err(serde::de::Error::custom)
}
