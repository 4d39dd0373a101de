use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::assignment::{
    rank_by_rating, split_chosen, verify_stylist, AssignmentDecision, AssignmentError,
    AssignmentPolicy,
};
use super::config::SchedulingConfig;
use super::domain::{
    Appointment, AppointmentId, AppointmentStatus, CandidateSlot, CustomerId, Rating, Service,
    ServiceId, Stylist, StylistId,
};
use super::lifecycle::{LifecycleError, LifecycleEvent};
use super::preference::PreferenceResolver;
use super::repository::{
    BookingNotification, LedgerError, NotificationSink, Recipient, RepositoryError,
    SalonRepository,
};
use super::suggestion::SuggestedBooking;
use super::sweep::{sweep_due_appointments, ReminderReport, SweepReport};

/// Number of past appointments listed on an agenda.
const RECENT_LIMIT: usize = 5;

/// A customer's request for a service at a specific instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub customer_id: CustomerId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Customer feedback for a completed appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSubmission {
    pub customer_id: CustomerId,
    pub score: u8,
    #[serde(default)]
    pub comment: String,
}

/// What the booking flow did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Booked {
        appointment: Appointment,
        alternatives: Vec<Stylist>,
        preferred: bool,
    },
    Suggested {
        slot: CandidateSlot,
        suggestion: SuggestedBooking,
    },
    Unavailable,
}

/// Result of driving an appointment through one lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub appointment: Appointment,
    pub points_granted: u32,
    pub points_revoked: u32,
    /// False when a repeated cancellation left everything untouched.
    pub changed: bool,
}

/// Upcoming and recent appointments for one person.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Agenda {
    pub upcoming: Vec<Appointment>,
    pub recent: Vec<Appointment>,
}

/// Service composing the assignment policy, lifecycle, loyalty ledger, and notifications.
pub struct BookingService<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    config: SchedulingConfig,
}

static APPOINTMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_appointment_id() -> AppointmentId {
    let id = APPOINTMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AppointmentId(format!("appt-{id:06}"))
}

impl<R, N> BookingService<R, N>
where
    R: SalonRepository + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(repository: Arc<R>, notifications: Arc<N>, config: SchedulingConfig) -> Self {
        Self {
            repository,
            notifications,
            config,
        }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    fn policy(&self) -> AssignmentPolicy<'_, R> {
        AssignmentPolicy::new(
            self.repository.as_ref(),
            self.config.conflict_rule,
            self.config.hours,
        )
    }

    /// Decide who would serve the request without writing anything.
    pub fn assign(
        &self,
        request: &BookingRequest,
    ) -> Result<AssignmentDecision, BookingServiceError> {
        let decision = self.policy().assign(
            &request.customer_id,
            &request.service_id,
            request.date,
            request.time,
        )?;
        Ok(decision)
    }

    /// Assign a stylist and persist a pending appointment, or hand back an alternative.
    ///
    /// A [`BookingServiceError::SlotTaken`] means a concurrent booking won the slot between
    /// the availability read and the write; callers may retry once.
    pub fn book(
        &self,
        request: BookingRequest,
        now: NaiveDateTime,
    ) -> Result<BookingOutcome, BookingServiceError> {
        let service = self.validate(&request, now)?;

        match self.assign(&request)? {
            AssignmentDecision::Assigned {
                stylist,
                alternatives,
                preferred,
            } => {
                let appointment = self.create_pending(
                    &request.customer_id,
                    &service,
                    &stylist,
                    request.date,
                    request.time,
                    now,
                )?;
                Ok(BookingOutcome::Booked {
                    appointment,
                    alternatives,
                    preferred,
                })
            }
            AssignmentDecision::Suggested(slot) => {
                let suggestion = SuggestedBooking::issue(
                    request.customer_id,
                    request.service_id,
                    &slot,
                    now,
                    self.config.suggestion_ttl(),
                );
                Ok(BookingOutcome::Suggested { slot, suggestion })
            }
            AssignmentDecision::Unavailable => Ok(BookingOutcome::Unavailable),
        }
    }

    /// Book the slot carried by a previously issued suggestion.
    pub fn accept_suggestion(
        &self,
        customer: &CustomerId,
        suggestion: &SuggestedBooking,
        now: NaiveDateTime,
    ) -> Result<Appointment, BookingServiceError> {
        if &suggestion.customer_id != customer {
            return Err(BookingServiceError::NotPermitted(
                "suggestion was issued to another customer".to_string(),
            ));
        }
        if suggestion.is_expired(now) {
            return Err(BookingServiceError::Validation(
                "suggestion has expired; please book again".to_string(),
            ));
        }
        self.check_suggestion(suggestion, now)?;

        let service = self.lookup_service(&suggestion.service_id)?;
        let available = self.policy().index().find_available(
            &suggestion.service_id,
            suggestion.date,
            suggestion.time,
        )?;
        if available.is_empty() {
            warn!(service = %suggestion.service_id, date = %suggestion.date, time = %suggestion.time, "suggested slot filled before acceptance");
            return Err(BookingServiceError::SlotTaken);
        }

        let resolver = PreferenceResolver::new(self.repository.as_ref());
        let chosen = match resolver.preferred_among(customer, &available)? {
            Some(preferred) => split_chosen(available, &preferred.id).map(|(stylist, _)| stylist),
            None => rank_by_rating(available).into_iter().next(),
        };
        let stylist = chosen.ok_or(BookingServiceError::SlotTaken)?;
        verify_stylist(&stylist, &suggestion.service_id)?;

        self.create_pending(
            customer,
            &service,
            &stylist,
            suggestion.date,
            suggestion.time,
            now,
        )
    }

    /// Apply one lifecycle event, including its loyalty side effects.
    ///
    /// The status change is committed first with the store's conditional write and the ledger
    /// is only touched by the writer that won it. A writer that lost re-reads once, so a
    /// cancellation racing another cancellation reports `changed == false`.
    pub fn transition(
        &self,
        id: &AppointmentId,
        event: LifecycleEvent,
    ) -> Result<TransitionOutcome, BookingServiceError> {
        match self.apply_event(self.fetch(id)?, event) {
            Err(BookingServiceError::Repository(RepositoryError::Conflict)) => {
                info!(appointment = %id, event = event.label(), "appointment changed concurrently; re-reading");
                self.apply_event(self.fetch(id)?, event)
            }
            other => other,
        }
    }

    fn apply_event(
        &self,
        appointment: Appointment,
        event: LifecycleEvent,
    ) -> Result<TransitionOutcome, BookingServiceError> {
        if event == LifecycleEvent::Cancel && appointment.status == AppointmentStatus::Cancelled {
            info!(appointment = %appointment.id, "cancellation repeated; nothing to do");
            return Ok(TransitionOutcome {
                appointment,
                points_granted: 0,
                points_revoked: 0,
                changed: false,
            });
        }

        let next = appointment.status.apply(event).map_err(|err| {
            warn!(appointment = %appointment.id, %err, "rejected lifecycle transition");
            err
        })?;

        let mut points_granted = 0;
        let mut points_revoked = 0;
        let stored = match event {
            LifecycleEvent::Confirm => {
                points_granted = self.loyalty_for(&appointment)?;
                let stored = self.commit(&appointment, next, points_granted)?;
                if let Err(err) = self
                    .repository
                    .grant_points(&appointment.customer_id, points_granted)
                {
                    self.roll_back(&appointment, next);
                    return Err(err.into());
                }
                stored
            }
            LifecycleEvent::Cancel => {
                let stored = self.commit(&appointment, next, 0)?;
                if appointment.loyalty_points > 0 {
                    points_revoked = match self
                        .repository
                        .revoke_points(&appointment.customer_id, appointment.loyalty_points)
                    {
                        Ok(revoked) => revoked,
                        Err(err) => {
                            self.roll_back(&appointment, next);
                            return Err(err.into());
                        }
                    };
                }
                stored
            }
            LifecycleEvent::Complete => {
                self.commit(&appointment, next, appointment.loyalty_points)?
            }
        };

        info!(
            appointment = %stored.id,
            from = appointment.status.label(),
            to = next.label(),
            points_granted,
            points_revoked,
            "appointment transitioned"
        );

        if event == LifecycleEvent::Cancel {
            self.notify_cancelled(&stored, points_revoked);
        }

        Ok(TransitionOutcome {
            appointment: stored,
            points_granted,
            points_revoked,
            changed: true,
        })
    }

    fn commit(
        &self,
        appointment: &Appointment,
        next: AppointmentStatus,
        loyalty_points: u32,
    ) -> Result<Appointment, RepositoryError> {
        self.repository
            .transition(&appointment.id, appointment.status, next, loyalty_points)
    }

    /// Restores the appointment as it was read when its ledger update failed.
    fn roll_back(&self, original: &Appointment, applied: AppointmentStatus) {
        if let Err(err) = self.repository.transition(
            &original.id,
            applied,
            original.status,
            original.loyalty_points,
        ) {
            error!(appointment = %original.id, %err, "could not restore appointment after ledger failure");
        }
    }

    pub fn confirm(&self, id: &AppointmentId) -> Result<TransitionOutcome, BookingServiceError> {
        self.transition(id, LifecycleEvent::Confirm)
    }

    pub fn complete(&self, id: &AppointmentId) -> Result<TransitionOutcome, BookingServiceError> {
        self.transition(id, LifecycleEvent::Complete)
    }

    pub fn cancel(&self, id: &AppointmentId) -> Result<TransitionOutcome, BookingServiceError> {
        self.transition(id, LifecycleEvent::Cancel)
    }

    /// Cancellation requested by a customer, who may only withdraw their own bookings.
    pub fn cancel_for_customer(
        &self,
        id: &AppointmentId,
        customer: &CustomerId,
    ) -> Result<TransitionOutcome, BookingServiceError> {
        if &self.fetch(id)?.customer_id != customer {
            return Err(BookingServiceError::NotPermitted(
                "customers may only cancel their own appointments".to_string(),
            ));
        }
        self.cancel(id)
    }

    /// Attach the customer's single rating to a completed appointment and refresh the
    /// stylist's average.
    pub fn rate(
        &self,
        id: &AppointmentId,
        submission: RatingSubmission,
        now: NaiveDateTime,
    ) -> Result<Rating, BookingServiceError> {
        let appointment = self.fetch(id)?;

        if appointment.customer_id != submission.customer_id {
            return Err(BookingServiceError::NotPermitted(
                "only the customer who booked may rate this appointment".to_string(),
            ));
        }
        if appointment.status != AppointmentStatus::Completed {
            return Err(BookingServiceError::Validation(
                "only completed appointments can be rated".to_string(),
            ));
        }
        if !(1..=5).contains(&submission.score) {
            return Err(BookingServiceError::Validation(format!(
                "rating must be between 1 and 5, got {}",
                submission.score
            )));
        }
        if self.repository.rating_for(id)?.is_some() {
            return Err(BookingServiceError::Validation(
                "appointment has already been rated".to_string(),
            ));
        }
        let stylist_id = appointment.stylist_id.clone().ok_or_else(|| {
            BookingServiceError::Invariant(format!(
                "completed appointment {} has no stylist",
                appointment.id
            ))
        })?;

        let rating = self.repository.insert_rating(Rating {
            appointment_id: appointment.id.clone(),
            customer_id: submission.customer_id,
            stylist_id: stylist_id.clone(),
            score: submission.score,
            comment: submission.comment,
            created_at: now,
        })?;

        let received = self.repository.ratings_received_by(&stylist_id)?;
        if !received.is_empty() {
            let total: u32 = received.iter().map(|rating| u32::from(rating.score)).sum();
            let average = total as f32 / received.len() as f32;
            self.repository.update_rating(&stylist_id, average)?;
            info!(stylist = %stylist_id, average, ratings = received.len(), "stylist rating refreshed");
        }

        Ok(rating)
    }

    pub fn sweep(&self, now: NaiveDateTime) -> Result<SweepReport, BookingServiceError> {
        Ok(sweep_due_appointments(self.repository.as_ref(), now)?)
    }

    /// Reminds customer and stylist of every pending or confirmed appointment dated the day
    /// after `today`. An appointment is reminded at most once per day.
    pub fn send_reminders(&self, today: NaiveDate) -> Result<ReminderReport, BookingServiceError> {
        let tomorrow = today + Duration::days(1);
        let mut report = ReminderReport::default();

        for status in [AppointmentStatus::Pending, AppointmentStatus::Confirmed] {
            for appointment in self.repository.with_status(status)? {
                if appointment.date != tomorrow {
                    continue;
                }
                if !self.repository.claim_reminder(&appointment.id, today)? {
                    report.already_reminded += 1;
                    continue;
                }
                self.notify_reminder(&appointment);
                report.reminded += 1;
            }
        }

        info!(%tomorrow, reminded = report.reminded, already_reminded = report.already_reminded, "appointment reminders sent");
        Ok(report)
    }

    pub fn get(&self, id: &AppointmentId) -> Result<Appointment, BookingServiceError> {
        self.fetch(id)
    }

    pub fn customer_agenda(
        &self,
        customer: &CustomerId,
        today: NaiveDate,
    ) -> Result<Agenda, BookingServiceError> {
        Ok(build_agenda(self.repository.for_customer(customer)?, today))
    }

    pub fn stylist_agenda(
        &self,
        stylist: &StylistId,
        today: NaiveDate,
    ) -> Result<Agenda, BookingServiceError> {
        Ok(build_agenda(self.repository.for_stylist(stylist)?, today))
    }

    fn fetch(&self, id: &AppointmentId) -> Result<Appointment, BookingServiceError> {
        Ok(self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    fn lookup_service(&self, id: &ServiceId) -> Result<Service, BookingServiceError> {
        self.repository
            .service(id)?
            .ok_or_else(|| BookingServiceError::Validation(format!("unknown service {id}")))
    }

    fn validate(
        &self,
        request: &BookingRequest,
        now: NaiveDateTime,
    ) -> Result<Service, BookingServiceError> {
        let service = self.lookup_service(&request.service_id)?;
        self.check_start(request.date, request.time, now)?;
        Ok(service)
    }

    fn check_start(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<(), BookingServiceError> {
        if date.and_time(time) < now {
            return Err(BookingServiceError::Validation(
                "appointments cannot be booked in the past".to_string(),
            ));
        }
        if !self.config.hours.is_open_at(time) {
            return Err(BookingServiceError::Validation(format!(
                "the salon takes bookings from {} until {}",
                self.config.hours.opens_at.format("%H:%M"),
                self.config.hours.closes_at.format("%H:%M")
            )));
        }
        Ok(())
    }

    /// Suggestions come back from the client, so the slot gets the same checks as a request.
    fn check_suggestion(
        &self,
        suggestion: &SuggestedBooking,
        now: NaiveDateTime,
    ) -> Result<(), BookingServiceError> {
        if suggestion.issued_at > now
            || suggestion.expires_at - suggestion.issued_at > self.config.suggestion_ttl()
        {
            return Err(BookingServiceError::Validation(
                "suggestion was not issued by this salon".to_string(),
            ));
        }
        self.check_start(suggestion.date, suggestion.time, now)
    }

    fn create_pending(
        &self,
        customer: &CustomerId,
        service: &Service,
        stylist: &Stylist,
        date: NaiveDate,
        time: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<Appointment, BookingServiceError> {
        let appointment = Appointment {
            id: next_appointment_id(),
            customer_id: customer.clone(),
            stylist_id: Some(stylist.id.clone()),
            service_id: service.id.clone(),
            date,
            time,
            duration_minutes: service.duration_minutes,
            status: AppointmentStatus::Pending,
            loyalty_points: 0,
            created_at: now,
        };

        let stored = match self.repository.insert(appointment) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                warn!(stylist = %stylist.id, %date, %time, "slot taken by a concurrent booking");
                return Err(BookingServiceError::SlotTaken);
            }
            Err(other) => return Err(other.into()),
        };

        info!(appointment = %stored.id, stylist = %stylist.id, service = %service.id, %date, %time, "appointment booked");
        self.notify_booked(&stored, service, stylist);
        Ok(stored)
    }

    /// Points the confirmation earns; the appointment remembers them for a later revocation.
    fn loyalty_for(&self, appointment: &Appointment) -> Result<u32, BookingServiceError> {
        let accrued_before = self
            .repository
            .for_customer(&appointment.customer_id)?
            .iter()
            .filter(|other| other.id != appointment.id)
            .filter(|other| {
                matches!(
                    other.status,
                    AppointmentStatus::Confirmed | AppointmentStatus::Completed
                )
            })
            .count();

        Ok(self
            .config
            .loyalty
            .accrual(&appointment.service_id, accrued_before + 1))
    }

    fn notify_booked(&self, appointment: &Appointment, service: &Service, stylist: &Stylist) {
        let mut details = BTreeMap::new();
        details.insert("service".to_string(), service.name.clone());
        details.insert("date".to_string(), appointment.date.to_string());
        details.insert(
            "time".to_string(),
            appointment.time.format("%H:%M").to_string(),
        );
        details.insert("stylist".to_string(), stylist.name.clone());

        let recipients = [
            (
                "appointment_booked_stylist",
                Recipient::Stylist(stylist.id.clone()),
            ),
            (
                "appointment_booked_customer",
                Recipient::Customer(appointment.customer_id.clone()),
            ),
        ];
        for (template, recipient) in recipients {
            self.deliver(BookingNotification {
                template: template.to_string(),
                recipient,
                appointment_id: appointment.id.clone(),
                details: details.clone(),
            });
        }
    }

    fn notify_cancelled(&self, appointment: &Appointment, points_revoked: u32) {
        let Some(stylist) = appointment.stylist_id.clone() else {
            return;
        };
        let mut details = BTreeMap::new();
        details.insert("date".to_string(), appointment.date.to_string());
        details.insert(
            "time".to_string(),
            appointment.time.format("%H:%M").to_string(),
        );
        details.insert("points_revoked".to_string(), points_revoked.to_string());

        self.deliver(BookingNotification {
            template: "appointment_cancelled".to_string(),
            recipient: Recipient::Stylist(stylist),
            appointment_id: appointment.id.clone(),
            details,
        });
    }

    fn notify_reminder(&self, appointment: &Appointment) {
        let service_name = match self.repository.service(&appointment.service_id) {
            Ok(Some(service)) => service.name,
            _ => appointment.service_id.0.clone(),
        };
        let mut details = BTreeMap::new();
        details.insert("service".to_string(), service_name);
        details.insert("date".to_string(), appointment.date.to_string());
        details.insert(
            "time".to_string(),
            appointment.time.format("%H:%M").to_string(),
        );

        let mut recipients = vec![(
            "appointment_reminder_customer",
            Recipient::Customer(appointment.customer_id.clone()),
        )];
        if let Some(stylist) = appointment.stylist_id.clone() {
            recipients.push(("appointment_reminder_stylist", Recipient::Stylist(stylist)));
        }
        for (template, recipient) in recipients {
            self.deliver(BookingNotification {
                template: template.to_string(),
                recipient,
                appointment_id: appointment.id.clone(),
                details: details.clone(),
            });
        }
    }

    /// Fire and forget: a failed notification never undoes a booking.
    fn deliver(&self, notification: BookingNotification) {
        let template = notification.template.clone();
        let appointment = notification.appointment_id.clone();
        if let Err(err) = self.notifications.deliver(notification) {
            warn!(%appointment, template = %template, %err, "notification delivery failed");
        }
    }
}

fn build_agenda(mut appointments: Vec<Appointment>, today: NaiveDate) -> Agenda {
    appointments.sort_by_key(|appointment| appointment.starts_at());

    let mut agenda = Agenda::default();
    for appointment in appointments {
        if appointment.date >= today {
            if appointment.status != AppointmentStatus::Cancelled {
                agenda.upcoming.push(appointment);
            }
        } else {
            agenda.recent.push(appointment);
        }
    }
    agenda.recent.reverse();
    agenda.recent.truncate(RECENT_LIMIT);
    agenda
}

/// Error raised by the booking service.
#[derive(Debug, thiserror::Error)]
pub enum BookingServiceError {
    #[error("invalid booking request: {0}")]
    Validation(String),
    #[error("not permitted: {0}")]
    NotPermitted(String),
    #[error("slot is no longer available; retry the assignment")]
    SlotTaken,
    #[error("scheduling invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl BookingServiceError {
    /// Only a lost race for a slot is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingServiceError::SlotTaken)
    }
}

impl From<AssignmentError> for BookingServiceError {
    fn from(value: AssignmentError) -> Self {
        match value {
            AssignmentError::Repository(err) => Self::Repository(err),
            err @ AssignmentError::MissingExpertise { .. } => {
                error!(%err, "refusing to book");
                Self::Invariant(err.to_string())
            }
        }
    }
}
