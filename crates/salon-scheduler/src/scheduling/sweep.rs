use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use super::domain::{Appointment, AppointmentStatus};
use super::lifecycle::LifecycleEvent;
use super::repository::{AppointmentStore, RepositoryError};

/// Totals reported by one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cancelled_pending: usize,
    pub completed_confirmed: usize,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.cancelled_pending + self.completed_confirmed
    }
}

/// Totals reported by one reminder run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub reminded: usize,
    pub already_reminded: usize,
}

/// Expires pending appointments whose start has passed and completes confirmed appointments
/// dated strictly before yesterday. Already-swept appointments no longer match, so a second
/// pass changes nothing.
pub fn sweep_due_appointments<S>(store: &S, now: NaiveDateTime) -> Result<SweepReport, RepositoryError>
where
    S: AppointmentStore + ?Sized,
{
    let mut report = SweepReport::default();
    let yesterday = now.date() - Duration::days(1);

    for appointment in store.with_status(AppointmentStatus::Pending)? {
        if appointment.starts_at() >= now {
            continue;
        }
        if settle(store, &appointment, LifecycleEvent::Cancel)? {
            report.cancelled_pending += 1;
        }
    }

    for appointment in store.with_status(AppointmentStatus::Confirmed)? {
        if appointment.date >= yesterday {
            continue;
        }
        if settle(store, &appointment, LifecycleEvent::Complete)? {
            report.completed_confirmed += 1;
        }
    }

    info!(
        cancelled_pending = report.cancelled_pending,
        completed_confirmed = report.completed_confirmed,
        "appointment sweep finished"
    );
    Ok(report)
}

/// Applies `event` unless another writer moved the appointment since it was listed.
fn settle<S>(store: &S, appointment: &Appointment, event: LifecycleEvent) -> Result<bool, RepositoryError>
where
    S: AppointmentStore + ?Sized,
{
    let Ok(next) = appointment.status.apply(event) else {
        return Ok(false);
    };
    match store.transition(
        &appointment.id,
        appointment.status,
        next,
        appointment.loyalty_points,
    ) {
        Ok(_) => Ok(true),
        Err(RepositoryError::Conflict) => {
            debug!(appointment = %appointment.id, event = event.label(), "appointment changed during sweep; skipped");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
