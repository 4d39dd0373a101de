use crate::infra::{InMemoryNotificationSink, InMemorySalonRepository};
use crate::server::load_roster;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::Args;
use salon_scheduler::error::AppError;
use salon_scheduler::scheduling::{
    Agenda, Appointment, AppointmentId, AppointmentStatus, BookingOutcome, BookingRequest,
    BookingService, CustomerId, Rating, SchedulingConfig, ServiceId, StylistId,
};
use std::path::PathBuf;
use std::sync::Arc;

type DemoService = BookingService<InMemorySalonRepository, InMemoryNotificationSink>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Day to book (YYYY-MM-DD). Defaults to tomorrow.
    #[arg(long, value_parser = salon_scheduler::scheduling::parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Requested start time (HH:MM). Defaults to 10:00.
    #[arg(long, value_parser = salon_scheduler::scheduling::parse_time)]
    pub(crate) time: Option<NaiveTime>,
    /// Service requested by every demo customer.
    #[arg(long, default_value = "haircut")]
    pub(crate) service: String,
    /// Services CSV export to seed the directory instead of the built-in roster.
    #[arg(long, requires = "stylists_csv")]
    pub(crate) services_csv: Option<PathBuf>,
    /// Stylists CSV export to seed the directory instead of the built-in roster.
    #[arg(long, requires = "services_csv")]
    pub(crate) stylists_csv: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SweepArgs {
    /// Moment the sweep runs at (YYYY-MM-DDTHH:MM). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_datetime)]
    pub(crate) now: Option<NaiveDateTime>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        date,
        time,
        service,
        services_csv,
        stylists_csv,
    } = args;

    let now = Local::now().naive_local();
    let date = date.unwrap_or_else(|| now.date() + Duration::days(1));
    let time = time.unwrap_or_else(|| NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN));
    let service_id = ServiceId(service);

    let roster = load_roster(services_csv, stylists_csv)?;
    let repository = Arc::new(InMemorySalonRepository::with_roster(roster));
    let notifications = Arc::new(InMemoryNotificationSink::default());
    let booking = BookingService::new(
        repository.clone(),
        notifications.clone(),
        SchedulingConfig::default(),
    );

    println!("Salon booking demo for {} at {}", date, time.format("%H:%M"));

    // A regular with a glowing review on file, so the preference rule has something to use.
    let regular = CustomerId("maya".to_string());
    if let Some(favourite) = stage_regular(&repository, &booking, &regular, &service_id, now)? {
        println!("- {} previously rated {} 5/5", regular.0, favourite);
    }

    println!("\nBooking requests");
    let mut booked = Vec::new();
    let customers = [
        regular.0.as_str(),
        "walk-in-1",
        "walk-in-2",
        "walk-in-3",
    ];
    for customer in customers {
        let request = BookingRequest {
            customer_id: CustomerId(customer.to_string()),
            service_id: service_id.clone(),
            date,
            time,
        };
        match booking.book(request, now)? {
            BookingOutcome::Booked {
                appointment,
                alternatives,
                preferred,
            } => {
                println!(
                    "- {customer}: booked {} with {} ({}; {} alternative(s))",
                    appointment.id,
                    stylist_label(&appointment),
                    if preferred { "preferred" } else { "top rated" },
                    alternatives.len()
                );
                booked.push(appointment);
            }
            BookingOutcome::Suggested { slot, suggestion } => {
                println!(
                    "- {customer}: nobody free; suggested {} {} with {} stylist(s)",
                    slot.date,
                    slot.time.format("%H:%M"),
                    slot.stylists.len()
                );
                let appointment =
                    booking.accept_suggestion(&suggestion.customer_id, &suggestion, now)?;
                println!(
                    "  accepted -> {} with {}",
                    appointment.id,
                    stylist_label(&appointment)
                );
                booked.push(appointment);
            }
            BookingOutcome::Unavailable => {
                println!("- {customer}: no stylist free in the booking horizon");
            }
        }
    }

    if let Some(first) = booked.first() {
        println!("\nLifecycle for {}", first.id);
        let confirmed = booking.confirm(&first.id)?;
        println!(
            "- confirmed: +{} loyalty points",
            confirmed.points_granted
        );
        let cancelled = booking.cancel(&first.id)?;
        println!(
            "- cancelled: {} loyalty points revoked",
            cancelled.points_revoked
        );
        let repeated = booking.cancel(&first.id)?;
        println!("- cancelled again: changed={}", repeated.changed);
    }

    if let Some(stylist_id) = booked.get(1).and_then(|a| a.stylist_id.clone()) {
        let agenda = booking.stylist_agenda(&stylist_id, now.date())?;
        print_agenda(&format!("Agenda for {stylist_id}"), &agenda);
    }

    let events = notifications.events();
    println!("\nNotifications queued: {}", events.len());
    for event in events {
        println!(
            "  - {} -> {:?} ({})",
            event.template, event.recipient, event.appointment_id
        );
    }

    Ok(())
}

pub(crate) fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let now = args.now.unwrap_or_else(|| Local::now().naive_local());
    let repository = Arc::new(InMemorySalonRepository::with_roster(load_roster(None, None)?));
    let booking = BookingService::new(
        repository.clone(),
        Arc::new(InMemoryNotificationSink::default()),
        SchedulingConfig::default(),
    );

    let staged = [
        ("missed-pending", now - Duration::hours(2), AppointmentStatus::Pending),
        ("later-today", now + Duration::hours(2), AppointmentStatus::Pending),
        ("served-last-week", now - Duration::days(7), AppointmentStatus::Confirmed),
        ("served-yesterday", now - Duration::days(1), AppointmentStatus::Confirmed),
        ("tomorrow-visit", now + Duration::days(1), AppointmentStatus::Confirmed),
    ];
    for (id, starts_at, status) in staged {
        repository.record(history_entry(id, "sweep-demo", "amara", "haircut", starts_at, status));
    }

    println!("Maintenance sweep at {}", now.format("%Y-%m-%d %H:%M"));
    let first = booking.sweep(now)?;
    println!(
        "- first pass: {} pending expired, {} confirmed completed",
        first.cancelled_pending, first.completed_confirmed
    );
    let second = booking.sweep(now)?;
    println!("- second pass: {} change(s)", second.changed());

    let reminders = booking.send_reminders(now.date())?;
    println!("- reminders: {} appointment(s) for tomorrow", reminders.reminded);
    let repeated = booking.send_reminders(now.date())?;
    println!(
        "- reminders again: {} sent, {} already reminded",
        repeated.reminded, repeated.already_reminded
    );

    for (id, _, _) in staged {
        let appointment = booking.get(&AppointmentId(id.to_string()))?;
        println!("  {id}: {}", appointment.status.label());
    }
    Ok(())
}

/// Gives `customer` a rated, completed visit with the first stylist qualified for `service`.
fn stage_regular(
    repository: &InMemorySalonRepository,
    booking: &DemoService,
    customer: &CustomerId,
    service: &ServiceId,
    now: NaiveDateTime,
) -> Result<Option<StylistId>, AppError> {
    let assignment = booking.assign(&BookingRequest {
        customer_id: customer.clone(),
        service_id: service.clone(),
        date: now.date() + Duration::days(1),
        time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
    })?;
    let Some(stylist) = assignment.assigned_stylist().cloned() else {
        return Ok(None);
    };

    let visit = history_entry(
        "history-1",
        &customer.0,
        &stylist.id.0,
        &service.0,
        now - Duration::days(21),
        AppointmentStatus::Completed,
    );
    repository.record_rating(Rating {
        appointment_id: visit.id.clone(),
        customer_id: customer.clone(),
        stylist_id: stylist.id.clone(),
        score: 5,
        comment: "Best cut in years".to_string(),
        created_at: now - Duration::days(20),
    });
    repository.record(visit);
    Ok(Some(stylist.id))
}

fn history_entry(
    id: &str,
    customer: &str,
    stylist: &str,
    service: &str,
    starts_at: NaiveDateTime,
    status: AppointmentStatus,
) -> Appointment {
    Appointment {
        id: AppointmentId(id.to_string()),
        customer_id: CustomerId(customer.to_string()),
        stylist_id: Some(StylistId(stylist.to_string())),
        service_id: ServiceId(service.to_string()),
        date: starts_at.date(),
        time: starts_at.time(),
        duration_minutes: 45,
        status,
        loyalty_points: 0,
        created_at: starts_at - Duration::days(3),
    }
}

fn stylist_label(appointment: &Appointment) -> String {
    appointment
        .stylist_id
        .as_ref()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unassigned".to_string())
}

fn print_agenda(title: &str, agenda: &Agenda) {
    println!("\n{title}");
    if agenda.upcoming.is_empty() {
        println!("- nothing upcoming");
    }
    for appointment in &agenda.upcoming {
        println!(
            "- {} {} {} ({}, {})",
            appointment.date,
            appointment.time.format("%H:%M"),
            appointment.service_id.0,
            appointment.customer_id.0,
            appointment.status.label()
        );
    }
    if !agenda.recent.is_empty() {
        println!("  {} recent appointment(s)", agenda.recent.len());
    }
}
