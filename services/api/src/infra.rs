use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use metrics_exporter_prometheus::PrometheusHandle;
use salon_scheduler::scheduling::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentStore, BookingNotification,
    CustomerId, LedgerError, LoyaltyLedger, NotificationError, NotificationSink, Rating,
    RatingHistory, RepositoryError, Roster, Service, ServiceId, Stylist, StylistDirectory,
    StylistId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local salon data: directory, calendar, rating history and loyalty balances.
#[derive(Default, Clone)]
pub(crate) struct InMemorySalonRepository {
    stylists: Arc<Mutex<BTreeMap<StylistId, Stylist>>>,
    services: Arc<Mutex<BTreeMap<ServiceId, Service>>>,
    appointments: Arc<Mutex<BTreeMap<AppointmentId, Appointment>>>,
    ratings: Arc<Mutex<Vec<Rating>>>,
    balances: Arc<Mutex<HashMap<CustomerId, u32>>>,
    reminded: Arc<Mutex<BTreeSet<(AppointmentId, NaiveDate)>>>,
}

impl InMemorySalonRepository {
    pub(crate) fn with_roster(roster: Roster) -> Self {
        let repository = Self::default();
        {
            let mut services = repository.services.lock().expect("services mutex poisoned");
            for service in roster.services {
                services.insert(service.id.clone(), service);
            }
        }
        {
            let mut stylists = repository.stylists.lock().expect("stylists mutex poisoned");
            for stylist in roster.stylists {
                stylists.insert(stylist.id.clone(), stylist);
            }
        }
        repository
    }

    /// Stores history directly, bypassing assignment; used to stage demo data.
    pub(crate) fn record(&self, appointment: Appointment) {
        self.appointments
            .lock()
            .expect("appointments mutex poisoned")
            .insert(appointment.id.clone(), appointment);
    }

    pub(crate) fn record_rating(&self, rating: Rating) {
        self.ratings
            .lock()
            .expect("ratings mutex poisoned")
            .push(rating);
    }
}

impl StylistDirectory for InMemorySalonRepository {
    fn roster(&self) -> Result<Vec<Stylist>, RepositoryError> {
        let guard = self.stylists.lock().expect("stylists mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn stylist(&self, id: &StylistId) -> Result<Option<Stylist>, RepositoryError> {
        let guard = self.stylists.lock().expect("stylists mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn service(&self, id: &ServiceId) -> Result<Option<Service>, RepositoryError> {
        let guard = self.services.lock().expect("services mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update_rating(&self, id: &StylistId, rating: f32) -> Result<(), RepositoryError> {
        let mut guard = self.stylists.lock().expect("stylists mutex poisoned");
        match guard.get_mut(id) {
            Some(stylist) => {
                stylist.rating = rating;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

impl AppointmentStore for InMemorySalonRepository {
    fn has_conflict(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, RepositoryError> {
        let guard = self.appointments.lock().expect("appointments mutex poisoned");
        Ok(guard.values().any(|appointment| {
            appointment.status.holds_slot()
                && appointment.stylist_id.as_ref() == Some(stylist)
                && appointment.date == date
                && appointment.time == time
        }))
    }

    fn active_on(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let guard = self.appointments.lock().expect("appointments mutex poisoned");
        Ok(guard
            .values()
            .filter(|appointment| {
                appointment.status.holds_slot()
                    && appointment.stylist_id.as_ref() == Some(stylist)
                    && appointment.date == date
            })
            .cloned()
            .collect())
    }

    // Slot check and write share one lock.
    fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let mut guard = self.appointments.lock().expect("appointments mutex poisoned");
        if guard.contains_key(&appointment.id) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(slot) = appointment.slot() {
            let taken = guard.values().any(|existing| {
                existing.status.holds_slot() && existing.slot().as_ref() == Some(&slot)
            });
            if taken {
                return Err(RepositoryError::Conflict);
            }
        }
        guard.insert(appointment.id.clone(), appointment.clone());
        Ok(appointment)
    }

    // Status check and write share one lock.
    fn transition(
        &self,
        id: &AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
        loyalty_points: u32,
    ) -> Result<Appointment, RepositoryError> {
        let mut guard = self.appointments.lock().expect("appointments mutex poisoned");
        let appointment = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if appointment.status != from {
            return Err(RepositoryError::Conflict);
        }
        appointment.status = to;
        appointment.loyalty_points = loyalty_points;
        Ok(appointment.clone())
    }

    fn claim_reminder(&self, id: &AppointmentId, day: NaiveDate) -> Result<bool, RepositoryError> {
        let mut guard = self.reminded.lock().expect("reminders mutex poisoned");
        Ok(guard.insert((id.clone(), day)))
    }

    fn fetch(&self, id: &AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        let guard = self.appointments.lock().expect("appointments mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_customer(&self, customer: &CustomerId) -> Result<Vec<Appointment>, RepositoryError> {
        let guard = self.appointments.lock().expect("appointments mutex poisoned");
        Ok(guard
            .values()
            .filter(|appointment| &appointment.customer_id == customer)
            .cloned()
            .collect())
    }

    fn for_stylist(&self, stylist: &StylistId) -> Result<Vec<Appointment>, RepositoryError> {
        let guard = self.appointments.lock().expect("appointments mutex poisoned");
        Ok(guard
            .values()
            .filter(|appointment| appointment.stylist_id.as_ref() == Some(stylist))
            .cloned()
            .collect())
    }

    fn with_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, RepositoryError> {
        let guard = self.appointments.lock().expect("appointments mutex poisoned");
        Ok(guard
            .values()
            .filter(|appointment| appointment.status == status)
            .cloned()
            .collect())
    }
}

impl RatingHistory for InMemorySalonRepository {
    fn ratings_given_by(&self, customer: &CustomerId) -> Result<Vec<Rating>, RepositoryError> {
        let guard = self.ratings.lock().expect("ratings mutex poisoned");
        Ok(guard
            .iter()
            .filter(|rating| &rating.customer_id == customer)
            .cloned()
            .collect())
    }

    fn ratings_received_by(&self, stylist: &StylistId) -> Result<Vec<Rating>, RepositoryError> {
        let guard = self.ratings.lock().expect("ratings mutex poisoned");
        Ok(guard
            .iter()
            .filter(|rating| &rating.stylist_id == stylist)
            .cloned()
            .collect())
    }

    fn rating_for(&self, appointment: &AppointmentId) -> Result<Option<Rating>, RepositoryError> {
        let guard = self.ratings.lock().expect("ratings mutex poisoned");
        Ok(guard
            .iter()
            .find(|rating| &rating.appointment_id == appointment)
            .cloned())
    }

    fn insert_rating(&self, rating: Rating) -> Result<Rating, RepositoryError> {
        let mut guard = self.ratings.lock().expect("ratings mutex poisoned");
        if guard
            .iter()
            .any(|existing| existing.appointment_id == rating.appointment_id)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.push(rating.clone());
        Ok(rating)
    }
}

impl LoyaltyLedger for InMemorySalonRepository {
    fn balance(&self, customer: &CustomerId) -> Result<u32, LedgerError> {
        let guard = self.balances.lock().expect("ledger mutex poisoned");
        Ok(guard.get(customer).copied().unwrap_or(0))
    }

    fn grant_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        let mut guard = self.balances.lock().expect("ledger mutex poisoned");
        let balance = guard.entry(customer.clone()).or_insert(0);
        *balance = balance.saturating_add(points);
        Ok(*balance)
    }

    fn revoke_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        let mut guard = self.balances.lock().expect("ledger mutex poisoned");
        let balance = guard.entry(customer.clone()).or_insert(0);
        let revoked = points.min(*balance);
        *balance -= revoked;
        Ok(revoked)
    }
}

/// Notification sink that logs every message and keeps it for inspection.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationSink {
    events: Arc<Mutex<Vec<BookingNotification>>>,
}

impl NotificationSink for InMemoryNotificationSink {
    fn deliver(&self, notification: BookingNotification) -> Result<(), NotificationError> {
        info!(
            template = %notification.template,
            appointment = %notification.appointment_id,
            recipient = ?notification.recipient,
            "notification queued"
        );
        let mut guard = self.events.lock().expect("notification mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationSink {
    pub(crate) fn events(&self) -> Vec<BookingNotification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

/// Small built-in roster used when no CSV exports are supplied.
pub(crate) fn demo_roster() -> Roster {
    let service = |id: &str, name: &str, duration_minutes: u32| Service {
        id: ServiceId(id.to_string()),
        name: name.to_string(),
        duration_minutes,
    };
    let stylist = |id: &str, name: &str, rating: f32, on_duty: bool, expertise: &[&str]| Stylist {
        id: StylistId(id.to_string()),
        name: name.to_string(),
        expertise: expertise
            .iter()
            .map(|service| ServiceId(service.to_string()))
            .collect::<BTreeSet<_>>(),
        rating,
        on_duty,
    };

    Roster {
        services: vec![
            service("haircut", "Haircut", 45),
            service("color", "Colour", 90),
            service("blowout", "Blow-dry", 30),
            service("bridal", "Bridal Styling", 120),
        ],
        stylists: vec![
            stylist("amara", "Amara", 4.7, true, &["haircut", "color", "bridal"]),
            stylist("jonas", "Jonas", 4.2, true, &["haircut", "blowout"]),
            stylist("priya", "Priya", 4.9, true, &["color", "blowout"]),
            stylist("theo", "Theo", 3.8, false, &["haircut", "color"]),
        ],
    }
}

pub(crate) fn parse_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DDTHH:MM ({err})"))
}
