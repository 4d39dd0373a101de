use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

use crate::scheduling::domain::{
    Appointment, AppointmentId, AppointmentStatus, CustomerId, Rating, Service, ServiceId,
    Stylist, StylistId,
};
use crate::scheduling::repository::{
    AppointmentStore, BookingNotification, LedgerError, LoyaltyLedger, NotificationError,
    NotificationSink, RatingHistory, RepositoryError, StylistDirectory,
};
use crate::scheduling::{booking_router, BookingService, SchedulingConfig};

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

pub(super) fn at(day: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    day.and_time(time(h, m))
}

pub(super) fn booking_day() -> NaiveDate {
    date(2024, 6, 1)
}

/// A moment safely before every booking made in these tests.
pub(super) fn before_booking_day() -> NaiveDateTime {
    at(date(2024, 5, 31), 8, 0)
}

pub(super) fn customer(id: &str) -> CustomerId {
    CustomerId(id.to_string())
}

pub(super) fn stylist_id(id: &str) -> StylistId {
    StylistId(id.to_string())
}

pub(super) fn service_id(id: &str) -> ServiceId {
    ServiceId(id.to_string())
}

pub(super) fn service(id: &str, duration_minutes: u32) -> Service {
    Service {
        id: service_id(id),
        name: id.to_string(),
        duration_minutes,
    }
}

pub(super) fn stylist(id: &str, rating: f32, expertise: &[&str]) -> Stylist {
    Stylist {
        id: stylist_id(id),
        name: id.to_uppercase(),
        expertise: expertise.iter().map(|s| service_id(s)).collect(),
        rating,
        on_duty: true,
    }
}

pub(super) fn config() -> SchedulingConfig {
    let mut config = SchedulingConfig::default();
    config.loyalty.special_services = BTreeSet::from([service_id("special")]);
    config
}

/// Salon with a haircut (45 min), colour (90 min), and special service, and no stylists.
pub(super) fn salon() -> MemoryRepository {
    let repository = MemoryRepository::default();
    repository.add_service(service("cut", 45));
    repository.add_service(service("color", 90));
    repository.add_service(service("special", 60));
    repository
}

pub(super) fn build_service(
    repository: MemoryRepository,
) -> (
    BookingService<MemoryRepository, MemoryNotifications>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifications>,
) {
    let repository = Arc::new(repository);
    let notifications = Arc::new(MemoryNotifications::default());
    let service = BookingService::new(repository.clone(), notifications.clone(), config());
    (service, repository, notifications)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    stylists: Arc<Mutex<BTreeMap<StylistId, Stylist>>>,
    services: Arc<Mutex<BTreeMap<ServiceId, Service>>>,
    appointments: Arc<Mutex<BTreeMap<AppointmentId, Appointment>>>,
    ratings: Arc<Mutex<Vec<Rating>>>,
    balances: Arc<Mutex<HashMap<CustomerId, u32>>>,
    reminders: Arc<Mutex<BTreeSet<(AppointmentId, NaiveDate)>>>,
}

impl MemoryRepository {
    pub(super) fn add_service(&self, service: Service) {
        self.services
            .lock()
            .expect("services mutex poisoned")
            .insert(service.id.clone(), service);
    }

    pub(super) fn add_stylist(&self, stylist: Stylist) {
        self.stylists
            .lock()
            .expect("stylists mutex poisoned")
            .insert(stylist.id.clone(), stylist);
    }

    pub(super) fn set_on_duty(&self, id: &str, on_duty: bool) {
        if let Some(stylist) = self
            .stylists
            .lock()
            .expect("stylists mutex poisoned")
            .get_mut(&stylist_id(id))
        {
            stylist.on_duty = on_duty;
        }
    }

    /// Store an appointment directly, bypassing the booking flow.
    pub(super) fn seed_appointment(
        &self,
        id: &str,
        customer_id: &str,
        stylist: &str,
        service: &str,
        day: NaiveDate,
        at: NaiveTime,
        status: AppointmentStatus,
    ) -> Appointment {
        let duration_minutes = self
            .services
            .lock()
            .expect("services mutex poisoned")
            .get(&service_id(service))
            .map(|service| service.duration_minutes)
            .unwrap_or(60);
        let appointment = Appointment {
            id: AppointmentId(id.to_string()),
            customer_id: customer(customer_id),
            stylist_id: Some(stylist_id(stylist)),
            service_id: service_id(service),
            date: day,
            time: at,
            duration_minutes,
            status,
            loyalty_points: 0,
            created_at: before_booking_day(),
        };
        self.appointments
            .lock()
            .expect("appointments mutex poisoned")
            .insert(appointment.id.clone(), appointment.clone());
        appointment
    }

    pub(super) fn add_rating(&self, customer_id: &str, stylist: &str, score: u8) {
        let mut ratings = self.ratings.lock().expect("ratings mutex poisoned");
        let appointment_id = AppointmentId(format!("rated-{}", ratings.len()));
        ratings.push(Rating {
            appointment_id,
            customer_id: customer(customer_id),
            stylist_id: stylist_id(stylist),
            score,
            comment: String::new(),
            created_at: before_booking_day(),
        });
    }

    pub(super) fn set_balance(&self, customer_id: &str, points: u32) {
        self.balances
            .lock()
            .expect("balances mutex poisoned")
            .insert(customer(customer_id), points);
    }

    pub(super) fn points(&self, customer_id: &str) -> u32 {
        self.balances
            .lock()
            .expect("balances mutex poisoned")
            .get(&customer(customer_id))
            .copied()
            .unwrap_or(0)
    }

    pub(super) fn appointment(&self, id: &AppointmentId) -> Appointment {
        self.appointments
            .lock()
            .expect("appointments mutex poisoned")
            .get(id)
            .cloned()
            .expect("appointment stored")
    }

    pub(super) fn all_appointments(&self) -> Vec<Appointment> {
        self.appointments
            .lock()
            .expect("appointments mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub(super) fn stylist_rating(&self, id: &str) -> f32 {
        self.stylists
            .lock()
            .expect("stylists mutex poisoned")
            .get(&stylist_id(id))
            .map(|stylist| stylist.rating)
            .expect("stylist present")
    }
}

impl StylistDirectory for MemoryRepository {
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
        let stylist = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        stylist.rating = rating;
        Ok(())
    }
}

impl AppointmentStore for MemoryRepository {
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

    fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let mut guard = self.appointments.lock().expect("appointments mutex poisoned");
        let slot = appointment.slot();
        let taken = guard.values().any(|existing| {
            existing.status.holds_slot() && slot.is_some() && existing.slot() == slot
        });
        if taken || guard.contains_key(&appointment.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(appointment.id.clone(), appointment.clone());
        Ok(appointment)
    }

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
        let mut guard = self.reminders.lock().expect("reminders mutex poisoned");
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

impl RatingHistory for MemoryRepository {
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

impl LoyaltyLedger for MemoryRepository {
    fn balance(&self, customer: &CustomerId) -> Result<u32, LedgerError> {
        let guard = self.balances.lock().expect("balances mutex poisoned");
        Ok(guard.get(customer).copied().unwrap_or(0))
    }

    fn grant_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        let mut guard = self.balances.lock().expect("balances mutex poisoned");
        let balance = guard.entry(customer.clone()).or_insert(0);
        *balance = balance.saturating_add(points);
        Ok(*balance)
    }

    fn revoke_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        let mut guard = self.balances.lock().expect("balances mutex poisoned");
        let balance = guard.entry(customer.clone()).or_insert(0);
        let revoked = points.min(*balance);
        *balance -= revoked;
        Ok(revoked)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<BookingNotification>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<BookingNotification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSink for MemoryNotifications {
    fn deliver(&self, notification: BookingNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifications;

impl NotificationSink for OfflineNotifications {
    fn deliver(&self, _notification: BookingNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

/// Store whose insert always loses the race for the slot.
#[derive(Clone)]
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
}

impl StylistDirectory for RacingRepository {
    fn roster(&self) -> Result<Vec<Stylist>, RepositoryError> {
        self.inner.roster()
    }

    fn stylist(&self, id: &StylistId) -> Result<Option<Stylist>, RepositoryError> {
        self.inner.stylist(id)
    }

    fn service(&self, id: &ServiceId) -> Result<Option<Service>, RepositoryError> {
        self.inner.service(id)
    }

    fn update_rating(&self, id: &StylistId, rating: f32) -> Result<(), RepositoryError> {
        self.inner.update_rating(id, rating)
    }
}

impl AppointmentStore for RacingRepository {
    fn has_conflict(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, RepositoryError> {
        self.inner.has_conflict(stylist, date, time)
    }

    fn active_on(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.active_on(stylist, date)
    }

    fn insert(&self, _appointment: Appointment) -> Result<Appointment, RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn transition(
        &self,
        id: &AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
        loyalty_points: u32,
    ) -> Result<Appointment, RepositoryError> {
        self.inner.transition(id, from, to, loyalty_points)
    }

    fn claim_reminder(&self, id: &AppointmentId, day: NaiveDate) -> Result<bool, RepositoryError> {
        self.inner.claim_reminder(id, day)
    }

    fn fetch(&self, id: &AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn for_customer(&self, customer: &CustomerId) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.for_customer(customer)
    }

    fn for_stylist(&self, stylist: &StylistId) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.for_stylist(stylist)
    }

    fn with_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.with_status(status)
    }
}

impl RatingHistory for RacingRepository {
    fn ratings_given_by(&self, customer: &CustomerId) -> Result<Vec<Rating>, RepositoryError> {
        self.inner.ratings_given_by(customer)
    }

    fn ratings_received_by(&self, stylist: &StylistId) -> Result<Vec<Rating>, RepositoryError> {
        self.inner.ratings_received_by(stylist)
    }

    fn rating_for(&self, appointment: &AppointmentId) -> Result<Option<Rating>, RepositoryError> {
        self.inner.rating_for(appointment)
    }

    fn insert_rating(&self, rating: Rating) -> Result<Rating, RepositoryError> {
        self.inner.insert_rating(rating)
    }
}

impl LoyaltyLedger for RacingRepository {
    fn balance(&self, customer: &CustomerId) -> Result<u32, LedgerError> {
        self.inner.balance(customer)
    }

    fn grant_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        self.inner.grant_points(customer, points)
    }

    fn revoke_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        self.inner.revoke_points(customer, points)
    }
}

/// Store with switchable outages, used to watch how writes and ledger updates interleave.
pub(super) struct FaultyRepository {
    pub(super) inner: MemoryRepository,
    pub(super) store_down: AtomicBool,
    pub(super) ledger_down: AtomicBool,
    /// Holds the first two fetches until both have read the appointment.
    fetch_gate: Option<Barrier>,
    gated_fetches: AtomicUsize,
    /// Cancelled behind the caller's back right after a status listing returns it.
    cancel_after_listing: Mutex<Option<AppointmentId>>,
}

impl FaultyRepository {
    pub(super) fn new(inner: MemoryRepository) -> Self {
        Self {
            inner,
            store_down: AtomicBool::new(false),
            ledger_down: AtomicBool::new(false),
            fetch_gate: None,
            gated_fetches: AtomicUsize::new(0),
            cancel_after_listing: Mutex::new(None),
        }
    }

    pub(super) fn with_fetch_gate(inner: MemoryRepository) -> Self {
        Self {
            fetch_gate: Some(Barrier::new(2)),
            ..Self::new(inner)
        }
    }

    pub(super) fn cancel_after_listing(&self, id: &str) {
        *self
            .cancel_after_listing
            .lock()
            .expect("listing hook mutex poisoned") = Some(AppointmentId(id.to_string()));
    }

    fn store_available(&self) -> Result<(), RepositoryError> {
        if self.store_down.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        Ok(())
    }

    fn ledger_available(&self) -> Result<(), LedgerError> {
        if self.ledger_down.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        Ok(())
    }
}

pub(super) fn faulty_service(
    faulty: FaultyRepository,
) -> (
    BookingService<FaultyRepository, MemoryNotifications>,
    Arc<FaultyRepository>,
) {
    let faulty = Arc::new(faulty);
    let service = BookingService::new(
        faulty.clone(),
        Arc::new(MemoryNotifications::default()),
        config(),
    );
    (service, faulty)
}

impl StylistDirectory for FaultyRepository {
    fn roster(&self) -> Result<Vec<Stylist>, RepositoryError> {
        self.inner.roster()
    }

    fn stylist(&self, id: &StylistId) -> Result<Option<Stylist>, RepositoryError> {
        self.inner.stylist(id)
    }

    fn service(&self, id: &ServiceId) -> Result<Option<Service>, RepositoryError> {
        self.inner.service(id)
    }

    fn update_rating(&self, id: &StylistId, rating: f32) -> Result<(), RepositoryError> {
        self.inner.update_rating(id, rating)
    }
}

impl AppointmentStore for FaultyRepository {
    fn has_conflict(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, RepositoryError> {
        self.inner.has_conflict(stylist, date, time)
    }

    fn active_on(
        &self,
        stylist: &StylistId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.active_on(stylist, date)
    }

    fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        self.store_available()?;
        self.inner.insert(appointment)
    }

    fn transition(
        &self,
        id: &AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
        loyalty_points: u32,
    ) -> Result<Appointment, RepositoryError> {
        self.store_available()?;
        self.inner.transition(id, from, to, loyalty_points)
    }

    fn claim_reminder(&self, id: &AppointmentId, day: NaiveDate) -> Result<bool, RepositoryError> {
        self.inner.claim_reminder(id, day)
    }

    fn fetch(&self, id: &AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        let appointment = self.inner.fetch(id)?;
        if let Some(gate) = &self.fetch_gate {
            if self.gated_fetches.fetch_add(1, Ordering::SeqCst) < 2 {
                gate.wait();
            }
        }
        Ok(appointment)
    }

    fn for_customer(&self, customer: &CustomerId) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.for_customer(customer)
    }

    fn for_stylist(&self, stylist: &StylistId) -> Result<Vec<Appointment>, RepositoryError> {
        self.inner.for_stylist(stylist)
    }

    fn with_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, RepositoryError> {
        let listed = self.inner.with_status(status)?;
        let mut hook = self
            .cancel_after_listing
            .lock()
            .expect("listing hook mutex poisoned");
        if let Some(id) = hook.as_ref() {
            if let Some(target) = listed.iter().find(|appointment| &appointment.id == id) {
                self.inner
                    .transition(id, target.status, AppointmentStatus::Cancelled, 0)?;
                *hook = None;
            }
        }
        Ok(listed)
    }
}

impl RatingHistory for FaultyRepository {
    fn ratings_given_by(&self, customer: &CustomerId) -> Result<Vec<Rating>, RepositoryError> {
        self.inner.ratings_given_by(customer)
    }

    fn ratings_received_by(&self, stylist: &StylistId) -> Result<Vec<Rating>, RepositoryError> {
        self.inner.ratings_received_by(stylist)
    }

    fn rating_for(&self, appointment: &AppointmentId) -> Result<Option<Rating>, RepositoryError> {
        self.inner.rating_for(appointment)
    }

    fn insert_rating(&self, rating: Rating) -> Result<Rating, RepositoryError> {
        self.inner.insert_rating(rating)
    }
}

impl LoyaltyLedger for FaultyRepository {
    fn balance(&self, customer: &CustomerId) -> Result<u32, LedgerError> {
        self.inner.balance(customer)
    }

    fn grant_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        self.ledger_available()?;
        self.inner.grant_points(customer, points)
    }

    fn revoke_points(&self, customer: &CustomerId, points: u32) -> Result<u32, LedgerError> {
        self.ledger_available()?;
        self.inner.revoke_points(customer, points)
    }
}

pub(super) fn booking_router_with_service(
    service: BookingService<MemoryRepository, MemoryNotifications>,
) -> axum::Router {
    booking_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
