use super::common::*;

use crate::scheduling::domain::AppointmentStatus;
use crate::scheduling::{AvailabilityIndex, BusinessHours, ConflictRule, SlotSearch};

fn book_day(repository: &MemoryRepository, stylist: &str, day: chrono::NaiveDate) {
    let hours = BusinessHours::default();
    let mut cursor = hours.opens_at;
    let mut n = 0;
    while hours.is_open_at(cursor) {
        repository.seed_appointment(
            &format!("{stylist}-{day}-{n}"),
            "busy",
            stylist,
            "cut",
            day,
            cursor,
            AppointmentStatus::Confirmed,
        );
        cursor += hours.increment();
        n += 1;
    }
}

#[test]
fn candidates_wrap_to_the_next_opening() {
    let hours = BusinessHours::default();
    let from = booking_day();

    assert_eq!(
        hours.next_candidate(from, at(from, 10, 0)),
        Some(at(from, 10, 30))
    );
    assert_eq!(
        hours.next_candidate(from, at(from, 17, 30)),
        Some(at(date(2024, 6, 2), 9, 0))
    );
    assert_eq!(
        hours.next_candidate(from, at(from, 6, 0)),
        Some(at(from, 9, 0))
    );
    assert_eq!(
        hours.next_candidate(from, at(from, 23, 45)),
        Some(at(date(2024, 6, 2), 9, 0))
    );
}

#[test]
fn candidates_stop_after_the_horizon() {
    let hours = BusinessHours::default();
    let from = booking_day();
    let last_day = hours.last_day(from);

    assert_eq!(last_day, date(2024, 6, 14));
    assert_eq!(hours.next_candidate(from, at(last_day, 17, 30)), None);
}

#[test]
fn search_skips_the_requested_instant() {
    let repository = salon();
    repository.add_stylist(stylist("s1", 4.0, &["cut"]));

    let index = AvailabilityIndex::new(&repository, &repository, ConflictRule::ExactStart);
    let search = SlotSearch::new(&index, BusinessHours::default());
    let slot = search
        .next_available_slot(&service_id("cut"), booking_day(), time(10, 0), None)
        .expect("search runs")
        .expect("slot found");

    assert_eq!((slot.date, slot.time), (booking_day(), time(10, 30)));
}

#[test]
fn search_moves_to_the_next_day_when_today_is_full() {
    let repository = salon();
    repository.add_stylist(stylist("s1", 4.0, &["cut"]));
    book_day(&repository, "s1", booking_day());

    let index = AvailabilityIndex::new(&repository, &repository, ConflictRule::ExactStart);
    let search = SlotSearch::new(&index, BusinessHours::default());
    let slot = search
        .next_available_slot(&service_id("cut"), booking_day(), time(9, 0), None)
        .expect("search runs")
        .expect("slot found");

    assert_eq!((slot.date, slot.time), (date(2024, 6, 2), time(9, 0)));
    assert_eq!(slot.stylist_ids(), vec![stylist_id("s1")]);
}

#[test]
fn fully_booked_horizon_yields_nothing() {
    let repository = salon();
    repository.add_stylist(stylist("s1", 4.0, &["cut"]));
    let hours = BusinessHours::default();
    let mut day = booking_day();
    while day <= hours.last_day(booking_day()) {
        book_day(&repository, "s1", day);
        day = day.succ_opt().expect("next day");
    }

    let index = AvailabilityIndex::new(&repository, &repository, ConflictRule::ExactStart);
    let search = SlotSearch::new(&index, hours);
    let slot = search
        .next_available_slot(&service_id("cut"), booking_day(), time(9, 0), None)
        .expect("search runs");

    assert!(slot.is_none());
}

#[test]
fn custom_hours_shorten_the_scan() {
    let repository = salon();
    repository.add_stylist(stylist("s1", 4.0, &["cut"]));
    let hours = BusinessHours {
        opens_at: time(12, 0),
        closes_at: time(13, 0),
        increment_minutes: 15,
        horizon_days: 1,
    };

    let index = AvailabilityIndex::new(&repository, &repository, ConflictRule::ExactStart);
    let search = SlotSearch::new(&index, hours);
    let early = search
        .next_available_slot(&service_id("cut"), booking_day(), time(8, 0), None)
        .expect("search runs")
        .expect("slot found");
    let late = search
        .next_available_slot(&service_id("cut"), booking_day(), time(12, 45), None)
        .expect("search runs");

    assert_eq!(early.time, time(12, 0));
    assert!(late.is_none());
}
