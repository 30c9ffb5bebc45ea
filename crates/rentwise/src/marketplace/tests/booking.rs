use super::common::*;

use std::sync::Arc;

use chrono::NaiveDate;

use crate::marketplace::booking::{BookingLifecycleManager, StatusChange, VisitRequest};
use crate::marketplace::domain::{
    Booking, BookingStatus, Property, PropertyId, PropertyStatus, Role, VisitStatus,
};
use crate::marketplace::store::{Collection, EntityStore};

fn decide(status: &str) -> StatusChange {
    StatusChange {
        status: status.to_string(),
        owner_response: None,
    }
}

fn assert_available_listings_have_no_approved_booking<S: EntityStore>(store: &S) {
    let open = store
        .find_all(&|property: &Property| property.is_available)
        .expect("listings");
    for property in open {
        let approved = store
            .find_all(&|booking: &Booking| {
                booking.property == property.id && booking.status == BookingStatus::Approved
            })
            .expect("bookings");
        assert!(
            approved.is_empty(),
            "listing {} is available while approved bookings exist",
            property.id
        );
    }
}

#[test]
fn booking_scenario_keeps_listing_and_bookings_consistent() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let property = h.approved_listing(&h.owner, 45_000, Some(90_000));

    let booking = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("booking created");
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.total_amount, 135_000);
    assert_eq!(booking.owner, h.owner.id);

    let approved = bookings
        .transition(
            &h.owner,
            &booking.id,
            StatusChange {
                status: "Approved".to_string(),
                owner_response: Some("Keys at the society office".to_string()),
            },
        )
        .expect("approved");
    assert_eq!(approved.status, BookingStatus::Approved);
    assert_eq!(
        approved.owner_response.map(|response| response.message),
        Some("Keys at the society office".to_string())
    );

    let listing = h.property(&property);
    assert!(!listing.is_available);
    assert_eq!(listing.status, PropertyStatus::Rented);
    assert_eq!(listing.rented_under.as_ref(), Some(&booking.id));

    let err = bookings
        .create(&h.tenant, booking_request(&property))
        .expect_err("second booking must fail");
    assert_eq!(err.code(), "CONFLICT");

    let second_tenant = seed_user(h.store.as_ref(), "tenant-2", Role::Tenant);
    let other = h.approved_listing(&h.owner, 30_000, None);
    let pending = bookings
        .create(&second_tenant, booking_request(&other))
        .expect("booking on second listing");
    assert_eq!(pending.total_amount, 90_000);
    bookings
        .transition(&h.owner, &pending.id, decide("Rejected"))
        .expect("rejected");

    let other = h.property(&other);
    assert!(other.is_available);
    assert_eq!(other.status, PropertyStatus::Approved);
    assert_available_listings_have_no_approved_booking(h.store.as_ref());
}

#[test]
fn duplicate_pending_request_is_rejected_by_the_store_index() {
    let h = harness();
    let property = h.approved_listing(&h.owner, 20_000, None);

    h.marketplace
        .bookings
        .create(&h.tenant, booking_request(&property))
        .expect("first request");
    let err = h
        .marketplace
        .bookings
        .create(&h.tenant, booking_request(&property))
        .expect_err("duplicate");

    assert_eq!(err.code(), "CONFLICT");
    assert!(err.to_string().contains("already have a booking"));
    assert_eq!(h.store.count(Collection::Bookings), 1);
}

#[test]
fn cancelled_request_frees_the_slot_for_a_new_one() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let property = h.approved_listing(&h.owner, 20_000, None);

    let first = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("first request");
    let cancelled = bookings.cancel(&h.tenant, &first.id).expect("cancelled");
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let listing = h.property(&property);
    assert!(listing.is_available);
    assert_eq!(listing.status, PropertyStatus::Approved);

    bookings
        .create(&h.tenant, booking_request(&property))
        .expect("new request after cancellation");
}

#[test]
fn cancelling_a_non_pending_booking_is_invalid_state() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");
    bookings
        .transition(&h.owner, &booking.id, decide("Approved"))
        .expect("approved");

    let err = bookings
        .cancel(&h.tenant, &booking.id)
        .expect_err("approved bookings are not self-service");
    assert_eq!(err.code(), "INVALID_STATE");

    let stored: Booking = h.store.find_by_id(booking.id.as_str()).expect("booking");
    assert_eq!(stored.status, BookingStatus::Approved);
}

#[test]
fn only_the_tenant_or_an_admin_may_cancel() {
    let h = harness();
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = h
        .marketplace
        .bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");

    let err = h
        .marketplace
        .bookings
        .cancel(&h.owner, &booking.id)
        .expect_err("owner cannot cancel");
    assert_eq!(err.code(), "FORBIDDEN");

    h.marketplace
        .bookings
        .cancel(&h.admin, &booking.id)
        .expect("admin may cancel");
}

#[test]
fn leaving_approved_reopens_the_listing() {
    for exit in ["Cancelled", "Rejected", "Completed"] {
        let h = harness();
        let bookings = &h.marketplace.bookings;
        let property = h.approved_listing(&h.owner, 20_000, None);
        let booking = bookings
            .create(&h.tenant, booking_request(&property))
            .expect("request");
        bookings
            .transition(&h.owner, &booking.id, decide("Approved"))
            .expect("approved");

        let updated = bookings
            .transition(&h.admin, &booking.id, decide(exit))
            .unwrap_or_else(|err| panic!("{exit}: {err}"));
        assert_eq!(updated.status.label(), exit);

        let listing = h.property(&property);
        assert!(listing.is_available, "{exit} should reopen the listing");
        assert_eq!(listing.status, PropertyStatus::Approved);
        assert_eq!(listing.rented_under, None);
    }
}

#[test]
fn rejecting_a_competing_request_leaves_a_rented_listing_alone() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let second_tenant = seed_user(h.store.as_ref(), "tenant-2", Role::Tenant);
    let property = h.approved_listing(&h.owner, 20_000, None);

    let winner = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("winner");
    let loser = bookings
        .create(&second_tenant, booking_request(&property))
        .expect("loser");
    bookings
        .transition(&h.owner, &winner.id, decide("Approved"))
        .expect("approved");
    bookings
        .transition(&h.owner, &loser.id, decide("Rejected"))
        .expect("rejected");

    let listing = h.property(&property);
    assert_eq!(listing.status, PropertyStatus::Rented);
    assert!(!listing.is_available);
    assert_eq!(listing.rented_under.as_ref(), Some(&winner.id));
}

#[test]
fn second_approval_on_a_rented_listing_conflicts() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let second_tenant = seed_user(h.store.as_ref(), "tenant-2", Role::Tenant);
    let property = h.approved_listing(&h.owner, 20_000, None);

    let first = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("first");
    let second = bookings
        .create(&second_tenant, booking_request(&property))
        .expect("second");
    bookings
        .transition(&h.owner, &first.id, decide("Approved"))
        .expect("first approved");

    let err = bookings
        .transition(&h.owner, &second.id, decide("Approved"))
        .expect_err("listing already rented");
    assert_eq!(err.code(), "CONFLICT");

    let stored: Booking = h.store.find_by_id(second.id.as_str()).expect("booking");
    assert_eq!(stored.status, BookingStatus::Pending);
    assert_eq!(h.property(&property).rented_under.as_ref(), Some(&first.id));
}

#[test]
fn concurrent_requests_from_one_tenant_yield_a_single_booking() {
    let h = harness();
    let property = h.approved_listing(&h.owner, 20_000, None);

    let successes = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                scope.spawn(|| {
                    h.marketplace
                        .bookings
                        .create(&h.tenant, booking_request(&property))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .filter(|result| result.is_ok())
            .count()
    });

    assert_eq!(successes, 1);
    assert_eq!(h.store.count(Collection::Bookings), 1);
}

#[test]
fn concurrent_approvals_let_exactly_one_booking_take_the_listing() {
    let h = harness();
    let property = h.approved_listing(&h.owner, 20_000, None);
    let requests: Vec<Booking> = (0..8)
        .map(|index| {
            let tenant = seed_user(h.store.as_ref(), &format!("tenant-c{index}"), Role::Tenant);
            h.marketplace
                .bookings
                .create(&tenant, booking_request(&property))
                .expect("booking")
        })
        .collect();

    let bookings = &h.marketplace.bookings;
    let owner = &h.owner;
    let approvals = std::thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .map(|booking| {
                scope.spawn(move || bookings.transition(owner, &booking.id, decide("Approved")))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .filter(|result| result.is_ok())
            .count()
    });
    assert_eq!(approvals, 1);

    let approved = h
        .store
        .find_all(&|booking: &Booking| booking.status == BookingStatus::Approved)
        .expect("bookings");
    assert_eq!(approved.len(), 1);
    let listing = h.property(&property);
    assert_eq!(listing.status, PropertyStatus::Rented);
    assert!(!listing.is_available);
    assert_eq!(listing.rented_under.as_ref(), Some(&approved[0].id));
    assert_available_listings_have_no_approved_booking(h.store.as_ref());
}

#[test]
fn oversized_amounts_are_rejected_instead_of_overflowing() {
    let h = harness();
    let property = h.approved_listing(&h.owner, 20_000, None);
    h.store
        .update::<Property>(property.id.as_str(), &mut |stored| {
            stored.rent = u64::MAX / 4;
            stored.security_deposit = u64::MAX - 1;
        })
        .expect("legacy amounts");

    let err = h
        .marketplace
        .bookings
        .create(&h.tenant, booking_request(&property))
        .expect_err("total overflows");
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(h.store.count(Collection::Bookings), 0);
}

#[test]
fn failed_listing_write_reverts_the_approval_and_can_be_retried() {
    let h = harness_with(FaultyStore::default(), FixedGateway::approving());
    let bookings = &h.marketplace.bookings;
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");

    h.store.fail_updates(Some(Collection::Properties));
    let err = bookings
        .transition(&h.owner, &booking.id, decide("Approved"))
        .expect_err("listing write fails");
    assert_eq!(err.code(), "UNAVAILABLE");

    let stored: Booking = h.store.find_by_id(booking.id.as_str()).expect("booking");
    assert_eq!(stored.status, BookingStatus::Pending);
    assert!(h.property(&property).is_available);
    assert_available_listings_have_no_approved_booking(h.store.as_ref());

    h.store.fail_updates(None);
    bookings
        .transition(&h.owner, &booking.id, decide("Approved"))
        .expect("retry succeeds");
    assert_eq!(h.property(&property).status, PropertyStatus::Rented);
}

#[test]
fn reconcile_replays_an_interrupted_listing_write() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");

    // Booking committed, listing write never happened.
    h.store
        .update::<Booking>(booking.id.as_str(), &mut |stored| {
            stored.status = BookingStatus::Approved;
        })
        .expect("booking write");
    assert!(h.property(&property).is_available);

    let repaired = bookings
        .reconcile_property(&h.owner, &property.id)
        .expect("reconciled");
    assert_eq!(repaired.status, PropertyStatus::Rented);
    assert!(!repaired.is_available);
    assert_eq!(repaired.rented_under.as_ref(), Some(&booking.id));

    let again = bookings
        .reconcile_property(&h.admin, &property.id)
        .expect("reconcile is repeatable");
    assert_eq!(again.rented_under, repaired.rented_under);
    assert_eq!(again.status, PropertyStatus::Rented);
    assert_available_listings_have_no_approved_booking(h.store.as_ref());
}

#[test]
fn reconcile_reopens_a_listing_whose_holder_left() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");
    bookings
        .transition(&h.owner, &booking.id, decide("Approved"))
        .expect("approved");

    h.store
        .update::<Booking>(booking.id.as_str(), &mut |stored| {
            stored.status = BookingStatus::Completed;
        })
        .expect("booking write");

    let repaired = bookings
        .reconcile_property(&h.owner, &property.id)
        .expect("reconciled");
    assert!(repaired.is_available);
    assert_eq!(repaired.status, PropertyStatus::Approved);
    assert_eq!(repaired.rented_under, None);
}

#[test]
fn decisions_require_the_listing_owner_or_an_admin() {
    let h = harness();
    let stranger = seed_user(h.store.as_ref(), "owner-2", Role::Owner);
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = h
        .marketplace
        .bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");

    for actor in [&h.tenant, &stranger] {
        let err = h
            .marketplace
            .bookings
            .transition(actor, &booking.id, decide("Approved"))
            .expect_err("not permitted");
        assert_eq!(err.code(), "FORBIDDEN");
    }
    assert!(h.property(&property).is_available);
}

#[test]
fn unknown_and_illegal_transitions_are_distinguished() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");

    let err = bookings
        .transition(&h.owner, &booking.id, decide("Archived"))
        .expect_err("unknown status");
    assert_eq!(err.code(), "INVALID_ARGUMENT");

    let err = bookings
        .transition(&h.owner, &booking.id, decide("Completed"))
        .expect_err("pending cannot complete");
    assert_eq!(err.code(), "INVALID_STATE");

    bookings
        .transition(&h.owner, &booking.id, decide("Rejected"))
        .expect("rejected");
    let err = bookings
        .transition(&h.owner, &booking.id, decide("Approved"))
        .expect_err("terminal");
    assert_eq!(err.code(), "INVALID_STATE");
}

#[test]
fn create_checks_listing_and_request_fields() {
    let h = harness();
    let bookings = &h.marketplace.bookings;

    let mut missing = booking_request(&h.approved_listing(&h.owner, 20_000, None));
    missing.property_id = PropertyId::from("prop-missing");
    assert_eq!(
        bookings.create(&h.tenant, missing).expect_err("missing").code(),
        "NOT_FOUND"
    );

    let unreviewed = h
        .marketplace
        .listings
        .create_listing(&h.owner, draft("Kothrud 1BHK", 15_000, None))
        .expect("listing");
    assert_eq!(
        bookings
            .create(&h.tenant, booking_request(&unreviewed))
            .expect_err("not approved")
            .code(),
        "CONFLICT"
    );

    let property = h.approved_listing(&h.owner, 20_000, None);
    let mut zero_lease = booking_request(&property);
    zero_lease.lease_duration_months = 0;
    assert_eq!(
        bookings
            .create(&h.tenant, zero_lease)
            .expect_err("lease")
            .code(),
        "VALIDATION_ERROR"
    );

    let mut chatty = booking_request(&property);
    chatty.message = Some("x".repeat(501));
    assert_eq!(
        bookings.create(&h.tenant, chatty).expect_err("message").code(),
        "VALIDATION_ERROR"
    );

    assert_eq!(
        bookings
            .create(&h.owner, booking_request(&property))
            .expect_err("owners do not book")
            .code(),
        "FORBIDDEN"
    );
}

#[test]
fn visits_can_be_scheduled_in_any_status_by_the_parties() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let outsider = seed_user(h.store.as_ref(), "tenant-9", Role::Tenant);
    let property = h.approved_listing(&h.owner, 20_000, None);
    let booking = bookings
        .create(&h.tenant, booking_request(&property))
        .expect("request");
    bookings.cancel(&h.tenant, &booking.id).expect("cancelled");

    let visit = VisitRequest {
        visit_date: NaiveDate::from_ymd_opt(2025, 10, 20).expect("valid date"),
        visit_time: "17:30".to_string(),
        visit_status: None,
    };
    let updated = bookings
        .schedule_visit(&h.owner, &booking.id, visit.clone())
        .expect("scheduled");
    let schedule = updated.visit_scheduled.expect("visit attached");
    assert!(schedule.is_scheduled);
    assert_eq!(schedule.visit_status, VisitStatus::Scheduled);
    assert_eq!(updated.status, BookingStatus::Cancelled);

    let err = bookings
        .schedule_visit(&outsider, &booking.id, visit.clone())
        .expect_err("outsider");
    assert_eq!(err.code(), "FORBIDDEN");

    let blank = VisitRequest {
        visit_time: "  ".to_string(),
        ..visit
    };
    assert_eq!(
        bookings
            .schedule_visit(&h.tenant, &booking.id, blank)
            .expect_err("blank time")
            .code(),
        "VALIDATION_ERROR"
    );
}

#[test]
fn booking_lists_are_scoped_by_role() {
    let h = harness();
    let bookings = &h.marketplace.bookings;
    let second_owner = seed_user(h.store.as_ref(), "owner-2", Role::Owner);
    let second_tenant = seed_user(h.store.as_ref(), "tenant-2", Role::Tenant);
    let mine = h.approved_listing(&h.owner, 20_000, None);
    let theirs = h.approved_listing(&second_owner, 25_000, None);

    bookings
        .create(&h.tenant, booking_request(&mine))
        .expect("tenant-1 on mine");
    bookings
        .create(&second_tenant, booking_request(&theirs))
        .expect("tenant-2 on theirs");

    assert_eq!(bookings.bookings_for(&h.tenant).expect("tenant").len(), 1);
    assert_eq!(bookings.bookings_for(&h.owner).expect("owner").len(), 1);
    assert_eq!(bookings.bookings_for(&h.admin).expect("admin").len(), 2);

    let foreign = &bookings.bookings_for(&second_tenant).expect("tenant-2")[0];
    assert_eq!(
        bookings
            .get(&h.tenant, &foreign.id)
            .expect_err("not a party")
            .code(),
        "FORBIDDEN"
    );
    bookings.get(&second_owner, &foreign.id).expect("owner party");
}

#[test]
fn unreachable_store_surfaces_as_unavailable() {
    let h = harness();
    let property = h.approved_listing(&h.owner, 20_000, None);
    let down = BookingLifecycleManager::new(Arc::new(UnavailableStore));

    let err = down
        .create(&h.tenant, booking_request(&property))
        .expect_err("store down");
    assert_eq!(err.code(), "UNAVAILABLE");
}
