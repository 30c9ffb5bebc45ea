//! Capability check shared by every manager. Handlers never compare role
//! strings themselves; they ask `authorize` whether an actor may perform a
//! capability against a target record.

use super::domain::{Actor, Booking, Feedback, Payment, Property, Role};
use super::error::MarketplaceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateListing,
    EditListing,
    DeleteListing,
    ReviewListing,
    ReconcileListing,
    RequestBooking,
    DecideBooking,
    CancelBooking,
    ScheduleVisit,
    ViewBooking,
    MakePayment,
    ProcessPayment,
    ViewPaymentStats,
    WriteFeedback,
    ModifyFeedback,
    ModerateFeedback,
    ReviewReport,
}

/// Record the capability is exercised against.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Platform,
    Listing(&'a Property),
    Booking(&'a Booking),
    Payment(&'a Payment),
    Feedback(&'a Feedback),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(&'static str),
}

impl Access {
    fn when(allowed: bool, reason: &'static str) -> Self {
        if allowed {
            Access::Allow
        } else {
            Access::Deny(reason)
        }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Access::Allow)
    }

    pub fn require(self) -> Result<(), MarketplaceError> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny(reason) => Err(MarketplaceError::forbidden(reason)),
        }
    }
}

pub fn authorize(actor: &Actor, capability: Capability, target: Target<'_>) -> Access {
    use Capability::*;

    let admin = actor.is_admin();
    match (capability, target) {
        (CreateListing, Target::Platform) => Access::when(
            matches!(actor.role, Role::Owner | Role::Admin),
            "only owners can list properties",
        ),
        (EditListing, Target::Listing(property)) => Access::when(
            actor.is(&property.owner),
            "only the listing owner can edit it",
        ),
        (DeleteListing | ReconcileListing, Target::Listing(property)) => Access::when(
            admin || actor.is(&property.owner),
            "not authorized for this listing",
        ),
        (ReviewListing | ModerateFeedback | ReviewReport, _) => {
            Access::when(admin, "admin role required")
        }
        (RequestBooking, Target::Listing(property)) => Access::when(
            actor.role == Role::Tenant && !actor.is(&property.owner),
            "only tenants can request bookings",
        ),
        (DecideBooking, Target::Booking(booking)) => Access::when(
            admin || actor.is(&booking.owner),
            "only the listing owner or an admin can decide this booking",
        ),
        (CancelBooking, Target::Booking(booking)) => Access::when(
            admin || actor.is(&booking.tenant),
            "only the requesting tenant or an admin can cancel this booking",
        ),
        (ScheduleVisit | ViewBooking, Target::Booking(booking)) => Access::when(
            admin || actor.is(&booking.tenant) || actor.is(&booking.owner),
            "not a party to this booking",
        ),
        (MakePayment, Target::Platform) => {
            Access::when(actor.role == Role::Tenant, "only tenants can make payments")
        }
        (MakePayment, Target::Booking(booking)) => Access::when(
            actor.role == Role::Tenant && actor.is(&booking.tenant),
            "not authorized to pay for this booking",
        ),
        (ProcessPayment, Target::Payment(payment)) => Access::when(
            actor.is(&payment.tenant),
            "not authorized to process this payment",
        ),
        (ViewPaymentStats, Target::Platform) => Access::when(
            matches!(actor.role, Role::Owner | Role::Admin),
            "owner or admin role required",
        ),
        (WriteFeedback, Target::Platform) => {
            Access::when(actor.role == Role::Tenant, "only tenants can leave feedback")
        }
        (WriteFeedback, Target::Booking(booking)) => Access::when(
            actor.is(&booking.tenant),
            "invalid booking or not authorized",
        ),
        (ModifyFeedback, Target::Feedback(feedback)) => Access::when(
            admin || actor.is(&feedback.tenant),
            "only the author or an admin can change this feedback",
        ),
        _ => Access::Deny("capability does not apply to this target"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::domain::{BookingId, BookingStatus, PropertyId, UserId};
    use chrono::{NaiveDate, Utc};

    fn booking() -> Booking {
        Booking {
            id: BookingId::from("bkg-1"),
            property: PropertyId::from("prop-1"),
            tenant: UserId::from("tenant-1"),
            owner: UserId::from("owner-1"),
            status: BookingStatus::Pending,
            move_in_date: NaiveDate::from_ymd_opt(2025, 11, 1).expect("valid"),
            lease_duration_months: 11,
            monthly_rent: 45_000,
            security_deposit: 90_000,
            total_amount: 135_000,
            message: None,
            owner_response: None,
            visit_scheduled: None,
            requested_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn booking_decisions_belong_to_owner_or_admin() {
        let booking = booking();
        let target = Target::Booking(&booking);

        assert!(authorize(&Actor::new("owner-1", Role::Owner), Capability::DecideBooking, target)
            .is_allowed());
        assert!(authorize(&Actor::new("admin", Role::Admin), Capability::DecideBooking, target)
            .is_allowed());
        assert!(
            !authorize(&Actor::new("tenant-1", Role::Tenant), Capability::DecideBooking, target)
                .is_allowed()
        );
        assert!(
            !authorize(&Actor::new("owner-2", Role::Owner), Capability::DecideBooking, target)
                .is_allowed()
        );
    }

    #[test]
    fn cancellation_belongs_to_tenant_or_admin() {
        let booking = booking();
        let target = Target::Booking(&booking);

        assert!(authorize(&Actor::new("tenant-1", Role::Tenant), Capability::CancelBooking, target)
            .is_allowed());
        match authorize(&Actor::new("owner-1", Role::Owner), Capability::CancelBooking, target) {
            Access::Deny(reason) => assert!(reason.contains("tenant")),
            Access::Allow => panic!("owner must not cancel on the tenant's behalf"),
        }
    }

    #[test]
    fn mismatched_targets_are_denied() {
        let actor = Actor::new("admin", Role::Admin);
        let err = authorize(&actor, Capability::ProcessPayment, Target::Platform)
            .require()
            .expect_err("payment processing needs a payment target");
        assert_eq!(err.code(), "FORBIDDEN");
    }
}
