//! Booking lifecycle and its side effects on listing availability.
//!
//! A status decision touches two documents without a transaction. The booking is
//! written first, then the listing. The listing write is conditional and
//! idempotent: it records which booking holds the listing (`rented_under`), so
//! re-running it for the same booking is a no-op while a competing booking
//! observes a conflict. `reconcile_property` replays the listing write from the
//! committed booking states after an interrupted decision.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::access::{authorize, Capability, Target};
use super::domain::{
    Actor, Booking, BookingId, BookingStatus, OwnerResponse, Property, PropertyId,
    PropertyStatus, Role, VisitSchedule, VisitStatus,
};
use super::error::MarketplaceError;
use super::listing::deposit_for;
use super::store::{EntityStore, FindOptions, StoreError};

const MESSAGE_MAX: usize = 500;

/// Tenant booking request.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub property_id: PropertyId,
    pub move_in_date: NaiveDate,
    pub lease_duration_months: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// Owner/admin status decision. `status` is kept as free text so unknown values
/// surface as `InvalidArgument` rather than a decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: String,
    #[serde(default)]
    pub owner_response: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisitRequest {
    pub visit_date: NaiveDate,
    pub visit_time: String,
    #[serde(default)]
    pub visit_status: Option<VisitStatus>,
}

/// Owns the Booking state machine and the listing writes it implies.
pub struct BookingLifecycleManager<S> {
    store: Arc<S>,
}

impl<S> BookingLifecycleManager<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        actor: &Actor,
        request: BookingRequest,
    ) -> Result<Booking, MarketplaceError> {
        if request.lease_duration_months < 1 {
            return Err(MarketplaceError::validation(
                "lease duration must be at least one month",
            ));
        }
        if let Some(message) = &request.message {
            if message.chars().count() > MESSAGE_MAX {
                return Err(MarketplaceError::validation(format!(
                    "message cannot exceed {MESSAGE_MAX} characters"
                )));
            }
        }

        let property: Property = self.store.find_by_id(request.property_id.as_str())?;
        authorize(actor, Capability::RequestBooking, Target::Listing(&property)).require()?;
        if !property.is_open_for_booking() {
            return Err(MarketplaceError::Conflict(
                "property is not available for booking".to_string(),
            ));
        }

        let monthly_rent = property.rent;
        let security_deposit = deposit_for(
            monthly_rent,
            (property.security_deposit > 0).then_some(property.security_deposit),
        )?;
        let now = Utc::now();
        let booking = Booking {
            id: BookingId::generate(),
            property: property.id.clone(),
            tenant: actor.id.clone(),
            owner: property.owner.clone(),
            status: BookingStatus::Pending,
            move_in_date: request.move_in_date,
            lease_duration_months: request.lease_duration_months,
            monthly_rent,
            security_deposit,
            total_amount: monthly_rent.saturating_add(security_deposit),
            message: request.message,
            owner_response: None,
            visit_scheduled: None,
            requested_at: now,
            updated_at: now,
        };

        // The store's partial unique index on (tenant, property) settles racing requests.
        let stored = self.store.insert(booking).map_err(|err| match err {
            StoreError::Conflict(_) => MarketplaceError::Conflict(
                "you already have a booking request for this property".to_string(),
            ),
            other => other.into(),
        })?;

        info!(booking = %stored.id, property = %stored.property, tenant = %stored.tenant, "booking requested");
        Ok(stored)
    }

    /// Owner/admin status decision: Pending → Approved | Rejected and
    /// Approved → Rejected | Cancelled | Completed. Leaving Approved reopens the
    /// listing.
    pub fn transition(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
        change: StatusChange,
    ) -> Result<Booking, MarketplaceError> {
        let target: BookingStatus = change.status.parse()?;
        let booking: Booking = self.store.find_by_id(booking_id.as_str())?;
        authorize(actor, Capability::DecideBooking, Target::Booking(&booking)).require()?;

        let current = booking.status;
        if !transition_allowed(current, target) {
            return Err(MarketplaceError::invalid_state(format!(
                "cannot move booking from {current} to {target}"
            )));
        }

        if target == BookingStatus::Approved {
            let property: Property = self.store.find_by_id(booking.property.as_str())?;
            if !property.is_open_for_booking()
                && property.rented_under.as_ref() != Some(&booking.id)
            {
                return Err(MarketplaceError::Conflict(
                    "property is no longer available".to_string(),
                ));
            }
        }

        let response = change.owner_response.map(|message| OwnerResponse {
            message,
            responded_at: Utc::now(),
        });
        let updated = self
            .store
            .update_if::<Booking>(
                booking_id.as_str(),
                &|stored| stored.status == current,
                &mut |stored| {
                    stored.status = target;
                    if let Some(response) = &response {
                        stored.owner_response = Some(response.clone());
                    }
                    stored.updated_at = Utc::now();
                },
            )
            .map_err(|err| match err {
                StoreError::PredicateFailed(_, _) => MarketplaceError::Conflict(
                    "booking was updated concurrently".to_string(),
                ),
                other => other.into(),
            })?;

        match target {
            BookingStatus::Approved => {
                if let Err(err) = self.occupy_listing(&updated) {
                    self.revert_approval(&updated);
                    return Err(err);
                }
            }
            _ => {
                self.release_listing(&updated)?;
            }
        }

        info!(booking = %updated.id, from = %current, to = %target, "booking status changed");
        Ok(updated)
    }

    /// Tenant self-service cancellation of a still-pending request. A pending
    /// booking never took the listing off the market, so the listing is untouched.
    pub fn cancel(&self, actor: &Actor, booking_id: &BookingId) -> Result<Booking, MarketplaceError> {
        let booking: Booking = self.store.find_by_id(booking_id.as_str())?;
        authorize(actor, Capability::CancelBooking, Target::Booking(&booking)).require()?;
        if booking.status != BookingStatus::Pending {
            return Err(MarketplaceError::invalid_state(
                "can only cancel pending bookings",
            ));
        }

        let cancelled = self
            .store
            .update_if::<Booking>(
                booking_id.as_str(),
                &|stored| stored.status == BookingStatus::Pending,
                &mut |stored| {
                    stored.status = BookingStatus::Cancelled;
                    stored.updated_at = Utc::now();
                },
            )
            .map_err(|err| match err {
                StoreError::PredicateFailed(_, _) => {
                    MarketplaceError::invalid_state("can only cancel pending bookings")
                }
                other => other.into(),
            })?;

        info!(booking = %cancelled.id, "booking cancelled by tenant");
        Ok(cancelled)
    }

    /// Attaches or overwrites the visit annotation; allowed in any status.
    pub fn schedule_visit(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
        visit: VisitRequest,
    ) -> Result<Booking, MarketplaceError> {
        if visit.visit_time.trim().is_empty() {
            return Err(MarketplaceError::validation("visit time is required"));
        }
        let booking: Booking = self.store.find_by_id(booking_id.as_str())?;
        authorize(actor, Capability::ScheduleVisit, Target::Booking(&booking)).require()?;

        let schedule = VisitSchedule {
            is_scheduled: true,
            visit_date: visit.visit_date,
            visit_time: visit.visit_time.trim().to_string(),
            visit_status: visit.visit_status.unwrap_or(VisitStatus::Scheduled),
        };
        let updated = self.store.update::<Booking>(booking_id.as_str(), &mut |stored| {
            stored.visit_scheduled = Some(schedule.clone());
            stored.updated_at = Utc::now();
        })?;
        Ok(updated)
    }

    pub fn get(&self, actor: &Actor, booking_id: &BookingId) -> Result<Booking, MarketplaceError> {
        let booking: Booking = self.store.find_by_id(booking_id.as_str())?;
        authorize(actor, Capability::ViewBooking, Target::Booking(&booking)).require()?;
        Ok(booking)
    }

    /// Tenants see their requests, owners the requests on their listings, admins everything.
    pub fn bookings_for(&self, actor: &Actor) -> Result<Vec<Booking>, MarketplaceError> {
        let options = FindOptions::sorted(|a: &Booking, b: &Booking| b.requested_at.cmp(&a.requested_at));
        let bookings = match actor.role {
            Role::Tenant => self
                .store
                .find(&|booking: &Booking| booking.tenant == actor.id, options)?,
            Role::Owner => self
                .store
                .find(&|booking: &Booking| booking.owner == actor.id, options)?,
            Role::Admin => self.store.find(&|_: &Booking| true, options)?,
        };
        Ok(bookings)
    }

    /// Recomputes a listing's availability from committed booking states. Safe to
    /// run at any time; it repairs the window between a booking write and the
    /// listing write that should follow it.
    pub fn reconcile_property(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
    ) -> Result<Property, MarketplaceError> {
        let property: Property = self.store.find_by_id(property_id.as_str())?;
        authorize(actor, Capability::ReconcileListing, Target::Listing(&property)).require()?;

        let approved = self.store.find(
            &|booking: &Booking| {
                &booking.property == property_id && booking.status == BookingStatus::Approved
            },
            FindOptions::sorted(|a: &Booking, b: &Booking| a.updated_at.cmp(&b.updated_at)),
        )?;
        if approved.len() > 1 {
            warn!(property = %property_id, approved = approved.len(), "multiple approved bookings on one listing");
        }

        let holder = approved
            .iter()
            .find(|booking| property.rented_under.as_ref() == Some(&booking.id))
            .or_else(|| approved.first());

        // Conditional on the holder observed above so a concurrent decision wins.
        let observed = property.rented_under.clone();
        let reconciled = match holder {
            Some(booking) => self.store.update_if::<Property>(
                property_id.as_str(),
                &|stored| stored.rented_under == observed,
                &mut |stored| occupy(stored, &booking.id),
            )?,
            None if property.status == PropertyStatus::Rented || observed.is_some() => {
                self.store.update_if::<Property>(
                    property_id.as_str(),
                    &|stored| stored.rented_under == observed,
                    &mut |stored| reopen(stored),
                )?
            }
            None => property,
        };

        info!(property = %reconciled.id, status = ?reconciled.status, available = reconciled.is_available, "listing reconciled");
        Ok(reconciled)
    }

    fn occupy_listing(&self, booking: &Booking) -> Result<Property, MarketplaceError> {
        self.store
            .update_if::<Property>(
                booking.property.as_str(),
                &|property| {
                    property.rented_under.as_ref() == Some(&booking.id)
                        || (property.is_open_for_booking() && property.rented_under.is_none())
                },
                &mut |property| occupy(property, &booking.id),
            )
            .map_err(|err| match err {
                StoreError::PredicateFailed(_, _) => MarketplaceError::Conflict(
                    "property was taken by another booking".to_string(),
                ),
                other => other.into(),
            })
    }

    /// Reopens the listing unless another booking holds it or it is no longer
    /// in a bookable lifecycle state (e.g. sent back for re-review).
    fn release_listing(&self, booking: &Booking) -> Result<Option<Property>, MarketplaceError> {
        let result = self.store.update_if::<Property>(
            booking.property.as_str(),
            &|property| match &property.rented_under {
                Some(holder) => holder == &booking.id,
                None => matches!(
                    property.status,
                    PropertyStatus::Approved | PropertyStatus::Rented
                ),
            },
            &mut |property| reopen(property),
        );

        match result {
            Ok(property) => Ok(Some(property)),
            Err(StoreError::PredicateFailed(_, _)) => {
                debug!(booking = %booking.id, property = %booking.property, "listing not held by this booking; left untouched");
                Ok(None)
            }
            Err(StoreError::NotFound(_, _)) => {
                debug!(booking = %booking.id, property = %booking.property, "listing already removed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    // Compensating write for an approval whose listing write lost a race.
    fn revert_approval(&self, booking: &Booking) {
        let reverted = self.store.update_if::<Booking>(
            booking.id.as_str(),
            &|stored| stored.status == BookingStatus::Approved,
            &mut |stored| {
                stored.status = BookingStatus::Pending;
                stored.updated_at = Utc::now();
            },
        );
        match reverted {
            Ok(_) => warn!(booking = %booking.id, "approval reverted after listing conflict"),
            Err(err) => {
                warn!(booking = %booking.id, error = %err, "approval revert failed; reconcile the listing")
            }
        }
    }
}

fn occupy(property: &mut Property, booking: &BookingId) {
    property.status = PropertyStatus::Rented;
    property.is_available = false;
    property.rented_under = Some(booking.clone());
    property.updated_at = Utc::now();
}

fn reopen(property: &mut Property) {
    property.status = PropertyStatus::Approved;
    property.is_available = true;
    property.rented_under = None;
    property.updated_at = Utc::now();
}

pub(crate) fn transition_allowed(from: BookingStatus, to: BookingStatus) -> bool {
    matches!(
        (from, to),
        (BookingStatus::Pending, BookingStatus::Approved)
            | (BookingStatus::Pending, BookingStatus::Rejected)
            | (BookingStatus::Approved, BookingStatus::Rejected)
            | (BookingStatus::Approved, BookingStatus::Cancelled)
            | (BookingStatus::Approved, BookingStatus::Completed)
    )
}
