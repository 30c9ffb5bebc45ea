use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::access::{authorize, Capability, Target};
use super::domain::{Actor, Property, PropertyId, PropertyStatus, UserId};
use super::error::MarketplaceError;
use super::moderation::{purge_listings, CascadeSummary};
use super::store::{EntityStore, FindOptions, StoreError};

const TITLE_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 1000;
const DEFAULT_DEPOSIT_MONTHS: u64 = 2;

/// Owner supplied listing payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub city: String,
    pub rent: u64,
    #[serde(default)]
    pub security_deposit: Option<u64>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub rent: Option<u64>,
    pub security_deposit: Option<u64>,
}

/// Listing creation, admin review, owner edits, and removal.
pub struct ListingManager<S> {
    store: Arc<S>,
}

impl<S> ListingManager<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create_listing(
        &self,
        actor: &Actor,
        draft: ListingDraft,
    ) -> Result<Property, MarketplaceError> {
        authorize(actor, Capability::CreateListing, Target::Platform).require()?;
        validate_text(&draft.title, &draft.description)?;
        if draft.rent == 0 {
            return Err(MarketplaceError::validation("rent must be positive"));
        }
        let security_deposit = deposit_for(draft.rent, draft.security_deposit)?;

        let now = Utc::now();
        let property = Property {
            id: PropertyId::generate(),
            owner: actor.id.clone(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            city: draft.city,
            rent: draft.rent,
            security_deposit,
            status: PropertyStatus::Pending,
            is_available: false,
            rented_under: None,
            photo_urls: draft.photo_urls,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert(property)?;
        info!(property = %stored.id, owner = %stored.owner, "listing submitted for review");
        Ok(stored)
    }

    /// Admin decision on a listing: Approved opens it for booking, Rejected and
    /// Maintenance close it. Rented listings are only released by the booking
    /// lifecycle.
    pub fn review_listing(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
        decision: &str,
    ) -> Result<Property, MarketplaceError> {
        authorize(actor, Capability::ReviewListing, Target::Platform).require()?;
        let decision: PropertyStatus = decision.parse()?;
        if !matches!(
            decision,
            PropertyStatus::Approved | PropertyStatus::Rejected | PropertyStatus::Maintenance
        ) {
            return Err(MarketplaceError::InvalidArgument(format!(
                "{decision:?} is not a review decision"
            )));
        }

        let updated = self
            .store
            .update_if::<Property>(
                property_id.as_str(),
                &|property| property.status != PropertyStatus::Rented,
                &mut |property| {
                    property.status = decision;
                    property.is_available = decision == PropertyStatus::Approved;
                    property.updated_at = Utc::now();
                },
            )
            .map_err(|err| match err {
                StoreError::PredicateFailed(_, _) => {
                    MarketplaceError::invalid_state("a rented listing cannot be re-reviewed")
                }
                other => other.into(),
            })?;

        info!(property = %updated.id, status = ?updated.status, "listing reviewed");
        Ok(updated)
    }

    /// Applies an owner edit. Unless the listing is currently rented, the edit
    /// sends it back to Pending for re-review.
    pub fn edit_listing(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
        edit: ListingEdit,
    ) -> Result<Property, MarketplaceError> {
        let current: Property = self.store.find_by_id(property_id.as_str())?;
        authorize(actor, Capability::EditListing, Target::Listing(&current)).require()?;

        if let Some(title) = &edit.title {
            validate_text(title, edit.description.as_deref().unwrap_or_default())?;
        } else if let Some(description) = &edit.description {
            validate_text(&current.title, description)?;
        }
        if edit.rent == Some(0) {
            return Err(MarketplaceError::validation("rent must be positive"));
        }
        deposit_for(
            edit.rent.unwrap_or(current.rent),
            Some(edit.security_deposit.unwrap_or(current.security_deposit)),
        )?;

        let owner = current.owner.clone();
        let updated = self.store.update_if::<Property>(
            property_id.as_str(),
            &|property| property.owner == owner,
            &mut |property| {
                if let Some(title) = &edit.title {
                    property.title = title.trim().to_string();
                }
                if let Some(description) = &edit.description {
                    property.description = description.clone();
                }
                if let Some(city) = &edit.city {
                    property.city = city.clone();
                }
                if let Some(rent) = edit.rent {
                    property.rent = rent;
                }
                if let Some(deposit) = edit.security_deposit {
                    property.security_deposit = deposit;
                }
                if property.status != PropertyStatus::Rented {
                    property.status = PropertyStatus::Pending;
                    property.is_available = false;
                }
                property.updated_at = Utc::now();
            },
        )?;

        info!(property = %updated.id, status = ?updated.status, "listing edited");
        Ok(updated)
    }

    /// Removes a listing together with its bookings, payments, and feedback.
    pub fn delete_listing(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
    ) -> Result<CascadeSummary, MarketplaceError> {
        let property: Property = self.store.find_by_id(property_id.as_str())?;
        authorize(actor, Capability::DeleteListing, Target::Listing(&property)).require()?;

        let summary = purge_listings(self.store.as_ref(), std::slice::from_ref(&property.id))?;
        info!(property = %property.id, ?summary, "listing deleted");
        Ok(summary)
    }

    pub fn get_listing(&self, property_id: &PropertyId) -> Result<Property, MarketplaceError> {
        Ok(self.store.find_by_id(property_id.as_str())?)
    }

    /// Approved, available listings, newest first.
    pub fn available_listings(
        &self,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Property>, MarketplaceError> {
        let listings = self.store.find(
            &|property: &Property| property.is_open_for_booking(),
            FindOptions::sorted(newest_first).page(skip, limit),
        )?;
        Ok(listings)
    }

    pub fn listings_for_owner(&self, owner: &UserId) -> Result<Vec<Property>, MarketplaceError> {
        let listings = self.store.find(
            &|property: &Property| &property.owner == owner,
            FindOptions::sorted(newest_first),
        )?;
        Ok(listings)
    }
}

fn newest_first(a: &Property, b: &Property) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at)
}

/// Resolves the deposit (two months of rent when absent) and checks that a
/// booking total of rent plus deposit fits in a `u64`.
pub(crate) fn deposit_for(rent: u64, deposit: Option<u64>) -> Result<u64, MarketplaceError> {
    let deposit = match deposit {
        Some(deposit) => deposit,
        None => rent
            .checked_mul(DEFAULT_DEPOSIT_MONTHS)
            .ok_or_else(|| MarketplaceError::validation("rent is too large"))?,
    };
    rent.checked_add(deposit)
        .ok_or_else(|| MarketplaceError::validation("rent plus security deposit is too large"))?;
    Ok(deposit)
}

fn validate_text(title: &str, description: &str) -> Result<(), MarketplaceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(MarketplaceError::validation("title is required"));
    }
    if title.chars().count() > TITLE_MAX {
        return Err(MarketplaceError::validation(format!(
            "title cannot exceed {TITLE_MAX} characters"
        )));
    }
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(MarketplaceError::validation(format!(
            "description cannot exceed {DESCRIPTION_MAX} characters"
        )));
    }
    Ok(())
}
