use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{authorize, Capability, Target};
use super::domain::{
    Actor, Booking, BookingId, CategoryRatings, Feedback, FeedbackId, Property, PropertyId,
    RatingCategory,
};
use super::error::MarketplaceError;
use super::store::{EntityStore, FindOptions, StoreError};

const COMMENT_MAX: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackSubmission {
    pub property_id: PropertyId,
    #[serde(default)]
    pub booking_id: Option<BookingId>,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub categories: CategoryRatings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackEdit {
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub categories: Option<CategoryRatings>,
}

/// Read-side aggregate over the visible feedback of one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackSummary {
    pub count: usize,
    pub average_rating: f64,
    pub category_averages: BTreeMap<RatingCategory, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyFeedback {
    pub property: PropertyId,
    #[serde(flatten)]
    pub summary: FeedbackSummary,
    pub entries: Vec<Feedback>,
}

/// One feedback entry per (tenant, property), enforced by the store's unique
/// index rather than a lookup before insert.
pub struct FeedbackGuard<S> {
    store: Arc<S>,
}

impl<S> FeedbackGuard<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        actor: &Actor,
        submission: FeedbackSubmission,
    ) -> Result<Feedback, MarketplaceError> {
        authorize(actor, Capability::WriteFeedback, Target::Platform).require()?;
        validate_rating("rating", submission.rating)?;
        validate_categories(&submission.categories)?;
        validate_comment(submission.comment.as_deref())?;

        let property: Property = self.store.find_by_id(submission.property_id.as_str())?;
        let is_verified = match &submission.booking_id {
            Some(booking_id) => {
                let booking: Booking = self.store.find_by_id(booking_id.as_str())?;
                authorize(actor, Capability::WriteFeedback, Target::Booking(&booking))
                    .require()?;
                booking.property == property.id
            }
            None => false,
        };

        let feedback = Feedback {
            id: FeedbackId::generate(),
            tenant: actor.id.clone(),
            property: property.id,
            booking: submission.booking_id,
            rating: submission.rating,
            comment: submission.comment,
            categories: submission.categories,
            is_visible: true,
            is_verified,
            created_at: Utc::now(),
        };

        let stored = self.store.insert(feedback).map_err(|err| match err {
            StoreError::Conflict(_) => MarketplaceError::Conflict(
                "you have already left feedback for this property".to_string(),
            ),
            other => other.into(),
        })?;
        info!(feedback = %stored.id, property = %stored.property, "feedback recorded");
        Ok(stored)
    }

    pub fn update(
        &self,
        actor: &Actor,
        feedback_id: &FeedbackId,
        edit: FeedbackEdit,
    ) -> Result<Feedback, MarketplaceError> {
        let current: Feedback = self.store.find_by_id(feedback_id.as_str())?;
        authorize(actor, Capability::ModifyFeedback, Target::Feedback(&current)).require()?;
        if let Some(rating) = edit.rating {
            validate_rating("rating", rating)?;
        }
        if let Some(categories) = &edit.categories {
            validate_categories(categories)?;
        }
        validate_comment(edit.comment.as_deref())?;

        let updated = self.store.update::<Feedback>(feedback_id.as_str(), &mut |stored| {
            if let Some(rating) = edit.rating {
                stored.rating = rating;
            }
            if let Some(comment) = &edit.comment {
                stored.comment = Some(comment.clone());
            }
            if let Some(categories) = edit.categories {
                stored.categories = categories;
            }
        })?;
        Ok(updated)
    }

    pub fn delete(&self, actor: &Actor, feedback_id: &FeedbackId) -> Result<(), MarketplaceError> {
        let current: Feedback = self.store.find_by_id(feedback_id.as_str())?;
        authorize(actor, Capability::ModifyFeedback, Target::Feedback(&current)).require()?;
        self.store.delete_one::<Feedback>(feedback_id.as_str())?;
        info!(feedback = %feedback_id, "feedback deleted");
        Ok(())
    }

    /// Admin moderation: hidden feedback drops out of property aggregates.
    pub fn set_visibility(
        &self,
        actor: &Actor,
        feedback_id: &FeedbackId,
        visible: bool,
    ) -> Result<Feedback, MarketplaceError> {
        authorize(actor, Capability::ModerateFeedback, Target::Platform).require()?;
        let updated = self
            .store
            .update::<Feedback>(feedback_id.as_str(), &mut |stored| {
                stored.is_visible = visible;
            })?;
        Ok(updated)
    }

    pub fn property_feedback(
        &self,
        property_id: &PropertyId,
    ) -> Result<PropertyFeedback, MarketplaceError> {
        self.store.find_by_id::<Property>(property_id.as_str())?;
        let entries = self.store.find(
            &|entry: &Feedback| entry.is_visible && &entry.property == property_id,
            FindOptions::sorted(newest_first),
        )?;
        Ok(PropertyFeedback {
            property: property_id.clone(),
            summary: summarize(&entries),
            entries,
        })
    }

    pub fn feedback_for_tenant(&self, actor: &Actor) -> Result<Vec<Feedback>, MarketplaceError> {
        let entries = self.store.find(
            &|entry: &Feedback| actor.is(&entry.tenant),
            FindOptions::sorted(newest_first),
        )?;
        Ok(entries)
    }
}

/// Averages rounded to one decimal place. Categories nobody rated are omitted,
/// and a category's average only counts the entries that rated it.
pub fn summarize(entries: &[Feedback]) -> FeedbackSummary {
    if entries.is_empty() {
        return FeedbackSummary {
            count: 0,
            average_rating: 0.0,
            category_averages: BTreeMap::new(),
        };
    }

    let total: u32 = entries.iter().map(|entry| u32::from(entry.rating)).sum();
    let mut sums: BTreeMap<RatingCategory, (u32, u32)> = BTreeMap::new();
    for entry in entries {
        for (category, score) in entry.categories.entries() {
            if let Some(score) = score {
                let slot = sums.entry(category).or_default();
                slot.0 += u32::from(score);
                slot.1 += 1;
            }
        }
    }

    FeedbackSummary {
        count: entries.len(),
        average_rating: round1(f64::from(total) / entries.len() as f64),
        category_averages: sums
            .into_iter()
            .map(|(category, (sum, n))| (category, round1(f64::from(sum) / f64::from(n))))
            .collect(),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn newest_first(a: &Feedback, b: &Feedback) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at)
}

fn validate_rating(field: &str, value: u8) -> Result<(), MarketplaceError> {
    if (1..=5).contains(&value) {
        Ok(())
    } else {
        Err(MarketplaceError::validation(format!(
            "{field} must be between 1 and 5"
        )))
    }
}

fn validate_categories(categories: &CategoryRatings) -> Result<(), MarketplaceError> {
    for (category, score) in categories.entries() {
        if let Some(score) = score {
            validate_rating(category.label(), score)?;
        }
    }
    Ok(())
}

fn validate_comment(comment: Option<&str>) -> Result<(), MarketplaceError> {
    match comment {
        Some(comment) if comment.chars().count() > COMMENT_MAX => Err(
            MarketplaceError::validation(format!("comment cannot exceed {COMMENT_MAX} characters")),
        ),
        _ => Ok(()),
    }
}
