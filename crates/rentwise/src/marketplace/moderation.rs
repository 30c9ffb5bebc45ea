//! Report intake and the review protocol with its removal cascades.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::access::{authorize, Capability, Target};
use super::domain::{
    Actor, Booking, Feedback, Payment, Property, PropertyId, Report, ReportAction, ReportId,
    ReportStatus, Role, User, UserId,
};
use super::error::MarketplaceError;
use super::store::{EntityStore, FindOptions, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSubmission {
    pub property_id: PropertyId,
    pub category: String,
    pub details: String,
}

/// Records removed by a cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeSummary {
    pub bookings: usize,
    pub payments: usize,
    pub feedback: usize,
    pub properties: usize,
    pub users: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub report: Report,
    pub removed: CascadeSummary,
}

pub struct ModerationCascadeEngine<S> {
    store: Arc<S>,
    in_review: Mutex<HashSet<ReportId>>,
}

/// Marks a report as being reviewed by this process until dropped.
struct ReviewClaim<'a> {
    claims: &'a Mutex<HashSet<ReportId>>,
    report: ReportId,
}

impl Drop for ReviewClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.report);
    }
}

impl<S> ModerationCascadeEngine<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            in_review: Mutex::new(HashSet::new()),
        }
    }

    /// Files a report against a listing. Anonymous reports carry no reporter.
    pub fn submit_report(
        &self,
        reporter: Option<&Actor>,
        submission: ReportSubmission,
    ) -> Result<Report, MarketplaceError> {
        if submission.category.trim().is_empty() {
            return Err(MarketplaceError::validation("category is required"));
        }
        if submission.details.trim().is_empty() {
            return Err(MarketplaceError::validation("details are required"));
        }

        let property: Property = self.store.find_by_id(submission.property_id.as_str())?;
        let report = Report {
            id: ReportId::generate(),
            property: property.id,
            owner: property.owner,
            reporter: reporter.map(|actor| actor.id.clone()),
            category: submission.category.trim().to_string(),
            details: submission.details,
            status: ReportStatus::Pending,
            action: None,
            created_at: Utc::now(),
            reviewed_at: None,
        };

        let stored = self.store.insert(report)?;
        info!(report = %stored.id, property = %stored.property, "report submitted");
        Ok(stored)
    }

    pub fn reports(&self, actor: &Actor) -> Result<Vec<Report>, MarketplaceError> {
        authorize(actor, Capability::ReviewReport, Target::Platform).require()?;
        let reports = self.store.find(
            &|_: &Report| true,
            FindOptions::sorted(|a: &Report, b: &Report| b.created_at.cmp(&a.created_at)),
        )?;
        Ok(reports)
    }

    /// Applies a review action exactly once. The cascade runs before the report
    /// is marked Reviewed, so an interrupted review stays Pending and can be
    /// retried; the deletes themselves are idempotent. A second review of the
    /// same report while one is running in this process fails `InvalidState`.
    pub fn review(
        &self,
        actor: &Actor,
        report_id: &ReportId,
        action: &str,
    ) -> Result<ReviewOutcome, MarketplaceError> {
        authorize(actor, Capability::ReviewReport, Target::Platform).require()?;
        let action: ReportAction = action.parse()?;
        let _claim = self.claim(report_id)?;

        let report: Report = self.store.find_by_id(report_id.as_str())?;
        if report.status == ReportStatus::Reviewed {
            return Err(MarketplaceError::invalid_state(
                "report has already been reviewed",
            ));
        }

        let removed = match action {
            ReportAction::Ignore => CascadeSummary::default(),
            ReportAction::RemoveProperty => {
                purge_listings(self.store.as_ref(), std::slice::from_ref(&report.property))?
            }
            ReportAction::RemoveOwner => self.remove_owner(&report.owner)?,
        };

        let reviewed = self
            .store
            .update_if::<Report>(
                report_id.as_str(),
                &|stored| stored.status == ReportStatus::Pending,
                &mut |stored| {
                    stored.status = ReportStatus::Reviewed;
                    stored.action = Some(action);
                    stored.reviewed_at = Some(Utc::now());
                },
            )
            .map_err(|err| match err {
                StoreError::PredicateFailed(_, _) => {
                    MarketplaceError::invalid_state("report has already been reviewed")
                }
                other => other.into(),
            })?;

        info!(
            report = %reviewed.id,
            action = action.label(),
            ?removed,
            "report reviewed"
        );
        Ok(ReviewOutcome {
            report: reviewed,
            removed,
        })
    }

    fn claim(&self, report_id: &ReportId) -> Result<ReviewClaim<'_>, MarketplaceError> {
        let mut claims = self
            .in_review
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !claims.insert(report_id.clone()) {
            return Err(MarketplaceError::invalid_state(
                "report review already in progress",
            ));
        }
        Ok(ReviewClaim {
            claims: &self.in_review,
            report: report_id.clone(),
        })
    }

    fn remove_owner(&self, owner: &UserId) -> Result<CascadeSummary, MarketplaceError> {
        match self.store.find_by_id::<User>(owner.as_str()) {
            Ok(user) if user.role == Role::Admin => {
                return Err(MarketplaceError::forbidden(
                    "admin accounts cannot be removed",
                ));
            }
            Ok(_) => {}
            // Already removed by an earlier, interrupted attempt.
            Err(StoreError::NotFound(_, _)) => {}
            Err(err) => return Err(err.into()),
        }

        let owned: Vec<PropertyId> = self
            .store
            .find_all(&|property: &Property| &property.owner == owner)?
            .into_iter()
            .map(|property| property.id)
            .collect();

        let mut summary = purge_listings(self.store.as_ref(), &owned)?;
        summary.users = usize::from(
            self.store
                .delete_one::<User>(owner.as_str())
                .map_err(|err| cascade_interrupted("users", err))?,
        );
        Ok(summary)
    }
}

/// Deletes every booking, payment, and feedback entry referencing `properties`,
/// then the properties themselves. Dependents go first so no surviving record
/// points at a missing listing. Re-running after a partial failure is a no-op for
/// slices already removed.
pub(crate) fn purge_listings<S>(
    store: &S,
    properties: &[PropertyId],
) -> Result<CascadeSummary, MarketplaceError>
where
    S: EntityStore,
{
    if properties.is_empty() {
        return Ok(CascadeSummary::default());
    }
    let targeted = |id: &PropertyId| properties.contains(id);

    let bookings = store
        .delete_many::<Booking>(&|booking| targeted(&booking.property))
        .map_err(|err| cascade_interrupted("bookings", err))?;
    let payments = store
        .delete_many::<Payment>(&|payment| targeted(&payment.property))
        .map_err(|err| cascade_interrupted("payments", err))?;
    let feedback = store
        .delete_many::<Feedback>(&|entry| targeted(&entry.property))
        .map_err(|err| cascade_interrupted("feedback", err))?;
    let removed = store
        .delete_many::<Property>(&|property| targeted(&property.id))
        .map_err(|err| cascade_interrupted("properties", err))?;

    Ok(CascadeSummary {
        bookings,
        payments,
        feedback,
        properties: removed,
        users: 0,
    })
}

fn cascade_interrupted(stage: &'static str, err: StoreError) -> MarketplaceError {
    warn!(stage, error = %err, "cascade interrupted; retry to completion");
    err.into()
}
