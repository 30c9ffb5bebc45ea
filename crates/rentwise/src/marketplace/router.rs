use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::booking::{BookingRequest, StatusChange, VisitRequest};
use super::domain::{Actor, BookingId, FeedbackId, PaymentId, PropertyId, ReportId, Role};
use super::error::MarketplaceError;
use super::feedback::{FeedbackEdit, FeedbackSubmission};
use super::listing::{ListingDraft, ListingEdit};
use super::moderation::ReportSubmission;
use super::service::Marketplace;
use super::settlement::{CardDetails, PaymentRequest, SettlementGateway};
use super::store::EntityStore;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Shared handler state: the managers plus the bound applied to each store call.
pub struct MarketplaceState<S, G> {
    pub marketplace: Arc<Marketplace<S, G>>,
    pub store_timeout: Duration,
}

impl<S, G> MarketplaceState<S, G> {
    pub fn new(marketplace: Arc<Marketplace<S, G>>, store_timeout: Duration) -> Self {
        Self {
            marketplace,
            store_timeout,
        }
    }
}

impl<S, G> Clone for MarketplaceState<S, G> {
    fn clone(&self) -> Self {
        Self {
            marketplace: Arc::clone(&self.marketplace),
            store_timeout: self.store_timeout,
        }
    }
}

/// Router builder exposing the marketplace endpoints under `/api/v1`.
pub fn marketplace_router<S, G>(state: MarketplaceState<S, G>) -> Router
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    Router::new()
        .route(
            "/api/v1/listings",
            post(create_listing::<S, G>).get(available_listings::<S, G>),
        )
        .route(
            "/api/v1/listings/:property_id",
            get(get_listing::<S, G>)
                .put(edit_listing::<S, G>)
                .delete(delete_listing::<S, G>),
        )
        .route(
            "/api/v1/listings/:property_id/review",
            post(review_listing::<S, G>),
        )
        .route(
            "/api/v1/listings/:property_id/reconcile",
            post(reconcile_listing::<S, G>),
        )
        .route(
            "/api/v1/listings/:property_id/feedback",
            get(property_feedback::<S, G>),
        )
        .route(
            "/api/v1/bookings",
            post(create_booking::<S, G>).get(list_bookings::<S, G>),
        )
        .route("/api/v1/bookings/:booking_id", get(get_booking::<S, G>))
        .route(
            "/api/v1/bookings/:booking_id/status",
            put(transition_booking::<S, G>),
        )
        .route(
            "/api/v1/bookings/:booking_id/cancel",
            put(cancel_booking::<S, G>),
        )
        .route(
            "/api/v1/bookings/:booking_id/visit",
            put(schedule_visit::<S, G>),
        )
        .route(
            "/api/v1/payments",
            post(create_payment::<S, G>).get(list_payments::<S, G>),
        )
        .route("/api/v1/payments/stats", get(payment_stats::<S, G>))
        .route(
            "/api/v1/payments/:payment_id/process",
            post(process_payment::<S, G>),
        )
        .route(
            "/api/v1/feedback",
            post(create_feedback::<S, G>).get(my_feedback::<S, G>),
        )
        .route(
            "/api/v1/feedback/:feedback_id",
            put(update_feedback::<S, G>).delete(delete_feedback::<S, G>),
        )
        .route(
            "/api/v1/feedback/:feedback_id/visibility",
            put(feedback_visibility::<S, G>),
        )
        .route(
            "/api/v1/reports",
            post(submit_report::<S, G>).get(list_reports::<S, G>),
        )
        .route(
            "/api/v1/reports/:report_id/review",
            post(review_report::<S, G>),
        )
        .with_state(state)
}

/// Rejection for requests without a usable caller context.
#[derive(Debug, Clone, Copy)]
pub struct MissingActor(&'static str);

impl IntoResponse for MissingActor {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": { "code": "UNAUTHENTICATED", "message": self.0 },
        });
        (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
    }
}

/// The caller identity is verified upstream and forwarded in headers.
#[async_trait]
impl<St> FromRequestParts<St> for Actor
where
    St: Send + Sync,
{
    type Rejection = MissingActor;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(ACTOR_ID_HEADER).ok_or(MissingActor("caller identity required"))?;
        let role: Role = header(ACTOR_ROLE_HEADER)
            .ok_or(MissingActor("caller role required"))?
            .parse()
            .map_err(|_| MissingActor("caller role not recognized"))?;
        Ok(Actor::new(id, role))
    }
}

/// Runs a store-backed operation off the async executor, bounded by the
/// configured store timeout.
///
/// A `Timeout` outcome is indeterminate: blocking work cannot be cancelled, so
/// the operation keeps running and may still commit its writes. Its late
/// result is logged once it finishes.
async fn bounded<S, G, T, F>(state: &MarketplaceState<S, G>, op: F) -> Result<T, MarketplaceError>
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
    T: Send + 'static,
    F: FnOnce(&Marketplace<S, G>) -> Result<T, MarketplaceError> + Send + 'static,
{
    let marketplace = Arc::clone(&state.marketplace);
    let mut task = tokio::task::spawn_blocking(move || op(&marketplace));
    let timeout_ms = state.store_timeout.as_millis() as u64;
    match tokio::time::timeout(state.store_timeout, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(MarketplaceError::Internal(join.to_string())),
        Err(_) => {
            warn!(timeout_ms, "store call timed out; outcome unknown until it finishes");
            tokio::spawn(async move {
                match task.await {
                    Ok(Ok(_)) => warn!(timeout_ms, "timed-out store call completed"),
                    Ok(Err(err)) => {
                        warn!(timeout_ms, code = err.code(), "timed-out store call failed")
                    }
                    Err(join) => warn!(timeout_ms, error = %join, "timed-out store call aborted"),
                }
            });
            Err(MarketplaceError::Timeout)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ListingDecision {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportDecision {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct Visibility {
    pub is_visible: bool,
}

type Handled = Result<Response, MarketplaceError>;

fn created<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

fn ok<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) async fn create_listing<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Json(draft): Json<ListingDraft>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let listing = bounded(&state, move |m| m.listings.create_listing(&actor, draft)).await?;
    Ok(created(listing))
}

pub(crate) async fn available_listings<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    Query(page): Query<PageQuery>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let listings = bounded(&state, move |m| {
        m.listings
            .available_listings(page.skip.unwrap_or_default(), page.limit)
    })
    .await?;
    Ok(ok(listings))
}

pub(crate) async fn get_listing<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    Path(property_id): Path<String>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = PropertyId(property_id);
    let listing = bounded(&state, move |m| m.listings.get_listing(&id)).await?;
    Ok(ok(listing))
}

pub(crate) async fn edit_listing<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(property_id): Path<String>,
    Json(edit): Json<ListingEdit>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = PropertyId(property_id);
    let listing = bounded(&state, move |m| m.listings.edit_listing(&actor, &id, edit)).await?;
    Ok(ok(listing))
}

pub(crate) async fn delete_listing<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(property_id): Path<String>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = PropertyId(property_id);
    let removed = bounded(&state, move |m| m.listings.delete_listing(&actor, &id)).await?;
    Ok(ok(json!({ "removed": removed })))
}

pub(crate) async fn review_listing<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(property_id): Path<String>,
    Json(decision): Json<ListingDecision>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = PropertyId(property_id);
    let listing = bounded(&state, move |m| {
        m.listings.review_listing(&actor, &id, &decision.status)
    })
    .await?;
    Ok(ok(listing))
}

pub(crate) async fn reconcile_listing<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(property_id): Path<String>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = PropertyId(property_id);
    let listing = bounded(&state, move |m| m.bookings.reconcile_property(&actor, &id)).await?;
    Ok(ok(listing))
}

pub(crate) async fn property_feedback<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    Path(property_id): Path<String>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = PropertyId(property_id);
    let feedback = bounded(&state, move |m| m.feedback.property_feedback(&id)).await?;
    Ok(ok(feedback))
}

pub(crate) async fn create_booking<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Json(request): Json<BookingRequest>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let booking = bounded(&state, move |m| m.bookings.create(&actor, request)).await?;
    Ok(created(booking))
}

pub(crate) async fn list_bookings<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let bookings = bounded(&state, move |m| m.bookings.bookings_for(&actor)).await?;
    Ok(ok(bookings))
}

pub(crate) async fn get_booking<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(booking_id): Path<String>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = BookingId(booking_id);
    let booking = bounded(&state, move |m| m.bookings.get(&actor, &id)).await?;
    Ok(ok(booking))
}

pub(crate) async fn transition_booking<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(booking_id): Path<String>,
    Json(change): Json<StatusChange>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = BookingId(booking_id);
    let booking = bounded(&state, move |m| m.bookings.transition(&actor, &id, change)).await?;
    Ok(ok(booking))
}

pub(crate) async fn cancel_booking<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(booking_id): Path<String>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = BookingId(booking_id);
    let booking = bounded(&state, move |m| m.bookings.cancel(&actor, &id)).await?;
    Ok(ok(booking))
}

pub(crate) async fn schedule_visit<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(booking_id): Path<String>,
    Json(visit): Json<VisitRequest>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = BookingId(booking_id);
    let booking = bounded(&state, move |m| m.bookings.schedule_visit(&actor, &id, visit)).await?;
    Ok(ok(booking))
}

pub(crate) async fn create_payment<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Json(request): Json<PaymentRequest>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let payment = bounded(&state, move |m| m.payments.create_payment(&actor, request)).await?;
    Ok(created(payment))
}

pub(crate) async fn list_payments<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let payments = bounded(&state, move |m| m.payments.payments_for(&actor)).await?;
    Ok(ok(payments))
}

pub(crate) async fn payment_stats<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let stats = bounded(&state, move |m| m.payments.payment_stats(&actor)).await?;
    Ok(ok(stats))
}

pub(crate) async fn process_payment<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(payment_id): Path<String>,
    Json(card): Json<CardDetails>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = PaymentId(payment_id);
    let receipt = bounded(&state, move |m| m.payments.process(&actor, &id, card)).await?;
    Ok(ok(receipt))
}

pub(crate) async fn create_feedback<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Json(submission): Json<FeedbackSubmission>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let feedback = bounded(&state, move |m| m.feedback.create(&actor, submission)).await?;
    Ok(created(feedback))
}

pub(crate) async fn my_feedback<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let feedback = bounded(&state, move |m| m.feedback.feedback_for_tenant(&actor)).await?;
    Ok(ok(feedback))
}

pub(crate) async fn update_feedback<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(feedback_id): Path<String>,
    Json(edit): Json<FeedbackEdit>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = FeedbackId(feedback_id);
    let feedback = bounded(&state, move |m| m.feedback.update(&actor, &id, edit)).await?;
    Ok(ok(feedback))
}

pub(crate) async fn delete_feedback<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(feedback_id): Path<String>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = FeedbackId(feedback_id);
    bounded(&state, move |m| m.feedback.delete(&actor, &id)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn feedback_visibility<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(feedback_id): Path<String>,
    Json(visibility): Json<Visibility>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = FeedbackId(feedback_id);
    let feedback = bounded(&state, move |m| {
        m.feedback
            .set_visibility(&actor, &id, visibility.is_visible)
    })
    .await?;
    Ok(ok(feedback))
}

pub(crate) async fn submit_report<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Option<Actor>,
    Json(submission): Json<ReportSubmission>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let report = bounded(&state, move |m| {
        m.moderation.submit_report(actor.as_ref(), submission)
    })
    .await?;
    Ok(created(report))
}

pub(crate) async fn list_reports<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let reports = bounded(&state, move |m| m.moderation.reports(&actor)).await?;
    Ok(ok(reports))
}

pub(crate) async fn review_report<S, G>(
    State(state): State<MarketplaceState<S, G>>,
    actor: Actor,
    Path(report_id): Path<String>,
    Json(decision): Json<ReportDecision>,
) -> Handled
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    let id = ReportId(report_id);
    let outcome = bounded(&state, move |m| {
        m.moderation.review(&actor, &id, &decision.action)
    })
    .await?;
    Ok(ok(outcome))
}
