use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::marketplace::booking::BookingRequest;
use crate::marketplace::domain::{Actor, Property, Role, User, UserId};
use crate::marketplace::listing::ListingDraft;
use crate::marketplace::router::{marketplace_router, MarketplaceState};
use crate::marketplace::service::Marketplace;
use crate::marketplace::settlement::{CardDetails, SettlementGateway, SettlementOutcome};
use crate::marketplace::store::{
    Collection, Document, EntityStore, FindOptions, MemoryStore, StoreError,
};

/// Gateway double returning a fixed outcome.
pub(super) struct FixedGateway(pub SettlementOutcome);

impl FixedGateway {
    pub(super) fn approving() -> Self {
        Self(SettlementOutcome::Success {
            transaction_ref: None,
            masked_card: "**** **** **** 4242".to_string(),
        })
    }

    pub(super) fn declining() -> Self {
        Self(SettlementOutcome::Failure {
            reason: "Transaction declined by bank".to_string(),
        })
    }
}

impl SettlementGateway for FixedGateway {
    fn settle(&self, _card: &CardDetails) -> SettlementOutcome {
        self.0.clone()
    }
}

pub(super) struct Harness<S = MemoryStore> {
    pub store: Arc<S>,
    pub marketplace: Arc<Marketplace<S, FixedGateway>>,
    pub admin: Actor,
    pub owner: Actor,
    pub tenant: Actor,
}

pub(super) fn harness() -> Harness {
    harness_with(MemoryStore::new(), FixedGateway::approving())
}

pub(super) fn harness_with<S>(store: S, gateway: FixedGateway) -> Harness<S>
where
    S: EntityStore + 'static,
{
    let store = Arc::new(store);
    let marketplace = Arc::new(Marketplace::new(Arc::clone(&store), Arc::new(gateway)));
    let admin = seed_user(store.as_ref(), "admin-1", Role::Admin);
    let owner = seed_user(store.as_ref(), "owner-1", Role::Owner);
    let tenant = seed_user(store.as_ref(), "tenant-1", Role::Tenant);
    Harness {
        store,
        marketplace,
        admin,
        owner,
        tenant,
    }
}

pub(super) fn seed_user<S: EntityStore>(store: &S, id: &str, role: Role) -> Actor {
    store
        .insert(User {
            id: UserId::from(id),
            name: format!("{} {id}", role.label()),
            email: format!("{id}@rentwise.test"),
            role,
        })
        .expect("seed user");
    Actor::new(id, role)
}

pub(super) fn draft(title: &str, rent: u64, deposit: Option<u64>) -> ListingDraft {
    ListingDraft {
        title: title.to_string(),
        description: "Two bedroom flat near the metro".to_string(),
        city: "Pune".to_string(),
        rent,
        security_deposit: deposit,
        photo_urls: vec!["https://cdn.rentwise.test/p/1.jpg".to_string()],
    }
}

impl<S> Harness<S>
where
    S: EntityStore + 'static,
{
    /// Creates a listing for `owner` and has the admin approve it.
    pub(super) fn approved_listing(&self, owner: &Actor, rent: u64, deposit: Option<u64>) -> Property {
        let listing = self
            .marketplace
            .listings
            .create_listing(owner, draft("Baner 2BHK", rent, deposit))
            .expect("create listing");
        self.marketplace
            .listings
            .review_listing(&self.admin, &listing.id, "Approved")
            .expect("approve listing")
    }

    pub(super) fn property(&self, property: &Property) -> Property {
        self.store
            .find_by_id(property.id.as_str())
            .expect("property present")
    }
}

pub(super) fn booking_request(property: &Property) -> BookingRequest {
    BookingRequest {
        property_id: property.id.clone(),
        move_in_date: NaiveDate::from_ymd_opt(2025, 11, 1).expect("valid date"),
        lease_duration_months: 11,
        message: Some("Family of three, no pets".to_string()),
    }
}

pub(super) fn card() -> CardDetails {
    CardDetails {
        card_number: "4242 4242 4242 4242".to_string(),
        expiry_date: "12/27".to_string(),
        cvv: "123".to_string(),
        card_holder_name: "Meera Iyer".to_string(),
    }
}

/// Wraps a `MemoryStore` and fails writes to one collection while armed.
#[derive(Default)]
pub(super) struct FaultyStore {
    inner: MemoryStore,
    failing_updates: Mutex<Option<Collection>>,
    failing_deletes: Mutex<Option<Collection>>,
}

impl FaultyStore {
    pub(super) fn fail_updates(&self, collection: Option<Collection>) {
        *self.failing_updates.lock().expect("lock") = collection;
    }

    pub(super) fn fail_deletes(&self, collection: Option<Collection>) {
        *self.failing_deletes.lock().expect("lock") = collection;
    }

    fn armed(slot: &Mutex<Option<Collection>>, collection: Collection) -> Result<(), StoreError> {
        if *slot.lock().expect("lock") == Some(collection) {
            Err(StoreError::Unavailable("injected fault".to_string()))
        } else {
            Ok(())
        }
    }
}

impl EntityStore for FaultyStore {
    fn find_by_id<D: Document>(&self, id: &str) -> Result<D, StoreError> {
        self.inner.find_by_id(id)
    }

    fn find<D: Document>(
        &self,
        filter: &dyn Fn(&D) -> bool,
        options: FindOptions<D>,
    ) -> Result<Vec<D>, StoreError> {
        self.inner.find(filter, options)
    }

    fn insert<D: Document>(&self, doc: D) -> Result<D, StoreError> {
        self.inner.insert(doc)
    }

    fn update_if<D: Document>(
        &self,
        id: &str,
        predicate: &dyn Fn(&D) -> bool,
        patch: &mut dyn FnMut(&mut D),
    ) -> Result<D, StoreError> {
        Self::armed(&self.failing_updates, D::COLLECTION)?;
        self.inner.update_if(id, predicate, patch)
    }

    fn delete_many<D: Document>(&self, filter: &dyn Fn(&D) -> bool) -> Result<usize, StoreError> {
        Self::armed(&self.failing_deletes, D::COLLECTION)?;
        self.inner.delete_many(filter)
    }

    fn delete_one<D: Document>(&self, id: &str) -> Result<bool, StoreError> {
        Self::armed(&self.failing_deletes, D::COLLECTION)?;
        self.inner.delete_one::<D>(id)
    }
}

/// Store whose every call fails as unreachable.
pub(super) struct UnavailableStore;

impl UnavailableStore {
    fn down<T>() -> Result<T, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

impl EntityStore for UnavailableStore {
    fn find_by_id<D: Document>(&self, _id: &str) -> Result<D, StoreError> {
        Self::down()
    }

    fn find<D: Document>(
        &self,
        _filter: &dyn Fn(&D) -> bool,
        _options: FindOptions<D>,
    ) -> Result<Vec<D>, StoreError> {
        Self::down()
    }

    fn insert<D: Document>(&self, _doc: D) -> Result<D, StoreError> {
        Self::down()
    }

    fn update_if<D: Document>(
        &self,
        _id: &str,
        _predicate: &dyn Fn(&D) -> bool,
        _patch: &mut dyn FnMut(&mut D),
    ) -> Result<D, StoreError> {
        Self::down()
    }

    fn delete_many<D: Document>(&self, _filter: &dyn Fn(&D) -> bool) -> Result<usize, StoreError> {
        Self::down()
    }

    fn delete_one<D: Document>(&self, _id: &str) -> Result<bool, StoreError> {
        Self::down()
    }
}

/// Store that answers reads only after a delay.
pub(super) struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

impl EntityStore for SlowStore {
    fn find_by_id<D: Document>(&self, id: &str) -> Result<D, StoreError> {
        std::thread::sleep(self.delay);
        self.inner.find_by_id(id)
    }

    fn find<D: Document>(
        &self,
        filter: &dyn Fn(&D) -> bool,
        options: FindOptions<D>,
    ) -> Result<Vec<D>, StoreError> {
        std::thread::sleep(self.delay);
        self.inner.find(filter, options)
    }

    fn insert<D: Document>(&self, doc: D) -> Result<D, StoreError> {
        self.inner.insert(doc)
    }

    fn update_if<D: Document>(
        &self,
        id: &str,
        predicate: &dyn Fn(&D) -> bool,
        patch: &mut dyn FnMut(&mut D),
    ) -> Result<D, StoreError> {
        self.inner.update_if(id, predicate, patch)
    }

    fn delete_many<D: Document>(&self, filter: &dyn Fn(&D) -> bool) -> Result<usize, StoreError> {
        self.inner.delete_many(filter)
    }

    fn delete_one<D: Document>(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_one::<D>(id)
    }
}

pub(super) fn router_for<S>(harness: &Harness<S>, timeout: Duration) -> axum::Router
where
    S: EntityStore + 'static,
{
    marketplace_router(MarketplaceState::new(
        Arc::clone(&harness.marketplace),
        timeout,
    ))
}

pub(super) fn json_request(
    method: &str,
    uri: &str,
    actor: Option<&Actor>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder
            .header("x-actor-id", actor.id.as_str())
            .header("x-actor-role", actor.role.label());
    }
    match body {
        Some(body) => builder
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(super) async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}
