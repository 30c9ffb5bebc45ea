//! Entity store contract consumed by the marketplace managers.
//!
//! The store behaves like a document database: single-document atomic updates,
//! predicate queries, bulk deletes, and a uniqueness constraint declared per
//! document type. There are no multi-document transactions; managers order their
//! writes instead.

mod memory;

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::domain::{Booking, Feedback, Payment, Property, Report, User};

pub use memory::MemoryStore;

/// Named record collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Properties,
    Bookings,
    Payments,
    Feedback,
    Reports,
}

impl Collection {
    pub const fn label(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Properties => "properties",
            Collection::Bookings => "bookings",
            Collection::Payments => "payments",
            Collection::Feedback => "feedback",
            Collection::Reports => "reports",
        }
    }
}

/// A record type persisted in one collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn key(&self) -> &str;

    /// Value of the collection's uniqueness constraint for this document, if it
    /// currently participates in one. Two documents of the same collection may
    /// never share a key.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Document for Property {
    const COLLECTION: Collection = Collection::Properties;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Document for Booking {
    const COLLECTION: Collection = Collection::Bookings;

    fn key(&self) -> &str {
        self.id.as_str()
    }

    // Partial index: only Pending/Approved bookings hold the (tenant, property) slot.
    fn unique_key(&self) -> Option<String> {
        self.status
            .is_active()
            .then(|| format!("{}:{}", self.tenant, self.property))
    }
}

impl Document for Payment {
    const COLLECTION: Collection = Collection::Payments;

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.transaction_id.clone())
    }
}

impl Document for Feedback {
    const COLLECTION: Collection = Collection::Feedback;

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}:{}", self.tenant, self.property))
    }
}

impl Document for Report {
    const COLLECTION: Collection = Collection::Reports;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Sort, skip, and limit applied to `find` results.
pub struct FindOptions<D> {
    pub sort: Option<fn(&D, &D) -> Ordering>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl<D> Default for FindOptions<D> {
    fn default() -> Self {
        Self {
            sort: None,
            skip: 0,
            limit: None,
        }
    }
}

impl<D> FindOptions<D> {
    pub fn sorted(sort: fn(&D, &D) -> Ordering) -> Self {
        Self {
            sort: Some(sort),
            ..Self::default()
        }
    }

    pub fn page(mut self, skip: usize, limit: Option<usize>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }
}

/// Storage abstraction shared by every manager.
pub trait EntityStore: Send + Sync {
    fn find_by_id<D: Document>(&self, id: &str) -> Result<D, StoreError>;

    fn find<D: Document>(
        &self,
        filter: &dyn Fn(&D) -> bool,
        options: FindOptions<D>,
    ) -> Result<Vec<D>, StoreError>;

    /// Fails with `Conflict` when the id or the document's unique key is taken.
    fn insert<D: Document>(&self, doc: D) -> Result<D, StoreError>;

    /// Applies `patch` only if `predicate` holds for the stored document.
    fn update_if<D: Document>(
        &self,
        id: &str,
        predicate: &dyn Fn(&D) -> bool,
        patch: &mut dyn FnMut(&mut D),
    ) -> Result<D, StoreError>;

    fn delete_many<D: Document>(&self, filter: &dyn Fn(&D) -> bool) -> Result<usize, StoreError>;

    fn delete_one<D: Document>(&self, id: &str) -> Result<bool, StoreError>;

    fn find_all<D: Document>(&self, filter: &dyn Fn(&D) -> bool) -> Result<Vec<D>, StoreError> {
        self.find(filter, FindOptions::default())
    }

    fn update<D: Document>(
        &self,
        id: &str,
        patch: &mut dyn FnMut(&mut D),
    ) -> Result<D, StoreError> {
        self.update_if(id, &|_: &D| true, patch)
    }
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{} record '{}' not found", .0.label(), .1)]
    NotFound(Collection, String),
    #[error("{} uniqueness constraint violated", .0.label())]
    Conflict(Collection),
    #[error("{} record '{}' changed concurrently", .0.label(), .1)]
    PredicateFailed(Collection, String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out")]
    Timeout,
    #[error("stored document could not be decoded: {0}")]
    Corrupt(String),
}
