//! Rental marketplace core: listings, the booking lifecycle, moderation
//! cascades, payment settlement, and feedback, kept consistent across
//! collections of a document store without multi-document transactions.

pub mod access;
pub mod booking;
pub mod domain;
pub mod error;
pub mod feedback;
pub mod listing;
pub mod moderation;
pub mod router;
pub mod service;
pub mod settlement;
pub mod store;

#[cfg(test)]
mod tests;

pub use access::{authorize, Access, Capability, Target};
pub use booking::{BookingLifecycleManager, BookingRequest, StatusChange, VisitRequest};
pub use domain::{
    Actor, Booking, BookingId, BookingStatus, CategoryRatings, Feedback, FeedbackId,
    GatewayResponse, Payment, PaymentId, PaymentMethod, PaymentStatus, PaymentType, Property,
    PropertyId, PropertyStatus, RatingCategory, Report, ReportAction, ReportId, ReportStatus,
    Role, User, UserId,
};
pub use error::MarketplaceError;
pub use feedback::{FeedbackEdit, FeedbackGuard, FeedbackSubmission, FeedbackSummary, PropertyFeedback};
pub use listing::{ListingDraft, ListingEdit, ListingManager};
pub use moderation::{CascadeSummary, ModerationCascadeEngine, ReportSubmission, ReviewOutcome};
pub use router::{marketplace_router, MarketplaceState};
pub use service::Marketplace;
pub use settlement::{
    CardDetails, PaymentRequest, PaymentSettlementSimulator, PaymentStats, SettlementGateway,
    SettlementOutcome, SettlementReceipt, SimulatedGateway,
};
pub use store::{EntityStore, MemoryStore, StoreError};
