use std::sync::Arc;

use super::booking::BookingLifecycleManager;
use super::feedback::FeedbackGuard;
use super::listing::ListingManager;
use super::moderation::ModerationCascadeEngine;
use super::settlement::{PaymentSettlementSimulator, SettlementGateway};
use super::store::EntityStore;

/// The managers sharing one store. Each collection is written only through the
/// manager that owns it.
pub struct Marketplace<S, G> {
    pub listings: ListingManager<S>,
    pub bookings: BookingLifecycleManager<S>,
    pub moderation: ModerationCascadeEngine<S>,
    pub payments: PaymentSettlementSimulator<S, G>,
    pub feedback: FeedbackGuard<S>,
    store: Arc<S>,
}

impl<S, G> Marketplace<S, G>
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    pub fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
        Self {
            listings: ListingManager::new(Arc::clone(&store)),
            bookings: BookingLifecycleManager::new(Arc::clone(&store)),
            moderation: ModerationCascadeEngine::new(Arc::clone(&store)),
            payments: PaymentSettlementSimulator::new(Arc::clone(&store), gateway),
            feedback: FeedbackGuard::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
