//! Payment recording and the settlement simulator.
//!
//! Payments are recorded as Completed. `process` re-evaluates one through a
//! [`SettlementGateway`]; the default gateway flips a weighted coin, tests inject
//! a fixed outcome.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::access::{authorize, Capability, Target};
use super::domain::{
    Actor, Booking, BookingId, GatewayResponse, Payment, PaymentId, PaymentMethod, PaymentStatus,
    PaymentType, Property, PropertyId, Role, UserId,
};
use super::error::MarketplaceError;
use super::store::{EntityStore, FindOptions, StoreError};

const DESCRIPTION_MAX: usize = 200;
const DECLINED: &str = "Transaction declined by bank";

#[derive(Clone, Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    #[serde(default)]
    pub expiry_date: String,
    #[serde(default)]
    pub cvv: String,
    #[serde(default)]
    pub card_holder_name: String,
}

impl CardDetails {
    fn digits(&self) -> String {
        self.card_number
            .chars()
            .filter(char::is_ascii_digit)
            .collect()
    }

    /// Last four digits of the card number, if it has at least four.
    pub fn last4(&self) -> Option<String> {
        let digits = self.digits();
        (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string())
    }

    pub fn masked(&self) -> String {
        match self.last4() {
            Some(last4) => format!("**** **** **** {last4}"),
            None => "****".to_string(),
        }
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("card_number", &self.masked())
            .field("card_holder_name", &self.card_holder_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Success {
        transaction_ref: Option<String>,
        masked_card: String,
    },
    Failure {
        reason: String,
    },
}

/// Payment gateway seam.
pub trait SettlementGateway: Send + Sync {
    fn settle(&self, card: &CardDetails) -> SettlementOutcome;
}

/// Bernoulli stand-in for a real gateway.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedGateway {
    success_rate: f64,
}

impl SimulatedGateway {
    pub const DEFAULT_SUCCESS_RATE: f64 = 0.9;

    /// Clamps the rate into `[0, 1]`; a non-finite rate falls back to the default.
    pub fn new(success_rate: f64) -> Self {
        let success_rate = if success_rate.is_finite() {
            success_rate.clamp(0.0, 1.0)
        } else {
            Self::DEFAULT_SUCCESS_RATE
        };
        Self { success_rate }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SUCCESS_RATE)
    }
}

impl SettlementGateway for SimulatedGateway {
    fn settle(&self, card: &CardDetails) -> SettlementOutcome {
        if rand::thread_rng().gen_bool(self.success_rate) {
            SettlementOutcome::Success {
                transaction_ref: None,
                masked_card: card.masked(),
            }
        } else {
            SettlementOutcome::Failure {
                reason: DECLINED.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub property_id: PropertyId,
    #[serde(default)]
    pub booking_id: Option<BookingId>,
    pub amount: u64,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReceipt {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub amount: u64,
    pub payment_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PaymentStats {
    pub total_revenue: u64,
    pub total_payments: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub refunded: usize,
}

pub struct PaymentSettlementSimulator<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
}

impl<S, G> PaymentSettlementSimulator<S, G>
where
    S: EntityStore + 'static,
    G: SettlementGateway + 'static,
{
    pub fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
        Self { store, gateway }
    }

    pub fn create_payment(
        &self,
        actor: &Actor,
        request: PaymentRequest,
    ) -> Result<Payment, MarketplaceError> {
        authorize(actor, Capability::MakePayment, Target::Platform).require()?;
        if request.amount == 0 {
            return Err(MarketplaceError::validation("amount must be positive"));
        }
        if let Some(description) = &request.description {
            if description.chars().count() > DESCRIPTION_MAX {
                return Err(MarketplaceError::validation(format!(
                    "description cannot exceed {DESCRIPTION_MAX} characters"
                )));
            }
        }

        let property: Property = self.store.find_by_id(request.property_id.as_str())?;
        if let Some(booking_id) = &request.booking_id {
            let booking: Booking = self.store.find_by_id(booking_id.as_str())?;
            authorize(actor, Capability::MakePayment, Target::Booking(&booking)).require()?;
            if booking.property != property.id {
                return Err(MarketplaceError::validation(
                    "booking does not belong to this property",
                ));
            }
        }

        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::generate(),
            tenant: actor.id.clone(),
            property: property.id,
            booking: request.booking_id,
            amount: request.amount,
            payment_type: request.payment_type,
            payment_method: request.payment_method,
            status: PaymentStatus::Completed,
            transaction_id: request
                .transaction_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| transaction_id(now)),
            description: request.description,
            due_date: request.due_date.unwrap_or_else(|| now.date_naive()),
            payment_date: now,
            gateway_response: None,
        };

        let stored = self.store.insert(payment).map_err(|err| match err {
            StoreError::Conflict(_) => {
                MarketplaceError::Conflict("transaction id already recorded".to_string())
            }
            other => other.into(),
        })?;
        info!(
            payment = %stored.id,
            property = %stored.property,
            amount = stored.amount,
            "payment recorded"
        );
        Ok(stored)
    }

    /// Runs the payment through the gateway and records the outcome.
    pub fn process(
        &self,
        actor: &Actor,
        payment_id: &PaymentId,
        card: CardDetails,
    ) -> Result<SettlementReceipt, MarketplaceError> {
        let payment: Payment = self.store.find_by_id(payment_id.as_str())?;
        authorize(actor, Capability::ProcessPayment, Target::Payment(&payment)).require()?;
        if payment.status == PaymentStatus::Refunded {
            return Err(MarketplaceError::invalid_state(
                "refunded payments cannot be processed",
            ));
        }
        let last4 = card.last4().ok_or_else(|| {
            MarketplaceError::validation("card number must contain at least 4 digits")
        })?;

        let outcome = self.gateway.settle(&card);
        let processed_at = Utc::now();
        let (status, response) = match outcome {
            SettlementOutcome::Success {
                transaction_ref, ..
            } => (
                PaymentStatus::Completed,
                GatewayResponse::Success {
                    transaction_id: transaction_ref
                        .unwrap_or_else(|| payment.transaction_id.clone()),
                    processed_at,
                    card_last4: last4,
                },
            ),
            SettlementOutcome::Failure { reason } => (
                PaymentStatus::Failed,
                GatewayResponse::Failed {
                    error: reason,
                    processed_at,
                },
            ),
        };

        let updated = self
            .store
            .update_if::<Payment>(
                payment_id.as_str(),
                &|stored| stored.status != PaymentStatus::Refunded,
                &mut |stored| {
                    stored.status = status;
                    stored.payment_date = processed_at;
                    stored.gateway_response = Some(response.clone());
                },
            )
            .map_err(|err| match err {
                StoreError::PredicateFailed(_, _) => MarketplaceError::invalid_state(
                    "payment was refunded while processing",
                ),
                other => other.into(),
            })?;

        if updated.status == PaymentStatus::Failed {
            warn!(payment = %updated.id, card = %card.masked(), "settlement declined");
        } else {
            info!(payment = %updated.id, card = %card.masked(), "settlement completed");
        }

        Ok(SettlementReceipt {
            payment_id: updated.id,
            status: updated.status,
            transaction_id: updated.transaction_id,
            amount: updated.amount,
            payment_date: updated.payment_date,
        })
    }

    /// Tenants see their own payments, owners payments on their listings,
    /// admins everything. Newest first.
    pub fn payments_for(&self, actor: &Actor) -> Result<Vec<Payment>, MarketplaceError> {
        let scope = self.scope(actor)?;
        let payments = self.store.find(
            &|payment: &Payment| scope.includes(payment),
            FindOptions::sorted(|a: &Payment, b: &Payment| b.payment_date.cmp(&a.payment_date)),
        )?;
        Ok(payments)
    }

    pub fn payment_stats(&self, actor: &Actor) -> Result<PaymentStats, MarketplaceError> {
        authorize(actor, Capability::ViewPaymentStats, Target::Platform).require()?;
        let scope = self.scope(actor)?;
        let payments = self
            .store
            .find_all(&|payment: &Payment| scope.includes(payment))?;
        Ok(tally(&payments))
    }

    fn scope(&self, actor: &Actor) -> Result<PaymentScope, MarketplaceError> {
        Ok(match actor.role {
            Role::Admin => PaymentScope::All,
            Role::Tenant => PaymentScope::Tenant(actor.id.clone()),
            Role::Owner => PaymentScope::Properties(
                self.store
                    .find_all(&|property: &Property| actor.is(&property.owner))?
                    .into_iter()
                    .map(|property| property.id)
                    .collect(),
            ),
        })
    }
}

enum PaymentScope {
    All,
    Tenant(UserId),
    Properties(Vec<PropertyId>),
}

impl PaymentScope {
    fn includes(&self, payment: &Payment) -> bool {
        match self {
            PaymentScope::All => true,
            PaymentScope::Tenant(tenant) => &payment.tenant == tenant,
            PaymentScope::Properties(ids) => ids.contains(&payment.property),
        }
    }
}

pub(crate) fn tally(payments: &[Payment]) -> PaymentStats {
    payments
        .iter()
        .fold(PaymentStats::default(), |mut stats, payment| {
            stats.total_payments += 1;
            match payment.status {
                PaymentStatus::Completed => {
                    stats.completed += 1;
                    stats.total_revenue += payment.amount;
                }
                PaymentStatus::Pending => stats.pending += 1,
                PaymentStatus::Failed => stats.failed += 1,
                PaymentStatus::Refunded => stats.refunded += 1,
            }
            stats
        })
}

fn transaction_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect();
    format!("TXN{}{suffix}", now.timestamp_millis())
}
