use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered account (tenant, owner, or admin).
    UserId,
    "usr"
);
entity_id!(PropertyId, "prop");
entity_id!(BookingId, "bkg");
entity_id!(PaymentId, "pay");
entity_id!(FeedbackId, "fbk");
entity_id!(ReportId, "rpt");

/// Account role supplied by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Tenant,
    Owner,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Tenant => "Tenant",
            Role::Owner => "Owner",
            Role::Admin => "Admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tenant" => Ok(Role::Tenant),
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownVariant::new("role", value)),
        }
    }
}

/// Already-verified caller identity; the core never re-derives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is(&self, user: &UserId) -> bool {
        &self.id == user
    }
}

/// Raised when a free-form string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyStatus {
    Pending,
    Approved,
    Rejected,
    Rented,
    Maintenance,
}

impl FromStr for PropertyStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Rented" => Ok(Self::Rented),
            "Maintenance" => Ok(Self::Maintenance),
            _ => Err(UnknownVariant::new("property status", value)),
        }
    }
}

/// A listing. `is_available` is only ever true while `status` is Approved, and
/// `rented_under` names the approved booking holding the listing while Rented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub owner: UserId,
    pub title: String,
    pub description: String,
    pub city: String,
    pub rent: u64,
    pub security_deposit: u64,
    pub status: PropertyStatus,
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rented_under: Option<BookingId>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn is_open_for_booking(&self) -> bool {
        self.is_available && self.status == PropertyStatus::Approved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Pending and Approved bookings hold the (tenant, property) slot.
    pub const fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Approved => "Approved",
            BookingStatus::Rejected => "Rejected",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Cancelled" => Ok(Self::Cancelled),
            "Completed" => Ok(Self::Completed),
            _ => Err(UnknownVariant::new("booking status", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub message: String,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitStatus {
    Scheduled,
    Completed,
    Cancelled,
    Rescheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitSchedule {
    pub is_scheduled: bool,
    pub visit_date: NaiveDate,
    pub visit_time: String,
    pub visit_status: VisitStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub property: PropertyId,
    pub tenant: UserId,
    pub owner: UserId,
    pub status: BookingStatus,
    pub move_in_date: NaiveDate,
    pub lease_duration_months: u32,
    pub monthly_rent: u64,
    pub security_deposit: u64,
    pub total_amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_response: Option<OwnerResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_scheduled: Option<VisitSchedule>,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    Rent,
    #[serde(rename = "Security Deposit")]
    SecurityDeposit,
    Maintenance,
    #[serde(rename = "Late Fee")]
    LateFee,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    #[serde(rename = "UPI")]
    Upi,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    Cash,
    #[default]
    Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// Opaque settlement payload written by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GatewayResponse {
    Success {
        transaction_id: String,
        processed_at: DateTime<Utc>,
        card_last4: String,
    },
    Failed {
        error: String,
        processed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub tenant: UserId,
    pub property: PropertyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingId>,
    pub amount: u64,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub payment_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_response: Option<GatewayResponse>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

/// Optional per-category scores; absent categories are excluded from averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRatings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanliness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amenities: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_behavior: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_for_money: Option<u8>,
}

impl CategoryRatings {
    pub fn entries(&self) -> [(RatingCategory, Option<u8>); 5] {
        [
            (RatingCategory::Cleanliness, self.cleanliness),
            (RatingCategory::Location, self.location),
            (RatingCategory::Amenities, self.amenities),
            (RatingCategory::OwnerBehavior, self.owner_behavior),
            (RatingCategory::ValueForMoney, self.value_for_money),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RatingCategory {
    Cleanliness,
    Location,
    Amenities,
    OwnerBehavior,
    ValueForMoney,
}

impl RatingCategory {
    pub const fn label(self) -> &'static str {
        match self {
            RatingCategory::Cleanliness => "cleanliness",
            RatingCategory::Location => "location",
            RatingCategory::Amenities => "amenities",
            RatingCategory::OwnerBehavior => "ownerBehavior",
            RatingCategory::ValueForMoney => "valueForMoney",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub tenant: UserId,
    pub property: PropertyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingId>,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub categories: CategoryRatings,
    pub is_visible: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending,
    Reviewed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportAction {
    Ignore,
    #[serde(rename = "Remove_Property")]
    RemoveProperty,
    #[serde(rename = "Remove_Owner")]
    RemoveOwner,
}

impl ReportAction {
    pub const fn label(self) -> &'static str {
        match self {
            ReportAction::Ignore => "Ignore",
            ReportAction::RemoveProperty => "Remove_Property",
            ReportAction::RemoveOwner => "Remove_Owner",
        }
    }
}

impl FromStr for ReportAction {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Ignore" => Ok(Self::Ignore),
            "Remove_Property" => Ok(Self::RemoveProperty),
            "Remove_Owner" => Ok(Self::RemoveOwner),
            _ => Err(UnknownVariant::new("report action", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub property: PropertyId,
    pub owner: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<UserId>,
    pub category: String,
    pub details: String,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ReportAction>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}
