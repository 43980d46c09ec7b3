use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
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

string_id!(
    /// Identifier assigned to an order by the store at creation.
    OrderId
);
string_id!(
    /// Catalog entry reference.
    ServiceId
);
string_id!(
    /// Client (service receiver) profile id.
    CustomerId
);
string_id!(
    /// Partner (service provider) profile id.
    ProviderId
);
string_id!(
    /// Account id handed over by the identity boundary.
    UserId
);

/// Lifecycle status of an order. Drives marketplace visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    PaymentPending,
    PaymentCompleted,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Created,
        OrderStatus::PaymentPending,
        OrderStatus::PaymentCompleted,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::PaymentPending => "PAYMENT_PENDING",
            OrderStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.label() == normalized)
            .ok_or_else(|| format!("unknown order status '{value}'"))
    }
}

/// Payment state, tracked next to the order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Admin-controlled gate on partner participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
    Suspended,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Rejected => "REJECTED",
            VerificationStatus::Suspended => "SUSPENDED",
        }
    }
}

/// A single client request for one catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub service_id: ServiceId,
    pub customer_id: CustomerId,
    pub provider_id: Option<ProviderId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub final_price: Option<Decimal>,
    pub remarks_by_user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Unclaimed and paid: the marketplace listing predicate.
    pub fn is_listed(&self) -> bool {
        self.provider_id.is_none() && self.status == OrderStatus::PaymentCompleted
    }

    /// Short reference used in notification subjects.
    pub fn short_reference(&self) -> &str {
        let id = self.id.as_str();
        match id.char_indices().nth(8) {
            Some((end, _)) => &id[..end],
            None => id,
        }
    }
}

/// Insert payload handed to the order store; everything else is defaulted there.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub service_id: ServiceId,
    pub customer_id: CustomerId,
    pub remarks_by_user: Option<String>,
}

/// Client profile, created lazily on a first order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReceiver {
    pub id: CustomerId,
    pub user_id: UserId,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
}

/// Partner profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProvider {
    pub id: ProviderId,
    pub user_id: UserId,
    pub full_name: String,
    pub verification_status: VerificationStatus,
}

/// Orderable service definition as exposed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogService {
    pub id: ServiceId,
    pub document_type: String,
    pub region: String,
    pub is_active: bool,
}

/// How a caller names the service they want to order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRef {
    Id(ServiceId),
    Name(String),
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceRef::Id(id) => write!(f, "id {id}"),
            ServiceRef::Name(name) => write!(f, "'{name}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Client,
    Partner,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Partner => "PARTNER",
            Role::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Role::Client),
            "PARTNER" => Ok(Role::Partner),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Verified caller identity, as resolved by the authentication boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Client {
        user_id: UserId,
        name: Option<String>,
        email: Option<String>,
    },
    Partner {
        user_id: UserId,
    },
    Admin {
        user_id: UserId,
    },
}

impl Principal {
    pub fn client(user_id: impl Into<String>) -> Self {
        Principal::Client {
            user_id: UserId(user_id.into()),
            name: None,
            email: None,
        }
    }

    pub fn partner(user_id: impl Into<String>) -> Self {
        Principal::Partner {
            user_id: UserId(user_id.into()),
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Principal::Admin {
            user_id: UserId(user_id.into()),
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            Principal::Client { user_id, .. }
            | Principal::Partner { user_id }
            | Principal::Admin { user_id } => user_id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::Client { .. } => Role::Client,
            Principal::Partner { .. } => Role::Partner,
            Principal::Admin { .. } => Role::Admin,
        }
    }

    /// Name used for a lazily created client profile.
    pub fn display_name(&self) -> String {
        match self {
            Principal::Client { name, email, .. } => [name, email]
                .into_iter()
                .flatten()
                .map(|value| value.trim())
                .find(|value| !value.is_empty())
                .unwrap_or("Unknown")
                .to_string(),
            _ => "Unknown".to_string(),
        }
    }
}
