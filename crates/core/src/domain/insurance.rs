use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderId;

/// Hours after purchase during which a cancelled certificate is still
/// premium-refundable. Fixed by the insurer.
pub const REFUND_WINDOW_HOURS: i64 = 24;

/// Fixed insurer cancellation reason codes. The wire codes are what the
/// insurance API accepts; nothing else is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReasonCode {
    CancelledShipment,
    DuplicatePolicy,
    NoLongerRequired,
    IncorrectDetails,
    AlternativeCover,
    UnsupportedCommodity,
    PriceObjection,
    Other,
}

impl CancellationReasonCode {
    pub fn wire_code(self) -> &'static str {
        match self {
            Self::CancelledShipment => "CANSHIP",
            Self::DuplicatePolicy => "DUPLICATE",
            Self::NoLongerRequired => "NOTREQ",
            Self::IncorrectDetails => "DETAILS",
            Self::AlternativeCover => "ALTCOVER",
            Self::UnsupportedCommodity => "COMMODITY",
            Self::PriceObjection => "PRICE",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Cancelled,
}

impl CertificateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A purchased cargo-insurance certificate. Both the customer premium and
/// the reconstructable base premium are persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceCertificate {
    pub certificate_number: String,
    pub order_id: OrderId,
    pub premium: Decimal,
    pub base_premium: Decimal,
    pub status: CertificateStatus,
    pub purchased_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl InsuranceCertificate {
    /// Whether a cancellation at `at` still qualifies for a premium refund.
    pub fn refund_eligible_at(&self, at: DateTime<Utc>) -> bool {
        at - self.purchased_at <= Duration::hours(REFUND_WINDOW_HOURS)
    }
}
