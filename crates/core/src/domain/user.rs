use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Unknown roles deserialize to `Unknown` and are priced at ratio zero,
/// never rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Customer,
    #[serde(other)]
    Unknown,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Customer => "customer",
            Self::Unknown => "unknown",
        }
    }

    /// Unrecognised roles map to `Unknown`, same as the serde path.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "admin" => Self::Admin,
            "customer" => Self::Customer,
            _ => Self::Unknown,
        }
    }
}

/// Resolved acting user, as handed over by the identity layer. The ledger
/// core trusts this tuple as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub role: UserRole,
    /// Markup percentage over base cost. `20` means 20%, not `0.2`.
    /// Only customers carry a non-zero ratio.
    pub price_ratio: Decimal,
    pub is_active: bool,
    /// Marks the account that holds the base-cost side of every dual write.
    #[serde(default)]
    pub is_supervisor: bool,
}

impl User {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role: UserRole::Admin,
            price_ratio: Decimal::ZERO,
            is_active: true,
            is_supervisor: false,
        }
    }

    pub fn customer(id: impl Into<String>, price_ratio: Decimal) -> Self {
        Self {
            id: UserId(id.into()),
            role: UserRole::Customer,
            price_ratio,
            is_active: true,
            is_supervisor: false,
        }
    }

    pub fn supervisor(id: impl Into<String>) -> Self {
        Self { is_supervisor: true, ..Self::admin(id) }
    }
}
