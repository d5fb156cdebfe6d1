use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderId;
use crate::domain::user::UserId;

pub const METADATA_CUSTOMER_USER_ID: &str = "customer_user_id";
pub const METADATA_ACTUAL_USER_ID: &str = "actual_user_id";
pub const METADATA_COUNTERPART_ROLE: &str = "counterpart_role";
pub const METADATA_CERTIFICATE_NUMBER: &str = "certificate_number";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Debit,
    Credit,
    Refund,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debit" => Some(Self::Debit),
            "credit" => Some(Self::Credit),
            "refund" => Some(Self::Refund),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" => Some(Self::Completed),
            "pending" => Some(Self::Pending),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One append-only ledger row. Rows are never updated or deleted; a booking
/// is reversed by inserting an offsetting refund/adjustment row. Negative
/// `amount` is a debit, positive a credit or refund.
///
/// Field names are the persisted wire shape consumed by dashboards and must
/// stay stable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTransaction {
    pub id: String,
    pub transaction_id: String,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    pub amount: Decimal,
    /// Present only when this row is one side of a dual customer/supervisor
    /// pair; always the unmarked-up value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_amount: Option<Decimal>,
    pub transaction_type: TransactionType,
    pub is_supervisor_transaction: bool,
    pub status: TransactionStatus,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl BalanceTransaction {
    pub fn is_insurance_row(&self) -> bool {
        self.metadata.contains_key(METADATA_CERTIFICATE_NUMBER)
    }

    /// Absolute magnitude, independent of the debit/credit sign convention.
    pub fn magnitude(&self) -> Decimal {
        self.amount.abs()
    }
}

/// Derived snapshot over the transaction ledger; a fast-read cache, not an
/// authoritative balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    pub user_id: UserId,
    pub current_balance: Decimal,
    pub available_balance: Decimal,
    pub pending_balance: Decimal,
    pub credit_limit: Decimal,
    pub currency: String,
}
