use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::LedgerError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingReview,
    Confirmed,
    InTransit,
    Delivered,
    Exception,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Delivered | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Confirmed => "confirmed",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Exception => "exception",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending_review" => Some(Self::PendingReview),
            "confirmed" => Some(Self::Confirmed),
            "in_transit" => Some(Self::InTransit),
            "delivered" => Some(Self::Delivered),
            "exception" => Some(Self::Exception),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Append-only record of one status change on an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub occurred_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_amount: Option<Decimal>,
}

impl StatusHistoryEntry {
    pub fn new(status: OrderStatus, event: impl Into<String>) -> Self {
        Self { occurred_at: Utc::now(), status, event: event.into(), refunded_amount: None }
    }

    pub fn with_refunded_amount(mut self, amount: Decimal) -> Self {
        self.refunded_amount = Some(amount);
        self
    }
}

/// A freight shipment booking. `amount` is always the customer-facing
/// (marked-up) price; the base price is derived from the ledger, never
/// stored here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub owner_user_id: UserId,
    pub order_number: String,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub company_name: String,
    #[serde(default)]
    pub has_insurance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_certificate: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry>,
}

impl Order {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self.status, next) {
            (OrderStatus::PendingReview, OrderStatus::Confirmed)
            | (OrderStatus::PendingReview, OrderStatus::Rejected)
            | (OrderStatus::Confirmed, OrderStatus::InTransit)
            | (OrderStatus::InTransit, OrderStatus::Delivered)
            | (OrderStatus::InTransit, OrderStatus::Exception)
            | (OrderStatus::Exception, OrderStatus::Delivered) => true,
            // Any non-terminal order can be cancelled.
            (from, OrderStatus::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), LedgerError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(LedgerError::InvalidOrderTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{Order, OrderId, OrderStatus};
    use crate::domain::user::UserId;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId("O-1".to_string()),
            owner_user_id: UserId("u-cust".to_string()),
            order_number: "FD-2026-0001".to_string(),
            status,
            amount: Decimal::new(12_000, 2),
            company_name: "Acme Logistics".to_string(),
            has_insurance: false,
            insurance_certificate: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status_history: Vec::new(),
        }
    }

    #[test]
    fn allows_booking_lifecycle_transitions() {
        let mut order = order(OrderStatus::PendingReview);
        order.transition_to(OrderStatus::Confirmed).expect("pending_review -> confirmed");
        order.transition_to(OrderStatus::InTransit).expect("confirmed -> in_transit");
        order.transition_to(OrderStatus::Delivered).expect("in_transit -> delivered");
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn any_non_terminal_order_can_cancel() {
        for status in [OrderStatus::PendingReview, OrderStatus::Confirmed, OrderStatus::InTransit] {
            let mut order = order(status);
            order.transition_to(OrderStatus::Cancelled).expect("non-terminal -> cancelled");
        }
    }

    #[test]
    fn terminal_orders_reject_further_transitions() {
        for status in [OrderStatus::Cancelled, OrderStatus::Delivered, OrderStatus::Rejected] {
            let mut order = order(status);
            let error = order
                .transition_to(OrderStatus::Confirmed)
                .expect_err("terminal order must not transition");
            assert!(matches!(
                error,
                crate::errors::LedgerError::InvalidOrderTransition { .. }
            ));
        }
    }

    #[test]
    fn cancelled_order_cannot_be_recancelled() {
        let mut order = order(OrderStatus::Cancelled);
        assert!(order.transition_to(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in [
            OrderStatus::PendingReview,
            OrderStatus::Confirmed,
            OrderStatus::InTransit,
            OrderStatus::Delivered,
            OrderStatus::Exception,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
    }
}
