use thiserror::Error;

use crate::domain::order::{OrderId, OrderStatus};

/// Failures of the pure pricing math. Rejected before anything is written.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("invalid monetary input: {0}")]
    InvalidInput(String),
    #[error("a price ratio of -100 percent divides by zero")]
    RatioDividesByZero,
}

/// Failures raised by ledger stores. Implementations map their backend
/// errors into these variants.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("refund pair already recorded for order {0}")]
    DuplicateRefund(String),
    #[error("row not found: {0}")]
    NotFound(String),
}

/// Ledger-mutating failures. Always returned to the caller as values; the
/// core never throws past its boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no supervisor account is configured")]
    NoSupervisorFound,
    #[error("original transaction pair not found for order {0}")]
    OriginalTransactionNotFound(OrderId),
    #[error("refund pair already recorded for order {0}")]
    DuplicateRefund(String),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("certificate {0} not found")]
    CertificateNotFound(String),
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("store failure: {0}")]
    Store(String),
    #[error("manual intervention required: {0}")]
    ManualInterventionRequired(String),
    #[error("external api failure: {0}")]
    ExternalApi(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateRefund(order_id) => Self::DuplicateRefund(order_id),
            other => Self::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LedgerError, PricingError, StoreError};

    #[test]
    fn pricing_errors_lift_into_ledger_errors() {
        let error = LedgerError::from(PricingError::RatioDividesByZero);
        assert!(matches!(error, LedgerError::Pricing(PricingError::RatioDividesByZero)));
    }

    #[test]
    fn duplicate_refund_store_errors_keep_their_identity() {
        let error = LedgerError::from(StoreError::DuplicateRefund("O-1".to_string()));
        assert!(matches!(error, LedgerError::DuplicateRefund(ref id) if id == "O-1"));
    }

    #[test]
    fn backend_store_errors_collapse_to_store_failures() {
        let error = LedgerError::from(StoreError::Backend("disk full".to_string()));
        assert!(matches!(error, LedgerError::Store(ref message) if message.contains("disk full")));
    }
}
