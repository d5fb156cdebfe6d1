//! Refund issuance and reconciliation against the original debit pair.
//!
//! A refund always mirrors the original dual debit: same order, same
//! magnitudes, opposite sign. At most one freight refund pair can ever exist
//! per order; a repeat attempt is a reported no-op, not an error.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::order::{Order, StatusHistoryEntry};
use crate::domain::transaction::{BalanceTransaction, TransactionStatus, TransactionType};
use crate::errors::LedgerError;
use crate::ledger::store::{LedgerStore, OrderStore, TransactionFilter};
use crate::ledger::writer::{
    new_transaction_id, DualTransactionReceipt, DualTransactionRequest, DualTransactionWriter,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefundTrigger {
    /// Explicit customer cancellation request.
    CustomerCancellation,
    /// Carrier sync discovered an unreconciled terminal refundable status.
    CarrierSync,
}

impl RefundTrigger {
    pub fn event_tag(self) -> &'static str {
        match self {
            Self::CustomerCancellation => "customer_cancellation_refund",
            Self::CarrierSync => "carrier_sync_refund",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefundOutcome {
    /// Idempotency short-circuit: a refund pair already exists. A no-op
    /// success, never an error.
    AlreadyRefunded,
    /// Full dual refund mirroring the original pair.
    Refunded(DualTransactionReceipt),
    /// The original supervisor debit was missing, so only the customer side
    /// was refunded. Explicit and logged; never a hidden fallback.
    Degraded { customer_refund: BalanceTransaction },
}

pub struct RefundEngine {
    ledger: Arc<dyn LedgerStore>,
    orders: Arc<dyn OrderStore>,
    writer: Arc<DualTransactionWriter>,
    audit: Arc<dyn AuditSink>,
}

impl RefundEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        orders: Arc<dyn OrderStore>,
        writer: Arc<DualTransactionWriter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { ledger, orders, writer, audit }
    }

    /// Refund the original debit pair for `order`. Idempotent per order.
    pub async fn refund_order(
        &self,
        order: &Order,
        reason: &str,
        trigger: RefundTrigger,
    ) -> Result<RefundOutcome, LedgerError> {
        if self.ledger.refund_exists_for_order(&order.id).await? {
            info!(
                event_name = "ledger.refund.already_refunded",
                order_id = %order.id,
                "refund already recorded, skipping"
            );
            return Ok(RefundOutcome::AlreadyRefunded);
        }

        let customer_debit = self
            .original_debit(order, false)
            .await?
            .ok_or_else(|| LedgerError::OriginalTransactionNotFound(order.id.clone()))?;

        let description = format!("Refund for order {}: {reason}", order.order_number);

        let outcome = match self.original_debit(order, true).await? {
            Some(supervisor_debit) => {
                let receipt = match self
                    .writer
                    .create_dual_transaction(
                        &customer_debit.user_id,
                        DualTransactionRequest {
                            order_id: Some(order.id.clone()),
                            order_number: Some(order.order_number.clone()),
                            description,
                            customer_amount: customer_debit.magnitude(),
                            base_amount: supervisor_debit.magnitude(),
                            transaction_type: TransactionType::Refund,
                            metadata: Default::default(),
                        },
                    )
                    .await
                {
                    Ok(receipt) => receipt,
                    // The store-level constraint caught a concurrent refund
                    // between our pre-check and the write.
                    Err(LedgerError::DuplicateRefund(_)) => {
                        return Ok(RefundOutcome::AlreadyRefunded);
                    }
                    Err(error) => return Err(error),
                };
                RefundOutcome::Refunded(receipt)
            }
            None => self.degraded_refund(order, &customer_debit, &description).await?,
        };

        let refunded_amount = customer_debit.magnitude();
        let entry = StatusHistoryEntry::new(order.status, trigger.event_tag())
            .with_refunded_amount(refunded_amount);
        if let Err(error) = self.orders.append_status_history(&order.id, entry).await {
            // The refund rows are committed; a history miss is bookkeeping
            // for manual follow-up, not a reason to fail the refund.
            warn!(
                event_name = "ledger.refund.history_append_failed",
                order_id = %order.id,
                error = %error,
                "refund committed but status history append failed"
            );
        }

        Ok(outcome)
    }

    async fn original_debit(
        &self,
        order: &Order,
        is_supervisor: bool,
    ) -> Result<Option<BalanceTransaction>, LedgerError> {
        let filter = TransactionFilter {
            order_id: Some(order.id.clone()),
            transaction_type: Some(TransactionType::Debit),
            is_supervisor: Some(is_supervisor),
            ..TransactionFilter::default()
        };
        let rows = self.ledger.transactions_matching(&filter).await?;
        Ok(rows.into_iter().find(|row| !row.is_insurance_row()))
    }

    async fn degraded_refund(
        &self,
        order: &Order,
        customer_debit: &BalanceTransaction,
        description: &str,
    ) -> Result<RefundOutcome, LedgerError> {
        warn!(
            event_name = "ledger.refund.degraded_single_sided",
            order_id = %order.id,
            amount = %customer_debit.magnitude(),
            "supervisor debit missing; issuing single-sided customer refund"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(order.id.clone()),
                order.order_number.clone(),
                "refund.degraded_single_sided",
                AuditCategory::Refund,
                "refund-engine",
                AuditOutcome::Degraded,
            )
            .with_metadata("refunded_amount", customer_debit.magnitude().to_string()),
        );

        let refund = BalanceTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id: new_transaction_id(),
            user_id: customer_debit.user_id.clone(),
            order_id: Some(order.id.clone()),
            order_number: Some(order.order_number.clone()),
            amount: customer_debit.magnitude(),
            base_amount: None,
            transaction_type: TransactionType::Refund,
            is_supervisor_transaction: false,
            status: TransactionStatus::Completed,
            description: description.to_string(),
            metadata: Default::default(),
            created_at: chrono::Utc::now(),
        };

        match self.ledger.insert_transaction(refund.clone()).await {
            Ok(()) => Ok(RefundOutcome::Degraded { customer_refund: refund }),
            Err(crate::errors::StoreError::DuplicateRefund(_)) => {
                Ok(RefundOutcome::AlreadyRefunded)
            }
            Err(error) => Err(error.into()),
        }
    }
}
