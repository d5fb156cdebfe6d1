//! Customer-initiated order cancellation.
//!
//! Cancellation and refund bookkeeping are reported on independent channels:
//! a committed cancellation is presented as a success even when the refund
//! write fails, and the refund failure is logged and audited for manual
//! reconciliation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::order::{OrderId, OrderStatus, StatusHistoryEntry};
use crate::errors::LedgerError;
use crate::gateway::{CarrierCancelResponse, CarrierGateway};
use crate::ledger::refund::{RefundEngine, RefundOutcome, RefundTrigger};
use crate::ledger::store::OrderStore;

#[derive(Clone, Debug)]
pub struct CancellationReceipt {
    pub order_id: OrderId,
    pub cancelled_at: DateTime<Utc>,
    pub audit_remark: Option<String>,
}

/// The two independent channels of a cancellation: the cancellation itself
/// (already committed when this struct exists) and the refund bookkeeping.
#[derive(Debug)]
pub struct CancellationOutcome {
    pub receipt: CancellationReceipt,
    pub refund: Result<RefundOutcome, LedgerError>,
}

/// Whether the carrier accepted the cancellation. Structured success is the
/// `ok` flag; on top of that, the carrier sometimes reports a completed
/// cancellation through the error channel with the literal message
/// "success". Compatibility shim for that quirk; revisit if the upstream API
/// stabilises.
pub fn carrier_accepted(response: &CarrierCancelResponse) -> bool {
    if response.ok {
        return true;
    }
    response
        .message
        .as_deref()
        .map(|message| message.trim().eq_ignore_ascii_case("success"))
        .unwrap_or(false)
}

pub struct CancellationService {
    orders: Arc<dyn OrderStore>,
    carrier: Arc<dyn CarrierGateway>,
    refunds: Arc<RefundEngine>,
    audit: Arc<dyn AuditSink>,
}

impl CancellationService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        carrier: Arc<dyn CarrierGateway>,
        refunds: Arc<RefundEngine>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { orders, carrier, refunds, audit }
    }

    /// Cancel `order_id` with the carrier and issue the refund. Allowed only
    /// while the order is still in review. An error from this method means
    /// the cancellation itself did not happen; refund problems surface on
    /// the outcome's refund channel instead.
    pub async fn cancel_order(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<CancellationOutcome, LedgerError> {
        let mut order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| LedgerError::OrderNotFound(order_id.clone()))?;

        if order.status != OrderStatus::PendingReview {
            return Err(LedgerError::InvalidOrderTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        let response = self.carrier.cancel_order(&order.order_number, reason).await?;
        if !carrier_accepted(&response) {
            return Err(LedgerError::ExternalApi(format!(
                "carrier declined cancellation of {}: {}",
                order.order_number,
                response.message.as_deref().unwrap_or("no message")
            )));
        }

        order.transition_to(OrderStatus::Cancelled)?;
        self.orders.update_status(order_id, OrderStatus::Cancelled).await?;
        self.orders
            .append_status_history(
                order_id,
                StatusHistoryEntry::new(OrderStatus::Cancelled, "customer_cancellation"),
            )
            .await?;
        info!(
            event_name = "ledger.cancel.committed",
            order_id = %order_id,
            "order cancelled with carrier"
        );

        let refund = self
            .refunds
            .refund_order(&order, reason, RefundTrigger::CustomerCancellation)
            .await;
        if let Err(refund_error) = &refund {
            error!(
                event_name = "ledger.refund.bookkeeping_failed",
                order_id = %order_id,
                error = %refund_error,
                "cancellation committed but refund bookkeeping failed"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(order_id.clone()),
                    order.order_number.clone(),
                    "refund.bookkeeping_failed",
                    AuditCategory::Refund,
                    "cancellation-service",
                    AuditOutcome::Failed,
                )
                .with_metadata("error", refund_error.to_string()),
            );
        }

        Ok(CancellationOutcome {
            receipt: CancellationReceipt {
                order_id: order_id.clone(),
                cancelled_at: Utc::now(),
                audit_remark: response.audit_remark,
            },
            refund,
        })
    }
}
