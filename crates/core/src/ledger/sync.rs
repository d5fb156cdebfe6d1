//! Carrier-status reconciliation.
//!
//! Pulls the carrier's view of an order and maps it onto the local state
//! machine. A locally cancelled order is never overwritten, and a terminal
//! refundable status discovered here converges on the exact same refund path
//! as an explicit cancellation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::order::{OrderId, OrderStatus, StatusHistoryEntry};
use crate::errors::LedgerError;
use crate::gateway::CarrierGateway;
use crate::ledger::refund::{RefundEngine, RefundOutcome, RefundTrigger};
use crate::ledger::store::OrderStore;

#[derive(Debug)]
pub enum SyncOutcome {
    /// Carrier and local status agree; nothing written.
    Unchanged,
    /// Local status is terminal; the carrier view is ignored.
    SkippedTerminal,
    /// Local status updated. The refund channel is populated when the new
    /// status is refundable.
    Updated { from: OrderStatus, to: OrderStatus, refund: Option<Result<RefundOutcome, LedgerError>> },
}

pub struct StatusSync {
    orders: Arc<dyn OrderStore>,
    carrier: Arc<dyn CarrierGateway>,
    refunds: Arc<RefundEngine>,
}

impl StatusSync {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        carrier: Arc<dyn CarrierGateway>,
        refunds: Arc<RefundEngine>,
    ) -> Self {
        Self { orders, carrier, refunds }
    }

    pub async fn sync_order(&self, order_id: &OrderId) -> Result<SyncOutcome, LedgerError> {
        let mut order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| LedgerError::OrderNotFound(order_id.clone()))?;

        if order.status.is_terminal() {
            info!(
                event_name = "ledger.sync.skipped_terminal",
                order_id = %order_id,
                status = order.status.as_str(),
                "order is terminal locally; carrier status ignored"
            );
            return Ok(SyncOutcome::SkippedTerminal);
        }

        let remote = self.carrier.order_status(&order.order_number).await?;
        if remote.status == order.status {
            return Ok(SyncOutcome::Unchanged);
        }

        let refundable = matches!(remote.status, OrderStatus::Rejected | OrderStatus::Cancelled);
        // A rejection the state machine cannot express from the current
        // status still has to land the order in a refundable terminal state.
        let target = if order.can_transition_to(remote.status) {
            remote.status
        } else if refundable && order.can_transition_to(OrderStatus::Cancelled) {
            OrderStatus::Cancelled
        } else {
            warn!(
                event_name = "ledger.sync.unmapped_transition",
                order_id = %order_id,
                local = order.status.as_str(),
                remote = remote.status.as_str(),
                "carrier status has no valid local transition; skipping"
            );
            return Ok(SyncOutcome::Unchanged);
        };

        let from = order.status;
        order.transition_to(target)?;
        self.orders.update_status(order_id, target).await?;
        self.orders
            .append_status_history(order_id, StatusHistoryEntry::new(target, "carrier_sync"))
            .await?;
        info!(
            event_name = "ledger.sync.status_updated",
            order_id = %order_id,
            from = from.as_str(),
            to = target.as_str(),
            "carrier sync updated order status"
        );

        let refund = if refundable {
            Some(
                self.refunds
                    .refund_order(&order, &format!("carrier status {}", remote.status.as_str()), RefundTrigger::CarrierSync)
                    .await,
            )
        } else {
            None
        };

        Ok(SyncOutcome::Updated { from, to: target, refund })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{StatusSync, SyncOutcome};
    use crate::audit::InMemoryAuditSink;
    use crate::domain::order::{Order, OrderId, OrderStatus};
    use crate::domain::transaction::TransactionType;
    use crate::domain::user::{User, UserId};
    use crate::gateway::{
        CarrierCancelResponse, CarrierGateway, CarrierOrderStatus, GatewayError,
    };
    use crate::ledger::refund::{RefundEngine, RefundOutcome};
    use crate::ledger::store::{InMemoryLedger, OrderStore};
    use crate::ledger::writer::{DualTransactionRequest, DualTransactionWriter};

    fn dec(raw: &str) -> Decimal {
        raw.parse().expect("decimal literal")
    }

    struct FakeCarrier {
        status: OrderStatus,
    }

    #[async_trait]
    impl CarrierGateway for FakeCarrier {
        async fn cancel_order(
            &self,
            _order_number: &str,
            _reason: &str,
        ) -> Result<CarrierCancelResponse, GatewayError> {
            Ok(CarrierCancelResponse { ok: true, message: None, audit_remark: None })
        }

        async fn order_status(
            &self,
            order_number: &str,
        ) -> Result<CarrierOrderStatus, GatewayError> {
            Ok(CarrierOrderStatus { order_number: order_number.to_string(), status: self.status })
        }
    }

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId("O-1".to_string()),
            owner_user_id: UserId("u-cust".to_string()),
            order_number: "FD-2026-0001".to_string(),
            status,
            amount: dec("120.00"),
            company_name: "Acme Logistics".to_string(),
            has_insurance: false,
            insurance_certificate: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status_history: Vec::new(),
        }
    }

    async fn sync_with(
        local: OrderStatus,
        remote: OrderStatus,
    ) -> (Arc<InMemoryLedger>, StatusSync) {
        let store = Arc::new(InMemoryLedger::default());
        store.seed_user(User::supervisor("u-sup")).await;
        store.seed_order(order(local)).await;
        let writer = Arc::new(DualTransactionWriter::new(store.clone(), store.clone()));
        let refunds = Arc::new(RefundEngine::new(
            store.clone(),
            store.clone(),
            writer,
            Arc::new(InMemoryAuditSink::default()),
        ));
        let sync = StatusSync::new(store.clone(), Arc::new(FakeCarrier { status: remote }), refunds);
        (store, sync)
    }

    async fn place_original_debit(store: &Arc<InMemoryLedger>) {
        let writer = DualTransactionWriter::new(store.clone(), store.clone());
        writer
            .create_dual_transaction(
                &UserId("u-cust".to_string()),
                DualTransactionRequest {
                    order_id: Some(OrderId("O-1".to_string())),
                    order_number: Some("FD-2026-0001".to_string()),
                    description: "Order placement".to_string(),
                    customer_amount: dec("120.00"),
                    base_amount: dec("100.00"),
                    transaction_type: TransactionType::Debit,
                    metadata: BTreeMap::new(),
                },
            )
            .await
            .expect("place original debit");
    }

    #[tokio::test]
    async fn forward_progress_is_applied_without_refund() {
        let (store, sync) = sync_with(OrderStatus::Confirmed, OrderStatus::InTransit).await;

        let outcome = sync.sync_order(&OrderId("O-1".to_string())).await.expect("sync");
        let SyncOutcome::Updated { from, to, refund } = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!((from, to), (OrderStatus::Confirmed, OrderStatus::InTransit));
        assert!(refund.is_none());

        let saved = store
            .find_by_id(&OrderId("O-1".to_string()))
            .await
            .expect("load")
            .expect("order");
        assert_eq!(saved.status, OrderStatus::InTransit);
        assert_eq!(saved.status_history.len(), 1);
    }

    #[tokio::test]
    async fn carrier_rejection_triggers_the_refund_path() {
        let (store, sync) = sync_with(OrderStatus::PendingReview, OrderStatus::Rejected).await;
        place_original_debit(&store).await;

        let outcome = sync.sync_order(&OrderId("O-1".to_string())).await.expect("sync");
        let SyncOutcome::Updated { to, refund, .. } = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!(to, OrderStatus::Rejected);
        assert!(matches!(refund, Some(Ok(RefundOutcome::Refunded(_)))));
    }

    #[tokio::test]
    async fn locally_cancelled_orders_are_never_overwritten() {
        let (store, sync) = sync_with(OrderStatus::Cancelled, OrderStatus::InTransit).await;

        let outcome = sync.sync_order(&OrderId("O-1".to_string())).await.expect("sync");
        assert!(matches!(outcome, SyncOutcome::SkippedTerminal));

        let saved = store
            .find_by_id(&OrderId("O-1".to_string()))
            .await
            .expect("load")
            .expect("order");
        assert_eq!(saved.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn carrier_cancel_of_confirmed_order_maps_to_local_cancel() {
        // Rejected is not reachable from Confirmed, so the sync falls back
        // to the cancel transition, which is.
        let (store, sync) = sync_with(OrderStatus::Confirmed, OrderStatus::Rejected).await;
        place_original_debit(&store).await;

        let outcome = sync.sync_order(&OrderId("O-1".to_string())).await.expect("sync");
        let SyncOutcome::Updated { to, refund, .. } = outcome else {
            panic!("expected update, got {outcome:?}");
        };
        assert_eq!(to, OrderStatus::Cancelled);
        assert!(matches!(refund, Some(Ok(RefundOutcome::Refunded(_)))));
    }

    #[tokio::test]
    async fn matching_status_is_a_noop() {
        let (_, sync) = sync_with(OrderStatus::Confirmed, OrderStatus::Confirmed).await;
        let outcome = sync.sync_order(&OrderId("O-1".to_string())).await.expect("sync");
        assert!(matches!(outcome, SyncOutcome::Unchanged));
    }
}
