//! Cargo-insurance purchase and cancellation.
//!
//! Premiums flow through the same dual writer as freight charges: customer
//! row at the marked-up premium, supervisor row at the insurer's base
//! premium. Certificate refund rows are tagged with the certificate number
//! so they never collide with the order's own freight refund.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::domain::insurance::{
    CancellationReasonCode, CertificateStatus, InsuranceCertificate,
};
use crate::domain::order::{Order, OrderId};
use crate::domain::transaction::{TransactionType, METADATA_CERTIFICATE_NUMBER};
use crate::domain::user::User;
use crate::errors::LedgerError;
use crate::gateway::InsuranceGateway;
use crate::ledger::store::{CertificateStore, LedgerStore, OrderStore, TransactionFilter};
use crate::ledger::writer::{DualTransactionReceipt, DualTransactionRequest, DualTransactionWriter};
use crate::pricing::{effective_ratio, to_customer_price};
use rust_decimal::Decimal;

#[derive(Debug)]
pub struct InsurancePurchase {
    pub certificate: InsuranceCertificate,
    pub receipt: DualTransactionReceipt,
}

/// Same asymmetric shape as order cancellation: the certificate is cancelled
/// once this exists; the refund channel reports its own fate. `None` means
/// the 24-hour window had closed and no refund was due.
#[derive(Debug)]
pub struct InsuranceCancellationOutcome {
    pub certificate_number: String,
    pub refund: Option<Result<DualTransactionReceipt, LedgerError>>,
}

pub struct InsuranceService {
    ledger: Arc<dyn LedgerStore>,
    orders: Arc<dyn OrderStore>,
    certificates: Arc<dyn CertificateStore>,
    writer: Arc<DualTransactionWriter>,
    gateway: Arc<dyn InsuranceGateway>,
}

impl InsuranceService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        orders: Arc<dyn OrderStore>,
        certificates: Arc<dyn CertificateStore>,
        writer: Arc<DualTransactionWriter>,
        gateway: Arc<dyn InsuranceGateway>,
    ) -> Self {
        Self { ledger, orders, certificates, writer, gateway }
    }

    /// Buy cover for `order` at the customer's effective ratio. Exactly one
    /// dual debit pair plus one persisted certificate on success.
    pub async fn purchase(
        &self,
        order: &Order,
        customer: &User,
        declared_value: Decimal,
    ) -> Result<InsurancePurchase, LedgerError> {
        if declared_value <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(format!(
                "declared value must be positive: {declared_value}"
            )));
        }

        let issued = self.gateway.issue_certificate(&order.order_number, declared_value).await?;
        let premium = to_customer_price(issued.premium, effective_ratio(customer))?;

        let mut metadata = BTreeMap::new();
        metadata
            .insert(METADATA_CERTIFICATE_NUMBER.to_string(), issued.certificate_number.clone());

        let receipt = self
            .writer
            .create_dual_transaction(
                &customer.id,
                DualTransactionRequest {
                    order_id: Some(order.id.clone()),
                    order_number: Some(order.order_number.clone()),
                    description: format!(
                        "Cargo insurance {} for order {}",
                        issued.certificate_number, order.order_number
                    ),
                    customer_amount: premium,
                    base_amount: issued.premium,
                    transaction_type: TransactionType::Debit,
                    metadata,
                },
            )
            .await?;

        let certificate = InsuranceCertificate {
            certificate_number: issued.certificate_number.clone(),
            order_id: order.id.clone(),
            premium,
            base_premium: issued.premium,
            status: CertificateStatus::Active,
            purchased_at: Utc::now(),
            cancelled_at: None,
        };
        self.certificates.save(certificate.clone()).await?;
        self.orders.set_insurance(&order.id, &issued.certificate_number).await?;

        info!(
            event_name = "ledger.insurance.purchased",
            order_id = %order.id,
            certificate_number = %issued.certificate_number,
            premium = %premium,
            base_premium = %issued.premium,
            "insurance certificate purchased"
        );

        Ok(InsurancePurchase { certificate, receipt })
    }

    /// Cancel a certificate with the insurer. Inside the 24-hour window the
    /// premium pair is refunded; outside it the cancellation still proceeds
    /// with no refund due.
    pub async fn cancel(
        &self,
        certificate_number: &str,
        reason: CancellationReasonCode,
    ) -> Result<InsuranceCancellationOutcome, LedgerError> {
        let certificate = self
            .certificates
            .find_by_number(certificate_number)
            .await?
            .ok_or_else(|| LedgerError::CertificateNotFound(certificate_number.to_string()))?;

        if certificate.status == CertificateStatus::Cancelled {
            return Ok(InsuranceCancellationOutcome {
                certificate_number: certificate_number.to_string(),
                refund: None,
            });
        }

        let response = self.gateway.cancel_certificate(certificate_number, reason).await?;
        if !response.ok {
            return Err(LedgerError::ExternalApi(format!(
                "insurer declined cancellation of {certificate_number}: {}",
                response.message.as_deref().unwrap_or("no message")
            )));
        }

        let now = Utc::now();
        self.certificates.mark_cancelled(certificate_number, now).await?;
        info!(
            event_name = "ledger.insurance.cancelled",
            certificate_number = %certificate_number,
            reason = reason.wire_code(),
            "insurance certificate cancelled"
        );

        if !certificate.refund_eligible_at(now) {
            info!(
                event_name = "ledger.insurance.refund_window_closed",
                certificate_number = %certificate_number,
                "cancellation outside refund window; no refund due"
            );
            return Ok(InsuranceCancellationOutcome {
                certificate_number: certificate_number.to_string(),
                refund: None,
            });
        }

        let refund = self.refund_premium(&certificate, reason).await;
        if let Err(refund_error) = &refund {
            error!(
                event_name = "ledger.insurance.refund_failed",
                certificate_number = %certificate_number,
                error = %refund_error,
                "certificate cancelled but premium refund failed"
            );
        }

        Ok(InsuranceCancellationOutcome {
            certificate_number: certificate_number.to_string(),
            refund: Some(refund),
        })
    }

    async fn refund_premium(
        &self,
        certificate: &InsuranceCertificate,
        reason: CancellationReasonCode,
    ) -> Result<DualTransactionReceipt, LedgerError> {
        let debit = self.original_premium_debit(&certificate.order_id, certificate).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert(
            METADATA_CERTIFICATE_NUMBER.to_string(),
            certificate.certificate_number.clone(),
        );

        self.writer
            .create_dual_transaction(
                &debit.user_id,
                DualTransactionRequest {
                    order_id: Some(certificate.order_id.clone()),
                    order_number: debit.order_number.clone(),
                    description: format!(
                        "Premium refund for certificate {} ({})",
                        certificate.certificate_number,
                        reason.wire_code()
                    ),
                    customer_amount: debit.magnitude(),
                    base_amount: debit.base_amount.unwrap_or(certificate.base_premium),
                    transaction_type: TransactionType::Refund,
                    metadata,
                },
            )
            .await
    }

    async fn original_premium_debit(
        &self,
        order_id: &OrderId,
        certificate: &InsuranceCertificate,
    ) -> Result<crate::domain::transaction::BalanceTransaction, LedgerError> {
        let filter = TransactionFilter {
            order_id: Some(order_id.clone()),
            transaction_type: Some(TransactionType::Debit),
            is_supervisor: Some(false),
            ..TransactionFilter::default()
        };
        let rows = self.ledger.transactions_matching(&filter).await?;
        rows.into_iter()
            .find(|row| {
                row.metadata.get(METADATA_CERTIFICATE_NUMBER)
                    == Some(&certificate.certificate_number)
            })
            .ok_or_else(|| LedgerError::OriginalTransactionNotFound(order_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{InsuranceCancellationOutcome, InsuranceService};
    use crate::domain::insurance::{CancellationReasonCode, CertificateStatus};
    use crate::domain::order::{Order, OrderId, OrderStatus};
    use crate::domain::user::User;
    use crate::errors::LedgerError;
    use crate::gateway::{
        GatewayError, InsuranceCancelResponse, InsuranceGateway, InsuranceIssueResponse,
    };
    use crate::ledger::store::{CertificateStore, InMemoryLedger, OrderStore};
    use crate::ledger::writer::DualTransactionWriter;

    fn dec(raw: &str) -> Decimal {
        raw.parse().expect("decimal literal")
    }

    struct FakeInsurer;

    #[async_trait]
    impl InsuranceGateway for FakeInsurer {
        async fn issue_certificate(
            &self,
            _order_number: &str,
            _declared_value: Decimal,
        ) -> Result<InsuranceIssueResponse, GatewayError> {
            Ok(InsuranceIssueResponse {
                certificate_number: "LS-88341".to_string(),
                premium: dec("30.00"),
            })
        }

        async fn cancel_certificate(
            &self,
            _certificate_number: &str,
            _reason: CancellationReasonCode,
        ) -> Result<InsuranceCancelResponse, GatewayError> {
            Ok(InsuranceCancelResponse { ok: true, message: None })
        }
    }

    fn order() -> Order {
        Order {
            id: OrderId("O-1".to_string()),
            owner_user_id: crate::domain::user::UserId("u-cust".to_string()),
            order_number: "FD-2026-0001".to_string(),
            status: OrderStatus::Confirmed,
            amount: dec("120.00"),
            company_name: "Acme Logistics".to_string(),
            has_insurance: false,
            insurance_certificate: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status_history: Vec::new(),
        }
    }

    async fn service() -> (Arc<InMemoryLedger>, InsuranceService) {
        let store = Arc::new(InMemoryLedger::default());
        store.seed_user(User::supervisor("u-sup")).await;
        store.seed_order(order()).await;
        let writer = Arc::new(DualTransactionWriter::new(store.clone(), store.clone()));
        let service = InsuranceService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            writer,
            Arc::new(FakeInsurer),
        );
        (store, service)
    }

    #[tokio::test]
    async fn purchase_writes_marked_up_premium_pair_and_flags_the_order() {
        let (store, service) = service().await;
        let customer = User::customer("u-cust", dec("20"));

        let purchase = service
            .purchase(&order(), &customer, dec("5000.00"))
            .await
            .expect("purchase cover");

        assert_eq!(purchase.certificate.premium, dec("36.00"));
        assert_eq!(purchase.certificate.base_premium, dec("30.00"));
        assert_eq!(purchase.receipt.customer.amount, dec("-36.00"));
        assert_eq!(purchase.receipt.supervisor.amount, dec("-30.00"));
        assert!(purchase.receipt.customer.is_insurance_row());

        let saved = store
            .find_by_id(&OrderId("O-1".to_string()))
            .await
            .expect("load")
            .expect("order");
        assert!(saved.has_insurance);
        assert_eq!(saved.insurance_certificate.as_deref(), Some("LS-88341"));
    }

    #[tokio::test]
    async fn cancel_inside_window_refunds_the_premium_pair() {
        let (store, service) = service().await;
        let customer = User::customer("u-cust", dec("20"));
        service.purchase(&order(), &customer, dec("5000.00")).await.expect("purchase");

        let outcome = service
            .cancel("LS-88341", CancellationReasonCode::CancelledShipment)
            .await
            .expect("cancel");

        let Some(Ok(receipt)) = outcome.refund else {
            panic!("expected premium refund, got {outcome:?}");
        };
        assert_eq!(receipt.customer.amount, dec("36.00"));
        assert_eq!(receipt.supervisor.amount, dec("30.00"));

        let certificate = store
            .find_by_number("LS-88341")
            .await
            .expect("load certificate")
            .expect("certificate");
        assert_eq!(certificate.status, CertificateStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_outside_window_emits_no_refund_rows() {
        let (store, service) = service().await;
        let customer = User::customer("u-cust", dec("20"));
        service.purchase(&order(), &customer, dec("5000.00")).await.expect("purchase");

        // Age the certificate past the refund window.
        let mut certificate = store
            .find_by_number("LS-88341")
            .await
            .expect("load")
            .expect("certificate");
        certificate.purchased_at = Utc::now() - Duration::hours(30);
        CertificateStore::save(&*store, certificate).await.expect("age certificate");

        let before = store.all_transactions().await.len();
        let outcome = service
            .cancel("LS-88341", CancellationReasonCode::NoLongerRequired)
            .await
            .expect("cancel");

        assert!(matches!(
            outcome,
            InsuranceCancellationOutcome { refund: None, .. }
        ));
        assert_eq!(store.all_transactions().await.len(), before);
    }

    #[tokio::test]
    async fn cancelling_an_unknown_certificate_fails() {
        let (_, service) = service().await;
        let error = service
            .cancel("LS-00000", CancellationReasonCode::Other)
            .await
            .expect_err("unknown certificate");
        assert!(matches!(error, LedgerError::CertificateNotFound(_)));
    }

    #[tokio::test]
    async fn cancelling_twice_is_a_noop() {
        let (store, service) = service().await;
        let customer = User::customer("u-cust", dec("20"));
        service.purchase(&order(), &customer, dec("5000.00")).await.expect("purchase");

        service
            .cancel("LS-88341", CancellationReasonCode::CancelledShipment)
            .await
            .expect("first cancel");
        let rows_after_first = store.all_transactions().await.len();

        let repeat = service
            .cancel("LS-88341", CancellationReasonCode::CancelledShipment)
            .await
            .expect("second cancel");
        assert!(repeat.refund.is_none());
        assert_eq!(store.all_transactions().await.len(), rows_after_first);
    }
}
