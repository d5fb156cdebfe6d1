//! Paired customer/supervisor ledger writes.
//!
//! Every priced business event produces exactly two rows: the customer-facing
//! row at the marked-up amount and the supervisor row at base cost. Either
//! both commit or neither does.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::domain::order::OrderId;
use crate::domain::transaction::{
    BalanceTransaction, TransactionStatus, TransactionType, METADATA_ACTUAL_USER_ID,
    METADATA_COUNTERPART_ROLE, METADATA_CUSTOMER_USER_ID,
};
use crate::domain::user::UserId;
use crate::errors::LedgerError;
use crate::ledger::atomic::{execute_atomic, AtomicWriteError, Operation};
use crate::ledger::store::{LedgerStore, RowStore, UserStore};

#[derive(Clone, Debug)]
pub struct DualTransactionRequest {
    pub order_id: Option<OrderId>,
    pub order_number: Option<String>,
    pub description: String,
    /// Marked-up amount for the customer row. Always non-negative; the sign
    /// convention is applied by the writer.
    pub customer_amount: Decimal,
    /// Base-cost amount for the supervisor row. Always non-negative.
    pub base_amount: Decimal,
    pub transaction_type: TransactionType,
    /// Extra metadata stamped onto both rows (certificate numbers etc).
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DualTransactionReceipt {
    pub customer: BalanceTransaction,
    pub supervisor: BalanceTransaction,
}

/// Human-readable ledger row id: year-scoped prefix plus a uuid fragment.
/// Uniqueness comes from the uuid, never from counting existing rows.
pub fn new_transaction_id() -> String {
    let fragment = Uuid::new_v4().simple().to_string();
    format!("TXN-{}-{}", Utc::now().year(), fragment[..8].to_ascii_uppercase())
}

pub struct DualTransactionWriter {
    ledger: Arc<dyn LedgerStore>,
    users: Arc<dyn UserStore>,
}

impl DualTransactionWriter {
    pub fn new(ledger: Arc<dyn LedgerStore>, users: Arc<dyn UserStore>) -> Self {
        Self { ledger, users }
    }

    /// Create the customer/supervisor pair for one business event. The store
    /// commits both rows in a single transaction; on any failure nothing is
    /// written.
    pub async fn create_dual_transaction(
        &self,
        customer_user_id: &UserId,
        request: DualTransactionRequest,
    ) -> Result<DualTransactionReceipt, LedgerError> {
        let (customer, supervisor) = self.build_pair(customer_user_id, &request).await?;

        self.ledger.insert_dual(customer.clone(), supervisor.clone()).await?;

        info!(
            event_name = "ledger.dual_write.committed",
            order_id = request.order_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            transaction_type = request.transaction_type.as_str(),
            customer_amount = %customer.amount,
            base_amount = %supervisor.amount,
            "dual ledger pair committed"
        );

        Ok(DualTransactionReceipt { customer, supervisor })
    }

    /// Fallback for stores without a transactional dual insert: two
    /// sequential inserts through the compensating atomic helper. Best
    /// effort only; a failed rollback surfaces as manual intervention.
    pub async fn create_dual_transaction_best_effort(
        &self,
        rows: &dyn RowStore,
        customer_user_id: &UserId,
        request: DualTransactionRequest,
    ) -> Result<DualTransactionReceipt, LedgerError> {
        let (customer, supervisor) = self.build_pair(customer_user_id, &request).await?;

        let ops = vec![
            Operation::insert(
                "balance_transactions",
                serde_json::to_value(&customer)
                    .map_err(|error| LedgerError::Store(error.to_string()))?,
            ),
            Operation::insert(
                "balance_transactions",
                serde_json::to_value(&supervisor)
                    .map_err(|error| LedgerError::Store(error.to_string()))?,
            ),
        ];

        match execute_atomic(rows, &ops).await {
            Ok(_) => Ok(DualTransactionReceipt { customer, supervisor }),
            Err(AtomicWriteError::ManualInterventionRequired { .. }) => {
                Err(LedgerError::ManualInterventionRequired(
                    "dual write rollback failed; ledger holds an unpaired row".to_string(),
                ))
            }
            Err(AtomicWriteError::OperationFailed { source, .. }) => Err(source.into()),
        }
    }

    async fn build_pair(
        &self,
        customer_user_id: &UserId,
        request: &DualTransactionRequest,
    ) -> Result<(BalanceTransaction, BalanceTransaction), LedgerError> {
        if request.customer_amount.is_sign_negative() {
            return Err(LedgerError::InvalidInput(format!(
                "customer amount must not be negative: {}",
                request.customer_amount
            )));
        }
        if request.base_amount.is_sign_negative() {
            return Err(LedgerError::InvalidInput(format!(
                "base amount must not be negative: {}",
                request.base_amount
            )));
        }
        let sign = match request.transaction_type {
            TransactionType::Debit => Decimal::NEGATIVE_ONE,
            TransactionType::Credit | TransactionType::Refund => Decimal::ONE,
            TransactionType::Adjustment => {
                return Err(LedgerError::InvalidInput(
                    "adjustments are single-sided and never dual-written".to_string(),
                ));
            }
        };

        // A missing supervisor must fail loudly. Skipping the supervisor row
        // silently is how ledgers end up unbalanced.
        let supervisor_user =
            self.users.find_supervisor().await?.ok_or(LedgerError::NoSupervisorFound)?;

        let now = Utc::now();
        let mut customer_metadata = request.metadata.clone();
        customer_metadata
            .insert(METADATA_CUSTOMER_USER_ID.to_string(), customer_user_id.0.clone());
        customer_metadata.insert(METADATA_ACTUAL_USER_ID.to_string(), customer_user_id.0.clone());
        customer_metadata
            .insert(METADATA_COUNTERPART_ROLE.to_string(), "supervisor".to_string());

        let mut supervisor_metadata = request.metadata.clone();
        supervisor_metadata
            .insert(METADATA_CUSTOMER_USER_ID.to_string(), customer_user_id.0.clone());
        supervisor_metadata
            .insert(METADATA_ACTUAL_USER_ID.to_string(), supervisor_user.id.0.clone());
        supervisor_metadata
            .insert(METADATA_COUNTERPART_ROLE.to_string(), "customer".to_string());

        let customer = BalanceTransaction {
            id: Uuid::new_v4().to_string(),
            transaction_id: new_transaction_id(),
            user_id: customer_user_id.clone(),
            order_id: request.order_id.clone(),
            order_number: request.order_number.clone(),
            amount: sign * request.customer_amount,
            base_amount: Some(request.base_amount),
            transaction_type: request.transaction_type,
            is_supervisor_transaction: false,
            status: TransactionStatus::Completed,
            description: request.description.clone(),
            metadata: customer_metadata,
            created_at: now,
        };

        let supervisor = BalanceTransaction {
            id: Uuid::new_v4().to_string(),
            transaction_id: new_transaction_id(),
            user_id: supervisor_user.id,
            order_id: request.order_id.clone(),
            order_number: request.order_number.clone(),
            amount: sign * request.base_amount,
            base_amount: Some(request.base_amount),
            transaction_type: request.transaction_type,
            is_supervisor_transaction: true,
            status: TransactionStatus::Completed,
            description: request.description.clone(),
            metadata: supervisor_metadata,
            created_at: now,
        };

        Ok((customer, supervisor))
    }
}
