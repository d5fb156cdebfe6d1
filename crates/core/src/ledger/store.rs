//! Store ports for the ledger core, plus an in-memory implementation used
//! by unit tests and lightweight tooling. SQL-backed implementations live in
//! `freightdesk-db`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::insurance::{CertificateStatus, InsuranceCertificate};
use crate::domain::order::{Order, OrderId, OrderStatus, StatusHistoryEntry};
use crate::domain::transaction::{BalanceTransaction, TransactionType};
use crate::domain::user::{User, UserId};
use crate::errors::StoreError;

/// Equality/range filter over ledger rows. Also the filter vocabulary of the
/// analytics rollups.
#[derive(Clone, Debug, Default)]
pub struct TransactionFilter {
    pub user_id: Option<UserId>,
    pub order_id: Option<OrderId>,
    pub transaction_type: Option<TransactionType>,
    pub is_supervisor: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
}

impl TransactionFilter {
    pub fn for_order(order_id: OrderId) -> Self {
        Self { order_id: Some(order_id), ..Self::default() }
    }

    pub fn matches(&self, row: &BalanceTransaction) -> bool {
        if let Some(user_id) = &self.user_id {
            if &row.user_id != user_id {
                return false;
            }
        }
        if let Some(order_id) = &self.order_id {
            if row.order_id.as_ref() != Some(order_id) {
                return false;
            }
        }
        if let Some(transaction_type) = self.transaction_type {
            if row.transaction_type != transaction_type {
                return false;
            }
        }
        if let Some(is_supervisor) = self.is_supervisor {
            if row.is_supervisor_transaction != is_supervisor {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if row.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if row.created_at > to {
                return false;
            }
        }
        if let Some(min) = self.min_amount {
            if row.magnitude() < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if row.magnitude() > max {
                return false;
            }
        }
        true
    }
}

/// Append-only balance-transaction store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_transaction(&self, row: BalanceTransaction) -> Result<(), StoreError>;

    /// Insert a customer/supervisor pair atomically: both rows or neither.
    async fn insert_dual(
        &self,
        customer: BalanceTransaction,
        supervisor: BalanceTransaction,
    ) -> Result<(), StoreError>;

    /// Compensating rollback only; the ledger is otherwise append-only.
    async fn delete_transaction(&self, id: &str) -> Result<(), StoreError>;

    async fn transactions_matching(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BalanceTransaction>, StoreError>;

    /// Whether a freight refund pair already exists for this order.
    /// Insurance refund rows (certificate-tagged) do not count.
    async fn refund_exists_for_order(&self, order_id: &OrderId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;
    async fn save(&self, order: Order) -> Result<(), StoreError>;
    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), StoreError>;
    async fn append_status_history(
        &self,
        id: &OrderId,
        entry: StatusHistoryEntry,
    ) -> Result<(), StoreError>;
    async fn set_insurance(
        &self,
        id: &OrderId,
        certificate_number: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    /// The account that holds the base-cost side of every dual write.
    async fn find_supervisor(&self) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<InsuranceCertificate>, StoreError>;
    async fn save(&self, certificate: InsuranceCertificate) -> Result<(), StoreError>;
    async fn mark_cancelled(
        &self,
        certificate_number: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Row-level port for the best-effort atomic write helper. Inserts return the
/// row id so they can be compensated; updates and deletes cannot be.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert_row(&self, table: &str, data: &Value) -> Result<String, StoreError>;
    async fn update_rows(&self, table: &str, filter: &Value, data: &Value)
        -> Result<u64, StoreError>;
    async fn delete_rows(&self, table: &str, filter: &Value) -> Result<u64, StoreError>;
    async fn delete_row_by_id(&self, table: &str, id: &str) -> Result<(), StoreError>;
}

fn is_freight_refund(row: &BalanceTransaction) -> bool {
    row.transaction_type == TransactionType::Refund
        && !row.is_supervisor_transaction
        && row.order_id.is_some()
        && !row.is_insurance_row()
}

fn is_insurance_refund(row: &BalanceTransaction) -> bool {
    row.transaction_type == TransactionType::Refund
        && !row.is_supervisor_transaction
        && row.is_insurance_row()
}

/// In-memory ledger backing store. Mirrors the refund uniqueness constraints
/// the SQL schema enforces with partial indexes.
#[derive(Default)]
pub struct InMemoryLedger {
    transactions: RwLock<Vec<BalanceTransaction>>,
    orders: RwLock<HashMap<String, Order>>,
    users: RwLock<HashMap<String, User>>,
    certificates: RwLock<HashMap<String, InsuranceCertificate>>,
}

impl InMemoryLedger {
    pub async fn seed_user(&self, user: User) {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
    }

    pub async fn seed_order(&self, order: Order) {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0.clone(), order);
    }

    /// Snapshot of every ledger row, in insertion order.
    pub async fn all_transactions(&self) -> Vec<BalanceTransaction> {
        self.transactions.read().await.clone()
    }

    fn check_refund_constraints(
        rows: &[BalanceTransaction],
        candidate: &BalanceTransaction,
    ) -> Result<(), StoreError> {
        if is_freight_refund(candidate) {
            let order_id = candidate.order_id.as_ref().map(|id| id.0.clone()).unwrap_or_default();
            let duplicate = rows
                .iter()
                .any(|row| is_freight_refund(row) && row.order_id == candidate.order_id);
            if duplicate {
                return Err(StoreError::DuplicateRefund(order_id));
            }
        }
        if is_insurance_refund(candidate) {
            let certificate = candidate
                .metadata
                .get(crate::domain::transaction::METADATA_CERTIFICATE_NUMBER)
                .cloned()
                .unwrap_or_default();
            let duplicate = rows.iter().any(|row| {
                is_insurance_refund(row)
                    && row.metadata.get(crate::domain::transaction::METADATA_CERTIFICATE_NUMBER)
                        == Some(&certificate)
            });
            if duplicate {
                return Err(StoreError::DuplicateRefund(certificate));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert_transaction(&self, row: BalanceTransaction) -> Result<(), StoreError> {
        let mut transactions = self.transactions.write().await;
        Self::check_refund_constraints(&transactions, &row)?;
        transactions.push(row);
        Ok(())
    }

    async fn insert_dual(
        &self,
        customer: BalanceTransaction,
        supervisor: BalanceTransaction,
    ) -> Result<(), StoreError> {
        // Single write lock: both rows land or neither does.
        let mut transactions = self.transactions.write().await;
        Self::check_refund_constraints(&transactions, &customer)?;
        Self::check_refund_constraints(&transactions, &supervisor)?;
        transactions.push(customer);
        transactions.push(supervisor);
        Ok(())
    }

    async fn delete_transaction(&self, id: &str) -> Result<(), StoreError> {
        let mut transactions = self.transactions.write().await;
        let before = transactions.len();
        transactions.retain(|row| row.id != id);
        if transactions.len() == before {
            return Err(StoreError::NotFound(format!("balance_transactions:{id}")));
        }
        Ok(())
    }

    async fn transactions_matching(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BalanceTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().filter(|row| filter.matches(row)).cloned().collect())
    }

    async fn refund_exists_for_order(&self, order_id: &OrderId) -> Result<bool, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .any(|row| is_freight_refund(row) && row.order_id.as_ref() == Some(order_id)))
    }
}

#[async_trait]
impl OrderStore for InMemoryLedger {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn save(&self, order: Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0.clone(), order);
        Ok(())
    }

    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("orders:{}", id.0)))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn append_status_history(
        &self,
        id: &OrderId,
        entry: StatusHistoryEntry,
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("orders:{}", id.0)))?;
        order.status_history.push(entry);
        Ok(())
    }

    async fn set_insurance(
        &self,
        id: &OrderId,
        certificate_number: &str,
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("orders:{}", id.0)))?;
        order.has_insurance = true;
        order.insurance_certificate = Some(certificate_number.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryLedger {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_supervisor(&self) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.is_supervisor && user.is_active).cloned())
    }
}

#[async_trait]
impl CertificateStore for InMemoryLedger {
    async fn find_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<InsuranceCertificate>, StoreError> {
        let certificates = self.certificates.read().await;
        Ok(certificates.get(certificate_number).cloned())
    }

    async fn save(&self, certificate: InsuranceCertificate) -> Result<(), StoreError> {
        let mut certificates = self.certificates.write().await;
        certificates.insert(certificate.certificate_number.clone(), certificate);
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        certificate_number: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut certificates = self.certificates.write().await;
        let certificate = certificates.get_mut(certificate_number).ok_or_else(|| {
            StoreError::NotFound(format!("insurance_certificates:{certificate_number}"))
        })?;
        certificate.status = CertificateStatus::Cancelled;
        certificate.cancelled_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl RowStore for InMemoryLedger {
    async fn insert_row(&self, table: &str, data: &Value) -> Result<String, StoreError> {
        match table {
            "balance_transactions" => {
                let row: BalanceTransaction = serde_json::from_value(data.clone())
                    .map_err(|error| StoreError::Backend(error.to_string()))?;
                let id = row.id.clone();
                self.insert_transaction(row).await?;
                Ok(id)
            }
            "orders" => {
                let order: Order = serde_json::from_value(data.clone())
                    .map_err(|error| StoreError::Backend(error.to_string()))?;
                let id = order.id.0.clone();
                OrderStore::save(self, order).await?;
                Ok(id)
            }
            other => Err(StoreError::Backend(format!("unknown table: {other}"))),
        }
    }

    async fn update_rows(
        &self,
        table: &str,
        filter: &Value,
        data: &Value,
    ) -> Result<u64, StoreError> {
        if table != "orders" {
            return Err(StoreError::Backend(format!("updates unsupported for table: {table}")));
        }
        let Some(id) = filter.get("id").and_then(Value::as_str) else {
            return Err(StoreError::Backend("order updates require an id filter".to_string()));
        };
        let Some(status) = data
            .get("status")
            .and_then(Value::as_str)
            .and_then(OrderStatus::parse)
        else {
            return Err(StoreError::Backend("order updates carry only a status".to_string()));
        };
        self.update_status(&OrderId(id.to_string()), status).await?;
        Ok(1)
    }

    async fn delete_rows(&self, table: &str, filter: &Value) -> Result<u64, StoreError> {
        if table != "balance_transactions" {
            return Err(StoreError::Backend(format!("deletes unsupported for table: {table}")));
        }
        let Some(id) = filter.get("id").and_then(Value::as_str) else {
            return Err(StoreError::Backend("deletes require an id filter".to_string()));
        };
        match LedgerStore::delete_transaction(self, id).await {
            Ok(()) => Ok(1),
            Err(StoreError::NotFound(_)) => Ok(0),
            Err(error) => Err(error),
        }
    }

    async fn delete_row_by_id(&self, table: &str, id: &str) -> Result<(), StoreError> {
        if table != "balance_transactions" {
            return Err(StoreError::Backend(format!(
                "rollback deletes unsupported for table: {table}"
            )));
        }
        LedgerStore::delete_transaction(self, id).await
    }
}

/// Build a bare ledger row for tests and fixtures.
pub fn transaction_fixture(
    user_id: &str,
    order_id: Option<&str>,
    amount: Decimal,
    transaction_type: TransactionType,
    is_supervisor: bool,
) -> BalanceTransaction {
    BalanceTransaction {
        id: Uuid::new_v4().to_string(),
        transaction_id: format!("TXN-{}-{}", Utc::now().format("%Y"), Uuid::new_v4().simple()),
        user_id: UserId(user_id.to_string()),
        order_id: order_id.map(|id| OrderId(id.to_string())),
        order_number: order_id.map(|id| format!("FD-{id}")),
        amount,
        base_amount: None,
        transaction_type,
        is_supervisor_transaction: is_supervisor,
        status: crate::domain::transaction::TransactionStatus::Completed,
        description: String::new(),
        metadata: Default::default(),
        created_at: Utc::now(),
    }
}
