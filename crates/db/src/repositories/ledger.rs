use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use freightdesk_core::domain::order::{Order, OrderId, OrderStatus};
use freightdesk_core::domain::transaction::{
    BalanceTransaction, TransactionStatus, TransactionType,
};
use freightdesk_core::domain::user::UserId;
use freightdesk_core::errors::StoreError;
use freightdesk_core::ledger::{LedgerStore, RowStore, TransactionFilter};
use serde_json::Value;

use super::{
    map_sqlx_error, parse_decimal, parse_optional_decimal, parse_timestamp,
};
use crate::DbPool;

const TRANSACTION_COLUMNS: &str = "id,
    transaction_id,
    user_id,
    order_id,
    order_number,
    amount,
    base_amount,
    transaction_type,
    is_supervisor_transaction,
    status,
    description,
    metadata,
    created_at";

pub struct SqlLedgerStore {
    pool: DbPool,
}

impl SqlLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn bind_insert<'q>(
        row: &'q BalanceTransaction,
        metadata_json: &'q str,
        created_at: &'q str,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        sqlx::query(
            "INSERT INTO balance_transactions (
                id,
                transaction_id,
                user_id,
                order_id,
                order_number,
                amount,
                base_amount,
                transaction_type,
                is_supervisor_transaction,
                status,
                description,
                metadata,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.transaction_id)
        .bind(&row.user_id.0)
        .bind(row.order_id.as_ref().map(|id| id.0.as_str()))
        .bind(row.order_number.as_deref())
        .bind(row.amount.to_string())
        .bind(row.base_amount.map(|amount| amount.to_string()))
        .bind(row.transaction_type.as_str())
        .bind(row.is_supervisor_transaction)
        .bind(row.status.as_str())
        .bind(&row.description)
        .bind(metadata_json)
        .bind(created_at)
    }
}

fn metadata_json(row: &BalanceTransaction) -> Result<String, StoreError> {
    serde_json::to_string(&row.metadata).map_err(|error| StoreError::Backend(error.to_string()))
}

fn transaction_from_row(row: SqliteRow) -> Result<BalanceTransaction, StoreError> {
    let transaction_type_raw = row.try_get::<String, _>("transaction_type").map_err(map_sqlx_error)?;
    let transaction_type = TransactionType::parse(&transaction_type_raw).ok_or_else(|| {
        StoreError::Backend(format!("unknown transaction type `{transaction_type_raw}`"))
    })?;
    let status_raw = row.try_get::<String, _>("status").map_err(map_sqlx_error)?;
    let status = TransactionStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown transaction status `{status_raw}`")))?;
    let metadata_raw = row.try_get::<String, _>("metadata").map_err(map_sqlx_error)?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_raw)
        .map_err(|error| StoreError::Backend(format!("invalid metadata json: {error}")))?;

    Ok(BalanceTransaction {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        transaction_id: row.try_get("transaction_id").map_err(map_sqlx_error)?,
        user_id: UserId(row.try_get("user_id").map_err(map_sqlx_error)?),
        order_id: row
            .try_get::<Option<String>, _>("order_id")
            .map_err(map_sqlx_error)?
            .map(OrderId),
        order_number: row.try_get("order_number").map_err(map_sqlx_error)?,
        amount: parse_decimal("amount", row.try_get("amount").map_err(map_sqlx_error)?)?,
        base_amount: parse_optional_decimal(
            "base_amount",
            row.try_get("base_amount").map_err(map_sqlx_error)?,
        )?,
        transaction_type,
        is_supervisor_transaction: row
            .try_get("is_supervisor_transaction")
            .map_err(map_sqlx_error)?,
        status,
        description: row.try_get("description").map_err(map_sqlx_error)?,
        metadata,
        created_at: parse_timestamp(
            "created_at",
            row.try_get("created_at").map_err(map_sqlx_error)?,
        )?,
    })
}

#[async_trait::async_trait]
impl LedgerStore for SqlLedgerStore {
    async fn insert_transaction(&self, row: BalanceTransaction) -> Result<(), StoreError> {
        let metadata = metadata_json(&row)?;
        let created_at = row.created_at.to_rfc3339();
        Self::bind_insert(&row, &metadata, &created_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_dual(
        &self,
        customer: BalanceTransaction,
        supervisor: BalanceTransaction,
    ) -> Result<(), StoreError> {
        let customer_metadata = metadata_json(&customer)?;
        let supervisor_metadata = metadata_json(&supervisor)?;
        let customer_created = customer.created_at.to_rfc3339();
        let supervisor_created = supervisor.created_at.to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Self::bind_insert(&customer, &customer_metadata, &customer_created)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Self::bind_insert(&supervisor, &supervisor_metadata, &supervisor_created)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_transaction(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM balance_transactions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("balance_transactions:{id}")));
        }
        Ok(())
    }

    async fn transactions_matching(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BalanceTransaction>, StoreError> {
        // Narrow by the indexed columns in SQL; the remaining predicates
        // reuse the filter's own matcher.
        let rows = if let Some(order_id) = &filter.order_id {
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS}
                 FROM balance_transactions
                 WHERE order_id = ?
                 ORDER BY created_at ASC, id ASC"
            ))
            .bind(&order_id.0)
            .fetch_all(&self.pool)
            .await
        } else if let Some(user_id) = &filter.user_id {
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS}
                 FROM balance_transactions
                 WHERE user_id = ?
                 ORDER BY created_at ASC, id ASC"
            ))
            .bind(&user_id.0)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS}
                 FROM balance_transactions
                 ORDER BY created_at ASC, id ASC"
            ))
            .fetch_all(&self.pool)
            .await
        }
        .map_err(map_sqlx_error)?;

        let transactions =
            rows.into_iter().map(transaction_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(transactions.into_iter().filter(|row| filter.matches(row)).collect())
    }

    async fn refund_exists_for_order(&self, order_id: &OrderId) -> Result<bool, StoreError> {
        let count = sqlx::query(
            "SELECT COUNT(*) AS count
             FROM balance_transactions
             WHERE order_id = ?
               AND transaction_type = 'refund'
               AND is_supervisor_transaction = 0
               AND json_extract(metadata, '$.certificate_number') IS NULL",
        )
        .bind(&order_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .try_get::<i64, _>("count")
        .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }
}

#[async_trait::async_trait]
impl RowStore for SqlLedgerStore {
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
                sqlx::query(
                    "INSERT INTO orders (
                        id, owner_user_id, order_number, status, amount,
                        company_name, has_insurance, insurance_certificate,
                        created_at, updated_at
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&order.id.0)
                .bind(&order.owner_user_id.0)
                .bind(&order.order_number)
                .bind(order.status.as_str())
                .bind(order.amount.to_string())
                .bind(&order.company_name)
                .bind(order.has_insurance)
                .bind(order.insurance_certificate.as_deref())
                .bind(order.created_at.to_rfc3339())
                .bind(order.updated_at.to_rfc3339())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
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
        let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_rows(&self, table: &str, filter: &Value) -> Result<u64, StoreError> {
        if table != "balance_transactions" {
            return Err(StoreError::Backend(format!("deletes unsupported for table: {table}")));
        }
        let Some(id) = filter.get("id").and_then(Value::as_str) else {
            return Err(StoreError::Backend("deletes require an id filter".to_string()));
        };
        let result = sqlx::query("DELETE FROM balance_transactions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_row_by_id(&self, table: &str, id: &str) -> Result<(), StoreError> {
        if table != "balance_transactions" {
            return Err(StoreError::Backend(format!(
                "rollback deletes unsupported for table: {table}"
            )));
        }
        self.delete_transaction(id).await
    }
}
