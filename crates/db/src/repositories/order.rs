use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use freightdesk_core::domain::order::{Order, OrderId, OrderStatus, StatusHistoryEntry};
use freightdesk_core::domain::user::UserId;
use freightdesk_core::errors::StoreError;
use freightdesk_core::ledger::OrderStore;

use super::{
    map_sqlx_error, parse_decimal, parse_optional_decimal, parse_timestamp,
};
use crate::DbPool;

pub struct SqlOrderStore {
    pool: DbPool,
}

impl SqlOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: SqliteRow) -> Result<Order, StoreError> {
    let status_raw = row.try_get::<String, _>("status").map_err(map_sqlx_error)?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown order status `{status_raw}`")))?;

    Ok(Order {
        id: OrderId(row.try_get("id").map_err(map_sqlx_error)?),
        owner_user_id: UserId(row.try_get("owner_user_id").map_err(map_sqlx_error)?),
        order_number: row.try_get("order_number").map_err(map_sqlx_error)?,
        status,
        amount: parse_decimal("amount", row.try_get("amount").map_err(map_sqlx_error)?)?,
        company_name: row.try_get("company_name").map_err(map_sqlx_error)?,
        has_insurance: row.try_get("has_insurance").map_err(map_sqlx_error)?,
        insurance_certificate: row.try_get("insurance_certificate").map_err(map_sqlx_error)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at").map_err(map_sqlx_error)?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at").map_err(map_sqlx_error)?)?,
        status_history: Vec::new(),
    })
}

fn history_from_row(row: SqliteRow) -> Result<StatusHistoryEntry, StoreError> {
    let status_raw = row.try_get::<String, _>("status").map_err(map_sqlx_error)?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown order status `{status_raw}`")))?;
    Ok(StatusHistoryEntry {
        occurred_at: parse_timestamp(
            "occurred_at",
            row.try_get("occurred_at").map_err(map_sqlx_error)?,
        )?,
        status,
        event: row.try_get("event").map_err(map_sqlx_error)?,
        refunded_amount: parse_optional_decimal(
            "refunded_amount",
            row.try_get("refunded_amount").map_err(map_sqlx_error)?,
        )?,
    })
}

#[async_trait::async_trait]
impl OrderStore for SqlOrderStore {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            "SELECT
                id,
                owner_user_id,
                order_number,
                status,
                amount,
                company_name,
                has_insurance,
                insurance_certificate,
                created_at,
                updated_at
             FROM orders
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(mut order) = row.map(order_from_row).transpose()? else {
            return Ok(None);
        };

        let history_rows = sqlx::query(
            "SELECT status, event, refunded_amount, occurred_at
             FROM order_status_history
             WHERE order_id = ?
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        order.status_history =
            history_rows.into_iter().map(history_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(order))
    }

    async fn save(&self, order: Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (
                id, owner_user_id, order_number, status, amount,
                company_name, has_insurance, insurance_certificate,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_user_id = excluded.owner_user_id,
                order_number = excluded.order_number,
                status = excluded.status,
                amount = excluded.amount,
                company_name = excluded.company_name,
                has_insurance = excluded.has_insurance,
                insurance_certificate = excluded.insurance_certificate,
                updated_at = excluded.updated_at",
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
        Ok(())
    }

    async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("orders:{}", id.0)));
        }
        Ok(())
    }

    async fn append_status_history(
        &self,
        id: &OrderId,
        entry: StatusHistoryEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO order_status_history (order_id, status, event, refunded_amount, occurred_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(entry.status.as_str())
        .bind(&entry.event)
        .bind(entry.refunded_amount.map(|amount| amount.to_string()))
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_insurance(
        &self,
        id: &OrderId,
        certificate_number: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders
             SET has_insurance = 1, insurance_certificate = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(certificate_number)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("orders:{}", id.0)));
        }
        Ok(())
    }
}
