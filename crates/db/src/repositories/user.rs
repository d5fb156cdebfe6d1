use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use freightdesk_core::domain::user::{User, UserId, UserRole};
use freightdesk_core::errors::StoreError;
use freightdesk_core::ledger::UserStore;

use super::{map_sqlx_error, parse_decimal};
use crate::DbPool;

pub struct SqlUserStore {
    pool: DbPool,
}

impl SqlUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, StoreError> {
    let role_raw = row.try_get::<String, _>("role").map_err(map_sqlx_error)?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(map_sqlx_error)?),
        role: UserRole::parse(&role_raw),
        price_ratio: parse_decimal(
            "price_ratio",
            row.try_get("price_ratio").map_err(map_sqlx_error)?,
        )?,
        is_active: row.try_get("is_active").map_err(map_sqlx_error)?,
        is_supervisor: row.try_get("is_supervisor").map_err(map_sqlx_error)?,
    })
}

#[async_trait::async_trait]
impl UserStore for SqlUserStore {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, role, price_ratio, is_active, is_supervisor
             FROM users
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(user_from_row).transpose()
    }

    async fn find_supervisor(&self) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, role, price_ratio, is_active, is_supervisor
             FROM users
             WHERE is_supervisor = 1 AND is_active = 1
             ORDER BY id ASC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(user_from_row).transpose()
    }
}
