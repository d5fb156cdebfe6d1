use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use freightdesk_core::domain::insurance::{CertificateStatus, InsuranceCertificate};
use freightdesk_core::domain::order::OrderId;
use freightdesk_core::errors::StoreError;
use freightdesk_core::ledger::CertificateStore;

use super::{map_sqlx_error, parse_decimal, parse_optional_timestamp, parse_timestamp};
use crate::DbPool;

pub struct SqlCertificateStore {
    pool: DbPool,
}

impl SqlCertificateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn certificate_from_row(row: SqliteRow) -> Result<InsuranceCertificate, StoreError> {
    let status_raw = row.try_get::<String, _>("status").map_err(map_sqlx_error)?;
    let status = CertificateStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown certificate status `{status_raw}`")))?;
    Ok(InsuranceCertificate {
        certificate_number: row.try_get("certificate_number").map_err(map_sqlx_error)?,
        order_id: OrderId(row.try_get("order_id").map_err(map_sqlx_error)?),
        premium: parse_decimal("premium", row.try_get("premium").map_err(map_sqlx_error)?)?,
        base_premium: parse_decimal(
            "base_premium",
            row.try_get("base_premium").map_err(map_sqlx_error)?,
        )?,
        status,
        purchased_at: parse_timestamp(
            "purchased_at",
            row.try_get("purchased_at").map_err(map_sqlx_error)?,
        )?,
        cancelled_at: parse_optional_timestamp(
            "cancelled_at",
            row.try_get("cancelled_at").map_err(map_sqlx_error)?,
        )?,
    })
}

#[async_trait::async_trait]
impl CertificateStore for SqlCertificateStore {
    async fn find_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<InsuranceCertificate>, StoreError> {
        let row = sqlx::query(
            "SELECT certificate_number, order_id, premium, base_premium,
                    status, purchased_at, cancelled_at
             FROM insurance_certificates
             WHERE certificate_number = ?",
        )
        .bind(certificate_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(certificate_from_row).transpose()
    }

    async fn save(&self, certificate: InsuranceCertificate) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO insurance_certificates (
                certificate_number, order_id, premium, base_premium,
                status, purchased_at, cancelled_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(certificate_number) DO UPDATE SET
                status = excluded.status,
                purchased_at = excluded.purchased_at,
                cancelled_at = excluded.cancelled_at",
        )
        .bind(&certificate.certificate_number)
        .bind(&certificate.order_id.0)
        .bind(certificate.premium.to_string())
        .bind(certificate.base_premium.to_string())
        .bind(certificate.status.as_str())
        .bind(certificate.purchased_at.to_rfc3339())
        .bind(certificate.cancelled_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        certificate_number: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE insurance_certificates
             SET status = 'cancelled', cancelled_at = ?
             WHERE certificate_number = ?",
        )
        .bind(at.to_rfc3339())
        .bind(certificate_number)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "insurance_certificates:{certificate_number}"
            )));
        }
        Ok(())
    }
}
