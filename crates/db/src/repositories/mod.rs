//! SQL-backed implementations of the core store ports. Amounts are stored
//! as decimal strings and timestamps as RFC 3339; the refund uniqueness
//! rules live in partial indexes created by the migrations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use freightdesk_core::errors::StoreError;

pub mod certificate;
pub mod ledger;
pub mod order;
pub mod user;

pub use certificate::SqlCertificateStore;
pub use ledger::SqlLedgerStore;
pub use order::SqlOrderStore;
pub use user::SqlUserStore;

/// Unique violations on the refund indexes surface as constraint errors;
/// everything else is a backend fault.
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(database_error) = &error {
        let message = database_error.message();
        if message.contains("UNIQUE constraint failed")
            && message.contains("balance_transactions")
        {
            return StoreError::DuplicateRefund(message.to_string());
        }
    }
    StoreError::Backend(error.to_string())
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, StoreError> {
    value.parse::<Decimal>().map_err(|error| {
        StoreError::Backend(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, StoreError> {
    value.map(|raw| parse_decimal(column, raw)).transpose()
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| StoreError::Backend(format!("invalid timestamp in `{column}`: `{value}` ({error})")),
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|raw| parse_timestamp(column, raw)).transpose()
}
