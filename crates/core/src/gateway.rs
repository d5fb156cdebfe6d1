//! Outbound collaborator contracts for the carrier and insurance APIs.
//!
//! The ledger core only sees these traits; HTTP transport, authentication,
//! and retry live in the `freightdesk-carrier` crate.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::insurance::CancellationReasonCode;
use crate::domain::order::OrderStatus;
use crate::errors::LedgerError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Connection-class failure (DNS, connect, timeout). The only class the
    /// retry policy will re-attempt.
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("request rejected by remote: {0}")]
    Rejected(String),
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<GatewayError> for LedgerError {
    fn from(value: GatewayError) -> Self {
        Self::ExternalApi(value.to_string())
    }
}

/// Carrier response to a cancellation request. `ok` is the structured
/// success flag; `message` may carry the quirky error-channel payload the
/// cancellation service special-cases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierCancelResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_remark: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierOrderStatus {
    pub order_number: String,
    pub status: OrderStatus,
}

#[async_trait]
pub trait CarrierGateway: Send + Sync {
    async fn cancel_order(
        &self,
        order_number: &str,
        reason: &str,
    ) -> Result<CarrierCancelResponse, GatewayError>;

    async fn order_status(&self, order_number: &str) -> Result<CarrierOrderStatus, GatewayError>;
}

/// Base-cost insurance quote as issued by the insurer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceIssueResponse {
    pub certificate_number: String,
    /// Base premium; the customer premium is derived by the pricing engine.
    pub premium: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceCancelResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[async_trait]
pub trait InsuranceGateway: Send + Sync {
    async fn issue_certificate(
        &self,
        order_number: &str,
        declared_value: Decimal,
    ) -> Result<InsuranceIssueResponse, GatewayError>;

    async fn cancel_certificate(
        &self,
        certificate_number: &str,
        reason: CancellationReasonCode,
    ) -> Result<InsuranceCancelResponse, GatewayError>;
}
