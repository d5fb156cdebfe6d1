pub mod analytics;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod ledger;
pub mod pricing;

pub use analytics::{daily_trend, profit_margin, revenue_by_customer, RevenueSummary};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::insurance::{CancellationReasonCode, CertificateStatus, InsuranceCertificate};
pub use domain::order::{Order, OrderId, OrderStatus, StatusHistoryEntry};
pub use domain::transaction::{BalanceTransaction, TransactionStatus, TransactionType, UserBalance};
pub use domain::user::{User, UserId, UserRole};
pub use errors::{LedgerError, PricingError, StoreError};
pub use gateway::{CarrierGateway, GatewayError, InsuranceGateway};
pub use ledger::{
    CancellationService, DualTransactionWriter, InsuranceService, RefundEngine, RefundOutcome,
    StatusSync,
};
pub use pricing::{apply_to_payload, clamp_ratio, effective_ratio, to_base_price, to_customer_price};
