//! The dual-ledger transaction core.
//!
//! Every charge against a customer is mirrored by a supervisor-side row at
//! the pre-markup amount, and every refund mirrors the pair back. The
//! submodules cover writing pairs, refunding them, the flows that trigger
//! refunds, and the sweep that finds pairs which came apart.

pub mod atomic;
pub mod cancel;
pub mod insurance;
pub mod refund;
pub mod store;
pub mod sweep;
pub mod sync;
pub mod writer;

pub use atomic::{execute_atomic, AtomicWriteError, Operation, OperationKind};
pub use cancel::{CancellationOutcome, CancellationReceipt, CancellationService};
pub use insurance::{InsuranceCancellationOutcome, InsurancePurchase, InsuranceService};
pub use refund::{RefundEngine, RefundOutcome, RefundTrigger};
pub use store::{
    CertificateStore, InMemoryLedger, LedgerStore, OrderStore, RowStore, TransactionFilter,
    UserStore,
};
pub use sweep::{find_unpaired, PairSide, UnpairedEntry};
pub use sync::{StatusSync, SyncOutcome};
pub use writer::{DualTransactionReceipt, DualTransactionRequest, DualTransactionWriter};
