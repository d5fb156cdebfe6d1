//! Best-effort multi-row write with compensating rollback.
//!
//! The preferred path for paired writes is a real store-level transaction
//! (`LedgerStore::insert_dual`); this helper is the fallback for stores that
//! cannot offer one. Inserts are compensated by deleting the returned id;
//! updates and deletes have no before-image and cannot be rolled back, which
//! is a known gap the error reporting never papers over.

use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use crate::errors::StoreError;
use crate::ledger::store::RowStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Insert(Value),
    Update { filter: Value, data: Value },
    Delete { filter: Value },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub table: String,
    pub kind: OperationKind,
}

impl Operation {
    pub fn insert(table: impl Into<String>, data: Value) -> Self {
        Self { table: table.into(), kind: OperationKind::Insert(data) }
    }

    pub fn update(table: impl Into<String>, filter: Value, data: Value) -> Self {
        Self { table: table.into(), kind: OperationKind::Update { filter, data } }
    }

    pub fn delete(table: impl Into<String>, filter: Value) -> Self {
        Self { table: table.into(), kind: OperationKind::Delete { filter } }
    }

    fn describe(&self) -> String {
        let kind = match &self.kind {
            OperationKind::Insert(_) => "insert",
            OperationKind::Update { .. } => "update",
            OperationKind::Delete { .. } => "delete",
        };
        format!("{kind} on {}", self.table)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpReceipt {
    pub table: String,
    /// Set for inserts only; the handle used for compensation.
    pub inserted_id: Option<String>,
    pub rows_affected: u64,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AtomicWriteError {
    /// An operation failed and every compensatable prior write was rolled
    /// back. `uncompensated` counts prior updates/deletes that had no
    /// before-image to restore.
    #[error("operation {index} ({operation}) failed after {rolled_back} rollbacks: {source}")]
    OperationFailed {
        index: usize,
        operation: String,
        rolled_back: usize,
        uncompensated: usize,
        source: StoreError,
    },
    /// Rollback itself failed; the store is in a partially-written state and
    /// needs manual repair. Carries the full operation list for the repair.
    #[error("manual intervention required: rollback failed after partial write at operation {index}: {source}")]
    ManualInterventionRequired {
        index: usize,
        operations: Vec<String>,
        failed_rollbacks: Vec<String>,
        source: StoreError,
    },
}

/// Execute `ops` sequentially against `store`. On the first failure, attempt
/// to delete every previously inserted row, newest first. Returns either all
/// receipts or an error that states exactly how much was undone.
pub async fn execute_atomic(
    store: &dyn RowStore,
    ops: &[Operation],
) -> Result<Vec<OpReceipt>, AtomicWriteError> {
    let mut receipts: Vec<OpReceipt> = Vec::with_capacity(ops.len());

    for (index, op) in ops.iter().enumerate() {
        let result = match &op.kind {
            OperationKind::Insert(data) => {
                store.insert_row(&op.table, data).await.map(|id| OpReceipt {
                    table: op.table.clone(),
                    inserted_id: Some(id),
                    rows_affected: 1,
                })
            }
            OperationKind::Update { filter, data } => {
                store.update_rows(&op.table, filter, data).await.map(|rows_affected| OpReceipt {
                    table: op.table.clone(),
                    inserted_id: None,
                    rows_affected,
                })
            }
            OperationKind::Delete { filter } => {
                store.delete_rows(&op.table, filter).await.map(|rows_affected| OpReceipt {
                    table: op.table.clone(),
                    inserted_id: None,
                    rows_affected,
                })
            }
        };

        match result {
            Ok(receipt) => receipts.push(receipt),
            Err(source) => {
                return Err(roll_back(store, ops, &receipts, index, source).await);
            }
        }
    }

    Ok(receipts)
}

async fn roll_back(
    store: &dyn RowStore,
    ops: &[Operation],
    receipts: &[OpReceipt],
    failed_index: usize,
    source: StoreError,
) -> AtomicWriteError {
    let operation = ops[failed_index].describe();
    warn!(
        event_name = "ledger.atomic.rolling_back",
        failed_operation = %operation,
        committed = receipts.len(),
        "atomic write failed, compensating prior inserts"
    );

    let mut rolled_back = 0usize;
    let mut uncompensated = 0usize;
    let mut failed_rollbacks: Vec<String> = Vec::new();

    for receipt in receipts.iter().rev() {
        match &receipt.inserted_id {
            Some(id) => match store.delete_row_by_id(&receipt.table, id).await {
                Ok(()) => rolled_back += 1,
                Err(rollback_error) => {
                    failed_rollbacks.push(format!("{}:{id}: {rollback_error}", receipt.table));
                }
            },
            // No before-image for updates/deletes; count, don't pretend.
            None => uncompensated += 1,
        }
    }

    if !failed_rollbacks.is_empty() {
        let operations = ops.iter().map(Operation::describe).collect::<Vec<_>>();
        error!(
            event_name = "ledger.atomic.manual_intervention_required",
            failed_operation = %operation,
            failed_rollbacks = failed_rollbacks.len(),
            "rollback failed; store left partially written"
        );
        return AtomicWriteError::ManualInterventionRequired {
            index: failed_index,
            operations,
            failed_rollbacks,
            source,
        };
    }

    AtomicWriteError::OperationFailed {
        index: failed_index,
        operation,
        rolled_back,
        uncompensated,
        source,
    }
}
