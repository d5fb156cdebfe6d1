use serde::Serialize;

use crate::commands::CommandResult;
use freightdesk_core::config::{AppConfig, LoadOptions};
use freightdesk_core::ledger::{find_unpaired, LedgerStore, TransactionFilter, UnpairedEntry};
use freightdesk_db::{connect_with_settings, SqlLedgerStore};

#[derive(Debug, Serialize)]
struct ReconcileFinding {
    transaction_id: String,
    order_id: Option<String>,
    transaction_type: String,
    amount: String,
    missing_side: String,
}

#[derive(Debug, Serialize)]
struct ReconcileReport {
    command: String,
    status: String,
    scanned: usize,
    unpaired: Vec<ReconcileFinding>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "reconcile",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "reconcile",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let rows = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let store = SqlLedgerStore::new(pool.clone());
        let rows = store
            .transactions_matching(&TransactionFilter::default())
            .await
            .map_err(|error| ("ledger_query", error.to_string(), 5u8));
        pool.close().await;
        rows
    });

    let rows = match rows {
        Ok(rows) => rows,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("reconcile", error_class, message, exit_code);
        }
    };

    let findings = find_unpaired(&rows);
    let report = ReconcileReport {
        command: "reconcile".to_string(),
        status: if findings.is_empty() { "ok" } else { "unpaired_found" }.to_string(),
        scanned: rows.len(),
        unpaired: findings.iter().map(finding_from_entry).collect(),
    };

    let output = serde_json::to_string_pretty(&report)
        .unwrap_or_else(|error| format!("{{\"command\":\"reconcile\",\"status\":\"error\",\"message\":\"{error}\"}}"));
    let exit_code = if findings.is_empty() { 0 } else { 1 };
    CommandResult { exit_code, output }
}

fn finding_from_entry(entry: &UnpairedEntry) -> ReconcileFinding {
    ReconcileFinding {
        transaction_id: entry.transaction.transaction_id.clone(),
        order_id: entry.transaction.order_id.as_ref().map(|id| id.0.clone()),
        transaction_type: entry.transaction.transaction_type.as_str().to_string(),
        amount: entry.transaction.amount.to_string(),
        missing_side: entry.missing_side.as_str().to_string(),
    }
}
