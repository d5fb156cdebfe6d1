use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;

use freightdesk_core::domain::insurance::{CertificateStatus, InsuranceCertificate};
use freightdesk_core::domain::order::{Order, OrderId, OrderStatus, StatusHistoryEntry};
use freightdesk_core::domain::transaction::{
    BalanceTransaction, TransactionStatus, TransactionType, METADATA_CERTIFICATE_NUMBER,
};
use freightdesk_core::domain::user::UserId;
use freightdesk_core::errors::StoreError;
use freightdesk_core::ledger::{
    CertificateStore, LedgerStore, OrderStore, TransactionFilter, UserStore,
};
use freightdesk_db::migrations::run_pending;
use freightdesk_db::{
    connect_with_settings, DbPool, SqlCertificateStore, SqlLedgerStore, SqlOrderStore,
    SqlUserStore,
};

fn dec(raw: &str) -> Decimal {
    raw.parse().expect("decimal literal")
}

async fn pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    run_pending(&pool).await.expect("run migrations");
    pool
}

async fn seed_users_and_order(pool: &DbPool) {
    sqlx::query(
        "INSERT INTO users (id, role, price_ratio, is_active, is_supervisor)
         VALUES ('u-cust', 'customer', '20', 1, 0), ('u-sup', 'admin', '0', 1, 1)",
    )
    .execute(pool)
    .await
    .expect("seed users");
    sqlx::query(
        "INSERT INTO orders (id, owner_user_id, order_number, status, amount, created_at, updated_at)
         VALUES ('O-1', 'u-cust', 'FD-2026-0001', 'pending_review', '120.00', ?, ?)",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("seed order");
}

fn ledger_row(
    id: &str,
    amount: &str,
    transaction_type: TransactionType,
    is_supervisor: bool,
) -> BalanceTransaction {
    BalanceTransaction {
        id: id.to_string(),
        transaction_id: format!("TXN-2026-{id}"),
        user_id: UserId(if is_supervisor { "u-sup" } else { "u-cust" }.to_string()),
        order_id: Some(OrderId("O-1".to_string())),
        order_number: Some("FD-2026-0001".to_string()),
        amount: dec(amount),
        base_amount: Some(dec("100.00")),
        transaction_type,
        is_supervisor_transaction: is_supervisor,
        status: TransactionStatus::Completed,
        description: "test row".to_string(),
        metadata: BTreeMap::new(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn dual_insert_lands_both_rows_and_round_trips() {
    let pool = pool().await;
    seed_users_and_order(&pool).await;
    let store = SqlLedgerStore::new(pool);

    store
        .insert_dual(
            ledger_row("t-1", "-120.00", TransactionType::Debit, false),
            ledger_row("t-2", "-100.00", TransactionType::Debit, true),
        )
        .await
        .expect("insert pair");

    let rows = store
        .transactions_matching(&TransactionFilter::for_order(OrderId("O-1".to_string())))
        .await
        .expect("query rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].amount, dec("-120.00"));
    assert_eq!(rows[0].base_amount, Some(dec("100.00")));
    assert!(rows[1].is_supervisor_transaction);
}

#[tokio::test]
async fn second_freight_refund_is_rejected_as_duplicate() {
    let pool = pool().await;
    seed_users_and_order(&pool).await;
    let store = SqlLedgerStore::new(pool);

    store
        .insert_transaction(ledger_row("r-1", "120.00", TransactionType::Refund, false))
        .await
        .expect("first refund");

    let error = store
        .insert_transaction(ledger_row("r-2", "120.00", TransactionType::Refund, false))
        .await
        .expect_err("second refund");
    assert!(matches!(error, StoreError::DuplicateRefund(_)));
    assert!(store
        .refund_exists_for_order(&OrderId("O-1".to_string()))
        .await
        .expect("refund check"));
}

#[tokio::test]
async fn insurance_refund_does_not_count_as_a_freight_refund() {
    let pool = pool().await;
    seed_users_and_order(&pool).await;
    let store = SqlLedgerStore::new(pool);

    let mut insurance_refund = ledger_row("r-ins", "36.00", TransactionType::Refund, false);
    insurance_refund
        .metadata
        .insert(METADATA_CERTIFICATE_NUMBER.to_string(), "LS-88341".to_string());
    store.insert_transaction(insurance_refund).await.expect("insurance refund");

    assert!(!store
        .refund_exists_for_order(&OrderId("O-1".to_string()))
        .await
        .expect("refund check"));

    // The freight refund is still allowed alongside it.
    store
        .insert_transaction(ledger_row("r-1", "120.00", TransactionType::Refund, false))
        .await
        .expect("freight refund");
}

#[tokio::test]
async fn order_store_round_trips_status_and_history() {
    let pool = pool().await;
    seed_users_and_order(&pool).await;
    let store = SqlOrderStore::new(pool);

    let order_id = OrderId("O-2".to_string());
    let order = Order {
        id: order_id.clone(),
        owner_user_id: UserId("u-cust".to_string()),
        order_number: "FD-2026-0002".to_string(),
        status: OrderStatus::PendingReview,
        amount: dec("240.00"),
        company_name: "Acme Logistics".to_string(),
        has_insurance: false,
        insurance_certificate: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        status_history: Vec::new(),
    };
    store.save(order).await.expect("save order");

    store.update_status(&order_id, OrderStatus::Cancelled).await.expect("update status");
    store
        .append_status_history(
            &order_id,
            StatusHistoryEntry::new(OrderStatus::Cancelled, "customer_cancellation")
                .with_refunded_amount(dec("240.00")),
        )
        .await
        .expect("append history");

    let loaded = store.find_by_id(&order_id).await.expect("load").expect("order");
    assert_eq!(loaded.status, OrderStatus::Cancelled);
    assert_eq!(loaded.status_history.len(), 1);
    assert_eq!(loaded.status_history[0].refunded_amount, Some(dec("240.00")));
}

#[tokio::test]
async fn user_store_finds_the_active_supervisor() {
    let pool = pool().await;
    seed_users_and_order(&pool).await;
    let store = SqlUserStore::new(pool);

    let customer = store
        .find_by_id(&UserId("u-cust".to_string()))
        .await
        .expect("load")
        .expect("customer");
    assert_eq!(customer.price_ratio, dec("20"));
    assert!(!customer.is_supervisor);

    let supervisor = store.find_supervisor().await.expect("load").expect("supervisor");
    assert_eq!(supervisor.id.0, "u-sup");
}

#[tokio::test]
async fn certificate_store_round_trips_and_cancels() {
    let pool = pool().await;
    seed_users_and_order(&pool).await;
    let store = SqlCertificateStore::new(pool);

    store
        .save(InsuranceCertificate {
            certificate_number: "LS-88341".to_string(),
            order_id: OrderId("O-1".to_string()),
            premium: dec("36.00"),
            base_premium: dec("30.00"),
            status: CertificateStatus::Active,
            purchased_at: Utc::now(),
            cancelled_at: None,
        })
        .await
        .expect("save certificate");

    store.mark_cancelled("LS-88341", Utc::now()).await.expect("cancel");
    let loaded = store.find_by_number("LS-88341").await.expect("load").expect("certificate");
    assert_eq!(loaded.status, CertificateStatus::Cancelled);
    assert!(loaded.cancelled_at.is_some());

    let missing = store.mark_cancelled("LS-00000", Utc::now()).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}
