//! Reconciliation sweep over the dual ledger.
//!
//! Every order-linked debit or refund is supposed to exist as a pair: one
//! customer row and one supervisor row. The sweep groups rows by pairing key
//! and reports any group missing a side, which is exactly the residue left
//! behind by a degraded refund or a partial write.

use std::collections::BTreeMap;

use tracing::info;

use crate::domain::transaction::{
    BalanceTransaction, TransactionType, METADATA_CERTIFICATE_NUMBER,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairSide {
    Customer,
    Supervisor,
}

impl PairSide {
    pub fn as_str(self) -> &'static str {
        match self {
            PairSide::Customer => "customer",
            PairSide::Supervisor => "supervisor",
        }
    }
}

/// A ledger row whose dual counterpart is absent.
#[derive(Clone, Debug)]
pub struct UnpairedEntry {
    pub transaction: BalanceTransaction,
    pub missing_side: PairSide,
}

// Rows pair up within an order by transaction type, with insurance rows
// pairing separately per certificate.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PairKey {
    order_id: String,
    transaction_type: TransactionType,
    certificate_number: Option<String>,
}

fn pair_key(row: &BalanceTransaction) -> Option<PairKey> {
    let order_id = row.order_id.as_ref()?;
    if !matches!(
        row.transaction_type,
        TransactionType::Debit | TransactionType::Refund
    ) {
        return None;
    }
    Some(PairKey {
        order_id: order_id.0.clone(),
        transaction_type: row.transaction_type,
        certificate_number: row.metadata.get(METADATA_CERTIFICATE_NUMBER).cloned(),
    })
}

/// Scan `rows` and return every dual-eligible row whose counterpart is
/// missing. Rows without an order id and adjustment or credit rows are
/// outside the pairing contract and are skipped.
pub fn find_unpaired(rows: &[BalanceTransaction]) -> Vec<UnpairedEntry> {
    let mut groups: BTreeMap<PairKey, Vec<&BalanceTransaction>> = BTreeMap::new();
    for row in rows {
        if let Some(key) = pair_key(row) {
            groups.entry(key).or_default().push(row);
        }
    }

    let mut unpaired = Vec::new();
    for (key, group) in groups {
        let has_customer = group.iter().any(|row| !row.is_supervisor_transaction);
        let has_supervisor = group.iter().any(|row| row.is_supervisor_transaction);
        if has_customer && has_supervisor {
            continue;
        }
        let missing_side =
            if has_customer { PairSide::Supervisor } else { PairSide::Customer };
        info!(
            event_name = "ledger.sweep.unpaired",
            order_id = %key.order_id,
            transaction_type = key.transaction_type.as_str(),
            missing_side = missing_side.as_str(),
            rows = group.len(),
            "ledger row has no dual counterpart"
        );
        for row in group {
            unpaired.push(UnpairedEntry { transaction: (*row).clone(), missing_side });
        }
    }
    unpaired
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{find_unpaired, PairSide};
    use crate::domain::transaction::{
        BalanceTransaction, TransactionType, METADATA_CERTIFICATE_NUMBER,
    };
    use crate::ledger::store::transaction_fixture;

    fn dec(raw: &str) -> Decimal {
        raw.parse().expect("decimal literal")
    }

    fn with_certificate(mut row: BalanceTransaction, number: &str) -> BalanceTransaction {
        row.metadata
            .insert(METADATA_CERTIFICATE_NUMBER.to_string(), number.to_string());
        row
    }

    #[test]
    fn complete_pairs_produce_no_findings() {
        let rows = vec![
            transaction_fixture("u-cust", Some("O-1"), dec("-120.00"), TransactionType::Debit, false),
            transaction_fixture("u-sup", Some("O-1"), dec("-100.00"), TransactionType::Debit, true),
            transaction_fixture("u-cust", Some("O-1"), dec("120.00"), TransactionType::Refund, false),
            transaction_fixture("u-sup", Some("O-1"), dec("100.00"), TransactionType::Refund, true),
        ];
        assert!(find_unpaired(&rows).is_empty());
    }

    #[test]
    fn a_lone_customer_refund_reports_the_missing_supervisor_side() {
        let rows = vec![
            transaction_fixture("u-cust", Some("O-1"), dec("-120.00"), TransactionType::Debit, false),
            transaction_fixture("u-sup", Some("O-1"), dec("-100.00"), TransactionType::Debit, true),
            // The shape a degraded refund leaves behind.
            transaction_fixture("u-cust", Some("O-1"), dec("120.00"), TransactionType::Refund, false),
        ];

        let findings = find_unpaired(&rows);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].missing_side, PairSide::Supervisor);
        assert_eq!(findings[0].transaction.amount, dec("120.00"));
    }

    #[test]
    fn a_lone_supervisor_debit_reports_the_missing_customer_side() {
        let rows = vec![
            transaction_fixture("u-sup", Some("O-2"), dec("-80.00"), TransactionType::Debit, true),
        ];
        let findings = find_unpaired(&rows);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].missing_side, PairSide::Customer);
    }

    #[test]
    fn insurance_rows_pair_separately_from_freight_rows() {
        let rows = vec![
            transaction_fixture("u-cust", Some("O-1"), dec("-120.00"), TransactionType::Debit, false),
            transaction_fixture("u-sup", Some("O-1"), dec("-100.00"), TransactionType::Debit, true),
            with_certificate(
                transaction_fixture("u-cust", Some("O-1"), dec("-36.00"), TransactionType::Debit, false),
                "LS-88341",
            ),
        ];

        let findings = find_unpaired(&rows);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].missing_side, PairSide::Supervisor);
        assert!(findings[0].transaction.is_insurance_row());
    }

    #[test]
    fn rows_outside_the_pairing_contract_are_skipped() {
        let no_order =
            transaction_fixture("u-cust", None, dec("-10.00"), TransactionType::Debit, false);
        let credit =
            transaction_fixture("u-cust", Some("O-1"), dec("50.00"), TransactionType::Credit, false);
        assert!(find_unpaired(&[no_order, credit]).is_empty());
    }
}
