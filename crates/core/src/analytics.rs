//! Revenue rollups over the ledger.
//!
//! All rollups read only customer-side debit rows that carry a base amount:
//! the customer magnitude is revenue, the base amount is cost, and the
//! spread between them is brokerage profit. Supervisor mirrors and refund
//! rows are bookkeeping, not revenue, and never enter a rollup. Callers
//! narrow the input with the same [`TransactionFilter`] vocabulary the
//! ledger store queries use.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::transaction::{BalanceTransaction, TransactionType};
use crate::domain::user::UserId;
use crate::ledger::store::TransactionFilter;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub revenue: Decimal,
    pub cost: Decimal,
    pub profit: Decimal,
    pub margin_percent: Decimal,
    pub transaction_count: u64,
    /// Mean per-row markup over base cost, in percent. Rows with a zero
    /// base are revenue but contribute nothing here.
    pub avg_markup_percent: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerRevenue {
    pub user_id: UserId,
    pub summary: RevenueSummary,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub summary: RevenueSummary,
}

fn is_revenue_row(row: &BalanceTransaction) -> bool {
    row.transaction_type == TransactionType::Debit
        && !row.is_supervisor_transaction
        && row.base_amount.is_some()
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn summarize<'a>(rows: impl Iterator<Item = &'a BalanceTransaction>) -> RevenueSummary {
    let mut revenue = Decimal::ZERO;
    let mut cost = Decimal::ZERO;
    let mut transaction_count = 0u64;
    let mut markup_sum = Decimal::ZERO;
    let mut markup_count = 0u64;
    for row in rows {
        let magnitude = row.magnitude();
        let base = row.base_amount.unwrap_or_default().abs();
        revenue += magnitude;
        cost += base;
        transaction_count += 1;
        if !base.is_zero() {
            markup_sum += (magnitude - base) / base * Decimal::ONE_HUNDRED;
            markup_count += 1;
        }
    }
    let profit = revenue - cost;
    let margin_percent = if revenue.is_zero() {
        Decimal::ZERO
    } else {
        round2(profit / revenue * Decimal::ONE_HUNDRED)
    };
    let avg_markup_percent = if markup_count == 0 {
        Decimal::ZERO
    } else {
        round2(markup_sum / Decimal::from(markup_count))
    };
    RevenueSummary {
        revenue: round2(revenue),
        cost: round2(cost),
        profit: round2(profit),
        margin_percent,
        transaction_count,
        avg_markup_percent,
    }
}

fn revenue_rows<'a>(
    rows: &'a [BalanceTransaction],
    filter: &'a TransactionFilter,
) -> impl Iterator<Item = &'a BalanceTransaction> {
    rows.iter().filter(|row| is_revenue_row(row) && filter.matches(row))
}

/// Overall margin across every revenue row in range. Zeroed out on an
/// empty selection.
pub fn profit_margin(rows: &[BalanceTransaction], filter: &TransactionFilter) -> RevenueSummary {
    summarize(revenue_rows(rows, filter))
}

/// Per-customer rollup, most profitable customer first.
pub fn revenue_by_customer(
    rows: &[BalanceTransaction],
    filter: &TransactionFilter,
) -> Vec<CustomerRevenue> {
    let mut buckets: BTreeMap<&UserId, Vec<&BalanceTransaction>> = BTreeMap::new();
    for row in revenue_rows(rows, filter) {
        buckets.entry(&row.user_id).or_default().push(row);
    }
    let mut rollup: Vec<CustomerRevenue> = buckets
        .into_iter()
        .map(|(user_id, group)| CustomerRevenue {
            user_id: user_id.clone(),
            summary: summarize(group.into_iter()),
        })
        .collect();
    rollup.sort_by(|a, b| b.summary.profit.cmp(&a.summary.profit));
    rollup
}

/// Per-day rollup in calendar order, keyed on the row's creation date.
pub fn daily_trend(rows: &[BalanceTransaction], filter: &TransactionFilter) -> Vec<DailyRevenue> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&BalanceTransaction>> = BTreeMap::new();
    for row in revenue_rows(rows, filter) {
        buckets.entry(row.created_at.date_naive()).or_default().push(row);
    }
    buckets
        .into_iter()
        .map(|(date, group)| DailyRevenue { date, summary: summarize(group.into_iter()) })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{daily_trend, profit_margin, revenue_by_customer};
    use crate::domain::transaction::{BalanceTransaction, TransactionType};
    use crate::ledger::store::{transaction_fixture, TransactionFilter};

    fn dec(raw: &str) -> Decimal {
        raw.parse().expect("decimal literal")
    }

    fn revenue_row(
        user: &str,
        amount: &str,
        base: &str,
        day: u32,
    ) -> BalanceTransaction {
        let mut row = transaction_fixture(user, Some("O-1"), dec(amount), TransactionType::Debit, false);
        row.base_amount = Some(dec(base));
        row.created_at = Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap();
        row
    }

    #[test]
    fn margin_is_the_spread_over_customer_revenue() {
        let rows = vec![
            revenue_row("u-a", "-120.00", "-100.00", 1),
            revenue_row("u-a", "-60.00", "-50.00", 2),
        ];
        let summary = profit_margin(&rows, &TransactionFilter::default());
        assert_eq!(summary.revenue, dec("180.00"));
        assert_eq!(summary.cost, dec("150.00"));
        assert_eq!(summary.profit, dec("30.00"));
        assert_eq!(summary.margin_percent, dec("16.67"));
        assert_eq!(summary.transaction_count, 2);
        assert_eq!(summary.avg_markup_percent, dec("20.00"));
    }

    #[test]
    fn supervisor_refund_and_baseless_rows_are_not_revenue() {
        let mut no_base =
            transaction_fixture("u-a", Some("O-1"), dec("-40.00"), TransactionType::Debit, false);
        no_base.base_amount = None;
        let rows = vec![
            revenue_row("u-a", "-120.00", "-100.00", 1),
            transaction_fixture("u-sup", Some("O-1"), dec("-100.00"), TransactionType::Debit, true),
            transaction_fixture("u-a", Some("O-1"), dec("120.00"), TransactionType::Refund, false),
            no_base,
        ];
        let summary = profit_margin(&rows, &TransactionFilter::default());
        assert_eq!(summary.revenue, dec("120.00"));
        assert_eq!(summary.profit, dec("20.00"));
        assert_eq!(summary.transaction_count, 1);
    }

    #[test]
    fn filter_narrows_the_rollup_by_date() {
        let rows = vec![
            revenue_row("u-a", "-120.00", "-100.00", 1),
            revenue_row("u-a", "-60.00", "-50.00", 5),
        ];
        let filter = TransactionFilter {
            created_from: Some(Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap()),
            ..TransactionFilter::default()
        };
        let summary = profit_margin(&rows, &filter);
        assert_eq!(summary.revenue, dec("60.00"));
        assert_eq!(summary.transaction_count, 1);
    }

    #[test]
    fn empty_ledger_rolls_up_to_zero() {
        let summary = profit_margin(&[], &TransactionFilter::default());
        assert_eq!(summary.revenue, Decimal::ZERO);
        assert_eq!(summary.margin_percent, Decimal::ZERO);
        assert_eq!(summary.transaction_count, 0);
        assert_eq!(summary.avg_markup_percent, Decimal::ZERO);
    }

    #[test]
    fn customers_are_ranked_by_profit() {
        let rows = vec![
            revenue_row("u-small", "-55.00", "-50.00", 1),
            revenue_row("u-big", "-240.00", "-200.00", 1),
        ];
        let rollup = revenue_by_customer(&rows, &TransactionFilter::default());
        assert_eq!(rollup.len(), 2);
        assert_eq!(rollup[0].user_id.0, "u-big");
        assert_eq!(rollup[0].summary.profit, dec("40.00"));
        assert_eq!(rollup[0].summary.avg_markup_percent, dec("20.00"));
        assert_eq!(rollup[1].user_id.0, "u-small");
        assert_eq!(rollup[1].summary.avg_markup_percent, dec("10.00"));
    }

    #[test]
    fn daily_trend_buckets_by_calendar_date() {
        let rows = vec![
            revenue_row("u-a", "-120.00", "-100.00", 1),
            revenue_row("u-b", "-60.00", "-50.00", 1),
            revenue_row("u-a", "-12.00", "-10.00", 2),
        ];
        let trend = daily_trend(&rows, &TransactionFilter::default());
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].summary.revenue, dec("180.00"));
        assert_eq!(trend[1].summary.profit, dec("2.00"));
    }
}
