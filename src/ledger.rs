//! Pure reductions over a tenant's transactions.
//!
//! Nothing here touches the database: callers load rows and hand slices in,
//! which keeps balance arithmetic and time windows testable without SQLite.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;

use crate::models::{Customer, TimeRange, Transaction, TransactionKind};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub total_debt: i64,
    pub total_paid: i64,
    pub net_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodDebtor {
    pub customer_id: String,
    pub name: String,
    pub phone: String,
    pub debt: i64,
    pub paid: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DueStatus {
    Overdue,
    Today,
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueReminder {
    pub transaction: Transaction,
    pub customer_name: String,
    pub status: DueStatus,
    pub days_until: i64,
}

/// Σ(debt) − Σ(payment) over one customer's transactions. Sums saturate at
/// the `i64` bounds.
pub fn customer_balance(transactions: &[Transaction], customer_id: &str) -> i64 {
    transactions
        .iter()
        .filter(|tx| tx.customer_id == customer_id)
        .fold(0i64, |acc, tx| acc.saturating_add(tx.kind.signed(tx.amount)))
}

pub fn balances_by_customer(transactions: &[Transaction]) -> HashMap<String, i64> {
    let mut balances: HashMap<String, i64> = HashMap::new();
    for tx in transactions {
        let balance = balances.entry(tx.customer_id.clone()).or_default();
        *balance = balance.saturating_add(tx.kind.signed(tx.amount));
    }
    balances
}

pub fn last_transaction_ts(transactions: &[Transaction], customer_id: &str) -> Option<i64> {
    transactions
        .iter()
        .filter(|tx| tx.customer_id == customer_id)
        .map(|tx| tx.ts_utc)
        .max()
}

pub fn totals(transactions: &[Transaction]) -> LedgerTotals {
    let mut totals = LedgerTotals::default();
    for tx in transactions {
        match tx.kind {
            TransactionKind::Debt => totals.total_debt = totals.total_debt.saturating_add(tx.amount),
            TransactionKind::Payment => totals.total_paid = totals.total_paid.saturating_add(tx.amount),
        }
    }
    totals.net_balance = totals.total_debt.saturating_sub(totals.total_paid);
    totals
}

impl TimeRange {
    /// Local wall-clock instant the window opens at; `None` for `All`.
    /// Weeks start on Monday.
    pub fn start(self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = now.date();
        let first_day = match self {
            TimeRange::All => return None,
            TimeRange::Today => today,
            TimeRange::Week => {
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            TimeRange::Month => today.with_day(1)?,
        };
        first_day.and_hms_opt(0, 0, 0)
    }
}

/// Keeps transactions that happened strictly after the window start, judged
/// in the timezone of `now`.
pub fn filter_by_range<Tz: TimeZone>(
    transactions: &[Transaction],
    range: TimeRange,
    now: &DateTime<Tz>,
) -> Vec<Transaction> {
    let Some(start) = range.start(now.naive_local()) else {
        return transactions.to_vec();
    };
    let tz = now.timezone();
    transactions
        .iter()
        .filter(|tx| match tz.timestamp_millis_opt(tx.ts_utc).single() {
            Some(at) => at.naive_local() > start,
            None => false,
        })
        .cloned()
        .collect()
}

/// Per-customer activity for the given transactions, customers without any
/// activity dropped, highest balance first.
pub fn period_debtors(customers: &[Customer], transactions: &[Transaction]) -> Vec<PeriodDebtor> {
    let mut debtors: Vec<PeriodDebtor> = customers
        .iter()
        .map(|customer| {
            let (debt, paid) = transactions
                .iter()
                .filter(|tx| tx.customer_id == customer.id)
                .fold((0i64, 0i64), |(debt, paid), tx| match tx.kind {
                    TransactionKind::Debt => (debt.saturating_add(tx.amount), paid),
                    TransactionKind::Payment => (debt, paid.saturating_add(tx.amount)),
                });
            PeriodDebtor {
                customer_id: customer.id.clone(),
                name: customer.name.clone(),
                phone: customer.phone.clone(),
                debt,
                paid,
                balance: debt.saturating_sub(paid),
            }
        })
        .filter(|debtor| debtor.debt > 0 || debtor.paid > 0)
        .collect();
    debtors.sort_by(|a, b| b.balance.cmp(&a.balance));
    debtors
}

/// Debts with a due date no later than `window_days` from `today` whose
/// customer still owes money overall. Overdue entries are always included.
pub fn due_reminders(
    customers: &[Customer],
    transactions: &[Transaction],
    today: NaiveDate,
    window_days: i64,
) -> Vec<DueReminder> {
    let balances = balances_by_customer(transactions);
    let names: HashMap<&str, &str> = customers
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let mut reminders: Vec<DueReminder> = transactions
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Debt)
        .filter_map(|tx| {
            let due = tx.due_date?;
            let name = names.get(tx.customer_id.as_str())?;
            if balances.get(&tx.customer_id).copied().unwrap_or(0) <= 0 {
                return None;
            }
            let days_until = (due - today).num_days();
            if days_until > window_days {
                return None;
            }
            let status = match days_until {
                d if d < 0 => DueStatus::Overdue,
                0 => DueStatus::Today,
                _ => DueStatus::Upcoming,
            };
            Some(DueReminder {
                transaction: tx.clone(),
                customer_name: name.to_string(),
                status,
                days_until,
            })
        })
        .collect();
    reminders.sort_by_key(|r| r.transaction.due_date);
    reminders
}

/// Lowercases and strips whitespace and phone punctuation so "+998 (90)"
/// and "99890" compare equal.
pub fn normalize_search(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '+' | '(' | ')' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whole days between two instants, rounded up, compared against `days`.
pub fn subscription_expired(started_ms: i64, now_ms: i64, days: i64) -> bool {
    let diff = (now_ms - started_ms).abs();
    let elapsed_days = (diff + DAY_MS - 1) / DAY_MS;
    elapsed_days > days
}
