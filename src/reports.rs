use chrono::{DateTime, Local, NaiveDate, TimeZone};
use rusqlite::Connection;
use serde::Serialize;

use crate::customers;
use crate::error::AppResult;
use crate::ledger::{self, DueReminder, DueStatus, LedgerTotals, PeriodDebtor};
use crate::models::TimeRange;
use crate::transactions;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    #[serde(flatten)]
    pub totals: LedgerTotals,
    pub customer_count: usize,
}

#[derive(Debug, Serialize)]
pub struct PeriodReport {
    pub range: TimeRange,
    #[serde(flatten)]
    pub totals: LedgerTotals,
    pub active_customers: usize,
    pub top_debtors: Vec<PeriodDebtor>,
}

#[derive(Debug, Serialize)]
pub struct Notifications {
    pub reminders: Vec<DueReminder>,
    pub overdue_count: usize,
    pub today_count: usize,
    pub has_active: bool,
}

pub fn dashboard(conn: &Connection, owner_id: &str) -> AppResult<Dashboard> {
    let transactions = transactions::all_transactions(conn, owner_id)?;
    let customer_count = customers::all_customers(conn, owner_id)?.len();
    Ok(Dashboard {
        totals: ledger::totals(&transactions),
        customer_count,
    })
}

pub fn period_report(
    conn: &Connection,
    owner_id: &str,
    range: TimeRange,
    top: usize,
) -> AppResult<PeriodReport> {
    period_report_at(conn, owner_id, range, top, &Local::now())
}

fn period_report_at<Tz: TimeZone>(
    conn: &Connection,
    owner_id: &str,
    range: TimeRange,
    top: usize,
    now: &DateTime<Tz>,
) -> AppResult<PeriodReport> {
    let transactions = transactions::all_transactions(conn, owner_id)?;
    let in_range = ledger::filter_by_range(&transactions, range, now);
    let customers = customers::all_customers(conn, owner_id)?;

    let mut debtors = ledger::period_debtors(&customers, &in_range);
    let active_customers = debtors.len();
    debtors.truncate(top);

    Ok(PeriodReport {
        range,
        totals: ledger::totals(&in_range),
        active_customers,
        top_debtors: debtors,
    })
}

pub fn notifications(conn: &Connection, owner_id: &str, window_days: i64) -> AppResult<Notifications> {
    let today = Local::now().date_naive();
    notifications_for_date(conn, owner_id, today, window_days)
}

fn notifications_for_date(
    conn: &Connection,
    owner_id: &str,
    today: NaiveDate,
    window_days: i64,
) -> AppResult<Notifications> {
    let transactions = transactions::all_transactions(conn, owner_id)?;
    let customers = customers::all_customers(conn, owner_id)?;
    let reminders = ledger::due_reminders(&customers, &transactions, today, window_days);

    let count = |status| reminders.iter().filter(|r| r.status == status).count();
    let overdue_count = count(DueStatus::Overdue);
    let today_count = count(DueStatus::Today);

    Ok(Notifications {
        has_active: overdue_count + today_count > 0,
        overdue_count,
        today_count,
        reminders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, memory_conn};
    use crate::models::{NewCustomer, NewTransaction, TransactionKind};
    use chrono::{Duration, Utc};

    fn customer(conn: &Connection, owner: &str, name: &str) -> String {
        customers::add_customer(
            conn,
            owner,
            NewCustomer {
                name: name.to_string(),
                phone: "+998901234567".to_string(),
                note: None,
            },
        )
        .expect("customer")
        .id
    }

    fn record_at(
        conn: &Connection,
        owner: &str,
        customer_id: &str,
        kind: TransactionKind,
        amount: i64,
        at: DateTime<Utc>,
        due_date: Option<NaiveDate>,
    ) {
        transactions::add_transaction_at(
            conn,
            owner,
            NewTransaction {
                customer_id: customer_id.to_string(),
                kind,
                amount,
                note: None,
                due_date,
            },
            at,
            &Utc,
        )
        .expect("record");
    }

    #[test]
    fn dashboard_totals() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");
        customer(&conn, &owner, "Vali");
        let now = Utc::now();
        record_at(&conn, &owner, &ali, TransactionKind::Debt, 1_000, now, None);
        record_at(&conn, &owner, &ali, TransactionKind::Payment, 400, now, None);

        let dashboard = dashboard(&conn, &owner).expect("dashboard");
        assert_eq!(dashboard.totals.total_debt, 1_000);
        assert_eq!(dashboard.totals.total_paid, 400);
        assert_eq!(dashboard.totals.net_balance, 600);
        assert_eq!(dashboard.customer_count, 2);
    }

    #[test]
    fn period_report_windows_and_top() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");
        let vali = customer(&conn, &owner, "Vali");
        let hasan = customer(&conn, &owner, "Hasan");
        let now = Utc.with_ymd_and_hms(2025, 5, 14, 12, 0, 0).single().expect("now");
        let last_month = now - Duration::days(30);

        record_at(&conn, &owner, &ali, TransactionKind::Debt, 5_000, last_month, None);
        record_at(&conn, &owner, &ali, TransactionKind::Debt, 300, now, None);
        record_at(&conn, &owner, &vali, TransactionKind::Debt, 900, now, None);
        record_at(&conn, &owner, &hasan, TransactionKind::Payment, 200, now, None);

        let month = period_report_at(&conn, &owner, TimeRange::Month, 2, &now).expect("report");
        assert_eq!(month.totals.total_debt, 1_200);
        assert_eq!(month.totals.total_paid, 200);
        assert_eq!(month.active_customers, 3);
        let names: Vec<&str> = month.top_debtors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Vali", "Ali"]);

        let all = period_report_at(&conn, &owner, TimeRange::All, 5, &now).expect("report");
        assert_eq!(all.totals.total_debt, 6_200);
        assert_eq!(all.top_debtors[0].name, "Ali");
    }

    #[test]
    fn notifications_count_overdue_and_today() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");
        let today = NaiveDate::from_ymd_opt(2025, 5, 10).expect("today");
        let now = Utc::now();

        record_at(&conn, &owner, &ali, TransactionKind::Debt, 100, now, Some(today - Duration::days(1)));
        record_at(&conn, &owner, &ali, TransactionKind::Debt, 100, now, Some(today));
        record_at(&conn, &owner, &ali, TransactionKind::Debt, 100, now, Some(today + Duration::days(2)));
        record_at(&conn, &owner, &ali, TransactionKind::Debt, 100, now, Some(today + Duration::days(10)));

        let notes = notifications_for_date(&conn, &owner, today, 3).expect("notifications");
        assert_eq!(notes.reminders.len(), 3);
        assert_eq!(notes.overdue_count, 1);
        assert_eq!(notes.today_count, 1);
        assert!(notes.has_active);

        let quiet = notifications_for_date(&conn, &owner, today - Duration::days(30), 3).expect("notifications");
        assert!(quiet.reminders.is_empty());
        assert!(!quiet.has_active);
    }
}
