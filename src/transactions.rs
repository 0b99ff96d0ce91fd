use std::collections::HashMap;

use chrono::{DateTime, Local, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use tracing::info;
use uuid::Uuid;

use crate::customers;
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::models::{NewTransaction, Transaction, TransactionFilter, TransactionView};

pub const UNKNOWN_CUSTOMER: &str = "Noma'lum";

/// Largest single amount accepted, in whole currency units.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

const TRANSACTION_COLUMNS: &str =
    "id, owner_id, customer_id, kind, amount, ts_utc, date_local, note, due_date";

pub(crate) fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        customer_id: row.get(2)?,
        kind: row.get(3)?,
        amount: row.get(4)?,
        ts_utc: row.get(5)?,
        date_local: row.get(6)?,
        note: row.get(7)?,
        due_date: row.get(8)?,
    })
}

fn query_transactions(
    conn: &Connection,
    sql_filter: &str,
    limit: Option<u32>,
    params: impl rusqlite::Params,
) -> AppResult<Vec<Transaction>> {
    let limit = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions WHERE {} ORDER BY ts_utc DESC, rowid DESC{}",
        TRANSACTION_COLUMNS, sql_filter, limit
    ))?;
    let rows = stmt.query_map(params, map_transaction)?;

    let mut transactions = Vec::new();
    for row in rows {
        transactions.push(row?);
    }
    Ok(transactions)
}

pub(crate) fn validate_amount(amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::validation("amount must be greater than zero"));
    }
    if amount > MAX_AMOUNT {
        return Err(AppError::Validation(format!(
            "amount must not exceed {}",
            MAX_AMOUNT
        )));
    }
    Ok(())
}

/// Every transaction of the tenant, newest first.
pub fn all_transactions(conn: &Connection, owner_id: &str) -> AppResult<Vec<Transaction>> {
    query_transactions(conn, "owner_id = ?1", None, [owner_id])
}

pub fn customer_transactions(
    conn: &Connection,
    owner_id: &str,
    customer_id: &str,
) -> AppResult<Vec<Transaction>> {
    query_transactions(
        conn,
        "owner_id = ?1 AND customer_id = ?2",
        None,
        params![owner_id, customer_id],
    )
}

pub fn add_transaction(
    conn: &Connection,
    owner_id: &str,
    payload: NewTransaction,
) -> AppResult<Transaction> {
    add_transaction_at(conn, owner_id, payload, Utc::now(), &Local)
}

/// Records a transaction stamped at `now`; `date_local` is taken in `tz`.
pub fn add_transaction_at<Tz: TimeZone>(
    conn: &Connection,
    owner_id: &str,
    payload: NewTransaction,
    now: DateTime<Utc>,
    tz: &Tz,
) -> AppResult<Transaction> {
    validate_amount(payload.amount)?;
    customers::get_customer(conn, owner_id, &payload.customer_id)?;

    let transaction = Transaction {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        customer_id: payload.customer_id,
        kind: payload.kind,
        amount: payload.amount,
        ts_utc: now.timestamp_millis(),
        date_local: now.with_timezone(tz).date_naive().format("%Y-%m-%d").to_string(),
        note: payload
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        due_date: payload.due_date,
    };

    conn.execute(
        "INSERT INTO transactions (id, owner_id, customer_id, kind, amount, ts_utc, date_local, note, due_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            transaction.id,
            transaction.owner_id,
            transaction.customer_id,
            transaction.kind,
            transaction.amount,
            transaction.ts_utc,
            transaction.date_local,
            transaction.note,
            transaction.due_date
        ],
    )?;

    info!(
        transaction_id = %transaction.id,
        customer_id = %transaction.customer_id,
        kind = %transaction.kind,
        amount = transaction.amount,
        "transaction recorded"
    );
    Ok(transaction)
}

pub fn delete_transaction(conn: &Connection, owner_id: &str, transaction_id: &str) -> AppResult<()> {
    let removed = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND owner_id = ?2",
        params![transaction_id, owner_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound("transaction"));
    }
    info!(transaction_id, "transaction deleted");
    Ok(())
}

fn customer_names(conn: &Connection, owner_id: &str) -> AppResult<HashMap<String, String>> {
    Ok(customers::all_customers(conn, owner_id)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}

fn into_views(transactions: Vec<Transaction>, names: &HashMap<String, String>) -> Vec<TransactionView> {
    transactions
        .into_iter()
        .map(|transaction| TransactionView {
            customer_name: names
                .get(&transaction.customer_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string()),
            transaction,
        })
        .collect()
}

pub fn list_transactions(
    conn: &Connection,
    owner_id: &str,
    filter: &TransactionFilter,
) -> AppResult<Vec<TransactionView>> {
    list_transactions_at(conn, owner_id, filter, &Local::now())
}

pub fn list_transactions_at<Tz: TimeZone>(
    conn: &Connection,
    owner_id: &str,
    filter: &TransactionFilter,
    now: &DateTime<Tz>,
) -> AppResult<Vec<TransactionView>> {
    let transactions = all_transactions(conn, owner_id)?;
    let in_range = ledger::filter_by_range(&transactions, filter.range, now);
    let names = customer_names(conn, owner_id)?;
    let needle = ledger::normalize_search(&filter.search);

    let views = into_views(in_range, &names)
        .into_iter()
        .filter(|view| filter.kind.map_or(true, |kind| view.transaction.kind == kind))
        .filter(|view| {
            needle.is_empty()
                || ledger::normalize_search(&view.customer_name).contains(&needle)
                || view
                    .transaction
                    .note
                    .as_deref()
                    .is_some_and(|note| ledger::normalize_search(note).contains(&needle))
        })
        .collect();
    Ok(views)
}

pub fn recent_transactions(
    conn: &Connection,
    owner_id: &str,
    limit: u32,
) -> AppResult<Vec<TransactionView>> {
    let transactions = query_transactions(conn, "owner_id = ?1", Some(limit), [owner_id])?;
    let names = customer_names(conn, owner_id)?;
    Ok(into_views(transactions, &names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, memory_conn};
    use crate::models::{NewCustomer, TimeRange, TransactionKind};
    use chrono::{Duration, FixedOffset};

    fn customer(conn: &Connection, owner: &str, name: &str) -> String {
        customers::add_customer(
            conn,
            owner,
            NewCustomer {
                name: name.to_string(),
                phone: String::new(),
                note: None,
            },
        )
        .expect("customer")
        .id
    }

    fn payload(customer_id: &str, kind: TransactionKind, amount: i64, note: Option<&str>) -> NewTransaction {
        NewTransaction {
            customer_id: customer_id.to_string(),
            kind,
            amount,
            note: note.map(str::to_string),
            due_date: None,
        }
    }

    #[test]
    fn rejects_invalid_transactions() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");

        let err = add_transaction(&conn, &owner, payload(&ali, TransactionKind::Debt, 0, None))
            .expect_err("zero amount");
        assert!(matches!(err, AppError::Validation(_)));
        let err = add_transaction(
            &conn,
            &owner,
            payload(&ali, TransactionKind::Debt, MAX_AMOUNT + 1, None),
        )
        .expect_err("oversized amount");
        assert!(matches!(err, AppError::Validation(_)));
        add_transaction(&conn, &owner, payload(&ali, TransactionKind::Debt, MAX_AMOUNT, None))
            .expect("largest amount");
        let err = add_transaction(&conn, &owner, payload("missing", TransactionKind::Debt, 10, None))
            .expect_err("unknown customer");
        assert!(matches!(err, AppError::NotFound("customer")));
    }

    #[test]
    fn large_debts_keep_listing_customers() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");
        for _ in 0..2 {
            add_transaction(&conn, &owner, payload(&ali, TransactionKind::Debt, i64::MAX / 2 + 1, None))
                .expect_err("rejected");
            add_transaction(&conn, &owner, payload(&ali, TransactionKind::Debt, MAX_AMOUNT, None))
                .expect("accepted");
        }

        let listed = customers::list_customers(&conn, &owner, &Default::default()).expect("list");
        assert_eq!(listed[0].balance, 2 * MAX_AMOUNT);
    }

    #[test]
    fn date_local_follows_timezone() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");
        let tashkent = FixedOffset::east_opt(5 * 3600).expect("offset");
        let now = Utc.with_ymd_and_hms(2025, 5, 13, 20, 0, 0).single().expect("now");

        let tx = add_transaction_at(
            &conn,
            &owner,
            payload(&ali, TransactionKind::Debt, 1000, Some("  non  ")),
            now,
            &tashkent,
        )
        .expect("add");
        assert_eq!(tx.date_local, "2025-05-14");
        assert_eq!(tx.note.as_deref(), Some("non"));

        let history = customer_transactions(&conn, &owner, &ali).expect("history");
        assert_eq!(history, vec![tx]);
    }

    #[test]
    fn delete_is_scoped_to_owner() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let other = insert_user(&conn, "other@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");
        let tx = add_transaction(&conn, &owner, payload(&ali, TransactionKind::Debt, 10, None)).expect("add");

        assert!(matches!(
            delete_transaction(&conn, &other, &tx.id),
            Err(AppError::NotFound(_))
        ));
        delete_transaction(&conn, &owner, &tx.id).expect("delete");
        assert!(all_transactions(&conn, &owner).expect("all").is_empty());
    }

    #[test]
    fn list_filters_and_orders() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali Valiyev");
        let hasan = customer(&conn, &owner, "Hasan");
        let now = Utc::now();
        let earlier = now - Duration::days(40);

        add_transaction_at(&conn, &owner, payload(&ali, TransactionKind::Debt, 100, Some("un")), earlier, &Utc)
            .expect("add");
        add_transaction_at(&conn, &owner, payload(&hasan, TransactionKind::Payment, 50, Some("Naqd pul")), now, &Utc)
            .expect("add");
        add_transaction_at(&conn, &owner, payload(&ali, TransactionKind::Payment, 30, None), now, &Utc)
            .expect("add");

        let all = list_transactions_at(&conn, &owner, &TransactionFilter::default(), &now).expect("list");
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].transaction.ts_utc >= w[1].transaction.ts_utc));

        let payments = list_transactions_at(
            &conn,
            &owner,
            &TransactionFilter {
                kind: Some(TransactionKind::Payment),
                ..Default::default()
            },
            &now,
        )
        .expect("list");
        assert_eq!(payments.len(), 2);

        let by_name = list_transactions_at(
            &conn,
            &owner,
            &TransactionFilter {
                search: "ali val".to_string(),
                ..Default::default()
            },
            &now,
        )
        .expect("list");
        assert_eq!(by_name.len(), 2);
        assert!(by_name.iter().all(|v| v.customer_name == "Ali Valiyev"));

        let by_note = list_transactions_at(
            &conn,
            &owner,
            &TransactionFilter {
                search: "naqd".to_string(),
                ..Default::default()
            },
            &now,
        )
        .expect("list");
        assert_eq!(by_note.len(), 1);

        let today = list_transactions_at(
            &conn,
            &owner,
            &TransactionFilter {
                range: TimeRange::Today,
                ..Default::default()
            },
            &now,
        )
        .expect("list");
        assert_eq!(today.len(), 2);
    }

    #[test]
    fn recent_limits_and_names() {
        let conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        let ali = customer(&conn, &owner, "Ali");
        for amount in 1..=8 {
            add_transaction(&conn, &owner, payload(&ali, TransactionKind::Debt, amount, None)).expect("add");
        }
        let recent = recent_transactions(&conn, &owner, 6).expect("recent");
        assert_eq!(recent.len(), 6);
        assert!(recent.iter().all(|v| v.customer_name == "Ali"));
    }
}
