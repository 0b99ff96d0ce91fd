use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::models::{Customer, CustomerFilter, CustomerPatch, CustomerSummary, NewCustomer};
use crate::transactions;

const CUSTOMER_COLUMNS: &str = "id, owner_id, name, phone, note, created_ts_utc";

fn map_customer(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        note: row.get(4)?,
        created_ts_utc: row.get(5)?,
    })
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

pub fn get_customer(conn: &Connection, owner_id: &str, customer_id: &str) -> AppResult<Customer> {
    conn.query_row(
        &format!(
            "SELECT {} FROM customers WHERE id = ?1 AND owner_id = ?2",
            CUSTOMER_COLUMNS
        ),
        params![customer_id, owner_id],
        map_customer,
    )
    .optional()?
    .ok_or(AppError::NotFound("customer"))
}

/// All of the tenant's customers, newest first.
pub fn all_customers(conn: &Connection, owner_id: &str) -> AppResult<Vec<Customer>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM customers WHERE owner_id = ?1 ORDER BY created_ts_utc DESC, rowid DESC",
        CUSTOMER_COLUMNS
    ))?;
    let rows = stmt.query_map([owner_id], map_customer)?;

    let mut customers = Vec::new();
    for row in rows {
        customers.push(row?);
    }
    Ok(customers)
}

pub fn add_customer(conn: &Connection, owner_id: &str, payload: NewCustomer) -> AppResult<Customer> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("customer name is required"));
    }
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        name,
        phone: payload.phone.trim().to_string(),
        note: clean_note(payload.note),
        created_ts_utc: Utc::now().timestamp_millis(),
    };

    conn.execute(
        "INSERT INTO customers (id, owner_id, name, phone, note, created_ts_utc) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            customer.id,
            customer.owner_id,
            customer.name,
            customer.phone,
            customer.note,
            customer.created_ts_utc
        ],
    )?;

    info!(customer_id = %customer.id, "customer added");
    Ok(customer)
}

pub fn update_customer(
    conn: &Connection,
    owner_id: &str,
    customer_id: &str,
    patch: CustomerPatch,
) -> AppResult<Customer> {
    let mut customer = get_customer(conn, owner_id, customer_id)?;
    if let Some(name) = patch.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("customer name is required"));
        }
        customer.name = name;
    }
    if let Some(phone) = patch.phone {
        customer.phone = phone.trim().to_string();
    }
    if patch.note.is_some() {
        customer.note = clean_note(patch.note);
    }

    conn.execute(
        "UPDATE customers SET name = ?1, phone = ?2, note = ?3 WHERE id = ?4 AND owner_id = ?5",
        params![customer.name, customer.phone, customer.note, customer.id, owner_id],
    )?;

    info!(customer_id, "customer updated");
    Ok(customer)
}

/// Removes the customer together with its transactions in one SQLite
/// transaction.
pub fn delete_customer(conn: &mut Connection, owner_id: &str, customer_id: &str) -> AppResult<()> {
    let tx = conn.transaction()?;
    let removed_tx = tx.execute(
        "DELETE FROM transactions WHERE customer_id = ?1 AND owner_id = ?2",
        params![customer_id, owner_id],
    )?;
    let removed = tx.execute(
        "DELETE FROM customers WHERE id = ?1 AND owner_id = ?2",
        params![customer_id, owner_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound("customer"));
    }
    tx.commit()?;

    info!(customer_id, transactions = removed_tx, "customer deleted");
    Ok(())
}

fn matches_filter(summary: &CustomerSummary, search: &str, only_debtors: bool) -> bool {
    let customer = &summary.customer;
    let matches_search = search.is_empty()
        || customer.name.to_lowercase().contains(search)
        || customer.phone.contains(search);
    matches_search && (!only_debtors || summary.balance > 0)
}

pub fn list_customers(
    conn: &Connection,
    owner_id: &str,
    filter: &CustomerFilter,
) -> AppResult<Vec<CustomerSummary>> {
    let customers = all_customers(conn, owner_id)?;
    let transactions = transactions::all_transactions(conn, owner_id)?;
    let balances = ledger::balances_by_customer(&transactions);
    let search = filter.search.trim().to_lowercase();

    Ok(customers
        .into_iter()
        .map(|customer| {
            let balance = balances.get(&customer.id).copied().unwrap_or(0);
            let last_transaction_ts = ledger::last_transaction_ts(&transactions, &customer.id);
            CustomerSummary {
                customer,
                balance,
                last_transaction_ts,
            }
        })
        .filter(|summary| matches_filter(summary, &search, filter.only_debtors))
        .collect())
}

pub fn customer_summary(
    conn: &Connection,
    owner_id: &str,
    customer_id: &str,
) -> AppResult<CustomerSummary> {
    let customer = get_customer(conn, owner_id, customer_id)?;
    let history = transactions::customer_transactions(conn, owner_id, customer_id)?;
    Ok(CustomerSummary {
        balance: ledger::customer_balance(&history, customer_id),
        last_transaction_ts: ledger::last_transaction_ts(&history, customer_id),
        customer,
    })
}
