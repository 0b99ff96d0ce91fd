//! JSON snapshots of one tenant's ledger, in the `{customers, transactions,
//! settings}` shape the web build kept in local storage.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::customers;
use crate::error::{AppError, AppResult};
use crate::models::{Customer, Settings, Transaction};
use crate::settings;
use crate::transactions;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub exported_ts_utc: i64,
    pub customers: Vec<Customer>,
    pub transactions: Vec<Transaction>,
    pub settings: Settings,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub customers: usize,
    pub transactions: usize,
}

pub fn export_snapshot(conn: &Connection, owner_id: &str) -> AppResult<LedgerSnapshot> {
    Ok(LedgerSnapshot {
        version: SNAPSHOT_VERSION,
        exported_ts_utc: Utc::now().timestamp_millis(),
        customers: customers::all_customers(conn, owner_id)?,
        transactions: transactions::all_transactions(conn, owner_id)?,
        settings: settings::get_settings(conn, owner_id)?,
    })
}

/// Checks the whole snapshot up front and returns its settings normalised.
fn validate(snapshot: &LedgerSnapshot) -> AppResult<Settings> {
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(AppError::Validation(format!(
            "backup version {} is newer than supported {}",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }
    let ids: HashSet<&str> = snapshot.customers.iter().map(|c| c.id.as_str()).collect();
    if ids.len() != snapshot.customers.len() {
        return Err(AppError::validation("backup has duplicate customer ids"));
    }
    let mut transaction_ids = HashSet::new();
    for tx in &snapshot.transactions {
        if !transaction_ids.insert(tx.id.as_str()) {
            return Err(AppError::Validation(format!(
                "backup has duplicate transaction id {}",
                tx.id
            )));
        }
        transactions::validate_amount(tx.amount).map_err(|err| {
            AppError::Validation(format!("transaction {}: {}", tx.id, err))
        })?;
        if !ids.contains(tx.customer_id.as_str()) {
            return Err(AppError::Validation(format!(
                "transaction {} references an unknown customer",
                tx.id
            )));
        }
    }
    settings::validated(&snapshot.settings)
}

/// Replaces the tenant's customers, transactions and settings with the
/// snapshot. Nothing is written unless the whole snapshot applies.
///
/// Rows get fresh ids, so the same backup can be restored into any account
/// sharing this database.
pub fn import_snapshot(
    conn: &mut Connection,
    owner_id: &str,
    snapshot: &LedgerSnapshot,
) -> AppResult<ImportSummary> {
    let imported_settings = validate(snapshot)?;
    // Make sure the settings row exists before the write below updates it.
    settings::get_settings(conn, owner_id)?;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM transactions WHERE owner_id = ?1", [owner_id])?;
    tx.execute("DELETE FROM customers WHERE owner_id = ?1", [owner_id])?;

    let mut new_ids: HashMap<&str, String> = HashMap::new();
    for customer in &snapshot.customers {
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO customers (id, owner_id, name, phone, note, created_ts_utc) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                owner_id,
                customer.name,
                customer.phone,
                customer.note,
                customer.created_ts_utc
            ],
        )?;
        new_ids.insert(customer.id.as_str(), id);
    }
    for record in &snapshot.transactions {
        let customer_id = new_ids
            .get(record.customer_id.as_str())
            .ok_or(AppError::NotFound("customer"))?;
        tx.execute(
            "INSERT INTO transactions (id, owner_id, customer_id, kind, amount, ts_utc, date_local, note, due_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                Uuid::new_v4().to_string(),
                owner_id,
                customer_id,
                record.kind,
                record.amount,
                record.ts_utc,
                record.date_local,
                record.note,
                record.due_date
            ],
        )?;
    }
    settings::write_settings(&tx, owner_id, &imported_settings)?;
    tx.commit()?;

    let summary = ImportSummary {
        customers: snapshot.customers.len(),
        transactions: snapshot.transactions.len(),
    };
    info!(
        owner_id,
        customers = summary.customers,
        transactions = summary.transactions,
        "backup imported"
    );
    Ok(summary)
}

pub fn write_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> AppResult<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> AppResult<LedgerSnapshot> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, memory_conn};
    use crate::models::{NewCustomer, NewTransaction, SettingsPatch, TransactionKind};

    fn seed(conn: &Connection, owner: &str) -> String {
        let customer = customers::add_customer(
            conn,
            owner,
            NewCustomer {
                name: "Ali".to_string(),
                phone: "+998901112233".to_string(),
                note: Some("qo'shni".to_string()),
            },
        )
        .expect("customer");
        for (kind, amount) in [(TransactionKind::Debt, 700), (TransactionKind::Payment, 200)] {
            transactions::add_transaction(
                conn,
                owner,
                NewTransaction {
                    customer_id: customer.id.clone(),
                    kind,
                    amount,
                    note: None,
                    due_date: None,
                },
            )
            .expect("transaction");
        }
        customer.id
    }

    #[test]
    fn restores_into_a_fresh_tenant_via_file() {
        let conn = memory_conn();
        let source = insert_user(&conn, "source@nasiya.uz");
        seed(&conn, &source);
        settings::update_settings(
            &conn,
            &source,
            SettingsPatch {
                store_name: Some("Yangi Market".to_string()),
                ..Default::default()
            },
        )
        .expect("settings");
        let snapshot = export_snapshot(&conn, &source).expect("export");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("backup.json");
        write_snapshot(&path, &snapshot).expect("write");
        let loaded = read_snapshot(&path).expect("read");
        assert_eq!(loaded, snapshot);

        // A second database stands in for another device.
        let mut target_conn = memory_conn();
        let target = insert_user(&target_conn, "target@nasiya.uz");
        let summary = import_snapshot(&mut target_conn, &target, &loaded).expect("import");
        assert_eq!(summary, ImportSummary { customers: 1, transactions: 2 });

        let restored = crate::customers::list_customers(&target_conn, &target, &Default::default())
            .expect("customers");
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].balance, 500);
        assert_eq!(restored[0].customer.owner_id, target);
        assert_eq!(
            settings::get_settings(&target_conn, &target).expect("settings").store_name,
            "Yangi Market"
        );
    }

    #[test]
    fn restores_into_another_account_on_the_same_database() {
        let mut conn = memory_conn();
        let first = insert_user(&conn, "first@nasiya.uz");
        let second = insert_user(&conn, "second@nasiya.uz");
        let ali = seed(&conn, &first);
        let snapshot = export_snapshot(&conn, &first).expect("export");

        let summary = import_snapshot(&mut conn, &second, &snapshot).expect("import");
        assert_eq!(summary, ImportSummary { customers: 1, transactions: 2 });

        let restored = customers::list_customers(&conn, &second, &Default::default()).expect("customers");
        assert_eq!(restored.len(), 1);
        assert_ne!(restored[0].customer.id, ali);
        assert_eq!(restored[0].balance, 500);

        // The source account is untouched.
        let original = customers::list_customers(&conn, &first, &Default::default()).expect("customers");
        assert_eq!(original.len(), 1);
        assert_eq!(original[0].customer.id, ali);
        assert_eq!(transactions::all_transactions(&conn, &first).expect("all").len(), 2);

        // Restoring over itself replaces rather than duplicates.
        import_snapshot(&mut conn, &first, &snapshot).expect("reimport");
        assert_eq!(transactions::all_transactions(&conn, &first).expect("all").len(), 2);
    }

    #[test]
    fn rejects_bad_rows_and_settings() {
        let mut conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        seed(&conn, &owner);
        let snapshot = export_snapshot(&conn, &owner).expect("export");

        let mut duplicated = snapshot.clone();
        let copy = duplicated.transactions[0].clone();
        duplicated.transactions.push(copy);
        let mut oversized = snapshot.clone();
        oversized.transactions[0].amount = transactions::MAX_AMOUNT + 1;
        let mut bad_currency = snapshot.clone();
        bad_currency.settings.currency = "so'm".to_string();
        let mut blank_template = snapshot.clone();
        blank_template.settings.sms_template = String::new();

        for broken in [duplicated, oversized, bad_currency, blank_template] {
            let err = import_snapshot(&mut conn, &owner, &broken).expect_err("rejected");
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(transactions::all_transactions(&conn, &owner).expect("all").len(), 2);
    }

    #[test]
    fn rows_without_owner_still_parse() {
        let raw = r#"{
            "customers": [{"id": "c1", "name": "Ali", "phone": "", "note": null, "created_ts_utc": 1}],
            "transactions": [{"id": "t1", "customer_id": "c1", "kind": "debt", "amount": 10,
                              "ts_utc": 2, "date_local": "2025-05-10", "note": null, "due_date": null}],
            "settings": {"currency": "UZS", "store_name": "Baraka", "owner_name": "Azizbek", "phone": "",
                         "sms_template": "{mijoz}", "is_setup_completed": true, "profile_image": null}
        }"#;
        let snapshot: LedgerSnapshot = serde_json::from_str(raw).expect("parse");
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);

        let mut conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        import_snapshot(&mut conn, &owner, &snapshot).expect("import");
        let restored = transactions::all_transactions(&conn, &owner).expect("all");
        assert_eq!(restored[0].owner_id, owner);
        assert_eq!(restored[0].amount, 10);
    }

    #[test]
    fn rejects_dangling_transactions_without_writing() {
        let mut conn = memory_conn();
        let owner = insert_user(&conn, "shop@nasiya.uz");
        seed(&conn, &owner);
        let mut snapshot = export_snapshot(&conn, &owner).expect("export");
        snapshot.customers.clear();

        let err = import_snapshot(&mut conn, &owner, &snapshot).expect_err("dangling");
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(transactions::all_transactions(&conn, &owner).expect("all").len(), 2);
    }
}
