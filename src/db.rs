use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use rusqlite::{params, Connection, OptionalExtension};
use tauri::{AppHandle, Manager};

use crate::error::AppResult;
use crate::models::Settings;

pub fn db_path(app: &AppHandle, file_name: &str) -> AppResult<PathBuf> {
    let data_dir = app.path().app_data_dir()?;
    fs::create_dir_all(&data_dir)?;
    Ok(data_dir.join(file_name))
}

pub fn open_connection(path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> AppResult<()> {
    // foreign_keys is per connection, not per file.
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

pub fn init_db(path: &Path) -> AppResult<()> {
    let conn = open_connection(path)?;
    migrate(&conn)
}

pub fn migrate(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS users (
          id TEXT PRIMARY KEY,
          email TEXT NOT NULL UNIQUE COLLATE NOCASE,
          password_hash TEXT NOT NULL,
          name TEXT NOT NULL,
          store_name TEXT NOT NULL,
          is_admin INTEGER NOT NULL DEFAULT 0,
          is_blocked INTEGER NOT NULL DEFAULT 0,
          subscription_ts_utc INTEGER NOT NULL,
          created_ts_utc INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS session (
          id INTEGER PRIMARY KEY CHECK (id = 1),
          user_id TEXT NOT NULL,
          started_ts_utc INTEGER NOT NULL,
          FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );
        CREATE TABLE IF NOT EXISTS settings (
          owner_id TEXT PRIMARY KEY,
          currency TEXT NOT NULL,
          store_name TEXT NOT NULL,
          owner_name TEXT NOT NULL,
          phone TEXT NOT NULL,
          sms_template TEXT NOT NULL,
          is_setup_completed INTEGER NOT NULL DEFAULT 0,
          profile_image TEXT,
          updated_ts_utc INTEGER NOT NULL,
          FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE CASCADE
        );
        CREATE TABLE IF NOT EXISTS customers (
          id TEXT PRIMARY KEY,
          owner_id TEXT NOT NULL,
          name TEXT NOT NULL,
          phone TEXT NOT NULL,
          note TEXT,
          created_ts_utc INTEGER NOT NULL,
          FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_customers_owner ON customers(owner_id);
        CREATE TABLE IF NOT EXISTS transactions (
          id TEXT PRIMARY KEY,
          owner_id TEXT NOT NULL,
          customer_id TEXT NOT NULL,
          kind TEXT NOT NULL CHECK (kind IN ('debt', 'payment')),
          amount INTEGER NOT NULL CHECK (amount > 0),
          ts_utc INTEGER NOT NULL,
          date_local TEXT NOT NULL,
          note TEXT,
          due_date TEXT,
          FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE CASCADE,
          FOREIGN KEY(customer_id) REFERENCES customers(id)
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_owner ON transactions(owner_id, ts_utc);
        CREATE INDEX IF NOT EXISTS idx_transactions_customer ON transactions(customer_id);",
    )?;
    Ok(())
}

/// Creates the tenant's settings row from defaults if it does not exist yet.
pub fn ensure_settings_row(
    conn: &Connection,
    owner_id: &str,
    store_name: &str,
    owner_name: &str,
) -> AppResult<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT owner_id FROM settings WHERE owner_id = ?1",
            [owner_id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_none() {
        let defaults = Settings::for_owner(store_name, owner_name);
        conn.execute(
            "INSERT INTO settings (owner_id, currency, store_name, owner_name, phone, sms_template, is_setup_completed, profile_image, updated_ts_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7)",
            params![
                owner_id,
                defaults.currency,
                defaults.store_name,
                defaults.owner_name,
                defaults.phone,
                defaults.sms_template,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        migrate(&conn).expect("first");
        migrate(&conn).expect("second");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users', 'session', 'settings', 'customers', 'transactions')",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(tables, 5);
    }

    #[test]
    fn file_backed_database_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.sqlite");
        init_db(&path).expect("init");
        {
            let conn = open_connection(&path).expect("open");
            test_support::insert_user(&conn, "shop@nasiya.uz");
        }
        let conn = open_connection(&path).expect("reopen");
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .expect("count");
        assert_eq!(users, 1);
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .expect("pragma");
        assert_eq!(fk, 1);
    }

    #[test]
    fn settings_row_created_once() {
        let conn = test_support::memory_conn();
        let owner = test_support::insert_user(&conn, "a@nasiya.uz");
        ensure_settings_row(&conn, &owner, "Other", "Other").expect("ensure");
        let store: String = conn
            .query_row(
                "SELECT store_name FROM settings WHERE owner_id = ?1",
                [&owner],
                |row| row.get(0),
            )
            .expect("settings");
        assert_eq!(store, "Baraka Market");
    }
}
