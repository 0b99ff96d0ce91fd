use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::ledger::subscription_expired;
use crate::models::{RegisterPayload, UserProfile, UserRecord};

pub const MIN_PASSWORD_LEN: usize = 6;

const USER_COLUMNS: &str = "id, email, password_hash, name, store_name, is_admin, is_blocked, subscription_ts_utc, created_ts_utc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminOverview {
    pub total_shops: i64,
    pub active_shops: i64,
    pub blocked_shops: i64,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let is_admin: i64 = row.get(5)?;
    let is_blocked: i64 = row.get(6)?;
    Ok(UserRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        store_name: row.get(4)?,
        is_admin: is_admin != 0,
        is_blocked: is_blocked != 0,
        subscription_ts_utc: row.get(7)?,
        created_ts_utc: row.get(8)?,
    })
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn validate_email(email: &str) -> AppResult<String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("a valid email is required"));
    }
    Ok(email.to_string())
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> AppResult<Option<UserRecord>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            [email.trim()],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_user(conn: &Connection, user_id: &str) -> AppResult<UserRecord> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [user_id],
        map_user,
    )
    .optional()?
    .ok_or(AppError::NotFound("user"))
}

fn insert_user(conn: &Connection, payload: RegisterPayload, is_admin: bool) -> AppResult<UserProfile> {
    let email = validate_email(&payload.email)?;
    validate_password(&payload.password)?;
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("name is required"));
    }
    if find_user_by_email(conn, &email)?.is_some() {
        return Err(AppError::Conflict("user"));
    }

    let password_hash = hash_password(&payload.password)?;
    let now = Utc::now().timestamp_millis();
    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash,
        name,
        store_name: payload.store_name.trim().to_string(),
        is_admin,
        is_blocked: false,
        subscription_ts_utc: now,
        created_ts_utc: now,
    };

    conn.execute(
        "INSERT INTO users (id, email, password_hash, name, store_name, is_admin, is_blocked, subscription_ts_utc, created_ts_utc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
        params![
            user.id,
            user.email,
            user.password_hash,
            user.name,
            user.store_name,
            is_admin as i64,
            user.subscription_ts_utc,
            user.created_ts_utc
        ],
    )?;
    db::ensure_settings_row(conn, &user.id, &user.store_name, &user.name)?;

    info!(user_id = %user.id, is_admin, "user registered");
    Ok(UserProfile::from(&user))
}

pub fn register_user(conn: &Connection, payload: RegisterPayload) -> AppResult<UserProfile> {
    insert_user(conn, payload, false)
}

/// Creates the configured admin account unless an admin already exists.
pub fn bootstrap_admin(conn: &Connection, email: &str, password: &str) -> AppResult<Option<UserProfile>> {
    let admins: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE is_admin = 1",
        [],
        |row| row.get(0),
    )?;
    if admins > 0 {
        return Ok(None);
    }
    let admin = insert_user(
        conn,
        RegisterPayload {
            email: email.to_string(),
            password: password.to_string(),
            name: "Super Admin".to_string(),
            store_name: "Nasiya Daftar Admin".to_string(),
        },
        true,
    )?;
    Ok(Some(admin))
}

/// Startup variant of `bootstrap_admin`: a rejected admin account is logged
/// and skipped so the app still opens.
pub fn seed_admin(conn: &Connection, email: &str, password: &str) -> Option<UserProfile> {
    match bootstrap_admin(conn, email, password) {
        Ok(Some(admin)) => {
            info!(email, "admin account created");
            Some(admin)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(email, error = %err, "admin account not created");
            None
        }
    }
}

/// Blocks a non-admin whose subscription window has run out. Returns the
/// (possibly updated) user.
fn enforce_subscription(
    conn: &Connection,
    mut user: UserRecord,
    now_ms: i64,
    subscription_days: i64,
) -> AppResult<UserRecord> {
    if user.is_admin || user.is_blocked {
        return Ok(user);
    }
    if subscription_expired(user.subscription_ts_utc, now_ms, subscription_days) {
        conn.execute("UPDATE users SET is_blocked = 1 WHERE id = ?1", [&user.id])?;
        warn!(user_id = %user.id, "subscription expired, account blocked");
        user.is_blocked = true;
    }
    Ok(user)
}

pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    now_ms: i64,
    subscription_days: i64,
) -> AppResult<UserProfile> {
    let Some(user) = find_user_by_email(conn, email)? else {
        warn!("login rejected: unknown email");
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login rejected: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let user = enforce_subscription(conn, user, now_ms, subscription_days)?;
    conn.execute(
        "INSERT INTO session (id, user_id, started_ts_utc) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, started_ts_utc = excluded.started_ts_utc",
        params![user.id, now_ms],
    )?;

    info!(user_id = %user.id, is_blocked = user.is_blocked, "user logged in");
    Ok(UserProfile::from(&user))
}

pub fn logout(conn: &Connection) -> AppResult<()> {
    conn.execute("DELETE FROM session", [])?;
    info!("user logged out");
    Ok(())
}

/// Signed-in user, re-checked against the subscription window.
pub fn current_session(
    conn: &Connection,
    now_ms: i64,
    subscription_days: i64,
) -> AppResult<Option<UserProfile>> {
    let user_id: Option<String> = conn
        .query_row("SELECT user_id FROM session WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    let user = find_user(conn, &user_id)?;
    let user = enforce_subscription(conn, user, now_ms, subscription_days)?;
    Ok(Some(UserProfile::from(&user)))
}

/// Signed-in, unblocked tenant allowed to touch ledger data.
pub fn require_tenant(conn: &Connection, now_ms: i64, subscription_days: i64) -> AppResult<UserProfile> {
    let user = current_session(conn, now_ms, subscription_days)?.ok_or(AppError::Unauthorized)?;
    if user.is_blocked {
        return Err(AppError::Blocked);
    }
    Ok(user)
}

pub fn require_admin(conn: &Connection, now_ms: i64, subscription_days: i64) -> AppResult<UserProfile> {
    let user = current_session(conn, now_ms, subscription_days)?.ok_or(AppError::Unauthorized)?;
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

pub fn list_shops(conn: &Connection) -> AppResult<Vec<UserProfile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE is_admin = 0 ORDER BY created_ts_utc DESC",
        USER_COLUMNS
    ))?;
    let rows = stmt.query_map([], map_user)?;

    let mut shops = Vec::new();
    for row in rows {
        shops.push(UserProfile::from(&row?));
    }
    Ok(shops)
}

pub fn admin_overview(conn: &Connection) -> AppResult<AdminOverview> {
    let (total_shops, blocked_shops): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_blocked), 0) FROM users WHERE is_admin = 0",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(AdminOverview {
        total_shops,
        active_shops: total_shops - blocked_shops,
        blocked_shops,
    })
}

pub fn create_shop(conn: &Connection, payload: RegisterPayload) -> AppResult<UserProfile> {
    register_user(conn, payload)
}

pub fn update_user_password(conn: &Connection, user_id: &str, new_password: &str) -> AppResult<()> {
    validate_password(new_password)?;
    let hash = hash_password(new_password)?;
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![hash, user_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("user"));
    }
    info!(user_id, "password updated");
    Ok(())
}

pub fn toggle_user_block(conn: &Connection, user_id: &str) -> AppResult<UserProfile> {
    let user = find_user(conn, user_id)?;
    if user.is_admin {
        return Err(AppError::validation("admin accounts cannot be blocked"));
    }
    conn.execute(
        "UPDATE users SET is_blocked = ?1 WHERE id = ?2",
        params![!user.is_blocked as i64, user_id],
    )?;
    info!(user_id, blocked = !user.is_blocked, "block status toggled");
    Ok(UserProfile::from(&find_user(conn, user_id)?))
}

pub fn update_user_login(conn: &Connection, user_id: &str, new_email: &str) -> AppResult<UserProfile> {
    let email = validate_email(new_email)?;
    if let Some(existing) = find_user_by_email(conn, &email)? {
        if existing.id != user_id {
            return Err(AppError::Conflict("user"));
        }
    }
    let changed = conn.execute(
        "UPDATE users SET email = ?1 WHERE id = ?2",
        params![email, user_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("user"));
    }
    info!(user_id, "login updated");
    Ok(UserProfile::from(&find_user(conn, user_id)?))
}

/// Restarts the subscription window from `now_ms` and lifts the block.
pub fn renew_subscription(conn: &Connection, user_id: &str, now_ms: i64) -> AppResult<UserProfile> {
    let changed = conn.execute(
        "UPDATE users SET subscription_ts_utc = ?1, is_blocked = 0 WHERE id = ?2",
        params![now_ms, user_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("user"));
    }
    info!(user_id, "subscription renewed");
    Ok(UserProfile::from(&find_user(conn, user_id)?))
}
