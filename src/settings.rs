use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;

use crate::auth;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{Settings, SettingsPatch};

pub fn get_settings(conn: &Connection, owner_id: &str) -> AppResult<Settings> {
    let user = auth::find_user(conn, owner_id)?;
    db::ensure_settings_row(conn, owner_id, &user.store_name, &user.name)?;
    let settings = conn.query_row(
        "SELECT currency, store_name, owner_name, phone, sms_template, is_setup_completed, profile_image
         FROM settings WHERE owner_id = ?1",
        [owner_id],
        |row| {
            let completed: i64 = row.get(5)?;
            Ok(Settings {
                currency: row.get(0)?,
                store_name: row.get(1)?,
                owner_name: row.get(2)?,
                phone: row.get(3)?,
                sms_template: row.get(4)?,
                is_setup_completed: completed != 0,
                profile_image: row.get(6)?,
            })
        },
    )?;
    Ok(settings)
}

pub(crate) fn write_settings(conn: &Connection, owner_id: &str, settings: &Settings) -> AppResult<()> {
    conn.execute(
        "UPDATE settings SET currency = ?1, store_name = ?2, owner_name = ?3, phone = ?4,
           sms_template = ?5, is_setup_completed = ?6, profile_image = ?7, updated_ts_utc = ?8
         WHERE owner_id = ?9",
        params![
            settings.currency,
            settings.store_name,
            settings.owner_name,
            settings.phone,
            settings.sms_template,
            settings.is_setup_completed as i64,
            settings.profile_image,
            Utc::now().timestamp_millis(),
            owner_id
        ],
    )?;
    Ok(())
}

fn validate_currency(code: &str) -> AppResult<String> {
    let code = code.trim().to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Validation(format!(
            "currency must be a 3-letter ISO code, got {:?}",
            code
        )));
    }
    Ok(code)
}

fn validate_template(template: &str) -> AppResult<()> {
    if template.trim().is_empty() {
        return Err(AppError::validation("SMS template cannot be empty"));
    }
    Ok(())
}

/// Settings from outside the app (a backup) held to the same rules as
/// `update_settings`. Returns them normalised.
pub(crate) fn validated(settings: &Settings) -> AppResult<Settings> {
    validate_template(&settings.sms_template)?;
    Ok(Settings {
        currency: validate_currency(&settings.currency)?,
        store_name: settings.store_name.trim().to_string(),
        owner_name: settings.owner_name.trim().to_string(),
        phone: settings.phone.trim().to_string(),
        sms_template: settings.sms_template.clone(),
        is_setup_completed: settings.is_setup_completed,
        profile_image: settings
            .profile_image
            .clone()
            .filter(|p| !p.trim().is_empty()),
    })
}

pub fn update_settings(conn: &Connection, owner_id: &str, patch: SettingsPatch) -> AppResult<Settings> {
    let mut settings = get_settings(conn, owner_id)?;
    if let Some(currency) = patch.currency {
        settings.currency = validate_currency(&currency)?;
    }
    if let Some(store_name) = patch.store_name {
        settings.store_name = store_name.trim().to_string();
    }
    if let Some(owner_name) = patch.owner_name {
        settings.owner_name = owner_name.trim().to_string();
    }
    if let Some(phone) = patch.phone {
        settings.phone = phone.trim().to_string();
    }
    if let Some(template) = patch.sms_template {
        validate_template(&template)?;
        settings.sms_template = template;
    }
    if let Some(completed) = patch.is_setup_completed {
        settings.is_setup_completed = completed;
    }
    if patch.profile_image.is_some() {
        settings.profile_image = patch.profile_image.filter(|p| !p.trim().is_empty());
    }

    write_settings(conn, owner_id, &settings)?;
    info!(owner_id, "settings updated");
    Ok(settings)
}

pub fn complete_onboarding(
    conn: &Connection,
    owner_id: &str,
    store_name: &str,
    owner_name: &str,
    phone: &str,
) -> AppResult<Settings> {
    let fields = [("store name", store_name), ("owner name", owner_name), ("phone", phone)];
    for (label, value) in fields {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} is required", label)));
        }
    }
    update_settings(
        conn,
        owner_id,
        SettingsPatch {
            store_name: Some(store_name.to_string()),
            owner_name: Some(owner_name.to_string()),
            phone: Some(phone.to_string()),
            is_setup_completed: Some(true),
            ..Default::default()
        },
    )
}

/// Whole units grouped by thousands with a non-breaking space, e.g.
/// `1 500 000 so'm`.
pub fn format_currency(amount: i64, currency: &str) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\u{a0}');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0 { "-" } else { "" };
    let unit = match currency {
        "" | "UZS" => "so'm",
        other => other,
    };
    format!("{}{}\u{a0}{}", sign, grouped, unit)
}
