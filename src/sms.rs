use rusqlite::Connection;
use serde::Serialize;

use crate::customers;
use crate::error::{AppError, AppResult};
use crate::settings::{self, format_currency};

pub const CUSTOMER_PLACEHOLDER: &str = "{mijoz}";
pub const STORE_PLACEHOLDER: &str = "{do'kon}";
pub const AMOUNT_PLACEHOLDER: &str = "{summa}";

/// iOS expects `sms:<n>&body=`, everything else `sms:<n>?body=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsPlatform {
    Ios,
    Other,
}

impl SmsPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            SmsPlatform::Ios
        } else {
            SmsPlatform::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsReminder {
    pub phone: String,
    pub message: String,
    pub url: String,
}

pub fn render_template(template: &str, customer_name: &str, store_name: &str, amount: &str) -> String {
    template
        .replace(CUSTOMER_PLACEHOLDER, customer_name)
        .replace(STORE_PLACEHOLDER, store_name)
        .replace(AMOUNT_PLACEHOLDER, amount)
}

pub fn sanitize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

pub fn sms_url(phone: &str, body: &str, platform: SmsPlatform) -> String {
    let separator = match platform {
        SmsPlatform::Ios => '&',
        SmsPlatform::Other => '?',
    };
    format!("sms:{}{}body={}", phone, separator, urlencoding::encode(body))
}

pub fn tel_url(phone: &str) -> AppResult<String> {
    let phone = sanitize_phone(phone);
    if phone.is_empty() {
        return Err(AppError::validation("customer has no phone number"));
    }
    Ok(format!("tel:{}", phone))
}

/// Builds the reminder for a customer's current balance from the tenant's
/// template.
pub fn compose_reminder(
    conn: &Connection,
    owner_id: &str,
    customer_id: &str,
    platform: SmsPlatform,
) -> AppResult<SmsReminder> {
    let summary = customers::customer_summary(conn, owner_id, customer_id)?;
    let phone = sanitize_phone(&summary.customer.phone);
    if phone.is_empty() {
        return Err(AppError::validation("customer has no phone number"));
    }
    let settings = settings::get_settings(conn, owner_id)?;
    let message = render_template(
        &settings.sms_template,
        &summary.customer.name,
        &settings.store_name,
        &format_currency(summary.balance, &settings.currency),
    );
    let url = sms_url(&phone, &message, platform);
    Ok(SmsReminder { phone, message, url })
}
