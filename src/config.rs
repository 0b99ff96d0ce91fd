use std::env;

use crate::error::{AppError, AppResult};

pub const DEFAULT_DB_FILE: &str = "nasiya.sqlite";
pub const DEFAULT_SUBSCRIPTION_DAYS: i64 = 30;
pub const DEFAULT_REMINDER_DAYS: i64 = 3;

/// Runtime options read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_file: String,
    pub subscription_days: i64,
    pub reminder_days: i64,
    pub admin: Option<AdminBootstrap>,
}

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_file: DEFAULT_DB_FILE.to_string(),
            subscription_days: DEFAULT_SUBSCRIPTION_DAYS,
            reminder_days: DEFAULT_REMINDER_DAYS,
            admin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_file = lookup("NASIYA_DB_FILE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.db_file);
        let subscription_days =
            parse_days(&lookup, "NASIYA_SUBSCRIPTION_DAYS", defaults.subscription_days)?;
        let reminder_days = parse_days(&lookup, "NASIYA_REMINDER_DAYS", defaults.reminder_days)?;

        let admin = match (lookup("NASIYA_ADMIN_EMAIL"), lookup("NASIYA_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) if !email.trim().is_empty() => Some(AdminBootstrap {
                email: email.trim().to_string(),
                password,
            }),
            _ => None,
        };

        Ok(Self {
            db_file,
            subscription_days,
            reminder_days,
            admin,
        })
    }
}

fn parse_days<F>(lookup: &F, key: &str, default: i64) -> AppResult<i64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => {
            let days: i64 = raw
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{} must be a number, got {:?}", key, raw)))?;
            if days < 0 {
                return Err(AppError::Config(format!("{} must be >= 0", key)));
            }
            Ok(days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config.db_file, DEFAULT_DB_FILE);
        assert_eq!(config.subscription_days, 30);
        assert_eq!(config.reminder_days, 3);
        assert!(config.admin.is_none());
    }

    #[test]
    fn reads_overrides_and_admin() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("NASIYA_DB_FILE", "shop.sqlite"),
            ("NASIYA_SUBSCRIPTION_DAYS", "45"),
            ("NASIYA_ADMIN_EMAIL", " admin@nasiya.uz "),
            ("NASIYA_ADMIN_PASSWORD", "secret1"),
        ]))
        .expect("config");
        assert_eq!(config.db_file, "shop.sqlite");
        assert_eq!(config.subscription_days, 45);
        let admin = config.admin.expect("admin");
        assert_eq!(admin.email, "admin@nasiya.uz");
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = AppConfig::from_lookup(lookup_from(&[("NASIYA_REMINDER_DAYS", "soon")]))
            .expect_err("should fail");
        assert!(matches!(err, AppError::Config(_)));
        let err = AppConfig::from_lookup(lookup_from(&[("NASIYA_SUBSCRIPTION_DAYS", "-1")]))
            .expect_err("should fail");
        assert!(matches!(err, AppError::Config(_)));
    }
}
