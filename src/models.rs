use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CURRENCY: &str = "UZS";
pub const DEFAULT_SMS_TEMPLATE: &str = "Hurmatli {mijoz}, sizning {do'kon}dagi qarzingiz: {summa}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debt,
    Payment,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Debt => "debt",
            TransactionKind::Payment => "payment",
        }
    }

    /// Contribution of `amount` to a balance: debts add, payments subtract.
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            TransactionKind::Debt => amount,
            TransactionKind::Payment => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "debt" => Ok(TransactionKind::Debt),
            "payment" => Ok(TransactionKind::Payment),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err: String| FromSqlError::Other(err.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub owner_id: String,
    pub name: String,
    pub phone: String,
    pub note: Option<String>,
    pub created_ts_utc: i64,
}

/// Customer row plus the figures derived from its transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    #[serde(flatten)]
    pub customer: Customer,
    pub balance: i64,
    pub last_transaction_ts: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub only_debtors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub owner_id: String,
    pub customer_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub ts_utc: i64,
    pub date_local: String,
    pub note: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub customer_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Transaction joined with the name of the customer it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub customer_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Today,
    Week,
    Month,
    #[default]
    All,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub range: TimeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub currency: String,
    pub store_name: String,
    pub owner_name: String,
    pub phone: String,
    pub sms_template: String,
    pub is_setup_completed: bool,
    pub profile_image: Option<String>,
}

impl Settings {
    pub fn for_owner(store_name: &str, owner_name: &str) -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            store_name: store_name.to_string(),
            owner_name: owner_name.to_string(),
            phone: String::new(),
            sms_template: DEFAULT_SMS_TEMPLATE.to_string(),
            is_setup_completed: false,
            profile_image: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub currency: Option<String>,
    pub store_name: Option<String>,
    pub owner_name: Option<String>,
    pub phone: Option<String>,
    pub sms_template: Option<String>,
    pub is_setup_completed: Option<bool>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub store_name: String,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub subscription_ts_utc: i64,
    pub created_ts_utc: i64,
}

/// What leaves the crate about a user: everything but the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub store_name: String,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub subscription_ts_utc: i64,
    pub created_ts_utc: i64,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            store_name: user.store_name.clone(),
            is_admin: user.is_admin,
            is_blocked: user.is_blocked,
            subscription_ts_utc: user.subscription_ts_utc,
            created_ts_utc: user.created_ts_utc,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub store_name: String,
}
