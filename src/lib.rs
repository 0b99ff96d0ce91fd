mod auth;
mod backup;
mod config;
mod customers;
mod db;
mod error;
mod ledger;
mod logging;
mod models;
mod reports;
mod settings;
mod sms;
mod transactions;

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::Connection;
use tauri::{AppHandle, Manager, State};
use tauri_plugin_dialog::DialogExt;
use tauri_plugin_opener::OpenerExt;
use tracing::info;

use crate::auth::AdminOverview;
use crate::backup::ImportSummary;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    Customer, CustomerFilter, CustomerPatch, CustomerSummary, NewCustomer, NewTransaction,
    RegisterPayload, Settings, SettingsPatch, TimeRange, Transaction, TransactionFilter,
    TransactionView, UserProfile,
};
use crate::reports::{Dashboard, Notifications, PeriodReport};
use crate::sms::{SmsPlatform, SmsReminder};

const DEFAULT_RECENT_LIMIT: u32 = 6;
const DEFAULT_TOP_DEBTORS: usize = 5;

struct AppState {
    db_path: PathBuf,
    config: AppConfig,
}

impl AppState {
    fn connect(&self) -> AppResult<Connection> {
        db::open_connection(&self.db_path)
    }

    /// Connection plus the signed-in, unblocked tenant.
    fn tenant(&self) -> AppResult<(Connection, UserProfile)> {
        let conn = self.connect()?;
        let user = auth::require_tenant(&conn, now_ms(), self.config.subscription_days)?;
        Ok((conn, user))
    }

    fn admin(&self) -> AppResult<Connection> {
        let conn = self.connect()?;
        auth::require_admin(&conn, now_ms(), self.config.subscription_days)?;
        Ok(conn)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[tauri::command(rename_all = "snake_case")]
fn register(state: State<'_, AppState>, payload: RegisterPayload) -> AppResult<UserProfile> {
    let conn = state.connect()?;
    auth::register_user(&conn, payload)
}

#[tauri::command(rename_all = "snake_case")]
fn login(state: State<'_, AppState>, email: String, password: String) -> AppResult<UserProfile> {
    let conn = state.connect()?;
    auth::login(
        &conn,
        &email,
        &password,
        now_ms(),
        state.config.subscription_days,
    )
}

#[tauri::command(rename_all = "snake_case")]
fn logout(state: State<'_, AppState>) -> AppResult<()> {
    let conn = state.connect()?;
    auth::logout(&conn)
}

#[tauri::command(rename_all = "snake_case")]
fn current_session(state: State<'_, AppState>) -> AppResult<Option<UserProfile>> {
    let conn = state.connect()?;
    auth::current_session(&conn, now_ms(), state.config.subscription_days)
}

#[tauri::command(rename_all = "snake_case")]
fn list_shops(state: State<'_, AppState>) -> AppResult<Vec<UserProfile>> {
    let conn = state.admin()?;
    auth::list_shops(&conn)
}

#[tauri::command(rename_all = "snake_case")]
fn admin_overview(state: State<'_, AppState>) -> AppResult<AdminOverview> {
    let conn = state.admin()?;
    auth::admin_overview(&conn)
}

#[tauri::command(rename_all = "snake_case")]
fn create_shop(state: State<'_, AppState>, payload: RegisterPayload) -> AppResult<UserProfile> {
    let conn = state.admin()?;
    auth::create_shop(&conn, payload)
}

#[tauri::command(rename_all = "snake_case")]
fn update_user_password(
    state: State<'_, AppState>,
    user_id: String,
    new_password: String,
) -> AppResult<()> {
    let conn = state.admin()?;
    auth::update_user_password(&conn, &user_id, &new_password)
}

#[tauri::command(rename_all = "snake_case")]
fn toggle_user_block(state: State<'_, AppState>, user_id: String) -> AppResult<UserProfile> {
    let conn = state.admin()?;
    auth::toggle_user_block(&conn, &user_id)
}

#[tauri::command(rename_all = "snake_case")]
fn update_user_login(
    state: State<'_, AppState>,
    user_id: String,
    new_email: String,
) -> AppResult<UserProfile> {
    let conn = state.admin()?;
    auth::update_user_login(&conn, &user_id, &new_email)
}

#[tauri::command(rename_all = "snake_case")]
fn renew_subscription(state: State<'_, AppState>, user_id: String) -> AppResult<UserProfile> {
    let conn = state.admin()?;
    auth::renew_subscription(&conn, &user_id, now_ms())
}

#[tauri::command(rename_all = "snake_case")]
fn list_customers(
    state: State<'_, AppState>,
    filter: Option<CustomerFilter>,
) -> AppResult<Vec<CustomerSummary>> {
    let (conn, user) = state.tenant()?;
    customers::list_customers(&conn, &user.id, &filter.unwrap_or_default())
}

#[tauri::command(rename_all = "snake_case")]
fn get_customer(state: State<'_, AppState>, customer_id: String) -> AppResult<CustomerSummary> {
    let (conn, user) = state.tenant()?;
    customers::customer_summary(&conn, &user.id, &customer_id)
}

#[tauri::command(rename_all = "snake_case")]
fn add_customer(state: State<'_, AppState>, payload: NewCustomer) -> AppResult<Customer> {
    let (conn, user) = state.tenant()?;
    customers::add_customer(&conn, &user.id, payload)
}

#[tauri::command(rename_all = "snake_case")]
fn update_customer(
    state: State<'_, AppState>,
    customer_id: String,
    patch: CustomerPatch,
) -> AppResult<Customer> {
    let (conn, user) = state.tenant()?;
    customers::update_customer(&conn, &user.id, &customer_id, patch)
}

#[tauri::command(rename_all = "snake_case")]
fn delete_customer(state: State<'_, AppState>, customer_id: String) -> AppResult<()> {
    let (mut conn, user) = state.tenant()?;
    customers::delete_customer(&mut conn, &user.id, &customer_id)
}

#[tauri::command(rename_all = "snake_case")]
fn add_transaction(state: State<'_, AppState>, payload: NewTransaction) -> AppResult<Transaction> {
    let (conn, user) = state.tenant()?;
    transactions::add_transaction(&conn, &user.id, payload)
}

#[tauri::command(rename_all = "snake_case")]
fn delete_transaction(state: State<'_, AppState>, transaction_id: String) -> AppResult<()> {
    let (conn, user) = state.tenant()?;
    transactions::delete_transaction(&conn, &user.id, &transaction_id)
}

#[tauri::command(rename_all = "snake_case")]
fn list_customer_transactions(
    state: State<'_, AppState>,
    customer_id: String,
) -> AppResult<Vec<Transaction>> {
    let (conn, user) = state.tenant()?;
    customers::get_customer(&conn, &user.id, &customer_id)?;
    transactions::customer_transactions(&conn, &user.id, &customer_id)
}

#[tauri::command(rename_all = "snake_case")]
fn list_transactions(
    state: State<'_, AppState>,
    filter: Option<TransactionFilter>,
) -> AppResult<Vec<TransactionView>> {
    let (conn, user) = state.tenant()?;
    transactions::list_transactions(&conn, &user.id, &filter.unwrap_or_default())
}

#[tauri::command(rename_all = "snake_case")]
fn list_recent_transactions(
    state: State<'_, AppState>,
    limit: Option<u32>,
) -> AppResult<Vec<TransactionView>> {
    let (conn, user) = state.tenant()?;
    transactions::recent_transactions(&conn, &user.id, limit.unwrap_or(DEFAULT_RECENT_LIMIT))
}

#[tauri::command(rename_all = "snake_case")]
fn get_settings(state: State<'_, AppState>) -> AppResult<Settings> {
    let (conn, user) = state.tenant()?;
    settings::get_settings(&conn, &user.id)
}

#[tauri::command(rename_all = "snake_case")]
fn update_settings(state: State<'_, AppState>, patch: SettingsPatch) -> AppResult<Settings> {
    let (conn, user) = state.tenant()?;
    settings::update_settings(&conn, &user.id, patch)
}

#[tauri::command(rename_all = "snake_case")]
fn complete_onboarding(
    state: State<'_, AppState>,
    store_name: String,
    owner_name: String,
    phone: String,
) -> AppResult<Settings> {
    let (conn, user) = state.tenant()?;
    settings::complete_onboarding(&conn, &user.id, &store_name, &owner_name, &phone)
}

#[tauri::command(rename_all = "snake_case")]
fn format_currency(state: State<'_, AppState>, amount: i64) -> AppResult<String> {
    let (conn, user) = state.tenant()?;
    let settings = settings::get_settings(&conn, &user.id)?;
    Ok(settings::format_currency(amount, &settings.currency))
}

#[tauri::command(rename_all = "snake_case")]
fn get_dashboard(state: State<'_, AppState>) -> AppResult<Dashboard> {
    let (conn, user) = state.tenant()?;
    reports::dashboard(&conn, &user.id)
}

#[tauri::command(rename_all = "snake_case")]
fn get_period_report(
    state: State<'_, AppState>,
    range: TimeRange,
    top: Option<usize>,
) -> AppResult<PeriodReport> {
    let (conn, user) = state.tenant()?;
    reports::period_report(&conn, &user.id, range, top.unwrap_or(DEFAULT_TOP_DEBTORS))
}

#[tauri::command(rename_all = "snake_case")]
fn get_notifications(state: State<'_, AppState>) -> AppResult<Notifications> {
    let (conn, user) = state.tenant()?;
    reports::notifications(&conn, &user.id, state.config.reminder_days)
}

#[tauri::command(rename_all = "snake_case")]
fn compose_sms_reminder(
    state: State<'_, AppState>,
    customer_id: String,
) -> AppResult<SmsReminder> {
    let (conn, user) = state.tenant()?;
    sms::compose_reminder(&conn, &user.id, &customer_id, SmsPlatform::current())
}

#[tauri::command(rename_all = "snake_case")]
fn send_sms_reminder(
    app: AppHandle,
    state: State<'_, AppState>,
    customer_id: String,
) -> AppResult<SmsReminder> {
    let (conn, user) = state.tenant()?;
    let reminder = sms::compose_reminder(&conn, &user.id, &customer_id, SmsPlatform::current())?;
    app.opener().open_url(reminder.url.as_str(), None::<&str>)?;
    info!(customer_id = %customer_id, "sms reminder handed to messaging app");
    Ok(reminder)
}

#[tauri::command(rename_all = "snake_case")]
fn call_customer(app: AppHandle, state: State<'_, AppState>, customer_id: String) -> AppResult<()> {
    let (conn, user) = state.tenant()?;
    let customer = customers::get_customer(&conn, &user.id, &customer_id)?;
    let url = sms::tel_url(&customer.phone)?;
    app.opener().open_url(url, None::<&str>)?;
    Ok(())
}

// Async so the blocking file dialogs stay off the main thread.
#[tauri::command(rename_all = "snake_case")]
async fn export_backup(app: AppHandle, state: State<'_, AppState>) -> AppResult<Option<String>> {
    let (conn, user) = state.tenant()?;
    let snapshot = backup::export_snapshot(&conn, &user.id)?;

    let file_name = format!("nasiya-{}.json", Utc::now().format("%Y-%m-%d"));
    let Some(target) = app
        .dialog()
        .file()
        .add_filter("JSON", &["json"])
        .set_file_name(file_name)
        .blocking_save_file()
    else {
        return Ok(None);
    };
    let path = target
        .into_path()
        .map_err(|err| AppError::Dialog(err.to_string()))?;
    backup::write_snapshot(&path, &snapshot)?;
    info!(path = %path.display(), "backup exported");
    Ok(Some(path.display().to_string()))
}

#[tauri::command(rename_all = "snake_case")]
async fn import_backup(
    app: AppHandle,
    state: State<'_, AppState>,
) -> AppResult<Option<ImportSummary>> {
    let Some(source) = app
        .dialog()
        .file()
        .add_filter("JSON", &["json"])
        .blocking_pick_file()
    else {
        return Ok(None);
    };
    let path = source
        .into_path()
        .map_err(|err| AppError::Dialog(err.to_string()))?;
    let snapshot = backup::read_snapshot(&path)?;

    let (mut conn, user) = state.tenant()?;
    let summary = backup::import_snapshot(&mut conn, &user.id, &snapshot)?;
    Ok(Some(summary))
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    logging::setup_logging();

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let config = AppConfig::from_env()?;
            let db_path = db::db_path(app.handle(), &config.db_file)?;
            db::init_db(&db_path)?;

            if let Some(admin) = &config.admin {
                let conn = db::open_connection(&db_path)?;
                auth::seed_admin(&conn, &admin.email, &admin.password);
            }

            info!(path = %db_path.display(), "database ready");
            app.manage(AppState { db_path, config });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            register,
            login,
            logout,
            current_session,
            list_shops,
            admin_overview,
            create_shop,
            update_user_password,
            toggle_user_block,
            update_user_login,
            renew_subscription,
            list_customers,
            get_customer,
            add_customer,
            update_customer,
            delete_customer,
            add_transaction,
            delete_transaction,
            list_customer_transactions,
            list_transactions,
            list_recent_transactions,
            get_settings,
            update_settings,
            complete_onboarding,
            format_currency,
            get_dashboard,
            get_period_report,
            get_notifications,
            compose_sms_reminder,
            send_sms_reminder,
            call_customer,
            export_backup,
            import_backup
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
