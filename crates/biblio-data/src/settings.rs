//! Migrations and stored-procedure wrappers for the `system_settings` table.

use crate::error::{DataError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

fn map_query_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}

/// Apply all settings-related migrations.
///
/// # Errors
///
/// Returns an error when migration execution fails.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|source| DataError::MigrationFailed { source })?;
    tracing::debug!("settings migrations applied");
    Ok(())
}

/// Raw projection of the `system_settings` table.
#[derive(Debug, Clone, FromRow)]
pub struct SystemSettingsRow {
    /// Singleton primary key.
    pub id: Uuid,
    /// Display name of the library.
    pub library_name: String,
    /// Maximum concurrent loans per user.
    pub max_books_per_user: i32,
    /// Loan period in days.
    pub loan_period_days: i32,
    /// Idle session timeout in minutes.
    pub session_timeout_minutes: i32,
    /// Password policy document (JSON object).
    pub password_policy: Value,
    /// Two-factor mode string (`disabled`, `optional`, `required`).
    pub two_factor_auth_mode: String,
    /// Monotonic revision number.
    pub version: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Fully populated column values used when creating the record.
#[derive(Debug, Clone, Copy)]
pub struct NewSystemSettings<'a> {
    /// Singleton primary key.
    pub id: Uuid,
    /// Display name of the library.
    pub library_name: &'a str,
    /// Maximum concurrent loans per user.
    pub max_books_per_user: i32,
    /// Loan period in days.
    pub loan_period_days: i32,
    /// Idle session timeout in minutes.
    pub session_timeout_minutes: i32,
    /// Password policy document.
    pub password_policy: &'a Value,
    /// Two-factor mode string.
    pub two_factor_auth_mode: &'a str,
}

/// Column values to merge over the stored record; `None` leaves a column untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSettingsMerge<'a> {
    /// Replacement library name.
    pub library_name: Option<&'a str>,
    /// Replacement loan limit.
    pub max_books_per_user: Option<i32>,
    /// Replacement loan period.
    pub loan_period_days: Option<i32>,
    /// Replacement session timeout.
    pub session_timeout_minutes: Option<i32>,
    /// Replacement password policy document.
    pub password_policy: Option<&'a Value>,
    /// Replacement two-factor mode.
    pub two_factor_auth_mode: Option<&'a str>,
}

/// Load the settings row for the provided identifier, if it exists.
///
/// # Errors
///
/// Returns an error when the query fails.
pub async fn fetch_system_settings_row<'e, E>(
    executor: E,
    id: Uuid,
) -> Result<Option<SystemSettingsRow>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, SystemSettingsRow>(
        "SELECT * FROM biblio_config.fetch_system_settings(_id => $1)",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(map_query_err("fetch system settings"))
}

/// Create the settings row. Returns `None` when a row with the same key already exists.
///
/// # Errors
///
/// Returns an error when the insert fails for any reason other than the key conflict.
pub async fn insert_system_settings<'e, E>(
    executor: E,
    settings: &NewSystemSettings<'_>,
) -> Result<Option<SystemSettingsRow>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, SystemSettingsRow>(
        "SELECT * FROM biblio_config.insert_system_settings(
            _id => $1,
            _library_name => $2,
            _max_books_per_user => $3,
            _loan_period_days => $4,
            _session_timeout_minutes => $5,
            _password_policy => $6,
            _two_factor_auth_mode => $7
        )",
    )
    .bind(settings.id)
    .bind(settings.library_name)
    .bind(settings.max_books_per_user)
    .bind(settings.loan_period_days)
    .bind(settings.session_timeout_minutes)
    .bind(settings.password_policy.clone())
    .bind(settings.two_factor_auth_mode)
    .fetch_optional(executor)
    .await
    .map_err(map_query_err("insert system settings"))
}

/// Atomically create the row from `defaults` or merge `merge` into the existing row.
///
/// # Errors
///
/// Returns an error when the upsert fails.
pub async fn upsert_system_settings<'e, E>(
    executor: E,
    defaults: &NewSystemSettings<'_>,
    merge: &SystemSettingsMerge<'_>,
) -> Result<SystemSettingsRow>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, SystemSettingsRow>(
        "SELECT * FROM biblio_config.upsert_system_settings(
            _id => $1,
            _default_library_name => $2,
            _default_max_books_per_user => $3,
            _default_loan_period_days => $4,
            _default_session_timeout_minutes => $5,
            _default_password_policy => $6,
            _default_two_factor_auth_mode => $7,
            _library_name => $8,
            _max_books_per_user => $9,
            _loan_period_days => $10,
            _session_timeout_minutes => $11,
            _password_policy => $12,
            _two_factor_auth_mode => $13
        )",
    )
    .bind(defaults.id)
    .bind(defaults.library_name)
    .bind(defaults.max_books_per_user)
    .bind(defaults.loan_period_days)
    .bind(defaults.session_timeout_minutes)
    .bind(defaults.password_policy.clone())
    .bind(defaults.two_factor_auth_mode)
    .bind(merge.library_name)
    .bind(merge.max_books_per_user)
    .bind(merge.loan_period_days)
    .bind(merge.session_timeout_minutes)
    .bind(merge.password_policy.cloned())
    .bind(merge.two_factor_auth_mode)
    .fetch_one(executor)
    .await
    .map_err(map_query_err("upsert system settings"))
}

/// Count the stored settings rows.
///
/// # Errors
///
/// Returns an error when the query fails.
pub async fn count_system_settings<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar("SELECT biblio_config.count_system_settings()")
        .fetch_one(executor)
        .await
        .map_err(map_query_err("count system settings"))
}
