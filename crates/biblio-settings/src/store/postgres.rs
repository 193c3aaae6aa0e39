use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use biblio_data::settings::{
    self as data_settings, NewSystemSettings, SystemSettingsMerge, SystemSettingsRow,
};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use super::SettingsStore;
use crate::defaults::SETTINGS_ID;
use crate::error::{SettingsError, SettingsResult};
use crate::model::{
    PasswordPolicy, SettingsDefaults, SettingsUpdate, SystemSettings, TwoFactorAuthMode,
};
use crate::validate::check_password_policy;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// `PostgreSQL`-backed store built on the `biblio_config` stored procedures.
#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    /// Establish a connection pool and ensure migrations are applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the `PostgreSQL` connection cannot be established or
    /// migrations fail to run.
    #[instrument(name = "settings_store.connect", skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> SettingsResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|source| SettingsError::storage("connect to settings database", source))?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying migrations first.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail to run.
    pub async fn from_pool(pool: PgPool) -> SettingsResult<Self> {
        data_settings::run_migrations(&pool)
            .await
            .map_err(|source| SettingsError::storage("apply settings migrations", source))?;
        Ok(Self { pool })
    }

    /// Access the underlying `SQLx` connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn find_one(&self) -> SettingsResult<Option<SystemSettings>> {
        data_settings::fetch_system_settings_row(&self.pool, SETTINGS_ID)
            .await
            .map_err(|source| SettingsError::storage("fetch settings", source))?
            .map(settings_from_row)
            .transpose()
    }

    async fn insert(&self, defaults: &SettingsDefaults) -> SettingsResult<SystemSettings> {
        let policy = defaults.password_policy.to_document();
        let row = data_settings::insert_system_settings(&self.pool, &new_row(defaults, &policy))
            .await
            .map_err(|source| SettingsError::storage("insert settings", source))?
            .ok_or(SettingsError::Duplicate)?;
        settings_from_row(row)
    }

    async fn upsert_merge(
        &self,
        update: &SettingsUpdate,
        defaults: &SettingsDefaults,
    ) -> SettingsResult<SystemSettings> {
        let default_policy = defaults.password_policy.to_document();
        let patch_policy = update.password_policy.as_ref().map(PasswordPolicy::to_document);
        let merge = SystemSettingsMerge {
            library_name: update.library_name.as_deref(),
            max_books_per_user: update.max_books_per_user,
            loan_period_days: update.loan_period_days,
            session_timeout_minutes: update.session_timeout_minutes,
            password_policy: patch_policy.as_ref(),
            two_factor_auth_mode: update
                .two_factor_auth_mode
                .as_ref()
                .map(TwoFactorAuthMode::as_str),
        };
        let row = data_settings::upsert_system_settings(
            &self.pool,
            &new_row(defaults, &default_policy),
            &merge,
        )
        .await
        .map_err(|source| SettingsError::storage("upsert settings", source))?;
        settings_from_row(row)
    }
}

fn new_row<'a>(defaults: &'a SettingsDefaults, policy: &'a Value) -> NewSystemSettings<'a> {
    NewSystemSettings {
        id: SETTINGS_ID,
        library_name: &defaults.library_name,
        max_books_per_user: defaults.max_books_per_user,
        loan_period_days: defaults.loan_period_days,
        session_timeout_minutes: defaults.session_timeout_minutes,
        password_policy: policy,
        two_factor_auth_mode: defaults.two_factor_auth_mode.as_str(),
    }
}

fn settings_from_row(row: SystemSettingsRow) -> SettingsResult<SystemSettings> {
    let password_policy = serde_json::from_value::<PasswordPolicy>(row.password_policy)
        .ok()
        .and_then(|policy| check_password_policy(policy).ok())
        .ok_or(SettingsError::CorruptRecord {
            field: "passwordPolicy",
            reason: "malformed password policy document",
        })?;
    let two_factor_auth_mode = TwoFactorAuthMode::from_str(&row.two_factor_auth_mode).map_err(
        |_| SettingsError::CorruptRecord {
            field: "twoFactorAuthMode",
            reason: "unknown two-factor mode",
        },
    )?;

    Ok(SystemSettings {
        id: row.id,
        library_name: row.library_name,
        max_books_per_user: row.max_books_per_user,
        loan_period_days: row.loan_period_days,
        session_timeout_minutes: row.session_timeout_minutes,
        password_policy,
        two_factor_auth_mode,
        version: row.version,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
