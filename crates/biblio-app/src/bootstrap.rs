use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use biblio_api::ApiServer;
use biblio_settings::{
    MemorySettingsStore, PgSettingsStore, SettingsFacade, SettingsService, SettingsStore,
};
use biblio_telemetry::{
    DEFAULT_LOG_LEVEL, GlobalContextGuard, LogFormat, LoggingConfig, Metrics, init_logging,
};
use tracing::info;

use crate::error::{AppError, AppResult};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7070";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const BUILD_SHA: &str = match option_env!("BIBLIO_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Backend holding the settings record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `PostgreSQL` via `DATABASE_URL`.
    Postgres,
    /// Process-local store; the record is lost on restart.
    Memory,
}

impl StoreBackend {
    /// Configuration string for the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(AppError::invalid_config(
                "BIBLIO_STORE",
                "unknown_backend",
                value,
            )),
        }
    }
}

/// Process configuration read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Settings store backend.
    pub store: StoreBackend,
    /// `PostgreSQL` connection string; required for the postgres backend.
    pub database_url: Option<String>,
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Connection pool size.
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is malformed or `DATABASE_URL` is
    /// missing for the postgres backend.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is malformed or `DATABASE_URL` is
    /// missing for the postgres backend.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let store = lookup("BIBLIO_STORE")
            .map_or(Ok(StoreBackend::Postgres), |value| value.parse())?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::MissingEnv {
                name: "DATABASE_URL",
            });
        }

        let bind_addr = lookup("BIBLIO_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.trim().parse::<SocketAddr>().map_err(|_| {
            AppError::invalid_config("BIBLIO_BIND_ADDR", "invalid_socket_addr", bind_addr.clone())
        })?;

        let log_level = lookup("BIBLIO_LOG_LEVEL")
            .map(|level| level.trim().to_string())
            .filter(|level| !level.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let log_format = match lookup("BIBLIO_LOG_FORMAT") {
            Some(value) => value.parse::<LogFormat>().map_err(|_| {
                AppError::invalid_config("BIBLIO_LOG_FORMAT", "unknown_format", value.clone())
            })?,
            None => LogFormat::infer(),
        };

        let db_max_connections = match lookup("BIBLIO_DB_MAX_CONNECTIONS") {
            Some(value) => parse_pool_size(&value)?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        Ok(Self {
            store,
            database_url,
            bind_addr,
            log_level,
            log_format,
            db_max_connections,
        })
    }
}

fn parse_pool_size(value: &str) -> AppResult<u32> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err(AppError::invalid_config(
            "BIBLIO_DB_MAX_CONNECTIONS",
            "zero",
            value,
        )),
        Ok(size) => Ok(size),
        Err(_) => Err(AppError::invalid_config(
            "BIBLIO_DB_MAX_CONNECTIONS",
            "not_a_number",
            value,
        )),
    }
}

/// Entry point for the Biblio boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, dependency construction or the API
/// server fails.
pub async fn run_app() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    run_app_with(config).await
}

/// Boot sequence driven entirely by an explicit configuration.
pub(crate) async fn run_app_with(config: AppConfig) -> AppResult<()> {
    init_logging(&LoggingConfig {
        level: &config.log_level,
        format: config.log_format,
        build_sha: BUILD_SHA,
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new(config.store.as_str());

    info!(store = %config.store, "Biblio settings service starting");

    let store = open_store(&config).await?;
    let service = SettingsService::new(store);
    let telemetry =
        Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

    let settings = service
        .get()
        .await
        .map_err(|err| AppError::settings("settings_service.get", err))?;
    info!(version = settings.version, "settings record ready");

    let facade: Arc<dyn SettingsFacade> = Arc::new(service);
    let api = ApiServer::new(facade, telemetry);
    info!(addr = %config.bind_addr, "Launching API listener");
    api.serve(config.bind_addr)
        .await
        .map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("API server shutdown complete");
    Ok(())
}

async fn open_store(config: &AppConfig) -> AppResult<Arc<dyn SettingsStore>> {
    match config.store {
        StoreBackend::Memory => Ok(Arc::new(MemorySettingsStore::new())),
        StoreBackend::Postgres => {
            let database_url = config.database_url.as_deref().ok_or(AppError::MissingEnv {
                name: "DATABASE_URL",
            })?;
            let store = PgSettingsStore::connect(database_url, config.db_max_connections)
                .await
                .map_err(|err| AppError::settings("settings_store.connect", err))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() -> AppResult<()> {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/biblio")]))?;
        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://db/biblio"));
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().expect("addr"));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.log_format, LogFormat::infer());
        assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        Ok(())
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(
            err,
            AppError::MissingEnv {
                name: "DATABASE_URL"
            }
        ));
    }

    #[test]
    fn memory_backend_needs_no_database() -> AppResult<()> {
        let config = AppConfig::from_lookup(lookup(&[
            ("BIBLIO_STORE", "Memory"),
            ("BIBLIO_BIND_ADDR", "0.0.0.0:8080"),
            ("BIBLIO_LOG_LEVEL", "debug"),
            ("BIBLIO_LOG_FORMAT", "json"),
            ("BIBLIO_DB_MAX_CONNECTIONS", "2"),
        ]))?;
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.database_url.is_none());
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.db_max_connections, 2);
        Ok(())
    }

    #[test]
    fn malformed_values_name_the_offending_variable() {
        let cases = [
            ("BIBLIO_STORE", "redis", "unknown_backend"),
            ("BIBLIO_BIND_ADDR", "localhost", "invalid_socket_addr"),
            ("BIBLIO_LOG_FORMAT", "yaml", "unknown_format"),
            ("BIBLIO_DB_MAX_CONNECTIONS", "0", "zero"),
            ("BIBLIO_DB_MAX_CONNECTIONS", "many", "not_a_number"),
        ];
        for (name, value, expected) in cases {
            let err = AppConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://db/biblio"),
                (name, value),
            ]))
            .unwrap_err();
            match err {
                AppError::InvalidConfig {
                    field,
                    reason,
                    value: Some(reported),
                } => {
                    assert_eq!(field, name);
                    assert_eq!(reason, expected);
                    assert_eq!(reported, value);
                }
                other => panic!("unexpected error for {name}: {other:?}"),
            }
        }
    }

    #[test]
    fn store_backend_round_trips_through_strings() -> AppResult<()> {
        assert_eq!("postgresql".parse::<StoreBackend>()?, StoreBackend::Postgres);
        assert_eq!(StoreBackend::Memory.to_string(), "memory");
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_opens_without_a_database() -> AppResult<()> {
        let config = AppConfig::from_lookup(lookup(&[("BIBLIO_STORE", "memory")]))?;
        let store = open_store(&config).await?;
        assert!(
            store
                .find_one()
                .await
                .map_err(|err| AppError::settings("settings_store.find_one", err))?
                .is_none()
        );
        Ok(())
    }
}
