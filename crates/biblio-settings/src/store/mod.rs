//! Persistence abstraction for the settings singleton.
//!
//! Implementations uphold the singleton at the storage layer: `insert` fails
//! with [`SettingsError::Duplicate`](crate::SettingsError::Duplicate) when a
//! record exists, and `upsert_merge` is a single atomic operation.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::SettingsResult;
use crate::model::{SettingsDefaults, SettingsUpdate, SystemSettings};

pub use memory::MemorySettingsStore;
pub use postgres::PgSettingsStore;

#[async_trait]
/// Durable storage of exactly one settings record.
pub trait SettingsStore: Send + Sync {
    /// Current record, or `None` when it has not been created yet.
    async fn find_one(&self) -> SettingsResult<Option<SystemSettings>>;
    /// Create the record from `defaults`; fails with `Duplicate` if it exists.
    async fn insert(&self, defaults: &SettingsDefaults) -> SettingsResult<SystemSettings>;
    /// Atomically merge `update` over the stored record, or over `defaults`
    /// when no record exists, and return the result.
    async fn upsert_merge(
        &self,
        update: &SettingsUpdate,
        defaults: &SettingsDefaults,
    ) -> SettingsResult<SystemSettings>;
}
