use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::SettingsStore;
use crate::error::{SettingsError, SettingsResult};
use crate::model::{SettingsDefaults, SettingsUpdate, SystemSettings};

/// In-process store; each operation holds the lock for its whole duration.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    record: Mutex<Option<SystemSettings>>,
}

impl MemorySettingsStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `record`.
    #[must_use]
    pub fn with_record(record: SystemSettings) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn find_one(&self) -> SettingsResult<Option<SystemSettings>> {
        Ok(self.record.lock().await.clone())
    }

    async fn insert(&self, defaults: &SettingsDefaults) -> SettingsResult<SystemSettings> {
        let mut guard = self.record.lock().await;
        if guard.is_some() {
            return Err(SettingsError::Duplicate);
        }
        let created = SystemSettings::from_defaults(defaults, Utc::now());
        *guard = Some(created.clone());
        Ok(created)
    }

    async fn upsert_merge(
        &self,
        update: &SettingsUpdate,
        defaults: &SettingsDefaults,
    ) -> SettingsResult<SystemSettings> {
        let mut guard = self.record.lock().await;
        let now = Utc::now();
        let merged = match guard.as_ref() {
            Some(current) => SystemSettings {
                version: current.version + 1,
                updated_at: now,
                ..update.apply_to(current)
            },
            None => update.apply_to(&SystemSettings::from_defaults(defaults, now)),
        };
        *guard = Some(merged.clone());
        Ok(merged)
    }
}
