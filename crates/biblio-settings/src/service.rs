//! Settings service: get-or-create on read, validated partial merge on write.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{MissingAfterConflict, SettingsError, SettingsResult};
use crate::model::{SettingsDefaults, SettingsPatch, SettingsUpdate, SystemSettings};
use crate::store::SettingsStore;
use crate::validate::{normalize_defaults, normalize_update, validate_patch};

#[async_trait]
/// Narrow interface handed to transport collaborators.
pub trait SettingsFacade: Send + Sync {
    /// Full current settings, creating the defaults on first use.
    async fn read(&self) -> SettingsResult<SystemSettings>;
    /// Validate and merge `patch`, returning the full settings afterwards.
    async fn update(&self, patch: SettingsPatch) -> SettingsResult<SystemSettings>;
}

/// Business logic over an explicitly owned store handle. Holds no cached copy;
/// every call round-trips through the store.
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    defaults: SettingsDefaults,
}

impl SettingsService {
    /// Service using the built-in defaults.
    #[must_use]
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            defaults: SettingsDefaults::default(),
        }
    }

    /// Service creating the record from custom `defaults`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Validation`] when a default violates a field constraint.
    pub fn with_defaults(
        store: Arc<dyn SettingsStore>,
        defaults: SettingsDefaults,
    ) -> SettingsResult<Self> {
        Ok(Self {
            store,
            defaults: normalize_defaults(defaults)?,
        })
    }

    /// Defaults applied when the record has to be created.
    #[must_use]
    pub const fn defaults(&self) -> &SettingsDefaults {
        &self.defaults
    }

    /// Return the record, creating it from defaults if absent.
    ///
    /// A concurrent creator winning the insert race is resolved with a single
    /// re-read.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::StorageUnavailable`] or
    /// [`SettingsError::CorruptRecord`] when the store fails.
    #[instrument(name = "settings_service.get", skip(self))]
    pub async fn get(&self) -> SettingsResult<SystemSettings> {
        if let Some(existing) = self.store.find_one().await? {
            return Ok(existing);
        }

        match self.store.insert(&self.defaults).await {
            Ok(created) => {
                info!(version = created.version, "created settings record from defaults");
                Ok(created)
            }
            Err(SettingsError::Duplicate) => {
                debug!("settings record created concurrently; re-reading");
                self.store.find_one().await?.ok_or_else(|| {
                    SettingsError::storage(
                        "re-read settings after conflict",
                        MissingAfterConflict,
                    )
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Validate `patch` and merge it into the record.
    ///
    /// An empty patch (no recognized, non-null field) behaves like [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Validation`] before touching the store when any
    /// field is invalid, or a storage error when the merge fails.
    #[instrument(name = "settings_service.update", skip(self, patch))]
    pub async fn update(&self, patch: &SettingsPatch) -> SettingsResult<SystemSettings> {
        let update = validate_patch(patch)?;
        self.apply(update).await
    }

    /// Merge an already typed update, re-checking field constraints first.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`].
    #[instrument(name = "settings_service.update_typed", skip(self, update))]
    pub async fn update_typed(&self, update: SettingsUpdate) -> SettingsResult<SystemSettings> {
        let update = normalize_update(update).inspect_err(|err| {
            debug!(violations = ?err.violations(), "rejected typed settings update");
        })?;
        self.apply(update).await
    }

    async fn apply(&self, update: SettingsUpdate) -> SettingsResult<SystemSettings> {
        if update.is_empty() {
            return self.get().await;
        }
        let merged = self.store.upsert_merge(&update, &self.defaults).await?;
        info!(
            version = merged.version,
            fields = ?update.changed_fields(),
            "applied settings update"
        );
        Ok(merged)
    }
}

#[async_trait]
impl SettingsFacade for SettingsService {
    async fn read(&self) -> SettingsResult<SystemSettings> {
        self.get().await
    }

    async fn update(&self, patch: SettingsPatch) -> SettingsResult<SystemSettings> {
        Self::update(self, &patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::Barrier;

    use crate::error::SettingsErrorKind;
    use crate::model::TwoFactorAuthMode;
    use crate::store::MemorySettingsStore;

    fn patch(value: serde_json::Value) -> SettingsPatch {
        SettingsPatch::from_value(value).expect("patch object")
    }

    fn memory_service() -> (Arc<MemorySettingsStore>, SettingsService) {
        let store = Arc::new(MemorySettingsStore::new());
        (store.clone(), SettingsService::new(store))
    }

    /// Forces every caller to observe an empty store before any insert runs.
    struct RacingStore {
        inner: MemorySettingsStore,
        callers: usize,
        barrier: Barrier,
        first_reads: AtomicUsize,
        inserts: AtomicUsize,
    }

    impl RacingStore {
        fn new(callers: usize) -> Self {
            Self {
                inner: MemorySettingsStore::new(),
                callers,
                barrier: Barrier::new(callers),
                first_reads: AtomicUsize::new(0),
                inserts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SettingsStore for RacingStore {
        async fn find_one(&self) -> SettingsResult<Option<SystemSettings>> {
            let seen = self.inner.find_one().await?;
            if self.first_reads.fetch_add(1, Ordering::SeqCst) < self.callers {
                self.barrier.wait().await;
            }
            Ok(seen)
        }

        async fn insert(&self, defaults: &SettingsDefaults) -> SettingsResult<SystemSettings> {
            let created = self.inner.insert(defaults).await?;
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(created)
        }

        async fn upsert_merge(
            &self,
            update: &SettingsUpdate,
            defaults: &SettingsDefaults,
        ) -> SettingsResult<SystemSettings> {
            self.inner.upsert_merge(update, defaults).await
        }
    }

    /// Store whose backend is always down.
    struct UnavailableStore;

    #[async_trait]
    impl SettingsStore for UnavailableStore {
        async fn find_one(&self) -> SettingsResult<Option<SystemSettings>> {
            Err(SettingsError::storage(
                "fetch settings",
                sqlx::Error::PoolTimedOut,
            ))
        }

        async fn insert(&self, _defaults: &SettingsDefaults) -> SettingsResult<SystemSettings> {
            Err(SettingsError::storage(
                "insert settings",
                sqlx::Error::PoolTimedOut,
            ))
        }

        async fn upsert_merge(
            &self,
            _update: &SettingsUpdate,
            _defaults: &SettingsDefaults,
        ) -> SettingsResult<SystemSettings> {
            Err(SettingsError::storage(
                "upsert settings",
                sqlx::Error::PoolTimedOut,
            ))
        }
    }

    /// Store that reports a conflicting insert but never shows the record.
    struct VanishingStore;

    #[async_trait]
    impl SettingsStore for VanishingStore {
        async fn find_one(&self) -> SettingsResult<Option<SystemSettings>> {
            Ok(None)
        }

        async fn insert(&self, _defaults: &SettingsDefaults) -> SettingsResult<SystemSettings> {
            Err(SettingsError::Duplicate)
        }

        async fn upsert_merge(
            &self,
            update: &SettingsUpdate,
            defaults: &SettingsDefaults,
        ) -> SettingsResult<SystemSettings> {
            Ok(update.apply_to(&SystemSettings::from_defaults(defaults, Utc::now())))
        }
    }

    #[tokio::test]
    async fn read_on_empty_store_creates_full_defaults() {
        let (store, service) = memory_service();
        let settings = service.get().await.unwrap();
        assert_eq!(settings.library_name, "Library");
        assert!(settings.max_books_per_user >= 0);
        assert!(settings.loan_period_days >= 1);
        assert!(settings.session_timeout_minutes >= 1);
        assert_eq!(settings.version, 1);
        assert_eq!(store.find_one().await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn consecutive_reads_are_identical() {
        let (_store, service) = memory_service();
        let first = service.get().await.unwrap();
        let second = service.get().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let (_store, service) = memory_service();
        service.get().await.unwrap();
        let updated = service
            .update(&patch(json!({ "loanPeriodDays": 21 })))
            .await
            .unwrap();
        assert_eq!(updated.loan_period_days, 21);
        assert_eq!(updated.max_books_per_user, 5);
        assert_eq!(updated.version, 2);
        assert_eq!(service.get().await.unwrap(), updated);
    }

    #[tokio::test]
    async fn rejected_update_changes_nothing() {
        let (_store, service) = memory_service();
        let before = service.get().await.unwrap();
        let err = service
            .update(&patch(json!({ "maxBooksPerUser": -1, "loanPeriodDays": 30 })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SettingsErrorKind::Validation);
        assert_eq!(err.violations()[0].field, "maxBooksPerUser");
        assert_eq!(service.get().await.unwrap(), before);
    }

    #[tokio::test]
    async fn two_factor_mode_is_enforced() {
        let (_store, service) = memory_service();
        let err = service
            .update(&patch(json!({ "twoFactorAuthMode": "bogus" })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SettingsErrorKind::Validation);

        service
            .update(&patch(json!({ "twoFactorAuthMode": "required" })))
            .await
            .unwrap();
        assert_eq!(
            service.get().await.unwrap().two_factor_auth_mode,
            TwoFactorAuthMode::Required
        );
    }

    #[tokio::test]
    async fn empty_patch_behaves_like_read() {
        let (store, service) = memory_service();
        let created = service
            .update(&patch(json!({ "unknownKey": 1, "libraryName": null })))
            .await
            .unwrap();
        assert_eq!(created.version, 1);
        let again = service.update(&SettingsPatch::default()).await.unwrap();
        assert_eq!(again, created);
        assert_eq!(store.find_one().await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn update_on_empty_store_merges_over_defaults() {
        let (_store, service) = memory_service();
        let created = service
            .update(&patch(json!({ "libraryName": "  Annex  " })))
            .await
            .unwrap();
        assert_eq!(created.library_name, "Annex");
        assert_eq!(created.loan_period_days, 14);
        assert_eq!(created.version, 1);
    }

    #[tokio::test]
    async fn typed_updates_are_validated() {
        let (_store, service) = memory_service();
        let err = service
            .update_typed(SettingsUpdate {
                session_timeout_minutes: Some(0),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SettingsErrorKind::Validation);

        let applied = service
            .update_typed(SettingsUpdate {
                session_timeout_minutes: Some(90),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(applied.session_timeout_minutes, 90);
    }

    #[tokio::test]
    async fn custom_defaults_are_checked_and_used() {
        let store = Arc::new(MemorySettingsStore::new());
        assert!(
            SettingsService::with_defaults(
                store.clone(),
                SettingsDefaults {
                    loan_period_days: 0,
                    ..SettingsDefaults::default()
                },
            )
            .is_err()
        );

        let service = SettingsService::with_defaults(
            store,
            SettingsDefaults {
                library_name: " Branch ".to_string(),
                ..SettingsDefaults::default()
            },
        )
        .unwrap();
        assert_eq!(service.defaults().library_name, "Branch");
        assert_eq!(service.get().await.unwrap().library_name, "Branch");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_reads_create_exactly_one_record() {
        const CALLERS: usize = 8;
        let store = Arc::new(RacingStore::new(CALLERS));
        let service = SettingsService::new(store.clone());

        let mut handles = Vec::new();
        for _ in 0..CALLERS {
            let service = service.clone();
            handles.push(tokio::spawn(async move { service.get().await }));
        }
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(store.inner.find_one().await.unwrap().as_ref(), results.first());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_and_updates_leave_one_record() {
        let (store, service) = memory_service();
        let mut handles = Vec::new();
        for index in 0..16_i32 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                if index % 2 == 0 {
                    service.get().await
                } else {
                    service
                        .update(&patch(json!({ "loanPeriodDays": index + 1 })))
                        .await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let settings = store.find_one().await.unwrap().expect("record exists");
        // Eight updates land on top of whichever call created the record.
        assert!(matches!(settings.version, 8 | 9));
        assert_eq!(settings.loan_period_days % 2, 0);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_retryable() {
        let service = SettingsService::new(Arc::new(UnavailableStore));
        let err = service.get().await.unwrap_err();
        assert_eq!(err.kind(), SettingsErrorKind::StorageUnavailable);
        assert!(err.is_retryable());

        let err = service
            .update(&patch(json!({ "loanPeriodDays": 3 })))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let err = service
            .update(&patch(json!({ "loanPeriodDays": 0 })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SettingsErrorKind::Validation);
    }

    #[tokio::test]
    async fn record_missing_after_conflict_is_retryable() {
        let service = SettingsService::new(Arc::new(VanishingStore));
        let err = service.get().await.unwrap_err();
        assert_eq!(err.kind(), SettingsErrorKind::StorageUnavailable);
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            SettingsError::StorageUnavailable {
                operation: "re-read settings after conflict",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn facade_delegates_to_service() {
        let (_store, service) = memory_service();
        let facade: Arc<dyn SettingsFacade> = Arc::new(service);
        let created = facade.read().await.unwrap();
        let updated = facade
            .update(patch(json!({ "passwordPolicy": "basic" })))
            .await
            .unwrap();
        assert_eq!(updated.password_policy.min_length, 6);
        assert_eq!(updated.version, created.version + 1);
    }
}
